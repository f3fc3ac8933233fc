use crate::config::ACTIVITY_THRESHOLD_PCT;
use crate::types::{ActivityRecord, MarketGroup, MarketKind, PollKey};

/// Compare a freshly fetched group against the cached one and emit one record
/// per market kind whose probability moved by at least `ACTIVITY_THRESHOLD_PCT`.
///
/// A kind qualifies only when both sides exist and the new side is live.
/// First observations (`previous == None`) never emit.
pub fn detect_changes(
    key: &PollKey,
    previous: Option<&MarketGroup>,
    current: &MarketGroup,
    observed_at_ns: u64,
) -> Vec<ActivityRecord> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    MarketKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let before = previous.get(kind)?;
            let after = current.get(kind)?;
            if !after.is_live {
                return None;
            }

            let previous_chance = before.chance_pct();
            let new_chance = after.chance_pct();
            let delta = new_chance - previous_chance;
            if delta.abs() < ACTIVITY_THRESHOLD_PCT {
                return None;
            }

            Some(ActivityRecord {
                poll_key: key.clone(),
                market_kind: kind,
                market_address: after.market_address.clone(),
                previous_chance,
                new_chance,
                delta,
                observed_at_ns,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketState;

    fn state(chance: u64, live: bool) -> MarketState {
        MarketState {
            is_live: live,
            total_value_locked: 0,
            yes_chance: chance,
            market_address: "0xmarket".to_string(),
            collateral_token: "0xusdc".to_string(),
        }
    }

    fn amm(chance: u64) -> MarketGroup {
        MarketGroup { amm: Some(state(chance, true)), pari_mutuel: None }
    }

    fn both(amm: u64, pm: u64) -> MarketGroup {
        MarketGroup {
            amm: Some(state(amm, true)),
            pari_mutuel: Some(state(pm, true)),
        }
    }

    fn key() -> PollKey {
        PollKey::new("0xa")
    }

    #[test]
    fn first_observation_emits_nothing() {
        assert!(detect_changes(&key(), None, &amm(900_000_000), 1).is_empty());
    }

    #[test]
    fn move_below_threshold_is_ignored() {
        // 50.0% -> 50.0999999%
        let records = detect_changes(&key(), Some(&amm(500_000_000)), &amm(500_999_999), 1);
        assert!(records.is_empty());
    }

    #[test]
    fn move_at_threshold_emits() {
        // 50.0% -> 50.1%
        let records = detect_changes(&key(), Some(&amm(500_000_000)), &amm(501_000_000), 1);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn two_point_move_reports_signed_delta() {
        let up = detect_changes(&key(), Some(&amm(500_000_000)), &amm(520_000_000), 7);
        assert_eq!(up.len(), 1);
        let r = &up[0];
        assert_eq!(r.market_kind, MarketKind::Amm);
        assert_eq!(r.observed_at_ns, 7);
        assert!((r.previous_chance - 50.0).abs() < 1e-9);
        assert!((r.new_chance - 52.0).abs() < 1e-9);
        assert!((r.delta - 2.0).abs() < 1e-9);

        let down = detect_changes(&key(), Some(&amm(520_000_000)), &amm(500_000_000), 7);
        assert!((down[0].delta + 2.0).abs() < 1e-9);
    }

    #[test]
    fn not_live_market_is_ignored() {
        let prev = amm(500_000_000);
        let next = MarketGroup { amm: Some(state(600_000_000, false)), pari_mutuel: None };
        assert!(detect_changes(&key(), Some(&prev), &next, 1).is_empty());
    }

    #[test]
    fn each_kind_is_judged_independently() {
        let records = detect_changes(
            &key(),
            Some(&both(500_000_000, 300_000_000)),
            &both(510_000_000, 250_000_000),
            1,
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].market_kind, MarketKind::Amm);
        assert_eq!(records[1].market_kind, MarketKind::PariMutuel);

        // Pari-Mutuel appearing for the first time is not a move.
        let records = detect_changes(&key(), Some(&amm(500_000_000)), &both(510_000_000, 250_000_000), 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].market_kind, MarketKind::Amm);
    }
}
