use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::{CHANCE_SCALE, ZERO_ADDRESS};

// ---------------------------------------------------------------------------
// PollKey
// ---------------------------------------------------------------------------

/// Poll address used as the cache key. Always trimmed and lower-cased so that
/// `0xAbC` and `0xabc` can never occupy two slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PollKey(String);

impl PollKey {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PollKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for PollKey {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl std::fmt::Display for PollKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize and dedup a caller-supplied key list, keeping first-seen order.
pub fn normalize_keys<I, S>(keys: I) -> Vec<PollKey>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    keys.into_iter()
        .map(|k| PollKey::new(k.as_ref()))
        .filter(|k| !k.as_str().is_empty())
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Market state
// ---------------------------------------------------------------------------

/// One market slot exactly as `GetMarketsState` returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarketState {
    pub is_live: bool,
    #[serde(with = "uint_str")]
    pub total_value_locked: u128,
    #[serde(deserialize_with = "de_u64")]
    pub yes_chance: u64,
    pub market_address: String,
    pub collateral_token: String,
}

impl RawMarketState {
    /// A slot whose market address is the zero address carries no market.
    pub fn is_absent(&self) -> bool {
        self.market_address.trim().eq_ignore_ascii_case(ZERO_ADDRESS)
    }

    pub fn into_state(self) -> Option<MarketState> {
        if self.is_absent() {
            return None;
        }
        Some(MarketState {
            is_live: self.is_live,
            total_value_locked: self.total_value_locked,
            yes_chance: self.yes_chance,
            market_address: self.market_address,
            collateral_token: self.collateral_token,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketState {
    pub is_live: bool,
    #[serde(serialize_with = "uint_str::serialize")]
    pub total_value_locked: u128,
    /// Fixed-point probability of "yes", 0..1_000_000_000.
    pub yes_chance: u64,
    pub market_address: String,
    pub collateral_token: String,
}

impl MarketState {
    /// `yes_chance` as a 0..100 percentage. No rounding is applied.
    pub fn chance_pct(&self) -> f64 {
        self.yes_chance as f64 / CHANCE_SCALE
    }
}

/// Cache value for one poll: the two market mechanisms that may back it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketGroup {
    pub amm: Option<MarketState>,
    pub pari_mutuel: Option<MarketState>,
}

impl MarketGroup {
    pub fn from_wire(amm: RawMarketState, pari_mutuel: RawMarketState) -> Self {
        Self {
            amm: amm.into_state(),
            pari_mutuel: pari_mutuel.into_state(),
        }
    }

    pub fn get(&self, kind: MarketKind) -> Option<&MarketState> {
        match kind {
            MarketKind::Amm => self.amm.as_ref(),
            MarketKind::PariMutuel => self.pari_mutuel.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Amm,
    PariMutuel,
}

impl MarketKind {
    pub const ALL: [MarketKind; 2] = [MarketKind::Amm, MarketKind::PariMutuel];
}

impl std::fmt::Display for MarketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketKind::Amm => "amm",
            MarketKind::PariMutuel => "pari_mutuel",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

/// A probability move on one market. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub poll_key: PollKey,
    pub market_kind: MarketKind,
    pub market_address: String,
    /// Percent, 0..100.
    pub previous_chance: f64,
    pub new_chance: f64,
    /// `new_chance - previous_chance`, percentage points.
    pub delta: f64,
    /// Nanosecond UTC epoch timestamp.
    pub observed_at_ns: u64,
}

// ---------------------------------------------------------------------------
// Volume pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    #[serde(with = "uint_str")]
    pub volume: u128,
    #[serde(deserialize_with = "de_u64")]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumePage {
    pub records: Vec<VolumeRecord>,
    pub has_more: bool,
}

// ---------------------------------------------------------------------------
// uint wire helpers
// ---------------------------------------------------------------------------

/// The gateway emits uints either as JSON numbers or as decimal strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireUint {
    Num(u64),
    Str(String),
}

impl WireUint {
    fn into_u128(self) -> std::result::Result<u128, String> {
        match self {
            WireUint::Num(n) => Ok(u128::from(n)),
            WireUint::Str(s) => s
                .trim()
                .parse::<u128>()
                .map_err(|e| format!("invalid uint {s:?}: {e}")),
        }
    }
}

fn de_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    let v = WireUint::deserialize(d)?
        .into_u128()
        .map_err(serde::de::Error::custom)?;
    u64::try_from(v).map_err(|_| serde::de::Error::custom(format!("uint {v} overflows u64")))
}

/// u128 amounts travel as decimal strings so JSON consumers keep full precision.
mod uint_str {
    use super::*;

    pub fn serialize<S: Serializer>(v: &u128, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(v)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u128, D::Error> {
        WireUint::deserialize(d)?
            .into_u128()
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
