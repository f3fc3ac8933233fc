use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::VOLUME_MAX_PAGES;
use crate::remote::MarketReader;

/// Volume and trade count summed across every page of one market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VolumeTotals {
    #[serde(serialize_with = "serialize_u128")]
    pub volume: u128,
    pub count: u64,
    pub pages: usize,
    /// True when a page failed (or the page cap was hit) and the sum is partial.
    pub truncated: bool,
}

fn serialize_u128<S: serde::Serializer>(v: &u128, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(v)
}

/// Walk `GetPaginatedVolume` with `offset += page_size` until `has_more` is false.
///
/// A failed page stops pagination for this market only; whatever was summed so
/// far is returned with `truncated` set. Failed pages are not retried.
pub async fn aggregate_volume(
    reader: &dyn MarketReader,
    market_address: &str,
    page_size: u64,
) -> VolumeTotals {
    let limit = page_size.max(1);
    let mut totals = VolumeTotals::default();
    let mut offset = 0u64;

    loop {
        if totals.pages >= VOLUME_MAX_PAGES {
            warn!(market = market_address, pages = totals.pages, "volume page cap reached");
            totals.truncated = true;
            break;
        }

        match reader.get_paginated_volume(market_address, offset, limit).await {
            Ok(page) => {
                totals.pages += 1;
                for record in &page.records {
                    totals.volume = totals.volume.saturating_add(record.volume);
                    totals.count = totals.count.saturating_add(record.count);
                }
                if !page.has_more {
                    break;
                }
                offset += limit;
            }
            Err(e) => {
                warn!(market = market_address, offset, "volume page failed, keeping partial sum: {e}");
                totals.truncated = true;
                break;
            }
        }
    }

    debug!(
        market = market_address,
        pages = totals.pages,
        count = totals.count,
        truncated = totals.truncated,
        "volume aggregated"
    );
    totals
}

/// Aggregate several markets concurrently. Output order follows `markets`.
pub async fn aggregate_volumes(
    reader: &dyn MarketReader,
    markets: &[String],
    page_size: u64,
) -> Vec<(String, VolumeTotals)> {
    let totals = join_all(
        markets
            .iter()
            .map(|market| aggregate_volume(reader, market, page_size)),
    )
    .await;
    markets.iter().cloned().zip(totals).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockReader;
    use crate::types::VolumeRecord;

    fn records(n: u64) -> Vec<VolumeRecord> {
        (1..=n)
            .map(|i| VolumeRecord { volume: u128::from(i) * 1_000, count: i })
            .collect()
    }

    #[tokio::test]
    async fn paged_sum_matches_unpaginated_sum() {
        let reader = MockReader::new();
        let all = records(23);
        reader.set_volume("0xm", all.clone());

        let expected_volume: u128 = all.iter().map(|r| r.volume).sum();
        let expected_count: u64 = all.iter().map(|r| r.count).sum();

        for page_size in [1, 5, 10, 23, 100] {
            let totals = aggregate_volume(&reader, "0xm", page_size).await;
            assert_eq!(totals.volume, expected_volume, "page_size={page_size}");
            assert_eq!(totals.count, expected_count, "page_size={page_size}");
            assert!(!totals.truncated);
        }

        // 23 records at 5 per page: 5 pages, the last one short.
        assert_eq!(aggregate_volume(&reader, "0xm", 5).await.pages, 5);
    }

    #[tokio::test]
    async fn failed_page_truncates_that_market_only() {
        let reader = MockReader::new();
        reader.set_volume("0xm", records(30));
        reader.set_volume("0xn", records(3));
        reader.fail_volume_at(20);

        let results = aggregate_volumes(&reader, &["0xm".to_string(), "0xn".to_string()], 10).await;

        let (_, m) = &results[0];
        assert!(m.truncated);
        assert_eq!(m.pages, 2);
        assert_eq!(m.count, (1..=20).sum::<u64>());

        let (_, n) = &results[1];
        assert!(!n.truncated);
        assert_eq!(n.count, 6);
    }

    #[tokio::test]
    async fn unknown_market_is_a_single_empty_page() {
        let reader = MockReader::new();
        let totals = aggregate_volume(&reader, "0xnone", 50).await;
        assert_eq!(totals, VolumeTotals { volume: 0, count: 0, pages: 1, truncated: false });
    }
}
