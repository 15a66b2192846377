//! Yield-trend aggregate.
//!
//! Combines daily average yield (relational store), a defect Pareto over the
//! selected lots (relational store) and located defect details (document
//! store). The result is what the cache-aside layer stores under
//! [`TREND_NAMESPACE`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{DefectDetail, DocumentStore, RecordError, RelationalStore, YieldFilter};
use crate::cache::CacheParams;

/// Cache namespace of trend aggregates; every lot write invalidates it.
pub const TREND_NAMESPACE: &str = "yield_trend";

/// Query string of `GET /yield/trend`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrendQuery {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default)]
    pub station: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    /// Comma-separated lot ids.
    #[serde(default)]
    pub lots: Option<String>,
}

impl TrendQuery {
    /// Reject an inverted date range.
    pub fn validate(&self) -> Result<(), String> {
        if self.date_from > self.date_to {
            return Err(format!(
                "date_from ({}) is after date_to ({})",
                self.date_from, self.date_to
            ));
        }
        Ok(())
    }

    /// Requested lot ids, sorted and deduplicated.
    pub fn lot_ids(&self) -> Vec<String> {
        self.lots
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn to_filter(&self) -> YieldFilter {
        YieldFilter {
            date_from: self.date_from,
            date_to: self.date_to,
            station: non_empty(&self.station),
            product: non_empty(&self.product),
            lots: self.lot_ids(),
        }
    }

    /// Cache identity of this query. Blank filters and absent filters share
    /// an entry, as do lot lists that differ only in order.
    pub fn cache_params(&self) -> CacheParams {
        let filter = self.to_filter();
        CacheParams::new()
            .with("date_from", filter.date_from.to_string())
            .with("date_to", filter.date_to.to_string())
            .with("station", filter.station)
            .with("product", filter.product)
            .with("lots", filter.lots)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Total count of one defect type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectCount {
    pub defect_type: String,
    pub count: i64,
}

/// Response of `GET /yield/trend`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    /// ISO dates with at least one yield record, ascending.
    pub dates: Vec<String>,
    /// Mean yield per entry of `dates`, rounded to two decimals.
    pub avg_yield: Vec<f64>,
    /// Defect totals, most frequent first.
    pub defect_pareto: Vec<DefectCount>,
    pub defect_details: Vec<DefectDetail>,
}

/// Build the trend aggregate for `filter`.
///
/// An empty selection returns an empty report without consulting the defect
/// stores. Defects are looked up for the requested lots, or for the lots that
/// produced yield rows when none were requested.
pub async fn compute_trend(
    relational: &dyn RelationalStore,
    documents: &dyn DocumentStore,
    filter: &YieldFilter,
) -> Result<TrendReport, RecordError> {
    let rows = relational.yield_rows(filter).await?;
    if rows.is_empty() {
        return Ok(TrendReport::default());
    }

    let mut daily: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for row in &rows {
        let entry = daily.entry(row.timestamp.date_naive()).or_default();
        entry.0 += row.yield_rate;
        entry.1 += 1;
    }
    let dates = daily.keys().map(NaiveDate::to_string).collect();
    let avg_yield = daily
        .values()
        .map(|(sum, n)| round2(sum / *n as f64))
        .collect();

    let lot_ids = if filter.lots.is_empty() {
        rows.iter()
            .map(|r| r.lot_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    } else {
        filter.lots.clone()
    };

    let summaries = relational.defect_counts(&lot_ids).await?;
    let mut totals: HashMap<String, i64> = HashMap::new();
    for summary in summaries {
        *totals.entry(summary.defect_type).or_default() += summary.count;
    }
    let mut defect_pareto: Vec<DefectCount> = totals
        .into_iter()
        .map(|(defect_type, count)| DefectCount { defect_type, count })
        .collect();
    defect_pareto.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.defect_type.cmp(&b.defect_type))
    });

    let defect_details = documents.defect_details(&lot_ids).await?;

    Ok(TrendReport {
        dates,
        avg_yield,
        defect_pareto,
        defect_details,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::derive_key;
    use crate::records::{
        DefectSummary, InMemoryDocumentStore, InMemoryRelationalStore, Lot, YieldRecord,
    };
    use chrono::{TimeZone, Utc};

    fn query(lots: Option<&str>) -> TrendQuery {
        TrendQuery {
            date_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            date_to: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            station: Some("S1".to_string()),
            product: None,
            lots: lots.map(str::to_string),
        }
    }

    fn seeded() -> (InMemoryRelationalStore, InMemoryDocumentStore) {
        let relational = InMemoryRelationalStore::new();
        for (id, station) in [("L1", "S1"), ("L2", "S1"), ("L3", "S2")] {
            relational.add_lot(Lot {
                lot_id: id.to_string(),
                product: "P1".to_string(),
                station: station.to_string(),
                total: 100,
                good: 90,
            });
        }
        let yields = [
            ("L1", 2, 90.0),
            ("L2", 2, 95.0),
            ("L1", 3, 80.0),
            ("L3", 3, 10.0),
        ];
        for (lot_id, day, rate) in yields {
            relational.add_yield(YieldRecord {
                lot_id: lot_id.to_string(),
                good: rate as i64,
                total: 100,
                yield_rate: rate,
                timestamp: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            });
        }
        for (lot_id, defect_type, count) in
            [("L1", "scratch", 3), ("L2", "scratch", 2), ("L2", "particle", 7), ("L3", "crack", 50)]
        {
            relational.add_defect_summary(DefectSummary {
                lot_id: lot_id.to_string(),
                defect_type: defect_type.to_string(),
                count,
            });
        }

        let documents = InMemoryDocumentStore::new();
        for lot_id in ["L1", "L3"] {
            documents.add_detail(DefectDetail {
                lot_id: lot_id.to_string(),
                defect_type: "scratch".to_string(),
                x: Some(1.5),
                y: Some(-2.0),
                severity: Some("major".to_string()),
                wafer: Some(4),
            });
        }
        (relational, documents)
    }

    #[tokio::test]
    async fn test_trend_aggregates_station() {
        let (relational, documents) = seeded();
        let report = compute_trend(&relational, &documents, &query(None).to_filter())
            .await
            .unwrap();

        assert_eq!(report.dates, vec!["2024-01-02", "2024-01-03"]);
        assert_eq!(report.avg_yield, vec![92.5, 80.0]);
        assert_eq!(
            report.defect_pareto,
            vec![
                DefectCount {
                    defect_type: "particle".to_string(),
                    count: 7
                },
                DefectCount {
                    defect_type: "scratch".to_string(),
                    count: 5
                },
            ]
        );
        assert_eq!(report.defect_details.len(), 1);
        assert_eq!(report.defect_details[0].lot_id, "L1");
    }

    #[tokio::test]
    async fn test_requested_lots_drive_defect_lookup() {
        let (relational, documents) = seeded();
        let report = compute_trend(&relational, &documents, &query(Some("L2")).to_filter())
            .await
            .unwrap();

        assert_eq!(report.dates, vec!["2024-01-02"]);
        assert_eq!(report.avg_yield, vec![95.0]);
        assert_eq!(report.defect_pareto.len(), 2);
        assert!(report.defect_details.is_empty());
    }

    #[tokio::test]
    async fn test_empty_selection_skips_defect_stores() {
        let (relational, documents) = seeded();
        let mut q = query(None);
        q.station = Some("S404".to_string());

        let report = compute_trend(&relational, &documents, &q.to_filter())
            .await
            .unwrap();
        assert_eq!(report, TrendReport::default());
        assert_eq!(relational.call_count(), 1);
        assert_eq!(documents.call_count(), 0);
    }

    #[test]
    fn test_equivalent_queries_share_cache_key() {
        let a = query(Some("L2, L1,,L1"));
        let mut b = query(Some("L1,L2"));
        b.product = Some("  ".to_string());

        assert_eq!(a.lot_ids(), vec!["L1", "L2"]);
        assert_eq!(
            derive_key(TREND_NAMESPACE, &a.cache_params()),
            derive_key(TREND_NAMESPACE, &b.cache_params())
        );
        assert_ne!(
            derive_key(TREND_NAMESPACE, &a.cache_params()),
            derive_key(TREND_NAMESPACE, &query(None).cache_params())
        );
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut q = query(None);
        q.date_from = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert!(q.validate().is_err());
        assert!(query(None).validate().is_ok());
    }
}
