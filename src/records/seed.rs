//! Demo dataset.
//!
//! Seven days ending today, three machines, three recipes and one to three
//! lots per machine, recipe and day. Each lot loses up to 20% of its units
//! to defects spread over four defect types; the document store gets at most
//! 50 located defects per lot and type.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime};
use rand::Rng;
use serde::Serialize;

use super::{
    DefectDetail, DefectSummary, DocumentStore, Lot, RecordError, RelationalDataset,
    RelationalStore, YieldRecord,
};

pub const MACHINES: [&str; 3] = ["AOI-01", "AOI-02", "AOI-03"];
pub const RECIPES: [&str; 3] = ["PKG-A", "PKG-B", "PKG-C"];
pub const DEFECT_TYPES: [&str; 4] = ["Scratch", "Particle", "Bridge", "Crack"];
const SEVERITIES: [&str; 3] = ["L", "M", "H"];

const DAYS: i64 = 7;
const FIRST_LOT_NUMBER: u32 = 1_000;
const MAX_DETAILS_PER_TYPE: i64 = 50;

/// Rows for both backing stores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedDataset {
    pub relational: RelationalDataset,
    pub details: Vec<DefectDetail>,
}

/// Row counts written by a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub lot_count: usize,
    pub yield_count: usize,
    pub defect_summary_count: usize,
    pub defect_detail_count: usize,
}

/// Generate a dataset whose last day is `today`.
pub fn generate_dataset<R: Rng>(rng: &mut R, today: NaiveDate) -> SeedDataset {
    let mut data = SeedDataset::default();
    let mut lot_number = FIRST_LOT_NUMBER;

    for offset in (0..DAYS).rev() {
        let day = today - ChronoDuration::days(offset);
        let timestamp = day.and_time(NaiveTime::MIN).and_utc() + ChronoDuration::hours(12);

        for machine in MACHINES {
            for recipe in RECIPES {
                for _ in 0..rng.gen_range(1..=3) {
                    let lot_id = format!("LOT{:05}", lot_number);
                    lot_number += 1;

                    let total: i64 = rng.gen_range(500..=1_200);
                    let defective = rng.gen_range(0..=total / 5);
                    let good = total - defective;

                    data.relational.lots.push(Lot {
                        lot_id: lot_id.clone(),
                        product: recipe.to_string(),
                        station: machine.to_string(),
                        total,
                        good,
                    });
                    data.relational.yields.push(YieldRecord {
                        lot_id: lot_id.clone(),
                        good,
                        total,
                        yield_rate: round2(good as f64 / total as f64 * 100.0),
                        timestamp,
                    });

                    split_defects(rng, &lot_id, defective, &mut data);
                }
            }
        }
    }
    data
}

/// Spread `defective` units over the defect types, recording a summary row
/// per non-zero type and a sample of located details.
fn split_defects<R: Rng>(rng: &mut R, lot_id: &str, defective: i64, data: &mut SeedDataset) {
    let mut remaining = defective;
    for defect_type in DEFECT_TYPES {
        if remaining <= 0 {
            break;
        }
        let count = rng.gen_range(0..=remaining);
        remaining -= count;
        if count == 0 {
            continue;
        }

        data.relational.summaries.push(DefectSummary {
            lot_id: lot_id.to_string(),
            defect_type: defect_type.to_string(),
            count,
        });
        for _ in 0..count.min(MAX_DETAILS_PER_TYPE) {
            data.details.push(DefectDetail {
                lot_id: lot_id.to_string(),
                defect_type: defect_type.to_string(),
                x: Some(round2(rng.gen_range(0.0..100.0))),
                y: Some(round2(rng.gen_range(0.0..100.0))),
                severity: Some(SEVERITIES[rng.gen_range(0..SEVERITIES.len())].to_string()),
                wafer: Some(rng.gen_range(1..=25)),
            });
        }
    }
}

/// Replace the contents of both stores with `data`.
///
/// The relational store is written first. If the document store then fails,
/// the relational rows stay and the error is returned.
pub async fn load_dataset(
    relational: &dyn RelationalStore,
    documents: &dyn DocumentStore,
    data: SeedDataset,
) -> Result<SeedReport, RecordError> {
    let lot_count = data.relational.lots.len();
    let yield_count = data.relational.yields.len();
    let defect_summary_count = data.relational.summaries.len();

    relational.replace_all(data.relational).await?;
    let defect_detail_count = documents.replace_details(data.details).await?;

    Ok(SeedReport {
        lot_count,
        yield_count,
        defect_summary_count,
        defect_detail_count,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{InMemoryDocumentStore, InMemoryRelationalStore};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{BTreeSet, HashMap};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    #[test]
    fn test_dataset_shape() {
        let data = generate_dataset(&mut StdRng::seed_from_u64(7), today());
        let lots = &data.relational.lots;

        // 7 days x 3 machines x 3 recipes, one to three lots each.
        assert!((63..=189).contains(&lots.len()));
        assert_eq!(data.relational.yields.len(), lots.len());
        assert_eq!(lots[0].lot_id, "LOT01000");

        let ids: BTreeSet<&str> = lots.iter().map(|l| l.lot_id.as_str()).collect();
        assert_eq!(ids.len(), lots.len());

        let days: BTreeSet<NaiveDate> = data
            .relational
            .yields
            .iter()
            .map(|y| y.timestamp.date_naive())
            .collect();
        assert_eq!(days.len(), 7);
        assert_eq!(days.iter().next_back(), Some(&today()));
        assert_eq!(
            days.iter().next(),
            Some(&NaiveDate::from_ymd_opt(2024, 6, 24).unwrap())
        );
    }

    #[test]
    fn test_defects_never_exceed_lost_units() {
        let data = generate_dataset(&mut StdRng::seed_from_u64(11), today());

        let mut per_lot: HashMap<&str, i64> = HashMap::new();
        for s in &data.relational.summaries {
            assert!(s.count > 0);
            *per_lot.entry(s.lot_id.as_str()).or_default() += s.count;
        }
        for lot in &data.relational.lots {
            assert!(lot.good <= lot.total);
            assert!(lot.total - lot.good <= lot.total / 5);
            let counted = per_lot.get(lot.lot_id.as_str()).copied().unwrap_or(0);
            assert!(counted <= lot.total - lot.good);
        }
        for y in &data.relational.yields {
            assert!((0.0..=100.0).contains(&y.yield_rate));
        }

        let mut per_type: HashMap<(&str, &str), i64> = HashMap::new();
        for d in &data.details {
            *per_type
                .entry((d.lot_id.as_str(), d.defect_type.as_str()))
                .or_default() += 1;
            assert!((1..=25).contains(&d.wafer.unwrap()));
        }
        for s in &data.relational.summaries {
            let sampled = per_type
                .get(&(s.lot_id.as_str(), s.defect_type.as_str()))
                .copied()
                .unwrap_or(0);
            assert_eq!(sampled, s.count.min(MAX_DETAILS_PER_TYPE));
        }
    }

    #[test]
    fn test_same_rng_seed_same_dataset() {
        let a = generate_dataset(&mut StdRng::seed_from_u64(3), today());
        let b = generate_dataset(&mut StdRng::seed_from_u64(3), today());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_load_replaces_both_stores() {
        let relational = InMemoryRelationalStore::new();
        let documents = InMemoryDocumentStore::new();
        relational.add_lot(Lot {
            lot_id: "STALE".to_string(),
            product: "P".to_string(),
            station: "S".to_string(),
            total: 1,
            good: 1,
        });

        let data = generate_dataset(&mut StdRng::seed_from_u64(5), today());
        let expected_details = data.details.len();
        let report = load_dataset(&relational, &documents, data).await.unwrap();

        let lots = relational.list_lots().await.unwrap();
        assert_eq!(lots.len(), report.lot_count);
        assert!(lots.iter().all(|l| l.lot_id != "STALE"));
        assert_eq!(report.defect_detail_count, expected_details);
        assert_eq!(documents.len(), expected_details);
        assert_eq!(
            relational.list_defect_summaries().await.unwrap().len(),
            report.defect_summary_count
        );
    }
}
