//! Cascading filter choices for the dashboard.
//!
//! Each level narrows the previous one: dates that have yield data, then the
//! stations that ran in a date range, then the products a station ran, then
//! the lots. Every function makes a single relational store call.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use super::{RecordError, RelationalStore, YieldFilter, YieldRow};

/// Every date with at least one yield record, ascending.
pub async fn available_dates(store: &dyn RelationalStore) -> Result<Vec<NaiveDate>, RecordError> {
    let dates: BTreeSet<NaiveDate> = store
        .list_yields()
        .await?
        .iter()
        .map(|y| y.timestamp.date_naive())
        .collect();
    Ok(dates.into_iter().collect())
}

/// Stations with yield data between `date_from` and `date_to`, inclusive.
pub async fn stations(
    store: &dyn RelationalStore,
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> Result<Vec<String>, RecordError> {
    let rows = store.yield_rows(&range(date_from, date_to, None, None)).await?;
    Ok(distinct(&rows, |r| &r.station))
}

/// Products run on `station` in the date range.
pub async fn products(
    store: &dyn RelationalStore,
    date_from: NaiveDate,
    date_to: NaiveDate,
    station: &str,
) -> Result<Vec<String>, RecordError> {
    let filter = range(date_from, date_to, Some(station), None);
    let rows = store.yield_rows(&filter).await?;
    Ok(distinct(&rows, |r| &r.product))
}

/// Lots of `product` run on `station` in the date range.
pub async fn lot_ids(
    store: &dyn RelationalStore,
    date_from: NaiveDate,
    date_to: NaiveDate,
    station: &str,
    product: &str,
) -> Result<Vec<String>, RecordError> {
    let filter = range(date_from, date_to, Some(station), Some(product));
    let rows = store.yield_rows(&filter).await?;
    Ok(distinct(&rows, |r| &r.lot_id))
}

fn range(
    date_from: NaiveDate,
    date_to: NaiveDate,
    station: Option<&str>,
    product: Option<&str>,
) -> YieldFilter {
    YieldFilter {
        date_from,
        date_to,
        station: station.map(str::to_string),
        product: product.map(str::to_string),
        lots: Vec::new(),
    }
}

fn distinct<F>(rows: &[YieldRow], field: F) -> Vec<String>
where
    F: Fn(&YieldRow) -> &String,
{
    rows.iter()
        .map(field)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{InMemoryRelationalStore, Lot, YieldRecord};
    use chrono::{TimeZone, Utc};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn seeded() -> InMemoryRelationalStore {
        let store = InMemoryRelationalStore::new();
        for (lot_id, station, product) in [
            ("L1", "AOI-01", "PKG-A"),
            ("L2", "AOI-01", "PKG-B"),
            ("L3", "AOI-02", "PKG-A"),
            ("L4", "AOI-01", "PKG-A"),
        ] {
            store.add_lot(Lot {
                lot_id: lot_id.to_string(),
                product: product.to_string(),
                station: station.to_string(),
                total: 100,
                good: 90,
            });
        }
        for (lot_id, day) in [("L1", 1), ("L2", 1), ("L3", 4), ("L4", 2), ("L1", 2)] {
            store.add_yield(YieldRecord {
                lot_id: lot_id.to_string(),
                good: 90,
                total: 100,
                yield_rate: 90.0,
                timestamp: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            });
        }
        store
    }

    #[tokio::test]
    async fn test_dates_are_distinct_and_ascending() {
        let store = seeded();
        assert_eq!(
            available_dates(&store).await.unwrap(),
            vec![date(1), date(2), date(4)]
        );
    }

    #[tokio::test]
    async fn test_each_level_narrows_the_previous() {
        let store = seeded();

        assert_eq!(
            stations(&store, date(1), date(4)).await.unwrap(),
            vec!["AOI-01", "AOI-02"]
        );
        assert_eq!(stations(&store, date(1), date(2)).await.unwrap(), vec!["AOI-01"]);

        assert_eq!(
            products(&store, date(1), date(2), "AOI-01").await.unwrap(),
            vec!["PKG-A", "PKG-B"]
        );
        assert_eq!(
            products(&store, date(2), date(2), "AOI-01").await.unwrap(),
            vec!["PKG-A"]
        );

        assert_eq!(
            lot_ids(&store, date(1), date(4), "AOI-01", "PKG-A").await.unwrap(),
            vec!["L1", "L4"]
        );
        assert!(lot_ids(&store, date(1), date(4), "AOI-09", "PKG-A")
            .await
            .unwrap()
            .is_empty());
    }
}
