//! Day-keyed cache of the latest known value per day, one store per domain.
//!
//! The read model reflects the best known local truth and is written as soon
//! as a session is accepted. It is independent of the action queue: two
//! writes for the same day leave one entry here and two items in the queue.

use chrono::{Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

use crate::db::{read_model_store, Database, StoreError};
use crate::models::{ActionType, Session};

const DAY_FORMAT: &str = "%Y-%m-%d";

pub struct LocalReadModel<E> {
    db: Database,
    store: String,
    _entry: PhantomData<fn() -> E>,
}

impl<E> Clone for LocalReadModel<E> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            store: self.store.clone(),
            _entry: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for LocalReadModel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalReadModel")
            .field("store", &self.store)
            .finish()
    }
}

impl<E: Serialize + DeserializeOwned> LocalReadModel<E> {
    pub fn new(db: Database, domain: ActionType) -> Self {
        Self {
            db,
            store: read_model_store(domain.as_str()),
            _entry: PhantomData,
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store
    }

    /// Replaces whatever is stored for `date` (last write wins).
    pub async fn upsert(&self, date: NaiveDate, entry: &E) -> Result<(), StoreError> {
        let value = serde_json::to_value(entry).map_err(|source| self.corrupt(source))?;
        self.db
            .put(&self.store, &date.format(DAY_FORMAT).to_string(), &value)
            .await
    }

    pub async fn get(&self, date: NaiveDate) -> Result<Option<E>, StoreError> {
        self.db
            .get(&self.store, &date.format(DAY_FORMAT).to_string())
            .await?
            .map(|value| serde_json::from_value(value).map_err(|source| self.corrupt(source)))
            .transpose()
    }

    /// Entries for the trailing `window_days` days ending today, oldest
    /// first. Days are UTC calendar days, the same clock sessions are keyed on.
    pub async fn query(&self, window_days: u32) -> Result<Vec<E>, StoreError> {
        self.query_window(Utc::now().date_naive(), window_days)
            .await
    }

    /// Entries whose day lies in `[today - (window_days - 1), today]`, oldest
    /// first. A zero-day window is empty; a window reaching past the earliest
    /// representable date covers everything up to `today`.
    pub async fn query_window(
        &self,
        today: NaiveDate,
        window_days: u32,
    ) -> Result<Vec<E>, StoreError> {
        if window_days == 0 {
            return Ok(Vec::new());
        }
        // Empty lower bound sorts before every day key
        let from = today
            .checked_sub_signed(Duration::days(i64::from(window_days) - 1))
            .map(|day| day.format(DAY_FORMAT).to_string())
            .unwrap_or_default();

        let rows = self
            .db
            .scan_range(&self.store, &from, &today.format(DAY_FORMAT).to_string())
            .await?;

        rows.into_iter()
            .map(|(_, value)| serde_json::from_value(value).map_err(|source| self.corrupt(source)))
            .collect()
    }

    fn corrupt(&self, source: serde_json::Error) -> StoreError {
        StoreError::Corrupt {
            store: self.store.clone(),
            source,
        }
    }
}

impl<E: Serialize + DeserializeOwned> LocalReadModel<E> {
    /// Read model of the domain that `S` belongs to.
    pub fn for_session<S>(db: Database) -> Self
    where
        S: Session<Entry = E>,
    {
        Self::new(db, S::ACTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::models::{SleepEntry, SleepSession};
    use chrono::TimeZone;
    use tempfile::{tempdir, TempDir};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn entry(d: u32, hours: f64) -> SleepEntry {
        SleepEntry {
            date: day(d),
            hours,
            quality: 3,
        }
    }

    async fn sleep_model() -> (LocalReadModel<SleepEntry>, TempDir) {
        let temp_dir = tempdir().unwrap();
        let db = init_db(Some(temp_dir.path().join("test.db"))).await.unwrap();
        (LocalReadModel::for_session::<SleepSession>(db), temp_dir)
    }

    #[tokio::test]
    async fn test_upsert_is_last_write_wins() {
        let (model, _temp) = sleep_model().await;

        model.upsert(day(10), &entry(10, 7.0)).await.unwrap();
        model.upsert(day(10), &entry(10, 8.0)).await.unwrap();

        let entries = model.query_window(day(10), 1).await.unwrap();
        assert_eq!(entries, vec![entry(10, 8.0)]);
        assert_eq!(model.get(day(10)).await.unwrap(), Some(entry(10, 8.0)));
    }

    #[tokio::test]
    async fn test_upsert_replaces_all_fields() {
        let (model, _temp) = sleep_model().await;

        model.upsert(day(10), &entry(10, 7.0)).await.unwrap();
        let replacement = SleepEntry {
            date: day(10),
            hours: 6.5,
            quality: 5,
        };
        model.upsert(day(10), &replacement).await.unwrap();

        assert_eq!(model.get(day(10)).await.unwrap(), Some(replacement));
    }

    #[tokio::test]
    async fn test_query_window_is_trailing_and_ascending() {
        let (model, _temp) = sleep_model().await;

        for d in [12, 3, 9, 11, 10, 13] {
            model.upsert(day(d), &entry(d, f64::from(d))).await.unwrap();
        }

        // Window of 3 days ending on the 12th: 10, 11, 12
        let dates: Vec<NaiveDate> = model
            .query_window(day(12), 3)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.date)
            .collect();
        assert_eq!(dates, vec![day(10), day(11), day(12)]);
    }

    #[tokio::test]
    async fn test_query_window_zero_days_is_empty() {
        let (model, _temp) = sleep_model().await;
        model.upsert(day(10), &entry(10, 7.0)).await.unwrap();

        assert!(model.query_window(day(10), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_crosses_month_boundary() {
        let (model, _temp) = sleep_model().await;
        let dec_31 = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        model
            .upsert(
                dec_31,
                &SleepEntry {
                    date: dec_31,
                    hours: 9.0,
                    quality: 5,
                },
            )
            .await
            .unwrap();
        model.upsert(day(1), &entry(1, 7.0)).await.unwrap();

        let entries = model.query_window(day(1), 7).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].date, dec_31);
    }

    #[tokio::test]
    async fn test_huge_window_returns_everything_up_to_today() {
        let (model, _temp) = sleep_model().await;
        let long_ago = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        model
            .upsert(
                long_ago,
                &SleepEntry {
                    date: long_ago,
                    hours: 6.0,
                    quality: 2,
                },
            )
            .await
            .unwrap();
        model.upsert(day(10), &entry(10, 7.0)).await.unwrap();
        model.upsert(day(11), &entry(11, 8.0)).await.unwrap();

        let dates: Vec<NaiveDate> = model
            .query_window(day(10), u32::MAX)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.date)
            .collect();
        assert_eq!(dates, vec![long_ago, day(10)]);

        assert_eq!(model.query(u32::MAX).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_window_uses_same_day_as_session_key() {
        let (model, _temp) = sleep_model().await;
        // Evening of Jan 10 west of UTC, already Jan 11 in UTC
        let at = Utc.with_ymd_and_hms(2024, 1, 11, 3, 0, 0).unwrap();
        let session = SleepSession::new(7.0, 4, at);
        model.upsert(session.day(), &session.to_entry()).await.unwrap();

        let entries = model.query_window(day(11), 7).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].date, day(11));
    }

    #[tokio::test]
    async fn test_query_shows_session_recorded_now() {
        let (model, _temp) = sleep_model().await;
        let session = SleepSession::new(7.5, 4, Utc::now());
        model.upsert(session.day(), &session.to_entry()).await.unwrap();

        let entries = model.query(1).await.unwrap();
        assert_eq!(entries, vec![session.to_entry()]);
    }

    #[tokio::test]
    async fn test_domains_are_separate_stores() {
        let temp_dir = tempdir().unwrap();
        let db = init_db(Some(temp_dir.path().join("test.db"))).await.unwrap();
        let sleep: LocalReadModel<SleepEntry> = LocalReadModel::new(db.clone(), ActionType::Sleep);
        let other: LocalReadModel<SleepEntry> = LocalReadModel::new(db, ActionType::Meditation);

        sleep.upsert(day(10), &entry(10, 7.0)).await.unwrap();

        assert_eq!(sleep.store_name(), "readModel:sleep");
        assert!(other.get(day(10)).await.unwrap().is_none());
    }
}
