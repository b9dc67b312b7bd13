//! Versioned local database exposing named key-value stores.
//!
//! Every store is a SQLite table holding JSON values under either an
//! auto-increment integer key or a text key. Two bookkeeping tables track the
//! schema:
//!
//! ```text
//! _meta    (key TEXT PRIMARY KEY, value TEXT)    -- name, version
//! _stores  (name TEXT PRIMARY KEY, key_kind TEXT) -- catalog of created stores
//! ```
//!
//! Opening at a higher version creates the stores that are missing and leaves
//! existing stores and their rows alone. Opening at the recorded version does
//! nothing.

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name recorded in `_meta` for the application database.
pub const DATABASE_NAME: &str = "wellnest";

/// Current schema version. Version 2 added the dead-letter store.
pub const SCHEMA_VERSION: u32 = 2;

pub const QUEUE_STORE: &str = "queue";
pub const DEAD_LETTER_STORE: &str = "deadLetter";

/// Errors raised by the persistent store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The environment offers no usable persistent storage.
    #[error("Persistent storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Invalid store name '{0}'")]
    InvalidStoreName(String),
    #[error("Unknown store '{0}'")]
    UnknownStore(String),
    #[error("Store '{store}' is not keyed by {expected}")]
    WrongKeyKind { store: String, expected: KeyKind },
    #[error("Database is at version {current}, cannot open at older version {requested}")]
    VersionDowngrade { current: u32, requested: u32 },
    #[error("Database file belongs to '{found}', expected '{expected}'")]
    NameMismatch { expected: String, found: String },
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Corrupt value in store '{store}': {source}")]
    Corrupt {
        store: String,
        #[source]
        source: serde_json::Error,
    },
}

/// How a store's primary key is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Integer key assigned by the database, strictly increasing, never reused.
    AutoIncrement,
    /// Caller-supplied text key.
    Text,
}

impl KeyKind {
    fn as_str(&self) -> &'static str {
        match self {
            KeyKind::AutoIncrement => "autoincrement",
            KeyKind::Text => "text",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "autoincrement" => Some(KeyKind::AutoIncrement),
            "text" => Some(KeyKind::Text),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyKind::AutoIncrement => write!(f, "auto-increment key"),
            KeyKind::Text => write!(f, "text key"),
        }
    }
}

/// Declaration of a store that must exist after an upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSpec {
    pub name: String,
    pub key: KeyKind,
}

impl StoreSpec {
    pub fn auto_increment(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: KeyKind::AutoIncrement,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: KeyKind::Text,
        }
    }
}

/// Store name of the read model for a domain (e.g. `readModel:sleep`).
pub fn read_model_store(domain: &str) -> String {
    format!("readModel:{}", domain)
}

/// Handle to an open database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    name: String,
    version: u32,
    stores: Arc<HashMap<String, KeyKind>>,
}

impl Database {
    /// Opens (creating if missing) the database at `path` and upgrades it to
    /// `version`.
    ///
    /// Fails with [`StoreError::StorageUnavailable`] when there is no path or
    /// the file cannot be created; a handle is never returned in a degraded
    /// state.
    pub async fn open(
        path: Option<&Path>,
        name: &str,
        version: u32,
        specs: &[StoreSpec],
    ) -> Result<Self, StoreError> {
        for spec in specs {
            validate_store_name(&spec.name)?;
        }

        let path = path.ok_or_else(|| {
            StoreError::StorageUnavailable("no database location is available".to_string())
        })?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::StorageUnavailable(format!(
                    "cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::StorageUnavailable(format!("cannot open {}: {}", path.display(), e))
            })?;

        let db = Self::upgrade(pool, name, version, specs).await?;
        tracing::debug!(
            "Opened database '{}' v{} at {} ({} stores)",
            db.name,
            db.version,
            path.display(),
            db.stores.len()
        );
        Ok(db)
    }

    async fn upgrade(
        pool: SqlitePool,
        name: &str,
        version: u32,
        specs: &[StoreSpec],
    ) -> Result<Self, StoreError> {
        let mut tx = pool.begin().await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS _meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _stores (name TEXT PRIMARY KEY, key_kind TEXT NOT NULL)",
        )
        .execute(&mut *tx)
        .await?;

        let recorded_name: Option<(String,)> =
            sqlx::query_as("SELECT value FROM _meta WHERE key = 'name'")
                .fetch_optional(&mut *tx)
                .await?;
        if let Some((found,)) = recorded_name {
            if found != name {
                return Err(StoreError::NameMismatch {
                    expected: name.to_string(),
                    found,
                });
            }
        }

        let recorded_version: Option<(String,)> =
            sqlx::query_as("SELECT value FROM _meta WHERE key = 'version'")
                .fetch_optional(&mut *tx)
                .await?;
        let current = recorded_version
            .and_then(|(v,)| v.parse::<u32>().ok())
            .unwrap_or(0);

        if version < current {
            return Err(StoreError::VersionDowngrade {
                current,
                requested: version,
            });
        }

        if version > current {
            let existing: Vec<(String,)> = sqlx::query_as("SELECT name FROM _stores")
                .fetch_all(&mut *tx)
                .await?;

            for spec in specs {
                if existing.iter().any(|(n,)| n == &spec.name) {
                    continue;
                }
                let ddl = match spec.key {
                    KeyKind::AutoIncrement => format!(
                        "CREATE TABLE IF NOT EXISTS {} (key INTEGER PRIMARY KEY AUTOINCREMENT, value TEXT NOT NULL)",
                        table_name(&spec.name)
                    ),
                    KeyKind::Text => format!(
                        "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
                        table_name(&spec.name)
                    ),
                };
                sqlx::query(&ddl).execute(&mut *tx).await?;
                sqlx::query("INSERT INTO _stores (name, key_kind) VALUES (?, ?)")
                    .bind(&spec.name)
                    .bind(spec.key.as_str())
                    .execute(&mut *tx)
                    .await?;
                tracing::info!("Created store '{}' (upgrade {} -> {})", spec.name, current, version);
            }

            sqlx::query(
                "INSERT INTO _meta (key, value) VALUES ('name', ?), ('version', ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(name)
            .bind(version.to_string())
            .execute(&mut *tx)
            .await?;
        }

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT name, key_kind FROM _stores ORDER BY name")
                .fetch_all(&mut *tx)
                .await?;

        tx.commit().await?;

        let stores = rows
            .into_iter()
            .filter_map(|(n, kind)| KeyKind::parse(&kind).map(|k| (n, k)))
            .collect();

        Ok(Self {
            pool,
            name: name.to_string(),
            version,
            stores: Arc::new(stores),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Names of all stores present, sorted.
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_store(&self, store: &str) -> bool {
        self.stores.contains_key(store)
    }

    fn table_for(&self, store: &str, expected: KeyKind) -> Result<String, StoreError> {
        match self.stores.get(store) {
            Some(kind) if *kind == expected => Ok(table_name(store)),
            Some(_) => Err(StoreError::WrongKeyKind {
                store: store.to_string(),
                expected,
            }),
            None => Err(StoreError::UnknownStore(store.to_string())),
        }
    }

    /// Inserts a value under a fresh auto-increment key and returns the key.
    pub async fn add(&self, store: &str, value: &Value) -> Result<i64, StoreError> {
        let table = self.table_for(store, KeyKind::AutoIncrement)?;
        let result = sqlx::query(&format!("INSERT INTO {} (value) VALUES (?)", table))
            .bind(value.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Inserts or fully replaces the value stored under a text key.
    pub async fn put(&self, store: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let table = self.table_for(store, KeyKind::Text)?;
        sqlx::query(&format!(
            "INSERT INTO {} (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            table
        ))
        .bind(key)
        .bind(value.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, store: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let table = self.table_for(store, KeyKind::Text)?;
        let row: Option<(String,)> =
            sqlx::query_as(&format!("SELECT value FROM {} WHERE key = ?", table))
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(raw,)| decode(store, &raw)).transpose()
    }

    /// All rows of an auto-increment store in key order.
    pub async fn scan(&self, store: &str) -> Result<Vec<(i64, Value)>, StoreError> {
        let table = self.table_for(store, KeyKind::AutoIncrement)?;
        let rows: Vec<(i64, String)> =
            sqlx::query_as(&format!("SELECT key, value FROM {} ORDER BY key", table))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|(key, raw)| Ok((key, decode(store, &raw)?)))
            .collect()
    }

    /// Rows of a text-keyed store with `from <= key <= to`, in key order.
    pub async fn scan_range(
        &self,
        store: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let table = self.table_for(store, KeyKind::Text)?;
        let rows: Vec<(String, String)> = sqlx::query_as(&format!(
            "SELECT key, value FROM {} WHERE key >= ? AND key <= ? ORDER BY key",
            table
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(key, raw)| Ok((key, decode(store, &raw)?)))
            .collect()
    }

    /// Number of rows in a store.
    pub async fn count(&self, store: &str) -> Result<i64, StoreError> {
        if !self.has_store(store) {
            return Err(StoreError::UnknownStore(store.to_string()));
        }
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table_name(store)))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Deletes a row from an auto-increment store. Deleting a missing key is a no-op.
    pub async fn delete(&self, store: &str, key: i64) -> Result<(), StoreError> {
        let table = self.table_for(store, KeyKind::AutoIncrement)?;
        sqlx::query(&format!("DELETE FROM {} WHERE key = ?", table))
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically deletes `key` from `from` and appends `value` to `to`.
    ///
    /// Returns the new key in `to`, or `None` when `key` was no longer present
    /// (nothing is written in that case).
    pub async fn transfer(
        &self,
        from: &str,
        key: i64,
        to: &str,
        value: &Value,
    ) -> Result<Option<i64>, StoreError> {
        let from_table = self.table_for(from, KeyKind::AutoIncrement)?;
        let to_table = self.table_for(to, KeyKind::AutoIncrement)?;

        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(&format!("DELETE FROM {} WHERE key = ?", from_table))
            .bind(key)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let inserted = sqlx::query(&format!("INSERT INTO {} (value) VALUES (?)", to_table))
            .bind(value.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(inserted.last_insert_rowid()))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// The application's stores at [`SCHEMA_VERSION`].
pub fn default_stores() -> Vec<StoreSpec> {
    vec![
        StoreSpec::auto_increment(QUEUE_STORE),
        StoreSpec::auto_increment(DEAD_LETTER_STORE),
        StoreSpec::text(read_model_store("sleep")),
        StoreSpec::text(read_model_store("exercise")),
        StoreSpec::text(read_model_store("meditation")),
    ]
}

/// Opens the application database with the default stores.
pub async fn init_db(db_path: Option<PathBuf>) -> Result<Database, StoreError> {
    Database::open(
        db_path.as_deref(),
        DATABASE_NAME,
        SCHEMA_VERSION,
        &default_stores(),
    )
    .await
}

/// Store names may only contain ASCII letters, digits, `_` and `:`, so they
/// can be embedded in a quoted SQL identifier.
fn validate_store_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
    {
        return Err(StoreError::InvalidStoreName(name.to_string()));
    }
    Ok(())
}

fn table_name(store: &str) -> String {
    format!("\"store_{}\"", store)
}

fn decode(store: &str, raw: &str) -> Result<Value, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Corrupt {
        store: store.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_db_creates_default_stores() {
        let temp_dir = tempdir().unwrap();
        let db = init_db(Some(temp_dir.path().join("test.db"))).await.unwrap();

        assert_eq!(db.version(), SCHEMA_VERSION);
        assert_eq!(db.name(), DATABASE_NAME);
        assert_eq!(
            db.store_names(),
            vec![
                "deadLetter",
                "queue",
                "readModel:exercise",
                "readModel:meditation",
                "readModel:sleep"
            ]
        );
    }

    #[tokio::test]
    async fn test_init_db_creates_parent_directories() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("data").join("test.db");

        init_db(Some(db_path.clone())).await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_open_without_location_is_storage_unavailable() {
        let err = init_db(None).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_open_unwritable_location_is_storage_unavailable() {
        let temp_dir = tempdir().unwrap();
        // A regular file where a directory is needed
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = init_db(Some(blocker.join("test.db"))).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_reopen_same_version_keeps_stores_and_rows() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = init_db(Some(db_path.clone())).await.unwrap();
        db.add(QUEUE_STORE, &json!({"n": 1})).await.unwrap();
        db.put("readModel:sleep", "2024-01-10", &json!({"hours": 7}))
            .await
            .unwrap();
        let before = db.store_names();
        db.close().await;

        let db = init_db(Some(db_path)).await.unwrap();
        assert_eq!(db.store_names(), before);
        assert_eq!(db.count(QUEUE_STORE).await.unwrap(), 1);
        assert_eq!(db.count("readModel:sleep").await.unwrap(), 1);

        let (stores,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _stores")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(stores, before.len() as i64);
    }

    #[tokio::test]
    async fn test_version_bump_adds_missing_store_only() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let v1 = vec![StoreSpec::auto_increment(QUEUE_STORE)];
        let db = Database::open(Some(db_path.as_path()), DATABASE_NAME, 1, &v1)
            .await
            .unwrap();
        let id = db.add(QUEUE_STORE, &json!({"kept": true})).await.unwrap();
        db.close().await;

        let db = Database::open(Some(db_path.as_path()), DATABASE_NAME, 2, &default_stores())
            .await
            .unwrap();
        assert!(db.has_store(DEAD_LETTER_STORE));
        assert_eq!(
            db.scan(QUEUE_STORE).await.unwrap(),
            vec![(id, json!({"kept": true}))]
        );
    }

    #[tokio::test]
    async fn test_same_version_does_not_add_new_stores() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let v1 = vec![StoreSpec::auto_increment(QUEUE_STORE)];
        Database::open(Some(db_path.as_path()), DATABASE_NAME, 1, &v1)
            .await
            .unwrap()
            .close()
            .await;

        let db = Database::open(Some(db_path.as_path()), DATABASE_NAME, 1, &default_stores())
            .await
            .unwrap();
        assert_eq!(db.store_names(), vec!["queue"]);
        assert!(matches!(
            db.add(DEAD_LETTER_STORE, &json!({})).await,
            Err(StoreError::UnknownStore(_))
        ));
    }

    #[tokio::test]
    async fn test_version_downgrade_fails() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        init_db(Some(db_path.clone())).await.unwrap().close().await;

        let err = Database::open(Some(db_path.as_path()), DATABASE_NAME, 1, &default_stores())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionDowngrade {
                current: SCHEMA_VERSION,
                requested: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_name_mismatch_fails() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        init_db(Some(db_path.clone())).await.unwrap().close().await;

        let err = Database::open(Some(db_path.as_path()), "other", SCHEMA_VERSION, &default_stores())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NameMismatch { .. }));
    }

    #[tokio::test]
    async fn test_invalid_store_name_rejected() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("t.db");
        let specs = vec![StoreSpec::text("bad\"name")];

        let err = Database::open(Some(db_path.as_path()), DATABASE_NAME, 1, &specs)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidStoreName(_)));
    }

    #[tokio::test]
    async fn test_auto_increment_keys_are_not_reused() {
        let temp_dir = tempdir().unwrap();
        let db = init_db(Some(temp_dir.path().join("test.db"))).await.unwrap();

        let first = db.add(QUEUE_STORE, &json!(1)).await.unwrap();
        db.delete(QUEUE_STORE, first).await.unwrap();
        let second = db.add(QUEUE_STORE, &json!(2)).await.unwrap();

        assert!(second > first);
    }

    #[tokio::test]
    async fn test_wrong_key_kind_rejected() {
        let temp_dir = tempdir().unwrap();
        let db = init_db(Some(temp_dir.path().join("test.db"))).await.unwrap();

        assert!(matches!(
            db.put(QUEUE_STORE, "x", &json!(1)).await,
            Err(StoreError::WrongKeyKind { .. })
        ));
        assert!(matches!(
            db.add("readModel:sleep", &json!(1)).await,
            Err(StoreError::WrongKeyKind { .. })
        ));
    }

    #[tokio::test]
    async fn test_scan_range_is_inclusive_and_ordered() {
        let temp_dir = tempdir().unwrap();
        let db = init_db(Some(temp_dir.path().join("test.db"))).await.unwrap();
        let store = read_model_store("sleep");

        for day in ["2024-01-12", "2024-01-09", "2024-01-10", "2024-01-11"] {
            db.put(&store, day, &json!({ "day": day })).await.unwrap();
        }

        let keys: Vec<String> = db
            .scan_range(&store, "2024-01-10", "2024-01-12")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["2024-01-10", "2024-01-11", "2024-01-12"]);
    }

    #[tokio::test]
    async fn test_transfer_moves_row_atomically() {
        let temp_dir = tempdir().unwrap();
        let db = init_db(Some(temp_dir.path().join("test.db"))).await.unwrap();

        let id = db.add(QUEUE_STORE, &json!({"a": 1})).await.unwrap();
        let moved = db
            .transfer(QUEUE_STORE, id, DEAD_LETTER_STORE, &json!({"parked": id}))
            .await
            .unwrap();

        assert!(moved.is_some());
        assert_eq!(db.count(QUEUE_STORE).await.unwrap(), 0);
        assert_eq!(db.count(DEAD_LETTER_STORE).await.unwrap(), 1);

        // Second transfer of the same key writes nothing
        let again = db
            .transfer(QUEUE_STORE, id, DEAD_LETTER_STORE, &json!({"parked": id}))
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(db.count(DEAD_LETTER_STORE).await.unwrap(), 1);
    }
}
