use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::ValidatorStore;
use crate::error::{MonitorError, MonitorResult};
use crate::models::{normalize_cons_addr, AbsentValidatorRecord, IndexedValidator};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS validators (
    cons_hex_address TEXT PRIMARY KEY,
    moniker TEXT NOT NULL DEFAULT '',
    first_seen_at INTEGER NOT NULL,
    last_seen_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS absent_validators (
    height INTEGER NOT NULL,
    cons_hex_address TEXT NOT NULL,
    recorded_at INTEGER NOT NULL,
    PRIMARY KEY (height, cons_hex_address)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_absent_validators_addr_height
    ON absent_validators(cons_hex_address, height DESC);
"#;

fn ts_to_utc(ts: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_default()
}

// Heights are stored as SQLite INTEGER (i64); larger heights are rejected.
fn height_to_sql(height: u64) -> MonitorResult<i64> {
    i64::try_from(height).map_err(|e| {
        MonitorError::Persistence(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
    })
}

fn validator_from_row(row: &Row<'_>) -> rusqlite::Result<IndexedValidator> {
    Ok(IndexedValidator {
        cons_hex_address: row.get(0)?,
        moniker: row.get(1)?,
        first_seen_at: ts_to_utc(row.get(2)?),
        last_seen_at: ts_to_utc(row.get(3)?),
    })
}

/// SQLite-backed validator store
#[derive(Clone)]
pub struct ValidatorDb {
    conn: Arc<Mutex<Connection>>,
}

impl ValidatorDb {
    pub fn new(db_path: &str) -> MonitorResult<Self> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.execute_batch(SCHEMA_SQL)?;

        let known: i64 = conn
            .query_row("SELECT COUNT(*) FROM validators", [], |row| row.get(0))
            .unwrap_or(0);
        info!(db_path, known_validators = known, "validator database ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl ValidatorStore for ValidatorDb {
    async fn upsert_validator(
        &self,
        cons_hex_addr: &str,
        moniker: &str,
    ) -> MonitorResult<IndexedValidator> {
        let addr = normalize_cons_addr(cons_hex_addr);
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO validators (cons_hex_address, moniker, first_seen_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(cons_hex_address) DO UPDATE SET
                moniker = CASE WHEN excluded.moniker != '' THEN excluded.moniker ELSE validators.moniker END,
                last_seen_at = excluded.last_seen_at",
            params![addr, moniker.trim(), now],
        )?;

        let validator = conn.query_row(
            "SELECT cons_hex_address, moniker, first_seen_at, last_seen_at
             FROM validators WHERE cons_hex_address = ?1",
            params![addr],
            validator_from_row,
        )?;
        Ok(validator)
    }

    async fn insert_absent_validator(&self, record: &AbsentValidatorRecord) -> MonitorResult<bool> {
        let addr = normalize_cons_addr(&record.cons_hex_addr);
        let height = height_to_sql(record.height)?;
        let conn = self.conn.lock().await;
        let changes = conn.execute(
            "INSERT OR IGNORE INTO absent_validators (height, cons_hex_address, recorded_at)
             VALUES (?1, ?2, ?3)",
            params![height, addr, Utc::now().timestamp()],
        )?;
        Ok(changes > 0)
    }

    async fn get_validator(&self, cons_hex_addr: &str) -> MonitorResult<Option<IndexedValidator>> {
        let addr = normalize_cons_addr(cons_hex_addr);
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT cons_hex_address, moniker, first_seen_at, last_seen_at
             FROM validators WHERE cons_hex_address = ?1",
        )?;
        Ok(stmt
            .query_row(params![addr], validator_from_row)
            .optional()?)
    }

    async fn list_validators(&self) -> MonitorResult<Vec<IndexedValidator>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT cons_hex_address, moniker, first_seen_at, last_seen_at
             FROM validators ORDER BY cons_hex_address ASC",
        )?;
        let rows = stmt.query_map([], validator_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn list_absent_validators(&self, height: u64) -> MonitorResult<Vec<AbsentValidatorRecord>> {
        let height = height_to_sql(height)?;
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT height, cons_hex_address FROM absent_validators
             WHERE height = ?1 ORDER BY cons_hex_address ASC",
        )?;
        let rows = stmt.query_map(params![height], |row| {
            let height: i64 = row.get(0)?;
            Ok(AbsentValidatorRecord {
                height: height.max(0) as u64,
                cons_hex_addr: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn count_absences(&self, cons_hex_addr: &str) -> MonitorResult<u64> {
        let addr = normalize_cons_addr(cons_hex_addr);
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM absent_validators WHERE cons_hex_address = ?1",
            params![addr],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (ValidatorDb, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db = ValidatorDb::new(temp_file.path().to_str().unwrap()).unwrap();
        (db, temp_file)
    }

    #[tokio::test]
    async fn test_upsert_validator_normalizes_and_refreshes() {
        let (db, _temp) = create_test_db();

        let first = db.upsert_validator(" abcd01 ", "alice").await.unwrap();
        assert_eq!(first.cons_hex_address, "ABCD01");
        assert_eq!(first.moniker, "alice");

        let again = db.upsert_validator("ABCD01", "alice-v2").await.unwrap();
        assert_eq!(again.moniker, "alice-v2");
        assert_eq!(again.first_seen_at, first.first_seen_at);
        assert_eq!(db.list_validators().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_moniker_keeps_known_one() {
        let (db, _temp) = create_test_db();
        db.upsert_validator("ABCD01", "alice").await.unwrap();
        let v = db.upsert_validator("ABCD01", "").await.unwrap();
        assert_eq!(v.moniker, "alice");
    }

    #[tokio::test]
    async fn test_absent_validator_is_idempotent() {
        let (db, _temp) = create_test_db();
        let rec = AbsentValidatorRecord {
            height: 1199,
            cons_hex_addr: "bbbb".into(),
        };

        assert!(db.insert_absent_validator(&rec).await.unwrap());
        assert!(!db.insert_absent_validator(&rec).await.unwrap());

        let stored = db.list_absent_validators(1199).await.unwrap();
        assert_eq!(
            stored,
            vec![AbsentValidatorRecord {
                height: 1199,
                cons_hex_addr: "BBBB".into()
            }]
        );
        assert_eq!(db.count_absences("BBBB").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_absences_across_heights() {
        let (db, _temp) = create_test_db();
        for height in [10, 11, 12] {
            let rec = AbsentValidatorRecord {
                height,
                cons_hex_addr: "CCCC".into(),
            };
            db.insert_absent_validator(&rec).await.unwrap();
        }
        assert_eq!(db.count_absences("cccc").await.unwrap(), 3);
        assert!(db.list_absent_validators(13).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heights_beyond_sqlite_integer_are_rejected() {
        let (db, _temp) = create_test_db();
        for height in [i64::MAX as u64 + 1, u64::MAX] {
            let rec = AbsentValidatorRecord {
                height,
                cons_hex_addr: "DDDD".into(),
            };
            let err = db.insert_absent_validator(&rec).await.unwrap_err();
            assert!(matches!(err, MonitorError::Persistence(_)));
        }
        assert!(db.list_absent_validators(u64::MAX).await.is_err());
        assert_eq!(db.count_absences("DDDD").await.unwrap(), 0);

        let top = AbsentValidatorRecord {
            height: i64::MAX as u64,
            cons_hex_addr: "DDDD".into(),
        };
        assert!(db.insert_absent_validator(&top).await.unwrap());
        assert_eq!(db.list_absent_validators(i64::MAX as u64).await.unwrap(), vec![top]);
    }

    #[tokio::test]
    async fn test_get_unknown_validator() {
        let (db, _temp) = create_test_db();
        assert!(db.get_validator("FFFF").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_keeps_facts() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap().to_string();
        {
            let db = ValidatorDb::new(&path).unwrap();
            db.upsert_validator("AAAA", "alice").await.unwrap();
        }
        let db = ValidatorDb::new(&path).unwrap();
        let v = db.get_validator("aaaa").await.unwrap().unwrap();
        assert_eq!(v.moniker, "alice");
    }
}
