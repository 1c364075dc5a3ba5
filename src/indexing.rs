//! Controller-facing indexing API
//!
//! Translates pipeline output into persistence calls and presentation rows.
//! Failures are logged and returned; nothing here decides whether a failure
//! is fatal.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::MonitorConfig;
use crate::consensus::{RoundAccumulator, RoundReport};
use crate::error::MonitorResult;
use crate::models::{normalize_cons_addr, AbsentValidatorRecord, IndexedValidator, ReconciledVoteRecord};
use crate::storage::ValidatorStore;

const VOTED_GLYPH: &str = "✅";
const NIL_GLYPH: &str = "❌";

fn glyph(voted: bool) -> &'static str {
    if voted {
        VOTED_GLYPH
    } else {
        NIL_GLYPH
    }
}

const OPERATOR_MARKER: &str = "*";

/// `ConsPubKey VotingPower ProposerPriority prevote precommit Moniker`,
/// tab separated. The operator's own row carries a trailing `*` column.
pub fn format_row(record: &ReconciledVoteRecord, is_operator: bool) -> String {
    let mut row = format!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        record.cons_pub_key,
        record.voting_power,
        record.proposer_priority,
        glyph(record.prevoted),
        glyph(record.precommitted),
        record.moniker
    );
    if is_operator {
        row.push('\t');
        row.push_str(OPERATOR_MARKER);
    }
    row
}

#[derive(Clone)]
pub struct ValidatorIndexer {
    store: Arc<dyn ValidatorStore>,
}

impl ValidatorIndexer {
    pub fn new(store: Arc<dyn ValidatorStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ValidatorStore> {
        &self.store
    }

    pub async fn index_validator(
        &self,
        cons_hex_addr: &str,
        moniker: &str,
    ) -> MonitorResult<IndexedValidator> {
        match self.store.upsert_validator(cons_hex_addr, moniker).await {
            Ok(validator) => {
                info!(
                    cons_hex_address = %validator.cons_hex_address,
                    moniker = %validator.moniker,
                    "validator indexed"
                );
                Ok(validator)
            }
            Err(e) => {
                error!(cons_hex_address = cons_hex_addr, error = %e, "failed to index validator");
                Err(e)
            }
        }
    }

    /// Re-indexing the same `(height, address)` is a no-op.
    pub async fn index_absent_validator(
        &self,
        height: u64,
        cons_hex_addr: &str,
    ) -> MonitorResult<AbsentValidatorRecord> {
        let record = AbsentValidatorRecord {
            height,
            cons_hex_addr: normalize_cons_addr(cons_hex_addr),
        };
        match self.store.insert_absent_validator(&record).await {
            Ok(inserted) => {
                if inserted {
                    info!(height, cons_hex_address = %record.cons_hex_addr, "absent validator indexed");
                } else {
                    debug!(height, cons_hex_address = %record.cons_hex_addr, "absent validator already indexed");
                }
                Ok(record)
            }
            Err(e) => {
                error!(height, cons_hex_address = cons_hex_addr, error = %e, "failed to index absent validator");
                Err(e)
            }
        }
    }

    /// Index every validator and absentee of a report. Stops at the first
    /// persistence failure and returns it.
    pub async fn index_report(&self, report: &RoundReport) -> MonitorResult<(usize, usize)> {
        for record in &report.records {
            self.index_validator(&record.cons_addr, &record.moniker)
                .await?;
        }
        for absent in &report.absentees {
            self.index_absent_validator(absent.height, &absent.cons_hex_addr)
                .await?;
        }
        Ok((report.records.len(), report.absentees.len()))
    }

    /// Presentation rows from the latest reconciled round. Reads only the
    /// accumulator; never touches the network.
    pub fn get_validator_info(
        &self,
        cfg: &MonitorConfig,
        current_height: u64,
        accumulator: &RoundAccumulator,
    ) -> Vec<String> {
        let Some(report) = accumulator.latest() else {
            debug!(current_height, "no reconciled round yet");
            return Vec::new();
        };
        if report.height != current_height {
            debug!(
                current_height,
                report_height = report.height,
                "presenting reconciled round from a different height"
            );
        }

        let operator = cfg.operator_cons_addr.as_deref().map(normalize_cons_addr);
        report
            .records
            .iter()
            .map(|r| {
                let is_operator = operator
                    .as_deref()
                    .is_some_and(|op| normalize_cons_addr(&r.cons_addr) == op);
                format_row(r, is_operator)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::models::IndexedValidator;
    use crate::storage::ValidatorDb;
    use async_trait::async_trait;
    use tempfile::NamedTempFile;

    fn record(addr: &str, pk: &str, moniker: &str, pv: bool, pc: bool) -> ReconciledVoteRecord {
        ReconciledVoteRecord {
            cons_addr: addr.into(),
            cons_pub_key: pk.into(),
            voting_power: 100,
            proposer_priority: -5,
            moniker: moniker.into(),
            prevoted: pv,
            precommitted: pc,
        }
    }

    fn report(height: u64) -> RoundReport {
        RoundReport {
            height,
            round: 0,
            step: 6,
            records: vec![
                record("AAAA", "pkA", "alice", false, true),
                record("BBBB", "pkB", "", true, true),
            ],
            prevote_ratio: Some(0.5),
            precommit_ratio: Some(1.0),
            last_commit_ratio: Some(0.5),
            absentees: vec![AbsentValidatorRecord {
                height: height - 1,
                cons_hex_addr: "BBBB".into(),
            }],
        }
    }

    fn indexer() -> (ValidatorIndexer, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let db = ValidatorDb::new(temp.path().to_str().unwrap()).unwrap();
        (ValidatorIndexer::new(Arc::new(db)), temp)
    }

    #[tokio::test]
    async fn test_index_absent_validator_twice_stores_once() {
        let (indexer, _temp) = indexer();
        let first = indexer.index_absent_validator(42, "abcd").await.unwrap();
        let second = indexer.index_absent_validator(42, "ABCD").await.unwrap();
        assert_eq!(first, second);

        let stored = indexer.store().list_absent_validators(42).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_index_report_persists_everything() {
        let (indexer, _temp) = indexer();
        let counts = indexer.index_report(&report(100)).await.unwrap();
        assert_eq!(counts, (2, 1));

        let validators = indexer.store().list_validators().await.unwrap();
        assert_eq!(validators.len(), 2);
        assert_eq!(indexer.store().count_absences("BBBB").await.unwrap(), 1);
    }

    #[test]
    fn test_operator_marker_keeps_pubkey_field() {
        let rec = record("AAAA", "pkA", "alice", true, false);
        let fields: Vec<String> = format_row(&rec, true)
            .split('\t')
            .map(str::to_string)
            .collect();
        assert_eq!(fields[0], "pkA");
        assert_eq!(fields[5], "alice");
        assert_eq!(fields.get(6).map(String::as_str), Some("*"));

        assert_eq!(format_row(&rec, false).split('\t').count(), 6);
    }

    #[test]
    fn test_get_validator_info_rows() {
        let (indexer, _temp) = indexer();
        let acc = RoundAccumulator::new();
        let cfg = MonitorConfig {
            operator_cons_addr: Some("bbbb".into()),
            ..MonitorConfig::default()
        };

        assert!(indexer.get_validator_info(&cfg, 100, &acc).is_empty());

        acc.publish(report(100));
        let rows = indexer.get_validator_info(&cfg, 100, &acc);
        assert_eq!(
            rows,
            vec![
                "pkA\t100\t-5\t❌\t✅\talice".to_string(),
                "pkB\t100\t-5\t✅\t✅\t\t*".to_string(),
            ]
        );
        assert_eq!(rows[1].split('\t').next(), Some("pkB"));

        // stale accumulator still renders
        assert_eq!(indexer.get_validator_info(&cfg, 101, &acc).len(), 2);
    }

    struct FailingStore;

    #[async_trait]
    impl ValidatorStore for FailingStore {
        async fn upsert_validator(&self, _: &str, _: &str) -> MonitorResult<IndexedValidator> {
            Err(MonitorError::Persistence(rusqlite::Error::InvalidQuery))
        }
        async fn insert_absent_validator(&self, _: &AbsentValidatorRecord) -> MonitorResult<bool> {
            Err(MonitorError::Persistence(rusqlite::Error::InvalidQuery))
        }
        async fn get_validator(&self, _: &str) -> MonitorResult<Option<IndexedValidator>> {
            Ok(None)
        }
        async fn list_validators(&self) -> MonitorResult<Vec<IndexedValidator>> {
            Ok(vec![])
        }
        async fn list_absent_validators(&self, _: u64) -> MonitorResult<Vec<AbsentValidatorRecord>> {
            Ok(vec![])
        }
        async fn count_absences(&self, _: &str) -> MonitorResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_persistence_errors_are_returned() {
        let indexer = ValidatorIndexer::new(Arc::new(FailingStore));
        assert!(matches!(
            indexer.index_validator("AAAA", "alice").await,
            Err(MonitorError::Persistence(_))
        ));
        assert!(matches!(
            indexer.index_absent_validator(1, "AAAA").await,
            Err(MonitorError::Persistence(_))
        ));
        assert!(indexer.index_report(&report(10)).await.is_err());
    }
}
