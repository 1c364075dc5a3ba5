//! Persistence for validator facts
//!
//! Two facts are kept: "validator is known" keyed by consensus hex address,
//! and "validator absent at height" keyed by (height, address). Both writes
//! are upserts, so a single in-flight run needs no extra locking.

pub mod validator_db;

pub use validator_db::ValidatorDb;

use async_trait::async_trait;

use crate::error::MonitorResult;
use crate::models::{AbsentValidatorRecord, IndexedValidator};

#[async_trait]
pub trait ValidatorStore: Send + Sync {
    /// Insert or refresh a validator. An empty moniker never overwrites a
    /// known one.
    async fn upsert_validator(
        &self,
        cons_hex_addr: &str,
        moniker: &str,
    ) -> MonitorResult<IndexedValidator>;

    /// Returns `false` when the fact was already stored.
    async fn insert_absent_validator(&self, record: &AbsentValidatorRecord) -> MonitorResult<bool>;

    async fn get_validator(&self, cons_hex_addr: &str) -> MonitorResult<Option<IndexedValidator>>;

    async fn list_validators(&self) -> MonitorResult<Vec<IndexedValidator>>;

    async fn list_absent_validators(&self, height: u64) -> MonitorResult<Vec<AbsentValidatorRecord>>;

    async fn count_absences(&self, cons_hex_addr: &str) -> MonitorResult<u64>;
}
