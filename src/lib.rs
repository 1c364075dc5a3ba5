//! Valwatch Backend Library
//!
//! Snapshots a node's in-flight consensus round, reconciles validators with
//! their registry monikers, derives prevote/precommit participation, and
//! persists "validator seen" and "validator absent at height" facts.

pub mod config;
pub mod consensus;
pub mod error;
pub mod indexing;
pub mod models;
pub mod scrapers;
pub mod storage;

pub use config::MonitorConfig;
pub use consensus::{ConsensusPipeline, RoundAccumulator, RoundReport};
pub use error::{MonitorError, MonitorResult};
pub use indexing::ValidatorIndexer;
