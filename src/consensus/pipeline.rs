//! Consensus snapshot reconciliation
//!
//! One run = fetch dump -> resolve monikers -> align. Runs are linear and
//! fail fast: transport, parse, registry and alignment errors abort the run
//! before anything is published.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::aligner::VoteAligner;
use super::bit_array::BitArraySummary;
use crate::config::MonitorConfig;
use crate::error::MonitorResult;
use crate::models::{AbsentValidatorRecord, ConsensusRound, MonikerIndex, ReconciledVoteRecord};
use crate::scrapers::{EndpointQuery, IdentityResolver, SnapshotFetcher};

/// Result of one successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReport {
    pub height: u64,
    pub round: u32,
    pub step: u32,
    pub records: Vec<ReconciledVoteRecord>,
    pub prevote_ratio: Option<f64>,
    pub precommit_ratio: Option<f64>,
    /// Participation in the previous height's commit, when the dump carries one
    pub last_commit_ratio: Option<f64>,
    pub absentees: Vec<AbsentValidatorRecord>,
}

fn ratio_or_warn(phase: &'static str, text: &str) -> Option<f64> {
    match text.parse::<BitArraySummary>() {
        Ok(summary) => {
            info!(phase, ratio = %summary, "vote bit array");
            Some(summary.ratio)
        }
        Err(e) => {
            warn!(phase, error = %e, "unparsable vote bit array, ratio omitted");
            None
        }
    }
}

/// Pure half of a run: align the round and derive absences.
pub fn reconcile(round: &ConsensusRound, monikers: &MonikerIndex) -> MonitorResult<RoundReport> {
    let records = VoteAligner::align(round, monikers)?;
    let absentees = match &round.last_commit {
        Some(commit) => VoteAligner::absentees(commit)?,
        None => Vec::new(),
    };

    info!(
        height = round.height,
        round = round.round,
        step = round.step,
        "consensus height({}) round({}) step({})",
        round.height,
        round.round,
        round.step
    );
    let prevote_ratio = ratio_or_warn("prevote", &round.prevotes_bit_array);
    let precommit_ratio = ratio_or_warn("precommit", &round.precommits_bit_array);
    let last_commit_ratio = round
        .last_commit
        .as_ref()
        .and_then(|commit| ratio_or_warn("last_commit", &commit.votes_bit_array));

    let unresolved = records.iter().filter(|r| r.moniker.is_empty()).count();
    if unresolved > 0 {
        warn!(unresolved, "validators without a registry moniker");
    }

    Ok(RoundReport {
        height: round.height,
        round: round.round,
        step: round.step,
        records,
        prevote_ratio,
        precommit_ratio,
        last_commit_ratio,
        absentees,
    })
}

pub struct ConsensusPipeline {
    snapshot: SnapshotFetcher,
    registry: IdentityResolver,
}

impl ConsensusPipeline {
    pub fn new(snapshot: SnapshotFetcher, registry: IdentityResolver) -> Self {
        Self { snapshot, registry }
    }

    pub fn from_config(query: Arc<dyn EndpointQuery>, cfg: &MonitorConfig) -> Self {
        Self::new(
            SnapshotFetcher::new(query.clone(), &cfg.rpc_addr),
            IdentityResolver::from_config(query, cfg),
        )
    }

    pub async fn run(&self) -> MonitorResult<RoundReport> {
        let started = Instant::now();
        let round = self.snapshot.fetch().await?;
        // Resolved after the snapshot; the two sources may be a round-trip apart.
        let monikers = self.registry.resolve().await?;
        let report = reconcile(&round, &monikers)?;

        info!(
            validators = report.records.len(),
            monikers = monikers.len(),
            absentees = report.absentees.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "consensus round reconciled"
        );
        Ok(report)
    }
}

/// Latest successful report, shared with the presentation side.
#[derive(Clone, Default)]
pub struct RoundAccumulator {
    latest: Arc<RwLock<Option<Arc<RoundReport>>>>,
}

impl RoundAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, report: RoundReport) -> Arc<RoundReport> {
        let report = Arc::new(report);
        *self.latest.write() = Some(report.clone());
        report
    }

    pub fn latest(&self) -> Option<Arc<RoundReport>> {
        self.latest.read().clone()
    }
}
