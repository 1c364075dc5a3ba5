//! Consensus dump fetcher
//!
//! Pulls `/dump_consensus_state` from the node RPC and turns the round state
//! into a [`ConsensusRound`]. Monikers are left empty here; they are filled
//! in during alignment.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::EndpointQuery;
use crate::error::{MonitorError, MonitorResult};
use crate::models::{ConsensusRound, LastCommit, ValidatorSnapshot};

#[derive(Debug, Deserialize)]
struct DumpResponse {
    result: Option<DumpResult>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct DumpResult {
    // Some node builds lift the position out of round_state.
    #[serde(default, deserialize_with = "de_flex_u64_opt")]
    height: Option<u64>,
    #[serde(default, deserialize_with = "de_flex_u64_opt")]
    round: Option<u64>,
    #[serde(default, deserialize_with = "de_flex_u64_opt")]
    step: Option<u64>,
    round_state: RoundStateWire,
}

#[derive(Debug, Deserialize)]
struct RoundStateWire {
    #[serde(default, deserialize_with = "de_flex_u64_opt")]
    height: Option<u64>,
    #[serde(default, deserialize_with = "de_flex_u64_opt")]
    round: Option<u64>,
    #[serde(default, deserialize_with = "de_flex_u64_opt")]
    step: Option<u64>,
    validators: ValidatorSetWire,
    #[serde(alias = "height_vote_set")]
    votes: Vec<RoundVotesWire>,
    #[serde(default)]
    last_commit: Option<LastCommitWire>,
    #[serde(default)]
    last_validators: Option<ValidatorSetWire>,
}

#[derive(Debug, Deserialize)]
struct ValidatorSetWire {
    #[serde(default)]
    validators: Vec<ValidatorWire>,
}

#[derive(Debug, Deserialize)]
struct ValidatorWire {
    address: String,
    pub_key: PubKeyWire,
    #[serde(deserialize_with = "de_flex_i64")]
    voting_power: i64,
    #[serde(deserialize_with = "de_flex_i64")]
    proposer_priority: i64,
}

#[derive(Debug, Deserialize)]
struct PubKeyWire {
    value: String,
}

#[derive(Debug, Deserialize)]
struct RoundVotesWire {
    #[serde(default)]
    prevotes: Vec<String>,
    #[serde(default)]
    prevotes_bit_array: String,
    #[serde(default)]
    precommits: Vec<String>,
    #[serde(default)]
    precommits_bit_array: String,
}

#[derive(Debug, Deserialize)]
struct LastCommitWire {
    #[serde(default)]
    votes: Vec<String>,
    #[serde(default)]
    votes_bit_array: String,
}

fn flex_to_i64<E: serde::de::Error>(v: Value) -> Result<Option<i64>, E> {
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| E::custom(format!("not an integer: {n}"))),
        Value::String(s) => s.trim().parse::<i64>().map(Some).map_err(E::custom),
        other => Err(E::custom(format!("expected integer, got {other}"))),
    }
}

fn de_flex_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    flex_to_i64::<D::Error>(v)?.ok_or_else(|| serde::de::Error::custom("missing integer"))
}

fn de_flex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match flex_to_i64::<D::Error>(v)? {
        None => Ok(None),
        Some(n) => u64::try_from(n)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("negative value: {n}"))),
    }
}

fn to_snapshots(set: ValidatorSetWire) -> Vec<ValidatorSnapshot> {
    set.validators
        .into_iter()
        .map(|v| ValidatorSnapshot {
            cons_addr: v.address,
            cons_pub_key: v.pub_key.value,
            voting_power: v.voting_power,
            proposer_priority: v.proposer_priority,
            moniker: String::new(),
        })
        .collect()
}

/// Parse a raw dump body.
///
/// Bodies that are not JSON at all are a transport problem (proxy pages,
/// truncated reads); JSON of the wrong shape is a parse problem.
pub fn parse_consensus_dump(url: &str, body: &[u8]) -> MonitorResult<ConsensusRound> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| MonitorError::transport(url, format!("malformed payload: {e}")))?;

    let resp: DumpResponse =
        serde_json::from_value(value).map_err(|e| MonitorError::parse("consensus dump", e))?;

    let result = match (resp.result, resp.error) {
        (Some(result), _) => result,
        (None, Some(err)) => {
            return Err(MonitorError::parse(
                "consensus dump",
                format!("node returned error: {err}"),
            ))
        }
        (None, None) => return Err(MonitorError::parse("consensus dump", "missing result")),
    };

    let rs = result.round_state;
    let height = result
        .height
        .or(rs.height)
        .ok_or_else(|| MonitorError::parse("consensus dump", "missing height"))?;
    let round = result
        .round
        .or(rs.round)
        .ok_or_else(|| MonitorError::parse("consensus dump", "missing round"))?;
    let step = result
        .step
        .or(rs.step)
        .ok_or_else(|| MonitorError::parse("consensus dump", "missing step"))?;

    let current = rs
        .votes
        .into_iter()
        .next()
        .ok_or_else(|| MonitorError::parse("consensus dump", "height vote set is empty"))?;

    let last_commit = match (rs.last_commit, rs.last_validators) {
        (Some(commit), Some(set)) if height > 1 && !commit.votes.is_empty() => Some(LastCommit {
            height: height - 1,
            validators: to_snapshots(set),
            votes: commit.votes,
            votes_bit_array: commit.votes_bit_array,
        }),
        _ => None,
    };

    Ok(ConsensusRound {
        height,
        round: u32::try_from(round)
            .map_err(|_| MonitorError::parse("consensus dump", "round out of range"))?,
        step: u32::try_from(step)
            .map_err(|_| MonitorError::parse("consensus dump", "step out of range"))?,
        validators: to_snapshots(rs.validators),
        prevotes_bit_array: current.prevotes_bit_array,
        precommits_bit_array: current.precommits_bit_array,
        prevotes: current.prevotes,
        precommits: current.precommits,
        last_commit,
    })
}

/// Retrieves the in-flight consensus round from the node.
pub struct SnapshotFetcher {
    query: Arc<dyn EndpointQuery>,
    url: String,
}

impl SnapshotFetcher {
    pub fn new(query: Arc<dyn EndpointQuery>, rpc_addr: &str) -> Self {
        Self {
            query,
            url: format!("{}/dump_consensus_state", rpc_addr.trim_end_matches('/')),
        }
    }

    pub async fn fetch(&self) -> MonitorResult<ConsensusRound> {
        let body = self.query.get(&self.url).await?;
        debug!(url = %self.url, body_len = body.len(), "consensus dump received");
        parse_consensus_dump(&self.url, &body)
    }
}
