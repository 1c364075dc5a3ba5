use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Wire token for "this validator cast no vote this round"
pub const NIL_VOTE: &str = "nil-Vote";

/// One validator as seen in a consensus round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSnapshot {
    pub cons_addr: String,
    pub cons_pub_key: String,
    pub voting_power: i64,
    pub proposer_priority: i64,
    /// Resolved from the registry; empty when no match was found
    pub moniker: String,
}

/// Parsed consensus dump for one in-flight round.
///
/// `validators`, `prevotes` and `precommits` are parallel: index `i` in each
/// refers to the same validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRound {
    pub height: u64,
    pub round: u32,
    pub step: u32,
    pub validators: Vec<ValidatorSnapshot>,
    pub prevotes_bit_array: String,
    pub precommits_bit_array: String,
    pub prevotes: Vec<String>,
    pub precommits: Vec<String>,
    pub last_commit: Option<LastCommit>,
}

/// Commit of the previous height with the validator set that signed it.
/// `validators` and `votes` are parallel like the round arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastCommit {
    pub height: u64,
    pub validators: Vec<ValidatorSnapshot>,
    pub votes: Vec<String>,
    pub votes_bit_array: String,
}

/// Pipeline output, one per validator per round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledVoteRecord {
    pub cons_addr: String,
    pub cons_pub_key: String,
    pub voting_power: i64,
    pub proposer_priority: i64,
    pub moniker: String,
    pub prevoted: bool,
    pub precommitted: bool,
}

/// "Validator did not sign at this height"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbsentValidatorRecord {
    pub height: u64,
    pub cons_hex_addr: String,
}

/// Persisted "validator is known/active" fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedValidator {
    pub cons_hex_address: String,
    pub moniker: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Consensus pubkey -> moniker, rebuilt every run and never cached.
#[derive(Debug, Clone, Default)]
pub struct MonikerIndex {
    by_pub_key: HashMap<String, String>,
}

impl MonikerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cons_pub_key: impl Into<String>, moniker: impl Into<String>) {
        self.by_pub_key.insert(cons_pub_key.into(), moniker.into());
    }

    /// Empty string on miss.
    pub fn moniker_for(&self, cons_pub_key: &str) -> &str {
        self.by_pub_key
            .get(cons_pub_key)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.by_pub_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pub_key.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MonikerIndex {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut index = MonikerIndex::new();
        for (k, v) in iter {
            index.insert(k, v);
        }
        index
    }
}

/// Consensus hex addresses are stored trimmed and upper-cased.
pub fn normalize_cons_addr(addr: &str) -> String {
    addr.trim().to_ascii_uppercase()
}
