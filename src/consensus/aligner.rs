//! Vote alignment
//!
//! The dump reports the validator set and the two vote arrays as parallel
//! sequences. Alignment first assigns each slot to exactly one validator
//! identifier, checks that every vote array covers the same slots, then
//! zips them into one record per validator. Output keeps the dump's
//! voting-power-descending order.

use std::collections::HashMap;

use crate::error::{MonitorError, MonitorResult};
use crate::models::{
    normalize_cons_addr, AbsentValidatorRecord, ConsensusRound, LastCommit, MonikerIndex,
    ReconciledVoteRecord, ValidatorSnapshot, NIL_VOTE,
};

/// Any token other than the nil sentinel counts as a vote, malformed ones included.
#[inline]
pub fn is_vote(token: &str) -> bool {
    token != NIL_VOTE
}

/// Slot index -> validator identifier, rejecting ambiguous sets.
fn slot_assignments(validators: &[ValidatorSnapshot]) -> MonitorResult<Vec<&str>> {
    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(validators.len());
    let mut slots = Vec::with_capacity(validators.len());

    for (i, v) in validators.iter().enumerate() {
        let addr = v.cons_addr.as_str();
        if addr.trim().is_empty() {
            return Err(MonitorError::Alignment(format!(
                "validator at slot {i} has no consensus address"
            )));
        }
        if let Some(first) = seen.insert(addr, i) {
            return Err(MonitorError::Alignment(format!(
                "consensus address {addr} occupies slots {first} and {i}"
            )));
        }
        slots.push(addr);
    }

    Ok(slots)
}

fn ensure_covers(what: &str, slots: usize, votes: usize) -> MonitorResult<()> {
    if slots != votes {
        return Err(MonitorError::Alignment(format!(
            "{slots} validators but {votes} {what}"
        )));
    }
    Ok(())
}

pub struct VoteAligner;

impl VoteAligner {
    /// One record per validator, in input order. Length mismatches fail the
    /// whole alignment; no truncated result is ever produced.
    pub fn align(
        round: &ConsensusRound,
        monikers: &MonikerIndex,
    ) -> MonitorResult<Vec<ReconciledVoteRecord>> {
        let slots = slot_assignments(&round.validators)?;
        ensure_covers("prevotes", slots.len(), round.prevotes.len())?;
        ensure_covers("precommits", slots.len(), round.precommits.len())?;

        let records = round
            .validators
            .iter()
            .zip(&round.prevotes)
            .zip(&round.precommits)
            .map(|((v, prevote), precommit)| ReconciledVoteRecord {
                cons_addr: v.cons_addr.clone(),
                cons_pub_key: v.cons_pub_key.clone(),
                voting_power: v.voting_power,
                proposer_priority: v.proposer_priority,
                moniker: monikers.moniker_for(&v.cons_pub_key).to_string(),
                prevoted: is_vote(prevote),
                precommitted: is_vote(precommit),
            })
            .collect();

        Ok(records)
    }

    /// Validators whose slot in the previous height's commit is nil.
    pub fn absentees(commit: &LastCommit) -> MonitorResult<Vec<AbsentValidatorRecord>> {
        let slots = slot_assignments(&commit.validators)?;
        ensure_covers("commit votes", slots.len(), commit.votes.len())?;

        Ok(slots
            .into_iter()
            .zip(&commit.votes)
            .filter(|(_, vote)| !is_vote(vote))
            .map(|(addr, _)| AbsentValidatorRecord {
                height: commit.height,
                cons_hex_addr: normalize_cons_addr(addr),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(addr: &str, pub_key: &str, power: i64) -> ValidatorSnapshot {
        ValidatorSnapshot {
            cons_addr: addr.into(),
            cons_pub_key: pub_key.into(),
            voting_power: power,
            proposer_priority: 0,
            moniker: String::new(),
        }
    }

    fn round(prevotes: &[&str], precommits: &[&str]) -> ConsensusRound {
        ConsensusRound {
            height: 100,
            round: 0,
            step: 6,
            validators: vec![
                validator("A", "pkA", 30),
                validator("B", "pkB", 20),
                validator("C", "pkC", 10),
            ],
            prevotes_bit_array: String::new(),
            precommits_bit_array: String::new(),
            prevotes: prevotes.iter().map(|s| s.to_string()).collect(),
            precommits: precommits.iter().map(|s| s.to_string()).collect(),
            last_commit: None,
        }
    }

    #[test]
    fn test_align_three_validators() {
        let r = round(&["nil-Vote", "x", "nil-Vote"], &["x", "x", "nil-Vote"]);
        let monikers: MonikerIndex = [("pkA", "alice"), ("pkC", "carol")].into_iter().collect();

        let records = VoteAligner::align(&r, &monikers).unwrap();
        let summary: Vec<(&str, &str, bool, bool)> = records
            .iter()
            .map(|r| (r.cons_addr.as_str(), r.moniker.as_str(), r.prevoted, r.precommitted))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("A", "alice", false, true),
                ("B", "", true, true),
                ("C", "carol", false, false),
            ]
        );
        assert_eq!(records[0].voting_power, 30);
    }

    #[test]
    fn test_any_non_sentinel_token_counts_as_vote() {
        assert!(!is_vote("nil-Vote"));
        assert!(is_vote("Vote{0:AAAA 100/00/SIGNED_MSG_TYPE_PREVOTE(Prevote) 1F2E}"));
        assert!(is_vote("garbage"));
        assert!(is_vote("nil-vote"));
    }

    #[test]
    fn test_prevote_length_mismatch_is_alignment_error() {
        let r = round(&["x", "x"], &["x", "x", "x"]);
        let err = VoteAligner::align(&r, &MonikerIndex::new()).unwrap_err();
        assert!(matches!(err, MonitorError::Alignment(_)));
    }

    #[test]
    fn test_precommit_length_mismatch_is_alignment_error() {
        let r = round(&["x", "x", "x"], &["x", "x", "x", "x"]);
        let err = VoteAligner::align(&r, &MonikerIndex::new()).unwrap_err();
        assert!(matches!(err, MonitorError::Alignment(_)));
    }

    #[test]
    fn test_duplicate_identifier_is_alignment_error() {
        let mut r = round(&["x", "x", "x"], &["x", "x", "x"]);
        r.validators[2].cons_addr = "A".into();
        let err = VoteAligner::align(&r, &MonikerIndex::new()).unwrap_err();
        assert!(matches!(err, MonitorError::Alignment(_)));
    }

    #[test]
    fn test_empty_round_aligns_to_nothing() {
        let mut r = round(&[], &[]);
        r.validators.clear();
        assert!(VoteAligner::align(&r, &MonikerIndex::new()).unwrap().is_empty());
    }

    #[test]
    fn test_absentees_from_last_commit() {
        let commit = LastCommit {
            height: 99,
            validators: vec![
                validator("aaaa", "pkA", 30),
                validator("bbbb", "pkB", 20),
                validator("cccc", "pkC", 10),
            ],
            votes: vec!["Vote{0}".into(), "nil-Vote".into(), "nil-Vote".into()],
            votes_bit_array: "BA{3:x__} 30/60 = 0.50".into(),
        };
        let absent = VoteAligner::absentees(&commit).unwrap();
        assert_eq!(
            absent,
            vec![
                AbsentValidatorRecord { height: 99, cons_hex_addr: "BBBB".into() },
                AbsentValidatorRecord { height: 99, cons_hex_addr: "CCCC".into() },
            ]
        );
    }

    #[test]
    fn test_absentees_length_mismatch() {
        let commit = LastCommit {
            height: 99,
            validators: vec![validator("A", "pkA", 1)],
            votes: vec![],
            votes_bit_array: String::new(),
        };
        assert!(matches!(
            VoteAligner::absentees(&commit).unwrap_err(),
            MonitorError::Alignment(_)
        ));
    }
}
