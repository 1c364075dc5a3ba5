//! Consensus round reconciliation
//!
//! - `aligner`: positional join of validators and vote arrays
//! - `bit_array`: participation ratio from bit-array summaries
//! - `pipeline`: one fetch/resolve/align run and the shared latest report

pub mod aligner;
pub mod bit_array;
pub mod pipeline;

pub use aligner::{is_vote, VoteAligner};
pub use bit_array::{summarize, BitArraySummary};
pub use pipeline::{reconcile, ConsensusPipeline, RoundAccumulator, RoundReport};
