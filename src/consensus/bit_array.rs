//! Bit-array summary parser
//!
//! Tendermint prints vote bit arrays as `BA{<size>:<bits>} <voted>/<total> = <ratio>`,
//! e.g. `BA{4:_x__} 100/400 = 0.25`. Only the ratio after `=` is required;
//! the `BA{..}` header and the power tally are optional.

use std::fmt;
use std::str::FromStr;

use crate::error::{MonitorError, MonitorResult};

#[derive(Debug, Clone, PartialEq)]
pub struct BitArraySummary {
    /// Declared size from the `BA{size:..}` header
    pub size: Option<usize>,
    /// `x` = voted, `_` = nil
    pub bits: Option<String>,
    /// Participation ratio in [0, 1]
    pub ratio: f64,
}

impl BitArraySummary {
    pub fn voted(&self) -> Option<usize> {
        self.bits
            .as_ref()
            .map(|b| b.chars().filter(|c| *c == 'x').count())
    }
}

fn format_err(text: &str, what: &str) -> MonitorError {
    MonitorError::Format(format!("{what} in {text:?}"))
}

/// Best-effort `BA{size:bits}` header; anything inconsistent yields `(None, None)`.
fn parse_header(head: &str) -> (Option<usize>, Option<String>) {
    let header = head.trim().strip_prefix("BA{").and_then(|rest| {
        let (inner, _tally) = rest.split_once('}')?;
        let (size, bits) = inner.split_once(':')?;
        let size: usize = size.trim().parse().ok()?;
        let well_formed =
            bits.chars().count() == size && bits.chars().all(|c| c == 'x' || c == '_');
        well_formed.then(|| (size, bits.to_string()))
    });
    match header {
        Some((size, bits)) => (Some(size), Some(bits)),
        None => (None, None),
    }
}

impl FromStr for BitArraySummary {
    type Err = MonitorError;

    fn from_str(text: &str) -> MonitorResult<Self> {
        let (head, tail) = text
            .split_once('=')
            .ok_or_else(|| format_err(text, "no '='"))?;
        let ratio: f64 = tail
            .trim()
            .parse()
            .map_err(|_| format_err(text, "ratio is not a number"))?;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(format_err(text, "ratio outside [0, 1]"));
        }
        let (size, bits) = parse_header(head);
        Ok(Self { size, bits, ratio })
    }
}

impl fmt::Display for BitArraySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.ratio)
    }
}

/// Participation ratio of a bit-array summary string.
pub fn summarize(bit_array_text: &str) -> MonitorResult<f64> {
    bit_array_text.parse::<BitArraySummary>().map(|s| s.ratio)
}
