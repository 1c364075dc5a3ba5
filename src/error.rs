//! Error taxonomy for the monitoring pipeline.

use thiserror::Error;

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Endpoint unreachable, timed out, or answered with a non-2xx status.
    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// Payload does not match the expected JSON shape.
    #[error("parse error ({context}): {reason}")]
    Parse {
        context: &'static str,
        reason: String,
    },

    /// Registry answered 2xx but the body carries an embedded error marker.
    #[error("registry error: {0}")]
    Registry(String),

    /// Validator set and vote arrays disagree on length or identity.
    #[error("alignment error: {0}")]
    Alignment(String),

    /// Bit-array summary text could not be parsed.
    #[error("bit array format error: {0}")]
    Format(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl MonitorError {
    pub fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        MonitorError::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(context: &'static str, reason: impl ToString) -> Self {
        MonitorError::Parse {
            context,
            reason: reason.to_string(),
        }
    }

    /// Whether this error invalidates the whole pipeline run.
    ///
    /// Format errors only affect the observability ratio; persistence and
    /// config errors never come out of a run.
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            MonitorError::Transport { .. }
                | MonitorError::Parse { .. }
                | MonitorError::Registry(_)
                | MonitorError::Alignment(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::Transport { .. } => "transport",
            MonitorError::Parse { .. } => "parse",
            MonitorError::Registry(_) => "registry",
            MonitorError::Alignment(_) => "alignment",
            MonitorError::Format(_) => "format",
            MonitorError::Persistence(_) => "persistence",
            MonitorError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_fast_classification() {
        assert!(MonitorError::transport("http://x", "refused").aborts_run());
        assert!(MonitorError::Registry("not found".into()).aborts_run());
        assert!(MonitorError::Alignment("3 != 2".into()).aborts_run());
        let parse_err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(MonitorError::parse("dump", parse_err).aborts_run());

        assert!(!MonitorError::Format("no ratio".into()).aborts_run());
        assert!(!MonitorError::Config("empty".into()).aborts_run());
    }

    #[test]
    fn test_transport_message_names_url() {
        let err = MonitorError::transport("http://node:26657/dump_consensus_state", "timed out");
        let msg = err.to_string();
        assert!(msg.contains("dump_consensus_state"));
        assert!(msg.contains("timed out"));
        assert_eq!(err.kind(), "transport");
    }
}
