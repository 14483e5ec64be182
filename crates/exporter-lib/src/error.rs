//! Error taxonomy for the exporter

use thiserror::Error;

/// Errors produced while talking to the engine or assembling snapshots.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// The token endpoint rejected the credential exchange or returned an
    /// unusable token response.
    #[error("authentication failed (status {status}): {reason}")]
    AuthenticationFailed { status: u16, reason: String },

    /// Connection failure or timeout talking to an engine endpoint.
    #[error("transport error talking to {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// A collector received a failing or malformed response.
    #[error("upstream error in {collector} collector: {reason}")]
    Upstream { collector: String, reason: String },

    /// Invalid or incomplete configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl ExporterError {
    pub fn upstream(collector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Upstream {
            collector: collector.into(),
            reason: reason.into(),
        }
    }

    /// Re-attribute any error to the named collector.
    ///
    /// Collectors report every failure as `Upstream` so the aggregator can
    /// isolate it, whatever the underlying cause was.
    pub fn into_upstream(self, collector: &str) -> Self {
        match self {
            Self::Upstream { reason, .. } => Self::upstream(collector, reason),
            other => Self::upstream(collector, other.to_string()),
        }
    }

    /// Short machine-friendly tag used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { .. } => "authentication_failed",
            Self::Transport { .. } => "transport",
            Self::Upstream { .. } => "upstream",
            Self::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_upstream_keeps_reason() {
        let err = ExporterError::upstream("raw", "bad payload").into_upstream("vms");

        match err {
            ExporterError::Upstream { collector, reason } => {
                assert_eq!(collector, "vms");
                assert_eq!(reason, "bad payload");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_into_upstream_wraps_other_errors() {
        let err = ExporterError::AuthenticationFailed {
            status: 401,
            reason: "denied".to_string(),
        }
        .into_upstream("hosts");

        assert_eq!(err.kind(), "upstream");
        assert!(err.to_string().contains("hosts"));
        assert!(err.to_string().contains("denied"));
    }
}
