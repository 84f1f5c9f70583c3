// src/ingest/error.rs
use thiserror::Error;

/// Failure taxonomy of the ingestion engine.
///
/// Transport, protocol and extraction errors stay inside the source task that
/// raised them and end up in `RunLog::per_source_errors`. Persistence and
/// configuration errors belong to the run as a whole.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: HTTP {status}")]
    Protocol { status: u16 },
    #[error("extraction error: {0}")]
    Extraction(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl IngestError {
    /// Worth another attempt within the same run.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::Transport(_) => true,
            IngestError::Protocol { status } => *status >= 500,
            _ => false,
        }
    }
}
