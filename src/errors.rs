//! Bridge Error Hierarchy
//!
//! Errors are grouped by the layer that produced them. Only [`Error::Fatal`] and
//! envelope-level [`ProtocolError`]s stop the dispatch loop; everything else is
//! reported back to the host as a status-1 completion.


use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Settings loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Envelope or request body could not be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Failures reported by the store client library
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Host boundary failures (queue I/O, response writes)
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Retry timeout after {0:?}")]
    RetryTimeout(Duration),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSenderClosed(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The fixed envelope fields could not be decoded.
    /// Indicates host/bridge version skew.
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The per-command body could not be decoded
    #[error("invalid request body for {kind}: {source}")]
    Body {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid connection config: {0}")]
    ConnectionConfig(String),

    #[error("failed to encode watch response: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{}", status_text(.0))]
    Client(#[from] etcd_client::Error),

    /// The watch stream ended before delivering a response
    #[error("watch stream closed")]
    StreamClosed,

    #[error("watch closed: deadline exceeded")]
    DeadlineExceeded,

    #[error("failed to read tls file {path}: {source}")]
    TlsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed task line: {0}")]
    MalformedLine(String),
}

/// gRPC failures carry their text in `Status::message`; the host only
/// needs that part.
fn status_text(e: &etcd_client::Error) -> String {
    match e {
        etcd_client::Error::GRpcStatus(status) => status_message(status),
        other => other.to_string(),
    }
}

fn status_message(status: &tonic::Status) -> String {
    if status.message().is_empty() {
        format!("{:?}", status.code())
    } else {
        status.message().to_string()
    }
}

impl Error {
    /// Whether the dispatch loop must stop after seeing this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Fatal(_) | Error::Protocol(ProtocolError::Envelope(_))
        )
    }
}
