use thiserror::Error;

/// Failures recovered locally and surfaced to the presentation layer. None
/// of these are fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Empty or whitespace-only text is never sent to the transport.
    #[error("add a message")]
    EmptyMessage,
    /// The transport rejected a write; the operation is not retried
    /// automatically.
    #[error("append rejected: {reason}")]
    Append { reason: String },
    #[error("upload failed: {reason}")]
    Upload { reason: String },
    /// At most one media upload may be in flight per conversation session.
    #[error("an upload is already in flight")]
    UploadBusy,
}

impl SessionError {
    pub fn append(err: &anyhow::Error) -> Self {
        Self::Append {
            reason: format!("{err:#}"),
        }
    }
}
