use thiserror::Error;

pub type Result<T> = std::result::Result<T, MessagingError>;

#[derive(Debug, Error)]
pub enum MessagingError {
    /// The backing store rejected a query or write
    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    /// A blocking store task panicked or was cancelled
    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}
