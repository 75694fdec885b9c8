use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Workshop item '{0}' is not available on Steam")]
    ItemUnavailable(String),

    #[error("Steam API error: {0}")]
    Steam(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("File operation failed: {0}")]
    FileOps(String),

    #[error("Build queue error: {0}")]
    BuildQueue(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Channel closed: {0}")]
    Channel(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

impl From<std::io::Error> for LifecycleError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for LifecycleError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpError(err.to_string())
    }
}
