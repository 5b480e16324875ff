/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// and ingestion loop can handle failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("external error: {0}")]
    External(String),

    #[error("unsupported update: {0}")]
    UnsupportedUpdate(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Store(format!("background task failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
