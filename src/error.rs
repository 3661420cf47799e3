use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaperError {
    #[error(transparent)]
    Provider(#[from] crate::providers::ProviderError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("region worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
