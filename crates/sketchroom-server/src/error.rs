use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("outbox capacity {capacity} is below the {required} frames a history replay needs")]
    OutboxTooSmall { capacity: usize, required: usize },
    #[error("max message size must be greater than zero")]
    ZeroMessageSize,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
