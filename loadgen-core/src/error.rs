use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("No endpoints given")]
    NoEndpoints,

    #[error("Invalid endpoint `{0}`, expected `host:port`")]
    InvalidEndpoint(String),

    #[error("Collection name must not be empty")]
    EmptyCollection,

    #[error("Write percentage must be within [0, 1], got {0}")]
    WritePercentage(f64),
}
