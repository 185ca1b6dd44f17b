use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Query is empty")]
    EmptyQuery,
}

pub type Result<T> = std::result::Result<T, Error>;
