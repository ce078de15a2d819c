use thiserror::Error;

#[derive(Error, Debug)]
pub enum KbmodError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("inconsistent input: {0}")]
    InputInconsistent(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("search cancelled")]
    Cancelled,

    #[error("empty image stack")]
    EmptyStack,
}

pub type Result<T> = std::result::Result<T, KbmodError>;
