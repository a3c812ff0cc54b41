use rlnc_error::RlncError;
use thiserror::Error;

/// Errors surfaced by the engine. Arithmetic preconditions (division by
/// zero in `gf`, out-of-bounds bit-array access) are not represented here
/// — they are programmer errors and assert/panic at the call site.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("allocation failed: {0}")]
    Alloc(String),

    #[error("malformed packet: {0}")]
    Framing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RlncError for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::InvalidParams(_) => -1,
            EngineError::Alloc(_) => -2,
            EngineError::Framing(_) => -3,
            EngineError::Io(_) => -4,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
