use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("{texts} texts but {ids} ids")]
    LengthMismatch { texts: usize, ids: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Rejects parallel `texts`/`ids` slices of different lengths.
pub fn ensure_aligned<A, B>(texts: &[A], ids: &[B]) -> Result<()> {
    if texts.len() != ids.len() {
        return Err(Error::LengthMismatch { texts: texts.len(), ids: ids.len() });
    }
    Ok(())
}
