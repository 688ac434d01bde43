#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Unknown and expired tokens are indistinguishable.
    #[error("share not found")]
    NotFound,

    #[error("share id not provided")]
    MissingToken,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
