use thiserror::Error;

/// Rejections raised before a request reaches the scoring core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("amount must be greater than 0")]
    NonPositiveAmount,

    #[error("unknown entity type '{0}' (expected one of: email, ip, bin, device)")]
    UnknownEntityType(String),

    #[error("unknown list type '{0}' (expected 'block' or 'allow')")]
    UnknownListType(String),

    #[error("threshold must be between 0 and 100, got {0}")]
    ThresholdOutOfRange(u32),

    #[error("days must be between 1 and 90, got {0}")]
    DaysOutOfRange(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("transaction '{0}' already exists")]
    DuplicateIdentifier(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True when the request was already processed under the same identifier.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::Store(StoreError::DuplicateIdentifier(_)))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
