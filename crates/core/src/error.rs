use thiserror::Error;

/// Failures reported by the backing data store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid request: {0}")]
    Msg(String),
}

#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("{0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{context}: {source}")]
    Write {
        context: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoverageError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoverageError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CoverageError::NotFound(what.into())
    }

    pub fn write(context: impl Into<String>, source: StoreError) -> Self {
        CoverageError::Write {
            context: context.into(),
            source,
        }
    }
}

impl From<ValidationError> for CoverageError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::Msg(msg) => CoverageError::Validation(msg),
        }
    }
}

pub type Result<T, E = CoverageError> = std::result::Result<T, E>;
