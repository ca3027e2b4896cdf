//! Error types for crewmem

use thiserror::Error;

/// Main error type for memory engine operations
#[derive(Error, Debug)]
pub enum CrewMemError {
    /// Rejected input: confidence gating, out-of-range scores, malformed ids
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced record does not exist for this tenant
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage-related errors (LanceDB, Arrow conversion)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Embedding generation errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A dependency failure wrapped with the operation that hit it
    #[error("failed to {context}: {source}")]
    Operation {
        context: String,
        #[source]
        source: Box<CrewMemError>,
    },
}

impl CrewMemError {
    /// Wrap this error with operation context, e.g. "store short-term memory".
    ///
    /// Validation and not-found errors pass through untouched so callers can
    /// still match on them.
    pub fn context(self, context: impl Into<String>) -> Self {
        match self {
            e @ (CrewMemError::Validation(_) | CrewMemError::NotFound(_)) => e,
            e => CrewMemError::Operation {
                context: context.into(),
                source: Box::new(e),
            },
        }
    }

    /// The innermost error, skipping any operation context layers
    pub fn root(&self) -> &CrewMemError {
        match self {
            CrewMemError::Operation { source, .. } => source.root(),
            e => e,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), CrewMemError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), CrewMemError::NotFound(_))
    }
}

impl From<serde_json::Error> for CrewMemError {
    fn from(e: serde_json::Error) -> Self {
        CrewMemError::Serialization(e.to_string())
    }
}

/// Result type alias for crewmem operations
pub type Result<T> = std::result::Result<T, CrewMemError>;

/// Attach operation context to the error side of a result
pub trait ResultExt<T> {
    fn context(self, context: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|e| e.context(context))
    }
}
