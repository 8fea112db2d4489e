//! Error types shared by every registry backend.

/// Boxed source error carried by backend failures.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during registry operations.
///
/// Backend-originated variants carry the component name of the backend that
/// produced them (`memory-registry`, `redis-registry`, `sql-registry`) so a
/// caller juggling several stores can tell failures apart.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The request itself is malformed: empty contract name, missing
    /// bytecode or ABI on registration, and so on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested item does not exist. This is an expected outcome for
    /// resolution queries and is consumed by callers as a normal branch,
    /// not an exceptional one.
    #[error("{component}: {what} not found")]
    NotFound {
        component: &'static str,
        what: String,
    },

    /// The backend could not be reached or a command failed in transit.
    /// Retryable by the caller.
    #[error("{component}: backend connection failed")]
    Connection {
        component: &'static str,
        #[source]
        source: BoxError,
    },

    /// Bytes read back from the store failed to deserialize. Indicates a
    /// prior write corrupted the record; retrying will not help.
    #[error("{component}: stored {what} failed to decode")]
    DataCorrupted {
        component: &'static str,
        what: &'static str,
        #[source]
        source: BoxError,
    },

    /// The operation is part of the registry contract but this backend
    /// does not implement it.
    #[error("{component}: {operation} is not supported by this backend")]
    FeatureNotSupported {
        component: &'static str,
        operation: &'static str,
    },
}

impl RegistryError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn not_found(component: &'static str, what: impl Into<String>) -> Self {
        Self::NotFound {
            component,
            what: what.into(),
        }
    }

    pub fn connection(
        component: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            component,
            source: Box::new(source),
        }
    }

    pub fn data_corrupted(
        component: &'static str,
        what: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DataCorrupted {
            component,
            what,
            source: Box::new(source),
        }
    }

    pub fn feature_not_supported(component: &'static str, operation: &'static str) -> Self {
        Self::FeatureNotSupported {
            component,
            operation,
        }
    }

    /// Whether this is a miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the caller may reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
