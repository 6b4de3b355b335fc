//! Error types for `taskvault`.

/// Errors that can occur when operating on the task store.
///
/// Every error raised inside a transaction aborts that whole transaction;
/// the store never retries on behalf of the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A structurally invalid write, e.g. conflicting field combinations or
    /// a write to a read-only field. Rejected before any row mutation.
    #[error("validation error: {0}")]
    Validation(String),

    /// An unprivileged caller tried to touch sync-adapter-only fields or the
    /// sync state table.
    #[error("permission error: {0}")]
    Permission(String),

    /// An operation that must return a single resource identifier addressed
    /// a row that does not exist.
    ///
    /// Selection-addressed updates and deletes that match nothing are *not*
    /// errors; they report an affected-row count of zero instead.
    #[error("not found: {0}")]
    NotFound(String),

    /// Recurrence expansion could not produce a well-formed instance set.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// A batch ran too many operations without a yield point.
    #[error("batch exceeded {max_operations} operations without a yield point")]
    Contention {
        /// The yield-free operation budget that was exceeded.
        max_operations: usize,
    },

    /// A `SQLite` database error occurred.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for an [`Error::Validation`] with the given reason.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Shorthand for an [`Error::Permission`] with the given reason.
    pub fn permission(reason: impl Into<String>) -> Self {
        Self::Permission(reason.into())
    }

    /// Shorthand for an [`Error::Consistency`] with the given reason.
    pub fn consistency(reason: impl Into<String>) -> Self {
        Self::Consistency(reason.into())
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
