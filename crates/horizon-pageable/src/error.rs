//! Error types for pageable collections.

/// Result type alias for pageable collection operations.
pub type Result<T> = std::result::Result<T, PageableError>;

/// Errors that can occur while reading, selecting or modifying a pageable collection.
///
/// Vetoed selection or removal changes are not errors; those operations
/// report `false` instead.
#[derive(Debug, thiserror::Error)]
pub enum PageableError {
    /// The query matches more items than the configured limit allows.
    ///
    /// `found` is `None` when the violation was detected without counting
    /// (the single-query guard only knows "more than `limit`").
    #[error("query exceeds the result limit of {limit} items{}", found_suffix(.found))]
    MaxResultsExceeded { limit: u64, found: Option<u64> },

    /// An id known to the collection no longer resolves to an item.
    ///
    /// This usually means the item was deleted concurrently by someone else.
    #[error("no item found for id {id}")]
    NoItemForId { id: String },

    /// The operation is not supported for this selection kind or backend.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The backing query service failed.
    #[error("backing service failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The configuration could not be parsed or is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn found_suffix(found: &Option<u64>) -> String {
    match found {
        Some(found) => format!(" ({found} found)"),
        None => String::new(),
    }
}

impl PageableError {
    /// Create a result size violation.
    pub fn max_results_exceeded(limit: u64, found: Option<u64>) -> Self {
        Self::MaxResultsExceeded { limit, found }
    }

    /// Create a not-found error for an id.
    pub fn no_item_for_id(id: &impl std::fmt::Debug) -> Self {
        Self::NoItemForId {
            id: format!("{id:?}"),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Wrap an error raised by the backing service.
    pub fn backend(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(source.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Returns `true` if repeating the same call may succeed.
    ///
    /// Size violations require narrowing the query, and misuse stays misuse;
    /// only backend failures and vanished items are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::NoItemForId { .. })
    }
}
