//! Error types for the `strata-snapshot` crate.

/// Errors raised while serializing, diffing, or replaying state trees.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The state could not be rendered into a JSON tree.
    #[error("state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The full-snapshot interval must be at least one capture.
    #[error("full snapshot interval must be at least 1, got {full_interval}")]
    InvalidInterval {
        /// The rejected interval.
        full_interval: u64,
    },

    /// At least one full snapshot must be retained.
    #[error("retained full snapshot count must be at least 1, got {retained}")]
    InvalidRetention {
        /// The rejected count.
        retained: usize,
    },

    /// The manager has not captured a baseline yet.
    #[error("snapshot manager is not primed")]
    Unprimed,

    /// A journal path walked through a value that is not a mapping.
    #[error("journal path '{path}' does not address a mapping")]
    PathNotObject {
        /// Dotted path of the offending prefix.
        path: String,
    },

    /// A journal entry removes a value that does not exist.
    #[error("journal path '{path}' does not exist")]
    MissingPath {
        /// Dotted path of the missing value.
        path: String,
    },
}
