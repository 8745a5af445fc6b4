//! Typed errors for the engine and its collaborators.

use crate::category::UnknownCategory;

/// Problems with the shape of a whole submission. Nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("submission must be a JSON object with 'year' and 'items'")]
    NotAnObject,
    #[error("missing reporting year")]
    MissingYear,
    #[error("invalid reporting year '{0}': expected an integer between 1 and 9999")]
    InvalidYear(String),
    #[error("missing item list")]
    MissingItems,
    #[error("'items' must be an array")]
    ItemsNotArray,
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategory),
}

/// Snapshot persistence failures. Always fatal to the submission.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("a user with email '{0}' already exists")]
    EmailTaken(String),
    #[error("a client named '{0}' already exists")]
    ClientExists(String),
    #[error("client '{0}' not found")]
    ClientNotFound(String),
    #[error("user '{0}' not found")]
    UserNotFound(String),
    #[error("user '{username}' is already associated with client '{client}'")]
    AlreadyAssociated { username: String, client: String },
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}
