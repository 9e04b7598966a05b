use thiserror::Error;

/// Failure kinds surfaced by the chat core.
///
/// The HTTP layer switches on the variant to pick a status code. Nothing in
/// the core retries on any of them.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range input. Raised before storage is touched.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced username (or other record) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The username is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage or hashing failure that the caller could not have caused.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn no_such_user(username: &str) -> Self {
        Error::NotFound(format!("no such user {}", username))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
