/// Duet Crypto Library
///
/// Password credentials only: per-account random salts and Argon2id hashes.
/// Messages are stored as sent; there is no message encryption here.

pub mod credential;
pub mod salt;

pub use credential::{CredentialService, HashCost, MAX_PASSWORD_LEN, validate_password};
