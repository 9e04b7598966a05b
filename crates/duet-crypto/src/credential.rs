use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use tracing::warn;

use duet_types::models::Credential;
use duet_types::{Error, Result};

use crate::salt::generate_salt;

/// Longest password accepted, in bytes (the bcrypt input limit).
pub const MAX_PASSWORD_LEN: usize = 72;

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Derives and verifies password credentials.
///
/// The hash covers `password || salt` and is stored in PHC string form, so
/// the Argon2 parameters travel with it: raising the cost later does not
/// invalidate existing accounts.
#[derive(Clone)]
pub struct CredentialService {
    argon2: Argon2<'static>,
}

impl CredentialService {
    pub fn new(cost: HashCost) -> Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| Error::Internal(format!("invalid argon2 parameters: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash `password` under a freshly generated salt.
    pub fn derive(&self, password: &str) -> Result<Credential> {
        validate_password(password)?;

        let salt = generate_salt();
        let salt_string = SaltString::encode_b64(&salt)
            .map_err(|e| Error::Internal(format!("salt encoding failed: {}", e)))?;

        let hash = self
            .argon2
            .hash_password(&salted(password, &salt), &salt_string)
            .map_err(|e| Error::Internal(format!("password hashing failed: {}", e)))?
            .to_string();

        Ok(Credential {
            hash: hash.into_bytes(),
            salt: salt.to_vec(),
        })
    }

    /// Check a login attempt against a stored hash and salt.
    ///
    /// A wrong password is `Ok(false)`. Only a hash that cannot be parsed is
    /// an error.
    pub fn verify(&self, password: &str, hash: &[u8], salt: &[u8]) -> Result<bool> {
        let encoded = std::str::from_utf8(hash).map_err(|_| {
            warn!("Stored password hash is not UTF-8");
            Error::Internal("stored password hash is corrupt".into())
        })?;
        let parsed = PasswordHash::new(encoded).map_err(|e| {
            warn!("Stored password hash failed to parse: {}", e);
            Error::Internal(format!("stored password hash is corrupt: {}", e))
        })?;

        // Nothing outside the accepted range was ever hashed.
        if validate_password(password).is_err() {
            return Ok(false);
        }

        // Output comparison inside verify_password is constant-time.
        match self.argon2.verify_password(&salted(password, salt), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Internal(format!("password verification failed: {}", e))),
        }
    }
}

/// Reject passwords that could never have been hashed: empty, or over
/// [`MAX_PASSWORD_LEN`] bytes.
pub fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::Validation("password must not be empty".into()));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "password must be at most {} bytes",
            MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn salted(password: &str, salt: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(password.len() + salt.len());
    input.extend_from_slice(password.as_bytes());
    input.extend_from_slice(salt);
    input
}
