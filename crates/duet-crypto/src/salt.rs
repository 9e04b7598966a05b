use rand_core::{OsRng, RngCore};

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Generate a fresh random salt. Called once per account, never reused.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}
