//! Passphrase key derivation with Argon2id
//!
//! The salt lives in the configuration file. `init` (or the first mount)
//! writes it once and every later mount reads it back, so one passphrase
//! always yields the same master key.

use crate::config::EncryptionConfig;
use crate::crypto::{KEY_SIZE, SALT_SIZE};
use crate::error::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::Zeroizing;

/// Master key material, wiped on drop
pub type MasterKey = Zeroizing<[u8; KEY_SIZE]>;

/// Argon2id instance with the configured costs and a key-sized output
fn hasher(config: &EncryptionConfig) -> Result<Argon2<'static>> {
    let params = Params::new(
        config.argon2_memory_kib,
        config.argon2_iterations,
        config.argon2_parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| Error::KeyDerivation(format!("Invalid Argon2 parameters: {}", e)))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// The salt recorded in the configuration
pub fn stored_salt(config: &EncryptionConfig) -> Result<[u8; SALT_SIZE]> {
    if config.salt.is_empty() {
        return Err(Error::KeyDerivation(
            "No salt configured; run `cryptmirror init` first".to_string(),
        ));
    }

    <[u8; SALT_SIZE]>::try_from(config.salt.as_slice()).map_err(|_| {
        Error::KeyDerivation(format!(
            "Stored salt is {} bytes, need {}",
            config.salt.len(),
            SALT_SIZE
        ))
    })
}

/// Stretch `passphrase` into the master key under `salt`
pub fn derive_master_key(
    passphrase: &[u8],
    salt: &[u8; SALT_SIZE],
    config: &EncryptionConfig,
) -> Result<MasterKey> {
    if passphrase.is_empty() {
        return Err(Error::KeyDerivation("Passphrase must not be empty".to_string()));
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hasher(config)?
        .hash_password_into(passphrase, salt, &mut key[..])
        .map_err(|e| Error::KeyDerivation(format!("Argon2id failed: {}", e)))?;
    Ok(key)
}

/// Fresh random salt for a new configuration
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
