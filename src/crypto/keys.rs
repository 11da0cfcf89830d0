//! Mount key material
//!
//! The passphrase-derived key is split with HKDF-SHA256 into a content
//! encryption subkey and a key-check subkey, so the check value stored in
//! each blob header never reveals anything about the encryption key.

use crate::config::EncryptionConfig;
use crate::crypto::kdf::{derive_master_key, stored_salt};
use crate::crypto::{KEY_CHECK_SIZE, KEY_SIZE, NONCE_SIZE};
use crate::error::{Error, Result};
use ring::{hkdf, hmac};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

const HKDF_SALT: &[u8] = b"cryptmirror-v1";
const CONTENT_LABEL: &[u8] = b"content";
const CHECK_LABEL: &[u8] = b"key-check";

/// Key material held for the lifetime of a mount. Never persisted.
#[derive(Clone)]
pub struct MountKey {
    content_key: Zeroizing<[u8; KEY_SIZE]>,
    check_key: Zeroizing<[u8; KEY_SIZE]>,
}

impl MountKey {
    /// Build from raw master key bytes
    pub fn from_bytes(master: &[u8; KEY_SIZE]) -> Result<Self> {
        let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, HKDF_SALT).extract(master);

        Ok(MountKey {
            content_key: expand(&prk, CONTENT_LABEL)?,
            check_key: expand(&prk, CHECK_LABEL)?,
        })
    }

    /// Derive from a passphrase using the salt stored in `config`
    pub fn from_passphrase(passphrase: &[u8], config: &EncryptionConfig) -> Result<Self> {
        let salt = stored_salt(config)?;
        let master = derive_master_key(passphrase, &salt, config)?;
        Self::from_bytes(&master)
    }

    /// AES-256 key for content encoding
    pub(crate) fn content_key(&self) -> &[u8; KEY_SIZE] {
        &self.content_key
    }

    /// Key check value bound to a blob's nonce
    pub(crate) fn key_check(&self, nonce: &[u8; NONCE_SIZE]) -> [u8; KEY_CHECK_SIZE] {
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.check_key[..]);
        let tag = hmac::sign(&key, nonce);

        let mut check = [0u8; KEY_CHECK_SIZE];
        check.copy_from_slice(&tag.as_ref()[..KEY_CHECK_SIZE]);
        check
    }

    /// Constant-time comparison against a stored check value
    pub(crate) fn verify_check(&self, nonce: &[u8; NONCE_SIZE], stored: &[u8]) -> bool {
        self.key_check(nonce)[..].ct_eq(stored).into()
    }
}

impl std::fmt::Debug for MountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountKey")
            .field("content_key", &"[REDACTED]")
            .field("check_key", &"[REDACTED]")
            .finish()
    }
}

fn expand(prk: &hkdf::Prk, label: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let info = [label];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| Error::KeyDerivation("HKDF expand failed".to_string()))?;

    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    okm.fill(&mut out[..])
        .map_err(|_| Error::KeyDerivation("HKDF fill failed".to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subkeys_differ() {
        let key = MountKey::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        assert_ne!(key.content_key(), &*key.check_key);
        assert_ne!(key.content_key(), &[7u8; KEY_SIZE]);
    }

    #[test]
    fn test_key_check_is_deterministic_per_nonce() {
        let key = MountKey::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        let nonce = [1u8; NONCE_SIZE];

        assert_eq!(key.key_check(&nonce), key.key_check(&nonce));
        assert_ne!(key.key_check(&nonce), key.key_check(&[2u8; NONCE_SIZE]));
        assert!(key.verify_check(&nonce, &key.key_check(&nonce)));
    }

    #[test]
    fn test_other_key_fails_check() {
        let key1 = MountKey::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        let key2 = MountKey::from_bytes(&[8u8; KEY_SIZE]).unwrap();
        let nonce = [1u8; NONCE_SIZE];

        assert!(!key2.verify_check(&nonce, &key1.key_check(&nonce)));
    }

    #[test]
    fn test_from_passphrase_requires_salt() {
        let config = EncryptionConfig {
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
            salt: Vec::new(),
        };
        assert!(matches!(
            MountKey::from_passphrase(b"secret", &config),
            Err(Error::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_from_passphrase_is_reproducible() {
        let config = EncryptionConfig {
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
            salt: crate::crypto::generate_salt().to_vec(),
        };
        let a = MountKey::from_passphrase(b"secret", &config).unwrap();
        let b = MountKey::from_passphrase(b"secret", &config).unwrap();
        assert_eq!(a.content_key(), b.content_key());
    }
}
