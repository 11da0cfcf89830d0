//! Cryptography module for cryptmirror
//!
//! Provides unauthenticated AES-256-CTR content encoding keyed by an
//! Argon2id passphrase-derived key. Confidentiality only: there is no MAC
//! over file content.

mod cipher;
mod kdf;
mod keys;

pub use cipher::{decode, encode, encode_to, plaintext_len, HEADER_SIZE, MAGIC};
pub use kdf::{derive_master_key, generate_salt, stored_salt, MasterKey};
pub use keys::MountKey;

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the CTR initial counter block in bytes
pub const NONCE_SIZE: usize = 16;

/// Size of the truncated key check stored in every blob header
pub const KEY_CHECK_SIZE: usize = 16;

/// Size of salt for key derivation
pub const SALT_SIZE: usize = 32;
