//! Whole-file content encoding
//!
//! # Blob Format
//!
//! | Offset | Size | Description |
//! |--------|------|-------------|
//! | 0      | 4    | Magic `CMF1` |
//! | 4      | 16   | Nonce (initial AES-CTR counter block, random per encode) |
//! | 20     | 16   | Key check: HMAC-SHA256(check subkey, nonce), truncated |
//! | 36     | n    | AES-256-CTR ciphertext, same length as the plaintext |
//!
//! A zero-length blob is the encoding of an empty file that was created but
//! never written.
//!
//! The key check only identifies the key. Nothing authenticates the
//! ciphertext body: flipped ciphertext bits decode to flipped plaintext bits
//! without error.

use std::io::{self, Write};

use aes::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use tracing::{trace, warn};

use crate::crypto::{MountKey, KEY_CHECK_SIZE, NONCE_SIZE};
use crate::error::{Error, Result};

/// AES-256-CTR with big-endian 128-bit counter
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Blob magic and format version
pub const MAGIC: [u8; 4] = *b"CMF1";

/// Bytes preceding the ciphertext
pub const HEADER_SIZE: usize = MAGIC.len() + NONCE_SIZE + KEY_CHECK_SIZE;

/// Chunk size used when streaming ciphertext into a writer
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

struct Header {
    nonce: [u8; NONCE_SIZE],
    key_check: [u8; KEY_CHECK_SIZE],
}

impl Header {
    fn fresh(key: &MountKey) -> Self {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        let key_check = key.key_check(&nonce);
        Header { nonce, key_check }
    }

    fn parse(blob: &[u8]) -> Result<Self> {
        if blob.len() < HEADER_SIZE {
            return Err(Error::Decode(format!(
                "blob of {} bytes is shorter than the {} byte header",
                blob.len(),
                HEADER_SIZE
            )));
        }
        if blob[..MAGIC.len()] != MAGIC {
            return Err(Error::Decode("unrecognized blob magic".to_string()));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&blob[MAGIC.len()..MAGIC.len() + NONCE_SIZE]);
        let mut key_check = [0u8; KEY_CHECK_SIZE];
        key_check.copy_from_slice(&blob[MAGIC.len() + NONCE_SIZE..HEADER_SIZE]);

        Ok(Header { nonce, key_check })
    }

    fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..MAGIC.len()].copy_from_slice(&MAGIC);
        out[MAGIC.len()..MAGIC.len() + NONCE_SIZE].copy_from_slice(&self.nonce);
        out[MAGIC.len() + NONCE_SIZE..].copy_from_slice(&self.key_check);
        out
    }

    fn cipher(&self, key: &MountKey) -> Aes256Ctr {
        Aes256Ctr::new(key.content_key().into(), (&self.nonce).into())
    }
}

/// Encode `plaintext` into a fresh blob.
///
/// Every call draws a new nonce, so encoding the same plaintext twice
/// yields different blobs.
pub fn encode(plaintext: &[u8], key: &MountKey) -> Vec<u8> {
    let header = Header::fresh(key);
    let mut blob = Vec::with_capacity(HEADER_SIZE + plaintext.len());
    blob.extend_from_slice(&header.to_bytes());
    blob.extend_from_slice(plaintext);
    header.cipher(key).apply_keystream(&mut blob[HEADER_SIZE..]);
    blob
}

/// Encode `plaintext` directly into `writer` without materializing the blob
pub fn encode_to<W: Write>(plaintext: &[u8], key: &MountKey, writer: &mut W) -> io::Result<()> {
    let header = Header::fresh(key);
    writer.write_all(&header.to_bytes())?;

    let mut cipher = header.cipher(key);
    let mut block = vec![0u8; plaintext.len().min(STREAM_CHUNK_SIZE)];
    for chunk in plaintext.chunks(STREAM_CHUNK_SIZE) {
        let out = &mut block[..chunk.len()];
        out.copy_from_slice(chunk);
        cipher.apply_keystream(out);
        writer.write_all(out)?;
    }
    Ok(())
}

/// Decode a blob produced by [`encode`] or [`encode_to`].
///
/// Fails with [`Error::Decode`] when the blob is malformed or was encoded
/// under a different key.
pub fn decode(blob: &[u8], key: &MountKey) -> Result<Vec<u8>> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }

    let header = Header::parse(blob)?;
    if !key.verify_check(&header.nonce, &header.key_check) {
        warn!("Key check mismatch while decoding blob");
        return Err(Error::Decode(
            "key check mismatch (wrong passphrase?)".to_string(),
        ));
    }

    trace!(len = blob.len() - HEADER_SIZE, "Decoding blob");
    let mut plaintext = blob[HEADER_SIZE..].to_vec();
    header.cipher(key).apply_keystream(&mut plaintext);
    Ok(plaintext)
}

/// Plaintext length of a blob, from its on-disk length alone
pub fn plaintext_len(blob_len: u64) -> u64 {
    blob_len.saturating_sub(HEADER_SIZE as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_SIZE;

    fn key(byte: u8) -> MountKey {
        MountKey::from_bytes(&[byte; KEY_SIZE]).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let key = key(1);
        let blob = encode(b"hello world", &key);

        assert_eq!(blob.len(), HEADER_SIZE + 11);
        assert_eq!(&blob[..4], b"CMF1");
        assert_ne!(&blob[HEADER_SIZE..], b"hello world");
        assert_eq!(decode(&blob, &key).unwrap(), b"hello world");
    }

    #[test]
    fn test_empty_plaintext() {
        let key = key(1);
        let blob = encode(b"", &key);
        assert_eq!(blob.len(), HEADER_SIZE);
        assert!(decode(&blob, &key).unwrap().is_empty());
    }

    #[test]
    fn test_empty_blob_is_empty_file() {
        assert!(decode(&[], &key(1)).unwrap().is_empty());
    }

    #[test]
    fn test_encode_is_randomized() {
        let key = key(1);
        let a = encode(b"same plaintext", &key);
        let b = encode(b"same plaintext", &key);
        assert_ne!(a, b);
        assert_eq!(decode(&a, &key).unwrap(), decode(&b, &key).unwrap());
    }

    #[test]
    fn test_wrong_key_fails_consistently() {
        let blob = encode(b"top secret", &key(1));
        let wrong = key(2);

        for _ in 0..3 {
            assert!(matches!(decode(&blob, &wrong), Err(Error::Decode(_))));
        }
    }

    #[test]
    fn test_truncated_header_rejected() {
        let blob = encode(b"data", &key(1));
        let result = decode(&blob[..HEADER_SIZE - 1], &key(1));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut blob = encode(b"data", &key(1));
        blob[0] ^= 0xFF;
        assert!(matches!(decode(&blob, &key(1)), Err(Error::Decode(_))));
    }

    #[test]
    fn test_body_tampering_is_not_detected() {
        let key = key(1);
        let mut blob = encode(b"abc", &key);
        blob[HEADER_SIZE] ^= 0x01;

        let decoded = decode(&blob, &key).unwrap();
        assert_eq!(decoded, [b'a' ^ 0x01, b'b', b'c']);
    }

    #[test]
    fn test_encode_to_matches_decode() {
        let key = key(3);
        let plaintext: Vec<u8> = (0..STREAM_CHUNK_SIZE * 2 + 17).map(|i| i as u8).collect();

        let mut blob = Vec::new();
        encode_to(&plaintext, &key, &mut blob).unwrap();

        assert_eq!(blob.len(), HEADER_SIZE + plaintext.len());
        assert_eq!(decode(&blob, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_plaintext_len() {
        assert_eq!(plaintext_len(0), 0);
        assert_eq!(plaintext_len(10), 0);
        assert_eq!(plaintext_len(HEADER_SIZE as u64 + 5), 5);
    }
}
