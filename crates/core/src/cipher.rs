use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};

use crate::error::EngineError;

/// Self-identifying prefix for the encryption envelope.
pub const ENCRYPTION_MAGIC: &[u8; 4] = b"DVE1";

const NONCE_LEN: usize = 12;

pub fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.starts_with(ENCRYPTION_MAGIC)
}

/// Short stable fingerprint of a passphrase, stored on the BackupRecord as
/// `key_ref` so a wrong key at restore time fails loudly instead of as an
/// opaque AEAD error.
pub fn key_fingerprint(passphrase: &str) -> String {
    let digest = Sha256::digest(passphrase.as_bytes());
    hex::encode(&digest[..8])
}

fn derive_key(passphrase: &str) -> Key<Aes256Gcm> {
    let digest = Sha256::digest(passphrase.as_bytes());
    *Key::<Aes256Gcm>::from_slice(&digest)
}

/// AES-256-GCM with a fresh random 96-bit nonce per call. The nonce is
/// written into the envelope and authenticated on decrypt; there is no
/// nonce reuse across calls and no unauthenticated output.
pub fn encrypt(plain: &[u8], passphrase: &str) -> Result<Vec<u8>, EngineError> {
    let cipher = Aes256Gcm::new(&derive_key(passphrase));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher.encrypt(&nonce, plain).map_err(|_| EngineError::Decrypt)?;

    let mut out = Vec::with_capacity(ENCRYPTION_MAGIC.len() + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(ENCRYPTION_MAGIC);
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverse `encrypt`. Fails on a missing envelope, a wrong key, or any
/// tampering with the nonce or ciphertext.
pub fn decrypt(bytes: &[u8], passphrase: &str) -> Result<Vec<u8>, EngineError> {
    let body = bytes
        .strip_prefix(ENCRYPTION_MAGIC.as_slice())
        .ok_or(EngineError::Decrypt)?;
    if body.len() < NONCE_LEN {
        return Err(EngineError::Decrypt);
    }
    let (nonce, ciphertext) = body.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(&derive_key(passphrase));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EngineError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let wrapped = encrypt(b"secret payload", "hunter2").unwrap();
        assert!(is_encrypted(&wrapped));
        assert_eq!(decrypt(&wrapped, "hunter2").unwrap(), b"secret payload");
    }

    #[test]
    fn ciphertext_hides_plaintext() {
        let plain = b"customers: ada, grace";
        let wrapped = encrypt(plain, "hunter2").unwrap();
        assert!(!wrapped
            .windows(plain.len())
            .any(|window| window == plain.as_slice()));
    }

    #[test]
    fn wrong_key_fails_rather_than_corrupting() {
        let wrapped = encrypt(b"payload", "correct").unwrap();
        assert!(matches!(
            decrypt(&wrapped, "incorrect"),
            Err(EngineError::Decrypt)
        ));
    }

    #[test]
    fn nonce_varies_per_call() {
        let one = encrypt(b"same input", "key").unwrap();
        let two = encrypt(b"same input", "key").unwrap();
        assert_ne!(one, two);
        // Both still decrypt.
        assert_eq!(decrypt(&one, "key").unwrap(), b"same input");
        assert_eq!(decrypt(&two, "key").unwrap(), b"same input");
    }

    #[test]
    fn tampering_is_detected() {
        let mut wrapped = encrypt(b"payload", "key").unwrap();
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0x01;
        assert!(matches!(decrypt(&wrapped, "key"), Err(EngineError::Decrypt)));
    }

    #[test]
    fn truncated_envelope_is_rejected() {
        assert!(matches!(decrypt(b"DVE1abc", "key"), Err(EngineError::Decrypt)));
        assert!(matches!(decrypt(b"plain", "key"), Err(EngineError::Decrypt)));
    }

    #[test]
    fn fingerprint_is_stable_and_key_dependent() {
        assert_eq!(key_fingerprint("a"), key_fingerprint("a"));
        assert_ne!(key_fingerprint("a"), key_fingerprint("b"));
        assert_eq!(key_fingerprint("a").len(), 16);
    }
}
