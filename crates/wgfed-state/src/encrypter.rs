//! Symmetric encryption of secret state fields.
//!
//! Sealed values are text so they survive YAML and JSON unchanged:
//! `aes256gcm:` followed by the standard Base64 of `nonce || ciphertext || tag`.

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::StateResult;
use crate::keyfile::{create_key_file, refuse_existing, PRIVATE_KEY_MODE};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Minimum salt length accepted for passphrase derivation.
pub const MIN_SALT_SIZE: usize = 16;

/// Prefix marking a sealed value.
pub const SEALED_PREFIX: &str = "aes256gcm:";

/// Encryption-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncryptionError {
    /// Authentication failed: wrong key or altered ciphertext.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    #[error("malformed sealed value: {reason}")]
    Malformed { reason: String },

    /// A field that must be sealed holds plain text.
    #[error("secret field '{field}' is not encrypted")]
    NotEncrypted { field: String },

    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    #[error("invalid encryption key: {message}")]
    Key { message: String },
}

/// Seals and opens secret strings.
pub trait MessageEncrypter: Send + Sync {
    /// Encrypt `plaintext` under a fresh nonce.
    fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError>;

    /// Open a value produced by [`encrypt`](Self::encrypt).
    fn decrypt(&self, sealed: &str) -> Result<Zeroizing<String>, EncryptionError>;
}

/// Whether `value` looks like a sealed value.
pub fn is_sealed(value: &str) -> bool {
    value.starts_with(SEALED_PREFIX)
}

/// AES-256-GCM encrypter.
pub struct AesGcmMessageEncrypter {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl std::fmt::Debug for AesGcmMessageEncrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmMessageEncrypter").finish_non_exhaustive()
    }
}

impl AesGcmMessageEncrypter {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Derive the key from a passphrase with Argon2id.
    pub fn from_passphrase(passphrase: &[u8], salt: &[u8]) -> Result<Self, EncryptionError> {
        if salt.len() < MIN_SALT_SIZE {
            return Err(EncryptionError::Key {
                message: format!("salt must be at least {} bytes", MIN_SALT_SIZE),
            });
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        argon2::Argon2::default()
            .hash_password_into(passphrase, salt, &mut key[..])
            .map_err(|e| EncryptionError::Key {
                message: format!("key derivation failed: {}", e),
            })?;
        Ok(Self { key })
    }

    /// Key from its standard Base64 text form.
    pub fn from_base64(encoded: &str) -> Result<Self, EncryptionError> {
        let bytes = Zeroizing::new(BASE64.decode(encoded.trim()).map_err(|e| {
            EncryptionError::Key {
                message: format!("invalid base64: {}", e),
            }
        })?);
        let key: [u8; KEY_SIZE] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| EncryptionError::Key {
                    message: format!("expected {} bytes, got {}", KEY_SIZE, bytes.len()),
                })?;
        Ok(Self::new(key))
    }

    /// Read a key file holding the Base64 key.
    pub fn load_key_file(path: &Path) -> Result<Self, EncryptionError> {
        let content = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            EncryptionError::Key {
                message: format!("failed to read {}: {}", path.display(), e),
            }
        })?);
        Self::from_base64(&content)
    }

    /// Write the key as a Base64 key file, mode 0600 on Unix.
    pub fn write_key_file(&self, path: &Path, force: bool) -> StateResult<()> {
        if !force {
            refuse_existing(&[path])?;
        }
        let mut content = self.to_base64();
        content.push('\n');
        create_key_file(path, content.as_bytes(), PRIVATE_KEY_MODE)
    }

    /// Standard Base64 of the key, for writing key files.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(self.key.as_slice()))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()))
    }
}

impl MessageEncrypter for AesGcmMessageEncrypter {
    fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| EncryptionError::EncryptionFailed {
                reason: e.to_string(),
            })?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", SEALED_PREFIX, BASE64.encode(sealed)))
    }

    fn decrypt(&self, sealed: &str) -> Result<Zeroizing<String>, EncryptionError> {
        let encoded = sealed
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| EncryptionError::Malformed {
                reason: format!("missing '{}' prefix", SEALED_PREFIX),
            })?;
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| EncryptionError::Malformed {
                reason: format!("invalid base64: {}", e),
            })?;
        if bytes.len() <= NONCE_SIZE {
            return Err(EncryptionError::Malformed {
                reason: format!("{} bytes is too short", bytes.len()),
            });
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);

        let plaintext = Zeroizing::new(
            self.cipher()
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|e| EncryptionError::DecryptionFailed {
                    reason: e.to_string(),
                })?,
        );
        String::from_utf8(plaintext.to_vec())
            .map(Zeroizing::new)
            .map_err(|_| EncryptionError::Malformed {
                reason: "plaintext is not UTF-8".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &[u8] = b"wg-federation-salt-0001";

    #[test]
    fn test_seal_then_open() {
        let encrypter = AesGcmMessageEncrypter::generate();
        let sealed = encrypter.encrypt("yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=").unwrap();

        assert!(is_sealed(&sealed));
        assert!(!sealed.contains("yAnz5TF"));
        assert_eq!(
            encrypter.decrypt(&sealed).unwrap().as_str(),
            "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk="
        );
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let encrypter = AesGcmMessageEncrypter::generate();
        assert_ne!(
            encrypter.encrypt("same").unwrap(),
            encrypter.encrypt("same").unwrap()
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = AesGcmMessageEncrypter::generate().encrypt("secret").unwrap();
        assert!(matches!(
            AesGcmMessageEncrypter::generate().decrypt(&sealed),
            Err(EncryptionError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let encrypter = AesGcmMessageEncrypter::generate();
        let sealed = encrypter.encrypt("secret").unwrap();

        let mut bytes = BASE64.decode(&sealed[SEALED_PREFIX.len()..]).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = format!("{}{}", SEALED_PREFIX, BASE64.encode(bytes));

        assert!(matches!(
            encrypter.decrypt(&tampered),
            Err(EncryptionError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_malformed_values() {
        let encrypter = AesGcmMessageEncrypter::generate();
        for sealed in ["plain text", "aes256gcm:!!!", "aes256gcm:AAAA"] {
            assert!(
                matches!(encrypter.decrypt(sealed), Err(EncryptionError::Malformed { .. })),
                "{} should be malformed",
                sealed
            );
        }
    }

    #[test]
    fn test_passphrase_derivation_is_deterministic() {
        let first = AesGcmMessageEncrypter::from_passphrase(b"correct horse", SALT).unwrap();
        let second = AesGcmMessageEncrypter::from_passphrase(b"correct horse", SALT).unwrap();
        let other = AesGcmMessageEncrypter::from_passphrase(b"battery staple", SALT).unwrap();

        let sealed = first.encrypt("psk").unwrap();
        assert_eq!(second.decrypt(&sealed).unwrap().as_str(), "psk");
        assert!(other.decrypt(&sealed).is_err());
        assert!(AesGcmMessageEncrypter::from_passphrase(b"x", b"short").is_err());
    }

    #[test]
    fn test_key_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.key");
        let encrypter = AesGcmMessageEncrypter::generate();
        encrypter.write_key_file(&path, false).unwrap();
        assert!(encrypter.write_key_file(&path, false).is_err());

        let loaded = AesGcmMessageEncrypter::load_key_file(&path).unwrap();
        let sealed = encrypter.encrypt("secret").unwrap();
        assert_eq!(loaded.decrypt(&sealed).unwrap().as_str(), "secret");

        std::fs::write(&path, BASE64.encode([0u8; 16])).unwrap();
        assert!(matches!(
            AesGcmMessageEncrypter::load_key_file(&path),
            Err(EncryptionError::Key { .. })
        ));
    }
}
