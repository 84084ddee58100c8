//! Message signing and verification for state envelopes.
//!
//! The signed bytes are a DSSE Pre-Authentication Encoding over
//! [`PAYLOAD_TYPE_STATE_V1`] with payload `LEN(nonce) SP nonce SP message`,
//! where `message` is the canonical JSON of the envelope's `data`. The
//! digest stored in an envelope is the standard Base64 of the Ed25519
//! signature.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::digest::sha256_prefixed;
use crate::error::StateResult;
use crate::keyfile::{create_key_file, refuse_existing, PRIVATE_KEY_MODE, PUBLIC_KEY_MODE};

/// File name of the PKCS#8 PEM private key written by `write_keypair`.
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";

/// File name of the SPKI PEM public key written by `write_keypair`.
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";

/// Payload type bound into every state signature.
pub const PAYLOAD_TYPE_STATE_V1: &str = "application/vnd.wg-federation.state+json;v=1";

/// Signer errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature invalid: {reason}")]
    SignatureInvalid { reason: String },

    #[error("malformed digest: {reason}")]
    MalformedDigest { reason: String },

    #[error("key_id mismatch: expected {claimed}, actual {actual}")]
    KeyIdMismatch { claimed: String, actual: String },

    #[error("no signing key configured")]
    MissingSigningKey,

    #[error("key error: {message}")]
    Key { message: String },
}

/// Verifies (and optionally produces) digests over a message and nonce.
pub trait MessageSigner: Send + Sync {
    /// Succeed only if `digest` is a valid signature of `message` bound to `nonce`.
    fn verify_sign(&self, message: &str, nonce: &str, digest: &str) -> Result<(), SignatureError>;

    /// Produce the digest of `message` bound to `nonce`.
    fn sign(&self, message: &str, nonce: &str) -> Result<String, SignatureError>;

    /// Fresh nonce for a new signature.
    fn generate_nonce(&self) -> String {
        generate_nonce()
    }
}

/// 128 bits from the OS CSPRNG as 32 lowercase hex characters.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Ed25519 signer over DSSE PAE.
#[derive(Clone)]
pub struct Ed25519MessageSigner {
    verifying_key: VerifyingKey,
    signing_key: Option<SigningKey>,
    key_id: String,
}

impl fmt::Debug for Ed25519MessageSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519MessageSigner")
            .field("key_id", &self.key_id)
            .field("can_sign", &self.signing_key.is_some())
            .finish()
    }
}

impl Ed25519MessageSigner {
    /// Signer with a fresh key from the OS CSPRNG.
    pub fn generate() -> Result<Self, SignatureError> {
        Self::from_signing_key(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// Verify-only signer.
    pub fn from_verifying_key(verifying_key: VerifyingKey) -> Result<Self, SignatureError> {
        let key_id = compute_key_id_from_verifying_key(&verifying_key)?;
        Ok(Self {
            verifying_key,
            signing_key: None,
            key_id,
        })
    }

    /// Signer that can both sign and verify.
    pub fn from_signing_key(signing_key: SigningKey) -> Result<Self, SignatureError> {
        let verifying_key = signing_key.verifying_key();
        let key_id = compute_key_id_from_verifying_key(&verifying_key)?;
        Ok(Self {
            verifying_key,
            signing_key: Some(signing_key),
            key_id,
        })
    }

    /// Verify-only signer from an SPKI PEM public key.
    pub fn from_public_key_pem(pem: &str) -> Result<Self, SignatureError> {
        let key = VerifyingKey::from_public_key_pem(pem).map_err(|e| SignatureError::Key {
            message: format!("invalid public key PEM: {}", e),
        })?;
        Self::from_verifying_key(key)
    }

    /// Signing signer from a PKCS#8 PEM private key.
    pub fn from_private_key_pem(pem: &str) -> Result<Self, SignatureError> {
        let key = SigningKey::from_pkcs8_pem(pem).map_err(|e| SignatureError::Key {
            message: format!("invalid private key PEM: {}", e),
        })?;
        Self::from_signing_key(key)
    }

    /// Read an SPKI PEM public key from disk.
    pub fn load_public_key_pem(path: &Path) -> Result<Self, SignatureError> {
        Self::from_public_key_pem(&read_key_file(path)?)
    }

    /// Read a PKCS#8 PEM private key from disk.
    pub fn load_private_key_pem(path: &Path) -> Result<Self, SignatureError> {
        Self::from_private_key_pem(&read_key_file(path)?)
    }

    /// Reject the key unless its id equals `expected`.
    pub fn require_key_id(self, expected: &str) -> Result<Self, SignatureError> {
        if self.key_id != expected {
            return Err(SignatureError::KeyIdMismatch {
                claimed: expected.to_string(),
                actual: self.key_id,
            });
        }
        Ok(self)
    }

    /// `sha256:<hex>` of the SPKI DER public key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Private key as PKCS#8 PEM.
    pub fn to_private_key_pem(&self) -> Result<Zeroizing<String>, SignatureError> {
        self.signing_key
            .as_ref()
            .ok_or(SignatureError::MissingSigningKey)?
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| SignatureError::Key {
                message: format!("failed to encode private key as PKCS#8 PEM: {}", e),
            })
    }

    /// Public key as SPKI PEM.
    pub fn to_public_key_pem(&self) -> Result<String, SignatureError> {
        self.verifying_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SignatureError::Key {
                message: format!("failed to encode public key as SPKI PEM: {}", e),
            })
    }

    /// Write [`PRIVATE_KEY_FILE`] (mode 0600) and [`PUBLIC_KEY_FILE`] into `dir`.
    ///
    /// Without `force`, nothing is written if either file exists.
    pub fn write_keypair(&self, dir: &Path, force: bool) -> StateResult<KeyPairPaths> {
        let private_pem = self.to_private_key_pem()?;
        let public_pem = self.to_public_key_pem()?;

        let paths = KeyPairPaths {
            private_key: dir.join(PRIVATE_KEY_FILE),
            public_key: dir.join(PUBLIC_KEY_FILE),
        };
        if !force {
            refuse_existing(&[&paths.private_key, &paths.public_key])?;
        }
        create_key_file(&paths.private_key, private_pem.as_bytes(), PRIVATE_KEY_MODE)?;
        create_key_file(&paths.public_key, public_pem.as_bytes(), PUBLIC_KEY_MODE)?;
        Ok(paths)
    }
}

/// Files written by [`Ed25519MessageSigner::write_keypair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairPaths {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

impl MessageSigner for Ed25519MessageSigner {
    fn verify_sign(&self, message: &str, nonce: &str, digest: &str) -> Result<(), SignatureError> {
        let signature_bytes =
            BASE64
                .decode(digest.trim())
                .map_err(|e| SignatureError::MalformedDigest {
                    reason: format!("invalid base64 digest: {}", e),
                })?;
        let signature =
            Signature::from_slice(&signature_bytes).map_err(|e| SignatureError::MalformedDigest {
                reason: format!("invalid signature bytes: {}", e),
            })?;

        let pae = build_pae(PAYLOAD_TYPE_STATE_V1, &signing_payload(message, nonce));
        self.verifying_key
            .verify(&pae, &signature)
            .map_err(|_| SignatureError::SignatureInvalid {
                reason: "ed25519 verification failed".to_string(),
            })
    }

    fn sign(&self, message: &str, nonce: &str) -> Result<String, SignatureError> {
        let signing_key = self
            .signing_key
            .as_ref()
            .ok_or(SignatureError::MissingSigningKey)?;

        let pae = build_pae(PAYLOAD_TYPE_STATE_V1, &signing_payload(message, nonce));
        let signature: Signature = signing_key.sign(&pae);
        Ok(BASE64.encode(signature.to_bytes()))
    }
}

/// Compute key_id from SPKI-encoded public key bytes.
pub fn compute_key_id(spki_bytes: &[u8]) -> String {
    sha256_prefixed(spki_bytes)
}

/// Compute key_id from a VerifyingKey.
pub fn compute_key_id_from_verifying_key(key: &VerifyingKey) -> Result<String, SignatureError> {
    let doc = key
        .to_public_key_der()
        .map_err(|e| SignatureError::Key {
            message: format!("failed to encode public key as SPKI DER: {}", e),
        })?;
    Ok(compute_key_id(doc.as_bytes()))
}

fn read_key_file(path: &Path) -> Result<String, SignatureError> {
    std::fs::read_to_string(path).map_err(|e| SignatureError::Key {
        message: format!("failed to read key {}: {}", path.display(), e),
    })
}

/// `LEN(nonce) SP nonce SP message`, so no two (nonce, message) pairs collide.
fn signing_payload(message: &str, nonce: &str) -> Vec<u8> {
    format!("{} {} {}", nonce.len(), nonce, message).into_bytes()
}

/// Build DSSE Pre-Authentication Encoding (PAE).
///
/// ```text
/// PAE(type, payload) = "DSSEv1" SP LEN(type) SP type SP LEN(payload) SP payload
/// ```
pub(crate) fn build_pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut pae = Vec::with_capacity(payload_type.len() + payload.len() + 32);
    pae.extend_from_slice(b"DSSEv1 ");
    pae.extend_from_slice(payload_type.len().to_string().as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_type.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload.len().to_string().as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload);
    pae
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkcs8::{EncodePrivateKey, LineEnding};

    fn signer() -> Ed25519MessageSigner {
        Ed25519MessageSigner::from_signing_key(SigningKey::generate(&mut rand::rngs::OsRng))
            .unwrap()
    }

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let signer = signer();
        let message = r#"{"address":"10.10.100.1/24"}"#;
        let digest = signer.sign(message, "abc123").unwrap();

        assert_eq!(BASE64.decode(&digest).unwrap().len(), 64);
        signer.verify_sign(message, "abc123", &digest).unwrap();
    }

    #[test]
    fn test_tampered_message_fails() {
        let signer = signer();
        let digest = signer.sign(r#"{"a":1}"#, "n").unwrap();
        assert!(matches!(
            signer.verify_sign(r#"{"a":2}"#, "n", &digest),
            Err(SignatureError::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn test_nonce_is_bound() {
        let signer = signer();
        let digest = signer.sign(r#"{"a":1}"#, "first").unwrap();
        assert!(matches!(
            signer.verify_sign(r#"{"a":1}"#, "second", &digest),
            Err(SignatureError::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn test_nonce_message_boundary_is_unambiguous() {
        let signer = signer();
        let digest = signer.sign("b c", "a").unwrap();
        assert!(signer.verify_sign("c", "a b", &digest).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let digest = signer().sign("m", "n").unwrap();
        assert!(matches!(
            signer().verify_sign("m", "n", &digest),
            Err(SignatureError::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn test_malformed_digest() {
        let signer = signer();
        assert!(matches!(
            signer.verify_sign("m", "n", "not base64!"),
            Err(SignatureError::MalformedDigest { .. })
        ));
        assert!(matches!(
            signer.verify_sign("m", "n", &BASE64.encode([0u8; 10])),
            Err(SignatureError::MalformedDigest { .. })
        ));
    }

    #[test]
    fn test_verify_only_cannot_sign() {
        let verifier = Ed25519MessageSigner::from_verifying_key(*signer().verifying_key()).unwrap();
        assert_eq!(
            verifier.sign("m", "n"),
            Err(SignatureError::MissingSigningKey)
        );
    }

    #[test]
    fn test_pem_round_trip_and_key_id() {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let private_pem = signing_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_pem = signing_key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();

        let signer = Ed25519MessageSigner::from_private_key_pem(&private_pem).unwrap();
        let verifier = Ed25519MessageSigner::from_public_key_pem(&public_pem).unwrap();
        assert_eq!(signer.key_id(), verifier.key_id());
        assert!(verifier.key_id().starts_with("sha256:"));
        assert_eq!(verifier.key_id().len(), 7 + 64);

        let digest = signer.sign("m", "n").unwrap();
        verifier.verify_sign("m", "n", &digest).unwrap();
    }

    #[test]
    fn test_require_key_id() {
        let signer = signer();
        let id = signer.key_id().to_string();
        assert!(signer.clone().require_key_id(&id).is_ok());
        assert!(matches!(
            signer.require_key_id("sha256:00"),
            Err(SignatureError::KeyIdMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_pem() {
        assert!(matches!(
            Ed25519MessageSigner::from_public_key_pem("not a key"),
            Err(SignatureError::Key { .. })
        ));
    }

    #[test]
    fn test_generate_nonce() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_pae_format() {
        let pae = build_pae("application/json", b"test");
        assert_eq!(pae, b"DSSEv1 16 application/json 4 test".to_vec());
    }

    #[test]
    fn test_write_keypair_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let signer = Ed25519MessageSigner::generate().unwrap();
        let paths = signer.write_keypair(&dir.path().join("keys"), false).unwrap();

        let private = Ed25519MessageSigner::load_private_key_pem(&paths.private_key).unwrap();
        let public = Ed25519MessageSigner::load_public_key_pem(&paths.public_key).unwrap();
        assert_eq!(private.key_id(), signer.key_id());
        assert_eq!(public.key_id(), signer.key_id());

        let digest = private.sign("message", "abc123").unwrap();
        public.verify_sign("message", "abc123", &digest).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&paths.private_key).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_write_keypair_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let first = Ed25519MessageSigner::generate().unwrap();
        first.write_keypair(dir.path(), false).unwrap();

        let second = Ed25519MessageSigner::generate().unwrap();
        let err = second.write_keypair(dir.path(), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        let kept = Ed25519MessageSigner::load_public_key_pem(&dir.path().join(PUBLIC_KEY_FILE))
            .unwrap();
        assert_eq!(kept.key_id(), first.key_id());

        second.write_keypair(dir.path(), true).unwrap();
        let replaced = Ed25519MessageSigner::load_public_key_pem(&dir.path().join(PUBLIC_KEY_FILE))
            .unwrap();
        assert_eq!(replaced.key_id(), second.key_id());
    }

    #[test]
    fn test_verify_only_signer_has_no_private_pem() {
        let signer = Ed25519MessageSigner::generate().unwrap();
        let public = Ed25519MessageSigner::from_public_key_pem(&signer.to_public_key_pem().unwrap())
            .unwrap();
        assert_eq!(
            public.to_private_key_pem().unwrap_err(),
            SignatureError::MissingSigningKey
        );
    }

    #[test]
    fn test_debug_hides_key_material() {
        let rendered = format!("{:?}", signer());
        assert!(rendered.contains("key_id"));
        assert!(!rendered.contains("SigningKey"));
    }
}
