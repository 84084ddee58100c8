//! SHA-256 digests in `sha256:{hex}` form.

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes and format as `sha256:{hex}`.
pub fn sha256_prefixed(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_prefixed_known_vector() {
        assert_eq!(
            sha256_prefixed(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
