//! Content digest utilities for artifact identification
//!
//! Every analyzed artifact is identified downstream by three digests
//! computed over the exact bytes that were fetched.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// MD5, SHA-1 and SHA-256 of one artifact, as lowercase hex strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigests {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

impl ArtifactDigests {
    /// Compute all three digests over a byte slice
    pub fn of(data: &[u8]) -> Self {
        Self {
            md5: compute_md5(data),
            sha1: compute_sha1(data),
            sha256: compute_sha256(data),
        }
    }
}

/// Compute MD5 of bytes as lowercase hex
pub fn compute_md5(data: &[u8]) -> String {
    let digest = md5::compute(data);
    format!("{:x}", digest)
}

/// Compute SHA-1 of bytes as lowercase hex
pub fn compute_sha1(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA-256 of bytes as lowercase hex
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_md5() {
        assert_eq!(compute_md5(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_compute_sha1() {
        assert_eq!(
            compute_sha1(b"hello world"),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn test_compute_sha256() {
        assert_eq!(
            compute_sha256(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_digests_of_single_zero_byte() {
        let digests = ArtifactDigests::of(b"\x00");
        assert_eq!(digests.md5, "93b885adfe0da089cdf634904fd59f71");
        assert_eq!(digests.sha1, "5ba93c9db0cff93f52b521d7420e43f6eda2784f");
        assert_eq!(
            digests.sha256,
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d"
        );
    }

    #[test]
    fn test_digests_are_lowercase_hex() {
        let digests = ArtifactDigests::of(b"ZOO");
        for value in [&digests.md5, &digests.sha1, &digests.sha256] {
            assert!(value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
        assert_eq!(digests.md5.len(), 32);
        assert_eq!(digests.sha1.len(), 40);
        assert_eq!(digests.sha256.len(), 64);
    }
}
