//! SHA256 hash verification
//!
//! Verifies downloaded archives against the release table before anything
//! touches the disk.

use sha2::{Digest, Sha256};

/// Result of hash verification
#[derive(Debug, Clone)]
pub struct HashResult {
    /// The computed hash (lowercase hex)
    pub computed: String,
    /// The expected hash (lowercase hex)
    pub expected: String,
    /// Whether they match
    pub matches: bool,
}

/// Compute SHA256 hash of bytes
pub fn compute_bytes_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compare the SHA256 of `data` against an expected hex digest
pub fn check_bytes_hash(data: &[u8], expected_hash: &str) -> HashResult {
    let computed = compute_bytes_hash(data);
    let expected = expected_hash.to_lowercase();
    let matches = computed == expected;

    log::info!(
        "Hash verification over {} bytes: computed={}, expected={}, matches={}",
        data.len(),
        hash_prefix(&computed),
        hash_prefix(&expected),
        matches
    );

    HashResult {
        computed,
        expected,
        matches,
    }
}

/// Leading part of a digest for log lines; safe for any string
fn hash_prefix(hash: &str) -> &str {
    let end = hash
        .char_indices()
        .nth(16)
        .map(|(index, _)| index)
        .unwrap_or(hash.len());
    &hash[..end]
}

/// Verify a byte buffer's SHA256 hash against expected value
pub fn verify_bytes_hash(data: &[u8], expected_hash: &str) -> bool {
    check_bytes_hash(data, expected_hash).matches
}
