use sha2::{Digest, Sha256};

/// Compute SHA256 hash of input bytes
pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Hex-encoded SHA256 of a string, suitable as a storage key
pub fn sha256_hex(input: &str) -> String {
    hex::encode(sha256(input.as_bytes()))
}
