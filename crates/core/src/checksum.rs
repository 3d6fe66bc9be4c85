use sha2::{Digest, Sha256};

/// Computes a deterministic SHA-256 digest over raw artifact bytes.
///
/// The digest is taken over the bytes as stored on disk (all envelopes
/// included), so any single-byte change to the artifact changes the checksum.
pub fn artifact_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::artifact_checksum;

    #[test]
    fn checksum_is_stable_for_same_bytes() {
        let data = b"docvault-artifact";
        assert_eq!(artifact_checksum(data), artifact_checksum(data));
    }

    #[test]
    fn checksum_changes_when_any_byte_changes() {
        let original = b"artifact-v1".to_vec();
        let base = artifact_checksum(&original);
        for i in 0..original.len() {
            let mut flipped = original.clone();
            flipped[i] ^= 0x01;
            assert_ne!(artifact_checksum(&flipped), base, "byte {i}");
        }
    }
}
