use std::io::{Cursor, Read};

use crate::error::EngineError;

/// Self-identifying prefix for the compression envelope. Restore and verify
/// peek this to decide whether the stage must be reversed, without trusting
/// the BackupRecord alone.
pub const COMPRESSION_MAGIC: &[u8; 4] = b"DVC1";

/// Entry name inside the single-entry archive.
const ENTRY_NAME: &str = "payload.json";

const ZSTD_LEVEL: i32 = 3;

pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.starts_with(COMPRESSION_MAGIC)
}

/// Wrap `payload` into a single-entry tar archive, zstd-encode it, and
/// prefix the envelope magic.
pub fn compress(payload: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut tar_data = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_data);
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, ENTRY_NAME, Cursor::new(payload))
            .map_err(|e| EngineError::Archive(format!("append archive entry: {e}")))?;
        builder
            .finish()
            .map_err(|e| EngineError::Archive(format!("finish archive: {e}")))?;
    }

    let compressed = zstd::encode_all(Cursor::new(&tar_data), ZSTD_LEVEL)
        .map_err(|e| EngineError::Archive(format!("zstd encode: {e}")))?;

    let mut out = Vec::with_capacity(COMPRESSION_MAGIC.len() + compressed.len());
    out.extend_from_slice(COMPRESSION_MAGIC);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Reverse `compress`, returning the byte-identical inner payload.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, EngineError> {
    let body = bytes
        .strip_prefix(COMPRESSION_MAGIC.as_slice())
        .ok_or_else(|| EngineError::Archive("missing compression envelope header".to_owned()))?;

    let tar_data = zstd::decode_all(Cursor::new(body))
        .map_err(|e| EngineError::Archive(format!("zstd decode: {e}")))?;

    let mut archive = tar::Archive::new(Cursor::new(tar_data));
    let mut entries = archive
        .entries()
        .map_err(|e| EngineError::Archive(format!("read archive: {e}")))?;
    let mut entry = entries
        .next()
        .ok_or_else(|| EngineError::Archive("empty archive".to_owned()))?
        .map_err(|e| EngineError::Archive(format!("read archive entry: {e}")))?;

    let mut payload = Vec::new();
    entry
        .read_to_end(&mut payload)
        .map_err(|e| EngineError::Archive(format!("read archive payload: {e}")))?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_byte_identical() {
        let payload = br#"{"customers":[{"id":1}]}"#;
        let wrapped = compress(payload).unwrap();
        assert!(is_compressed(&wrapped));
        assert_eq!(decompress(&wrapped).unwrap(), payload);
    }

    #[test]
    fn compresses_repetitive_payloads() {
        let payload = vec![b'x'; 64 * 1024];
        let wrapped = compress(&payload).unwrap();
        assert!(wrapped.len() < payload.len());
        assert_eq!(decompress(&wrapped).unwrap(), payload);
    }

    #[test]
    fn rejects_missing_header() {
        let err = decompress(b"plain bytes").unwrap_err();
        assert!(matches!(err, EngineError::Archive(_)));
    }

    #[test]
    fn rejects_corrupt_body() {
        let mut wrapped = compress(b"payload").unwrap();
        let mid = wrapped.len() / 2;
        wrapped[mid] ^= 0xff;
        assert!(decompress(&wrapped).is_err());
    }

    #[test]
    fn plain_bytes_are_not_compressed() {
        assert!(!is_compressed(b"{}"));
        assert!(!is_compressed(b""));
    }
}
