//! Deflate compression transform.

use crate::error::CodecError;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compresses `data`, returning `None` when deflate does not make it smaller.
pub fn compress(data: &[u8]) -> Result<Option<Vec<u8>>, CodecError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::fast());
    encoder
        .write_all(data)
        .map_err(|e| CodecError::Compression(e.to_string()))?;

    let compressed = encoder
        .finish()
        .map_err(|e| CodecError::Compression(format!("finalization failed: {e}")))?;

    if compressed.len() < data.len() {
        Ok(Some(compressed))
    } else {
        Ok(None)
    }
}

/// Decompresses `data`, refusing to produce more than `limit` bytes.
pub fn decompress(data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut decompressed = Vec::new();
    DeflateDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| CodecError::Decompression(e.to_string()))?;

    if decompressed.len() > limit {
        return Err(CodecError::TooLarge {
            size: decompressed.len(),
            max: limit,
        });
    }
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_repetitive_data() {
        let data = b"player.kick ".repeat(200);
        let compressed = compress(&data).unwrap().expect("repetitive data should shrink");
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_incompressible_data_is_left_alone() {
        assert!(compress(b"ab").unwrap().is_none());
    }

    #[test]
    fn test_decompression_limit() {
        let data = vec![b'z'; 10_000];
        let compressed = compress(&data).unwrap().unwrap();
        match decompress(&compressed, 1_000) {
            Err(CodecError::TooLarge { max, .. }) => assert_eq!(max, 1_000),
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_fails_to_decompress() {
        assert!(decompress(&[0xff, 0xfe, 0xfd, 0xfc], 1024).is_err());
    }
}
