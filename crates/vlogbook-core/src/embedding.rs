//! Binary embedding codec.
//!
//! Current format: packed little-endian f32 array. Two legacy formats remain
//! decodable for migration of old sidecars and inline index payloads:
//!
//! - gzip-compressed packed f32 (magic `1f 8b`)
//! - symmetric quantized int8 (magic `EMQ8`, f32 scale, one i8 per value)
//!
//! Decoding attempts gzip, then quantized, then raw, so the most permissive
//! decoder runs last.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::{Error, Result};

/// Magic prefix of the legacy quantized-int8 format.
pub const QUANTIZED_MAGIC: &[u8; 4] = b"EMQ8";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Encode a vector in the current format (packed little-endian f32).
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode an embedding in any supported format.
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.starts_with(&GZIP_MAGIC) {
        return decode_gzip(bytes);
    }
    if bytes.starts_with(QUANTIZED_MAGIC) {
        return decode_quantized(bytes);
    }
    decode_raw(bytes)
}

/// Encode a vector in the legacy gzip format. Retained for migration tests
/// and compatibility tooling.
pub fn encode_embedding_gzip(vector: &[f32]) -> Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&encode_embedding(vector))?;
    Ok(encoder.finish()?)
}

/// Encode a vector in the legacy quantized-int8 format. Retained for
/// migration tests and compatibility tooling. Lossy.
pub fn encode_embedding_quantized(vector: &[f32]) -> Vec<u8> {
    let max_abs = vector.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    let scale = if max_abs == 0.0 { 1.0 } else { max_abs / 127.0 };

    let mut bytes = Vec::with_capacity(8 + vector.len());
    bytes.extend_from_slice(QUANTIZED_MAGIC);
    bytes.extend_from_slice(&scale.to_le_bytes());
    for value in vector {
        let q = (value / scale).round().clamp(-127.0, 127.0) as i8;
        bytes.push(q as u8);
    }
    bytes
}

fn decode_raw(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Embedding(format!(
            "Packed f32 payload length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let mut vector = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        vector.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(vector)
}

fn decode_gzip(bytes: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::Embedding(format!("Gzip embedding payload: {}", e)))?;
    decode_raw(&decompressed)
}

fn decode_quantized(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() < 8 {
        return Err(Error::Embedding(
            "Quantized embedding payload shorter than header".to_string(),
        ));
    }
    let scale = f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let vector = bytes[8..]
        .iter()
        .map(|&b| (b as i8) as f32 * scale)
        .collect();
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_is_bit_identical() {
        let vector = vec![0.0f32, 1.5, -2.25, f32::MIN_POSITIVE, 1e30, -1e-30];
        let decoded = decode_embedding(&encode_embedding(&vector)).unwrap();
        assert_eq!(decoded.len(), vector.len());
        for (a, b) in vector.iter().zip(decoded.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_empty_vector_roundtrip() {
        let decoded = decode_embedding(&encode_embedding(&[])).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_gzip_legacy_decode() {
        let vector = vec![0.25f32, -0.5, 3.0];
        let payload = encode_embedding_gzip(&vector).unwrap();
        assert!(payload.starts_with(&[0x1f, 0x8b]));
        assert_eq!(decode_embedding(&payload).unwrap(), vector);
    }

    #[test]
    fn test_quantized_legacy_decode() {
        let vector = vec![1.0f32, -1.0, 0.5, 0.0];
        let payload = encode_embedding_quantized(&vector);
        assert!(payload.starts_with(QUANTIZED_MAGIC));

        let decoded = decode_embedding(&payload).unwrap();
        assert_eq!(decoded.len(), vector.len());
        for (original, dequantized) in vector.iter().zip(decoded.iter()) {
            assert!((original - dequantized).abs() < 0.02);
        }
    }

    #[test]
    fn test_quantized_all_zero() {
        let vector = vec![0.0f32; 8];
        let decoded = decode_embedding(&encode_embedding_quantized(&vector)).unwrap();
        assert_eq!(decoded, vector);
    }

    #[test]
    fn test_decode_rejects_misaligned_payload() {
        let result = decode_embedding(&[1, 2, 3]);
        assert!(matches!(result, Err(Error::Embedding(_))));
    }

    #[test]
    fn test_decode_rejects_truncated_quantized_header() {
        let result = decode_embedding(b"EMQ8\x00");
        assert!(matches!(result, Err(Error::Embedding(_))));
    }

    #[test]
    fn test_decode_rejects_corrupt_gzip() {
        let result = decode_embedding(&[0x1f, 0x8b, 0xff, 0xff]);
        assert!(matches!(result, Err(Error::Embedding(_))));
    }
}
