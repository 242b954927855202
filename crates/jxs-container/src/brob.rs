//! Brotli-compressed box payloads
//!
//! A `brob` box wraps another box: its payload is the wrapped box's 4-byte
//! type followed by the Brotli-compressed contents. `brob` may not wrap
//! another `brob` or any codestream-carrying box type.

use std::io::{Read, Write};

use jxs_core::{JxsError, JxsResult};

use crate::boxes::BoxType;

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 4;
const BROTLI_LGWIN: u32 = 22;

/// Build a `brob` payload wrapping `contents` as a box of type `inner`.
pub fn compress_box_payload(inner: BoxType, contents: &[u8]) -> JxsResult<Vec<u8>> {
    if inner.is_codestream() || inner == BoxType::Brotli {
        return Err(JxsError::InvalidParameter(format!(
            "box type {:?} cannot be brob-compressed",
            inner
        )));
    }

    let mut payload = Vec::with_capacity(4 + contents.len() / 2);
    payload.extend_from_slice(&inner.to_fourcc());
    {
        let mut writer = brotli::CompressorWriter::new(
            &mut payload,
            BROTLI_BUFFER_SIZE,
            BROTLI_QUALITY,
            BROTLI_LGWIN,
        );
        writer.write_all(contents)?;
    }
    Ok(payload)
}

/// Unwrap a `brob` payload into the inner box type and raw contents.
pub fn decompress_box_payload(payload: &[u8]) -> JxsResult<(BoxType, Vec<u8>)> {
    if payload.len() < 4 {
        return Err(JxsError::InvalidBitstream(
            "brob payload shorter than inner box type".to_string(),
        ));
    }
    let mut fourcc = [0u8; 4];
    fourcc.copy_from_slice(&payload[0..4]);
    let inner = BoxType::from_fourcc(&fourcc);
    if inner.is_codestream() || inner == BoxType::Brotli {
        return Err(JxsError::InvalidBitstream(format!(
            "brob wraps forbidden box type {:?}",
            inner
        )));
    }

    let mut contents = Vec::new();
    let mut reader = brotli::Decompressor::new(&payload[4..], BROTLI_BUFFER_SIZE);
    reader
        .read_to_end(&mut contents)
        .map_err(|_| JxsError::InvalidBitstream("corrupt brob payload".to_string()))?;
    Ok((inner, contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brob_roundtrip() {
        let contents: Vec<u8> = b"<x:xmpmeta>".iter().cycle().take(500).copied().collect();
        let payload = compress_box_payload(BoxType::Xml, &contents).unwrap();
        assert_eq!(&payload[0..4], b"xml ");
        // Repetitive data should actually shrink
        assert!(payload.len() < contents.len());

        let (inner, decoded) = decompress_box_payload(&payload).unwrap();
        assert_eq!(inner, BoxType::Xml);
        assert_eq!(decoded, contents);
    }

    #[test]
    fn test_brob_forbidden_types() {
        assert!(compress_box_payload(BoxType::Codestream, &[]).is_err());
        assert!(compress_box_payload(BoxType::Brotli, &[]).is_err());
    }

    #[test]
    fn test_brob_corrupt_payload() {
        assert!(decompress_box_payload(&[0, 1]).is_err());
        let mut payload = b"Exif".to_vec();
        payload.extend_from_slice(&[0xFF; 16]);
        assert!(decompress_box_payload(&payload).is_err());
    }
}
