//! Box headers and serialization

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use jxs_core::{JxsError, JxsResult};

/// Box types known to the container layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxType {
    /// File type box
    FileType,
    /// Codestream level box
    Level,
    /// Complete codestream box
    Codestream,
    /// Partial codestream box (sequenced)
    PartialCodestream,
    /// Frame index box
    FrameIndex,
    /// JPEG reconstruction data
    JpegReconstruction,
    /// Exif metadata
    Exif,
    /// XML/XMP metadata
    Xml,
    /// JUMBF metadata (the only box type allowed to nest)
    Jumbf,
    /// Brotli-compressed wrapper around another box
    Brotli,
    /// Application-specific or unrecognized box
    Unknown([u8; 4]),
}

impl BoxType {
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Self {
        match fourcc {
            b"ftyp" => BoxType::FileType,
            b"jxll" => BoxType::Level,
            b"jxlc" => BoxType::Codestream,
            b"jxlp" => BoxType::PartialCodestream,
            b"jxli" => BoxType::FrameIndex,
            b"jbrd" => BoxType::JpegReconstruction,
            b"Exif" => BoxType::Exif,
            b"xml " => BoxType::Xml,
            b"jumb" => BoxType::Jumbf,
            b"brob" => BoxType::Brotli,
            _ => BoxType::Unknown(*fourcc),
        }
    }

    pub fn to_fourcc(&self) -> [u8; 4] {
        match self {
            BoxType::FileType => *b"ftyp",
            BoxType::Level => *b"jxll",
            BoxType::Codestream => *b"jxlc",
            BoxType::PartialCodestream => *b"jxlp",
            BoxType::FrameIndex => *b"jxli",
            BoxType::JpegReconstruction => *b"jbrd",
            BoxType::Exif => *b"Exif",
            BoxType::Xml => *b"xml ",
            BoxType::Jumbf => *b"jumb",
            BoxType::Brotli => *b"brob",
            BoxType::Unknown(fourcc) => *fourcc,
        }
    }

    /// Whether the box carries codestream bytes rather than metadata.
    pub fn is_codestream(&self) -> bool {
        matches!(self, BoxType::Codestream | BoxType::PartialCodestream)
    }
}

/// Parsed box header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: BoxType,
    /// Payload length in bytes, excluding the header
    pub payload_len: u64,
    /// Header length: 8, or 16 with an extended size field
    pub header_len: usize,
}

/// Try to parse a box header from the start of `data`.
///
/// Returns `Ok(None)` when more bytes are needed. Boxes with size 0
/// (extend-to-end-of-file) are rejected: the incremental decoder has no
/// end-of-input signal to terminate them against.
pub fn read_box_header(data: &[u8]) -> JxsResult<Option<BoxHeader>> {
    if data.len() < 8 {
        return Ok(None);
    }

    let size = BigEndian::read_u32(&data[0..4]) as u64;
    let mut fourcc = [0u8; 4];
    fourcc.copy_from_slice(&data[4..8]);
    let box_type = BoxType::from_fourcc(&fourcc);

    let (total, header_len) = if size == 1 {
        if data.len() < 16 {
            return Ok(None);
        }
        (BigEndian::read_u64(&data[8..16]), 16usize)
    } else {
        (size, 8usize)
    };

    if total == 0 {
        return Err(JxsError::UnsupportedFeature(
            "boxes extending to end of file".to_string(),
        ));
    }
    if total < header_len as u64 {
        return Err(JxsError::InvalidBitstream(format!(
            "box size {} smaller than its header",
            total
        )));
    }

    Ok(Some(BoxHeader {
        box_type,
        payload_len: total - header_len as u64,
        header_len,
    }))
}

/// Append a complete box (header plus payload) to `out`.
pub fn write_box(out: &mut Vec<u8>, box_type: BoxType, payload: &[u8]) -> JxsResult<()> {
    let total = 8u64 + payload.len() as u64;
    if total <= u32::MAX as u64 {
        out.write_u32::<BigEndian>(total as u32)?;
        out.extend_from_slice(&box_type.to_fourcc());
    } else {
        out.write_u32::<BigEndian>(1)?;
        out.extend_from_slice(&box_type.to_fourcc());
        out.write_u64::<BigEndian>(total + 8)?;
    }
    out.extend_from_slice(payload);
    Ok(())
}

/// Brand carried by the `ftyp` box
pub const BRAND_JXL: [u8; 4] = *b"jxl ";

/// Build the `ftyp` payload for a JPEG XL container.
pub fn file_type_payload() -> Vec<u8> {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&BRAND_JXL);
    data.extend_from_slice(&0u32.to_be_bytes()); // minor version
    data.extend_from_slice(&BRAND_JXL); // compatible brands
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_roundtrip() {
        for ty in [
            BoxType::FileType,
            BoxType::Level,
            BoxType::Codestream,
            BoxType::PartialCodestream,
            BoxType::FrameIndex,
            BoxType::JpegReconstruction,
            BoxType::Exif,
            BoxType::Xml,
            BoxType::Jumbf,
            BoxType::Brotli,
            BoxType::Unknown(*b"abcd"),
        ] {
            assert_eq!(BoxType::from_fourcc(&ty.to_fourcc()), ty);
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let mut out = Vec::new();
        write_box(&mut out, BoxType::Exif, &[1, 2, 3, 4, 5]).unwrap();

        let header = read_box_header(&out).unwrap().unwrap();
        assert_eq!(header.box_type, BoxType::Exif);
        assert_eq!(header.payload_len, 5);
        assert_eq!(header.header_len, 8);
        assert_eq!(&out[header.header_len..], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_incomplete_header() {
        assert_eq!(read_box_header(&[0, 0, 0]).unwrap(), None);
    }

    #[test]
    fn test_eof_box_rejected() {
        let mut data = vec![0, 0, 0, 0];
        data.extend_from_slice(b"jxlc");
        assert!(read_box_header(&data).is_err());
    }

    #[test]
    fn test_ftyp_payload() {
        let payload = file_type_payload();
        assert_eq!(&payload[0..4], b"jxl ");
        assert_eq!(&payload[8..12], b"jxl ");
    }
}
