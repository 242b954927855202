//! Section-framed reference codestream
//!
//! After the two-byte codestream signature, the stream is a sequence of
//! byte-aligned sections: a one-byte tag, a little-endian u32 payload
//! length, and the payload. Length framing is what makes the decoder
//! resumable: a section is parsed only once all of its bytes are buffered,
//! and a partial section is a `NeedMoreInput` pause rather than an error.

pub mod band;
pub mod frame;
pub mod header;
pub mod pixels;

use byteorder::{ByteOrder, LittleEndian};
use jxs_core::{JxsError, JxsResult};

pub use band::{band_count, decode_band, encode_band, DecodedBand, BAND_ROWS};
pub use frame::{decode_frame_section, encode_frame_section, FrameMeta, FramePayloadKind};
pub use header::{decode_image_header, encode_image_header, ImageHeader};
pub use pixels::{deinterleave, interleave_rows, Plane};

/// Section tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionTag {
    ImageHeader = 0x01,
    FrameHeader = 0x02,
    Band = 0x03,
    Preview = 0x04,
    JpegData = 0x05,
    End = 0x0F,
}

impl SectionTag {
    pub fn from_u8(value: u8) -> JxsResult<Self> {
        match value {
            0x01 => Ok(SectionTag::ImageHeader),
            0x02 => Ok(SectionTag::FrameHeader),
            0x03 => Ok(SectionTag::Band),
            0x04 => Ok(SectionTag::Preview),
            0x05 => Ok(SectionTag::JpegData),
            0x0F => Ok(SectionTag::End),
            _ => Err(JxsError::InvalidBitstream(format!(
                "unknown section tag 0x{:02X}",
                value
            ))),
        }
    }
}

/// Section header length: tag byte plus u32 payload length.
pub const SECTION_HEADER_LEN: usize = 5;

/// Append a framed section to `out`.
pub fn write_section(out: &mut Vec<u8>, tag: SectionTag, payload: &[u8]) {
    out.push(tag as u8);
    let mut len = [0u8; 4];
    LittleEndian::write_u32(&mut len, payload.len() as u32);
    out.extend_from_slice(&len);
    out.extend_from_slice(payload);
}

/// Try to read one framed section from the start of `data`.
///
/// Returns `Ok(None)` while the section is incomplete; otherwise the tag,
/// the payload slice, and the total number of bytes consumed.
pub fn read_section(data: &[u8]) -> JxsResult<Option<(SectionTag, &[u8], usize)>> {
    if data.len() < SECTION_HEADER_LEN {
        return Ok(None);
    }
    let tag = SectionTag::from_u8(data[0])?;
    let len = LittleEndian::read_u32(&data[1..5]) as usize;
    let total = SECTION_HEADER_LEN + len;
    if data.len() < total {
        return Ok(None);
    }
    Ok(Some((tag, &data[SECTION_HEADER_LEN..total], total)))
}
