//! Frame header section codec

use jxs_bitstream::{BitReader, BitWriter};
use jxs_core::{
    BlendInfo, BlendMode, FrameHeader, FrameRect, FrameType, JxsError, JxsResult,
};

/// What kind of payload follows a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePayloadKind {
    /// Band sections carrying pixel planes
    Pixels,
    /// One opaque embedded-JPEG section
    Jpeg,
}

/// Decoding parameters carried alongside the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    pub kind: FramePayloadKind,
    /// Quantization step applied to integer samples; 1 = lossless
    pub quant_step: u32,
    /// Number of band sections that make up the frame
    pub band_count: u32,
}

fn zigzag(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

fn unzigzag(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Serialize a frame header section payload.
pub fn encode_frame_section(header: &FrameHeader, meta: &FrameMeta) -> JxsResult<Vec<u8>> {
    if meta.quant_step == 0 {
        return Err(JxsError::InvalidParameter(
            "quantization step must be at least 1".to_string(),
        ));
    }
    if header.save_as_reference > 3 {
        return Err(JxsError::InvalidParameter(format!(
            "reference slot {} out of range",
            header.save_as_reference
        )));
    }

    let mut writer = BitWriter::new();

    writer.write_bit(header.frame_type == FrameType::ReferenceOnly)?;
    writer.write_bit(meta.kind == FramePayloadKind::Jpeg)?;
    writer.write_u32(header.duration, 8)?;

    writer.write_bit(header.timecode.is_some())?;
    if let Some(tc) = header.timecode {
        writer.write_bits(tc as u64, 32)?;
    }

    writer.write_bit(header.is_last)?;

    writer.write_bit(header.name.is_some())?;
    if let Some(name) = &header.name {
        let bytes = name.as_bytes();
        writer.write_u32(bytes.len() as u32, 8)?;
        for &b in bytes {
            writer.write_bits(b as u64, 8)?;
        }
    }

    writer.write_bit(header.crop.is_some())?;
    if let Some(rect) = &header.crop {
        writer.write_u32(zigzag(rect.x0), 9)?;
        writer.write_u32(zigzag(rect.y0), 9)?;
        writer.write_u32(rect.width, 9)?;
        writer.write_u32(rect.height, 9)?;
    }

    writer.write_bits(header.blend.mode as u64, 2)?;
    writer.write_bits(header.blend.source as u64, 2)?;
    writer.write_u32(header.blend.alpha_channel, 2)?;
    writer.write_bit(header.blend.clamp)?;
    writer.write_bits(header.save_as_reference as u64, 2)?;

    if meta.kind == FramePayloadKind::Pixels {
        writer.write_u32(meta.quant_step, 4)?;
        writer.write_u32(meta.band_count, 8)?;
    }

    Ok(writer.into_bytes())
}

/// Parse a frame header section payload.
pub fn decode_frame_section(payload: &[u8]) -> JxsResult<(FrameHeader, FrameMeta)> {
    let mut reader = BitReader::new(payload);

    let frame_type = if reader.read_bit()? {
        FrameType::ReferenceOnly
    } else {
        FrameType::Regular
    };
    let kind = if reader.read_bit()? {
        FramePayloadKind::Jpeg
    } else {
        FramePayloadKind::Pixels
    };
    let duration = reader.read_u32(8)?;

    let timecode = if reader.read_bit()? {
        Some(reader.read_bits(32)? as u32)
    } else {
        None
    };

    let is_last = reader.read_bit()?;

    let name = if reader.read_bit()? {
        let len = reader.read_u32(8)? as usize;
        let mut bytes = vec![0u8; len];
        for b in bytes.iter_mut() {
            *b = reader.read_bits(8)? as u8;
        }
        Some(
            String::from_utf8(bytes)
                .map_err(|_| JxsError::InvalidHeader("frame name is not UTF-8".to_string()))?,
        )
    } else {
        None
    };

    let crop = if reader.read_bit()? {
        let x0 = unzigzag(reader.read_u32(9)?);
        let y0 = unzigzag(reader.read_u32(9)?);
        let width = reader.read_u32(9)?;
        let height = reader.read_u32(9)?;
        if width == 0 || height == 0 {
            return Err(JxsError::InvalidHeader("empty frame crop".to_string()));
        }
        Some(FrameRect {
            x0,
            y0,
            width,
            height,
        })
    } else {
        None
    };

    let mode = BlendMode::from_u8(reader.read_bits(2)? as u8)
        .ok_or_else(|| JxsError::InvalidHeader("invalid blend mode".to_string()))?;
    let blend = BlendInfo {
        mode,
        source: reader.read_bits(2)? as u8,
        alpha_channel: reader.read_u32(2)?,
        clamp: reader.read_bit()?,
    };
    let save_as_reference = reader.read_bits(2)? as u8;

    let (quant_step, band_count) = if kind == FramePayloadKind::Pixels {
        let q = reader.read_u32(4)?;
        if q == 0 {
            return Err(JxsError::InvalidHeader(
                "zero quantization step".to_string(),
            ));
        }
        (q, reader.read_u32(8)?)
    } else {
        (1, 0)
    };

    Ok((
        FrameHeader {
            frame_type,
            duration,
            timecode,
            is_last,
            crop,
            blend,
            save_as_reference,
            name,
        },
        FrameMeta {
            kind,
            quant_step,
            band_count,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag() {
        for v in [0, 1, -1, 63, -64, i32::MAX, i32::MIN] {
            assert_eq!(unzigzag(zigzag(v)), v);
        }
    }

    #[test]
    fn test_minimal_frame_roundtrip() {
        let header = FrameHeader {
            is_last: true,
            ..Default::default()
        };
        let meta = FrameMeta {
            kind: FramePayloadKind::Pixels,
            quant_step: 1,
            band_count: 1,
        };
        let payload = encode_frame_section(&header, &meta).unwrap();
        let (decoded, decoded_meta) = decode_frame_section(&payload).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded_meta, meta);
    }

    #[test]
    fn test_animated_frame_roundtrip() {
        let header = FrameHeader {
            frame_type: FrameType::ReferenceOnly,
            duration: 33,
            timecode: Some(123456),
            is_last: false,
            crop: Some(FrameRect {
                x0: -8,
                y0: 4,
                width: 16,
                height: 32,
            }),
            blend: BlendInfo {
                mode: BlendMode::Blend,
                source: 2,
                alpha_channel: 0,
                clamp: true,
            },
            save_as_reference: 1,
            name: Some("overlay".to_string()),
        };
        let meta = FrameMeta {
            kind: FramePayloadKind::Pixels,
            quant_step: 5,
            band_count: 3,
        };
        let payload = encode_frame_section(&header, &meta).unwrap();
        assert_eq!(decode_frame_section(&payload).unwrap(), (header, meta));
    }

    #[test]
    fn test_jpeg_frame_carries_no_band_info() {
        let header = FrameHeader {
            is_last: true,
            ..Default::default()
        };
        let meta = FrameMeta {
            kind: FramePayloadKind::Jpeg,
            quant_step: 1,
            band_count: 0,
        };
        let payload = encode_frame_section(&header, &meta).unwrap();
        let (_, decoded_meta) = decode_frame_section(&payload).unwrap();
        assert_eq!(decoded_meta.kind, FramePayloadKind::Jpeg);
        assert_eq!(decoded_meta.quant_step, 1);
    }
}
