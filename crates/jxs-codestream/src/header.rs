//! Image header section codec

use jxs_bitstream::{BitReader, BitWriter};
use jxs_core::{
    AnimationHeader, BasicInfo, BitDepth, ColorEncoding, ColorProfile, ColorSpace,
    ExtraChannelInfo, ExtraChannelType, JxsError, JxsResult, Orientation, Primaries,
    RenderingIntent, TransferFunction, WhitePoint,
};

/// Everything carried by the image header section.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHeader {
    pub basic: BasicInfo,
    pub color: ColorProfile,
    pub extra: Vec<ExtraChannelInfo>,
}

fn write_f32(writer: &mut BitWriter, value: f32) -> JxsResult<()> {
    writer.write_bits(value.to_bits() as u64, 32)
}

fn read_f32(reader: &mut BitReader) -> JxsResult<f32> {
    Ok(f32::from_bits(reader.read_bits(32)? as u32))
}

fn write_bit_depth(writer: &mut BitWriter, depth: &BitDepth) -> JxsResult<()> {
    writer.write_u32(depth.bits_per_sample, 5)?;
    writer.write_bit(depth.is_float())?;
    if depth.is_float() {
        writer.write_u32(depth.exponent_bits_per_sample, 4)?;
    }
    Ok(())
}

fn read_bit_depth(reader: &mut BitReader) -> JxsResult<BitDepth> {
    let bits = reader.read_u32(5)?;
    if !(1..=32).contains(&bits) {
        return Err(JxsError::InvalidHeader(format!(
            "bits per sample out of range: {}",
            bits
        )));
    }
    if reader.read_bit()? {
        let exp = reader.read_u32(4)?;
        if exp == 0 || exp >= bits {
            return Err(JxsError::InvalidHeader(format!(
                "invalid exponent bits: {}",
                exp
            )));
        }
        Ok(BitDepth::float(bits, exp))
    } else {
        Ok(BitDepth::integer(bits))
    }
}

fn write_name(writer: &mut BitWriter, name: &Option<String>) -> JxsResult<()> {
    writer.write_bit(name.is_some())?;
    if let Some(name) = name {
        let bytes = name.as_bytes();
        writer.write_u32(bytes.len() as u32, 8)?;
        for &b in bytes {
            writer.write_bits(b as u64, 8)?;
        }
    }
    Ok(())
}

fn read_name(reader: &mut BitReader) -> JxsResult<Option<String>> {
    if !reader.read_bit()? {
        return Ok(None);
    }
    let len = reader.read_u32(8)? as usize;
    let mut bytes = vec![0u8; len];
    for b in bytes.iter_mut() {
        *b = reader.read_bits(8)? as u8;
    }
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| JxsError::InvalidHeader("name is not valid UTF-8".to_string()))
}

fn write_extra_channel(writer: &mut BitWriter, info: &ExtraChannelInfo) -> JxsResult<()> {
    writer.write_bits(info.channel_type as u64, 4)?;
    write_bit_depth(writer, &info.bit_depth)?;
    writer.write_bits(info.dim_shift as u64, 3)?;
    if info.channel_type == ExtraChannelType::Alpha {
        writer.write_bit(info.alpha_premultiplied)?;
    }
    if info.channel_type == ExtraChannelType::SpotColor {
        let spot = info.spot_color.unwrap_or([0.0; 4]);
        for component in spot {
            write_f32(writer, component)?;
        }
    }
    write_name(writer, &info.name)
}

fn read_extra_channel(reader: &mut BitReader) -> JxsResult<ExtraChannelInfo> {
    let channel_type = ExtraChannelType::from_u32(reader.read_bits(4)? as u32)?;
    let bit_depth = read_bit_depth(reader)?;
    let dim_shift = reader.read_bits(3)? as u32;
    let alpha_premultiplied = if channel_type == ExtraChannelType::Alpha {
        reader.read_bit()?
    } else {
        false
    };
    let spot_color = if channel_type == ExtraChannelType::SpotColor {
        let mut spot = [0.0f32; 4];
        for component in spot.iter_mut() {
            *component = read_f32(reader)?;
        }
        Some(spot)
    } else {
        None
    };
    let name = read_name(reader)?;

    Ok(ExtraChannelInfo {
        channel_type,
        bit_depth,
        dim_shift,
        alpha_premultiplied,
        spot_color,
        name,
    })
}

fn write_color_encoding(writer: &mut BitWriter, enc: &ColorEncoding) -> JxsResult<()> {
    let space = match enc.color_space {
        ColorSpace::Rgb => 0u64,
        ColorSpace::Gray => 1,
        ColorSpace::Xyb => 2,
        ColorSpace::Unknown => 3,
    };
    writer.write_bits(space, 2)?;

    match enc.white_point {
        WhitePoint::D65 => writer.write_bits(0, 2)?,
        WhitePoint::E => writer.write_bits(1, 2)?,
        WhitePoint::Dci => writer.write_bits(2, 2)?,
        WhitePoint::Custom { wx, wy } => {
            writer.write_bits(3, 2)?;
            write_f32(writer, wx)?;
            write_f32(writer, wy)?;
        }
    }

    match enc.primaries {
        Primaries::Srgb => writer.write_bits(0, 2)?,
        Primaries::Bt2100 => writer.write_bits(1, 2)?,
        Primaries::P3 => writer.write_bits(2, 2)?,
        Primaries::Custom {
            rx,
            ry,
            gx,
            gy,
            bx,
            by,
        } => {
            writer.write_bits(3, 2)?;
            for v in [rx, ry, gx, gy, bx, by] {
                write_f32(writer, v)?;
            }
        }
    }

    let tf = match enc.transfer_function {
        TransferFunction::Bt709 => 0u64,
        TransferFunction::Linear => 1,
        TransferFunction::Srgb => 2,
        TransferFunction::Pq => 3,
        TransferFunction::Dci => 4,
        TransferFunction::Hlg => 5,
        TransferFunction::Gamma(_) => 6,
    };
    writer.write_bits(tf, 3)?;
    if let TransferFunction::Gamma(gamma) = enc.transfer_function {
        write_f32(writer, gamma)?;
    }

    writer.write_bits(enc.rendering_intent as u64, 2)
}

fn read_color_encoding(reader: &mut BitReader) -> JxsResult<ColorEncoding> {
    let color_space = match reader.read_bits(2)? {
        0 => ColorSpace::Rgb,
        1 => ColorSpace::Gray,
        2 => ColorSpace::Xyb,
        _ => ColorSpace::Unknown,
    };

    let white_point = match reader.read_bits(2)? {
        0 => WhitePoint::D65,
        1 => WhitePoint::E,
        2 => WhitePoint::Dci,
        _ => WhitePoint::Custom {
            wx: read_f32(reader)?,
            wy: read_f32(reader)?,
        },
    };

    let primaries = match reader.read_bits(2)? {
        0 => Primaries::Srgb,
        1 => Primaries::Bt2100,
        2 => Primaries::P3,
        _ => Primaries::Custom {
            rx: read_f32(reader)?,
            ry: read_f32(reader)?,
            gx: read_f32(reader)?,
            gy: read_f32(reader)?,
            bx: read_f32(reader)?,
            by: read_f32(reader)?,
        },
    };

    let transfer_function = match reader.read_bits(3)? {
        0 => TransferFunction::Bt709,
        1 => TransferFunction::Linear,
        2 => TransferFunction::Srgb,
        3 => TransferFunction::Pq,
        4 => TransferFunction::Dci,
        5 => TransferFunction::Hlg,
        6 => TransferFunction::Gamma(read_f32(reader)?),
        v => {
            return Err(JxsError::InvalidHeader(format!(
                "invalid transfer function: {}",
                v
            )))
        }
    };

    let rendering_intent = match reader.read_bits(2)? {
        0 => RenderingIntent::Perceptual,
        1 => RenderingIntent::Relative,
        2 => RenderingIntent::Saturation,
        _ => RenderingIntent::Absolute,
    };

    Ok(ColorEncoding {
        color_space,
        white_point,
        primaries,
        transfer_function,
        rendering_intent,
    })
}

/// Serialize the image header section payload.
pub fn encode_image_header(header: &ImageHeader) -> JxsResult<Vec<u8>> {
    let basic = &header.basic;
    if basic.width == 0 || basic.height == 0 {
        return Err(JxsError::InvalidDimensions {
            width: basic.width,
            height: basic.height,
        });
    }
    if basic.num_color_channels != 1 && basic.num_color_channels != 3 {
        return Err(JxsError::InvalidHeader(format!(
            "{} color channels not supported",
            basic.num_color_channels
        )));
    }
    if header.extra.len() != basic.num_extra_channels as usize {
        return Err(JxsError::InvalidHeader(format!(
            "declared {} extra channels but {} described",
            basic.num_extra_channels,
            header.extra.len()
        )));
    }

    let mut writer = BitWriter::new();

    let small = basic.width <= 32 && basic.height <= 32;
    writer.write_bit(small)?;
    if small {
        writer.write_bits((basic.width - 1) as u64, 5)?;
        writer.write_bits((basic.height - 1) as u64, 5)?;
    } else {
        writer.write_u32(basic.width, 9)?;
        writer.write_u32(basic.height, 9)?;
    }

    write_bit_depth(&mut writer, &basic.bit_depth)?;
    writer.write_bit(basic.num_color_channels == 3)?;
    writer.write_u32(basic.num_extra_channels, 4)?;
    writer.write_bit(basic.alpha_premultiplied)?;
    writer.write_bits((basic.orientation as u64) - 1, 3)?;

    writer.write_bit(basic.intrinsic_size.is_some())?;
    if let Some((w, h)) = basic.intrinsic_size {
        writer.write_u32(w, 9)?;
        writer.write_u32(h, 9)?;
    }

    writer.write_bit(basic.preview_size.is_some())?;
    if let Some((w, h)) = basic.preview_size {
        writer.write_u32(w, 8)?;
        writer.write_u32(h, 8)?;
    }

    writer.write_bit(basic.animation.is_some())?;
    if let Some(anim) = &basic.animation {
        writer.write_bits(anim.tps_numerator as u64, 32)?;
        writer.write_bits(anim.tps_denominator as u64, 32)?;
        writer.write_u32(anim.num_loops, 8)?;
        writer.write_bit(anim.have_timecodes)?;
    }

    writer.write_bit(basic.uses_original_profile)?;

    for info in &header.extra {
        write_extra_channel(&mut writer, info)?;
    }

    // Color profile last: an ICC blob is appended byte-aligned.
    match &header.color {
        ColorProfile::Encoding(enc) => {
            writer.write_bit(false)?;
            write_color_encoding(&mut writer, enc)?;
        }
        ColorProfile::Icc(data) => {
            writer.write_bit(true)?;
            writer.write_u32(data.len() as u32, 16)?;
            writer.align_to_byte()?;
            writer.write_bytes(data)?;
        }
    }

    Ok(writer.into_bytes())
}

/// Parse the image header section payload.
pub fn decode_image_header(payload: &[u8]) -> JxsResult<ImageHeader> {
    let mut reader = BitReader::new(payload);

    let small = reader.read_bit()?;
    let (width, height) = if small {
        (
            reader.read_bits(5)? as u32 + 1,
            reader.read_bits(5)? as u32 + 1,
        )
    } else {
        (reader.read_u32(9)?, reader.read_u32(9)?)
    };
    if width == 0 || height == 0 {
        return Err(JxsError::InvalidDimensions { width, height });
    }

    let bit_depth = read_bit_depth(&mut reader)?;
    let num_color_channels = if reader.read_bit()? { 3 } else { 1 };
    let num_extra_channels = reader.read_u32(4)?;
    let alpha_premultiplied = reader.read_bit()?;
    let orientation = Orientation::from_u8(reader.read_bits(3)? as u8 + 1)
        .ok_or_else(|| JxsError::InvalidHeader("invalid orientation".to_string()))?;

    let intrinsic_size = if reader.read_bit()? {
        Some((reader.read_u32(9)?, reader.read_u32(9)?))
    } else {
        None
    };

    let preview_size = if reader.read_bit()? {
        let (w, h) = (reader.read_u32(8)?, reader.read_u32(8)?);
        if w == 0 || h == 0 {
            return Err(JxsError::InvalidHeader("empty preview".to_string()));
        }
        Some((w, h))
    } else {
        None
    };

    let animation = if reader.read_bit()? {
        Some(AnimationHeader {
            tps_numerator: reader.read_bits(32)? as u32,
            tps_denominator: reader.read_bits(32)? as u32,
            num_loops: reader.read_u32(8)?,
            have_timecodes: reader.read_bit()?,
        })
    } else {
        None
    };

    let uses_original_profile = reader.read_bit()?;

    let mut extra = Vec::with_capacity(num_extra_channels as usize);
    for _ in 0..num_extra_channels {
        extra.push(read_extra_channel(&mut reader)?);
    }

    let color = if reader.read_bit()? {
        let len = reader.read_u32(16)? as usize;
        reader.align_to_byte()?;
        let rest = reader.remaining_bytes();
        if rest.len() < len {
            return Err(JxsError::InvalidHeader(
                "truncated ICC profile".to_string(),
            ));
        }
        ColorProfile::Icc(rest[..len].to_vec())
    } else {
        ColorProfile::Encoding(read_color_encoding(&mut reader)?)
    };

    Ok(ImageHeader {
        basic: BasicInfo {
            width,
            height,
            bit_depth,
            num_color_channels,
            num_extra_channels,
            alpha_premultiplied,
            orientation,
            intrinsic_size,
            preview_size,
            animation,
            uses_original_profile,
        },
        color,
        extra,
    })
}
