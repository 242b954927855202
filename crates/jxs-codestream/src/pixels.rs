//! Planar sample storage and interleaved-buffer conversion
//!
//! The codec works on per-channel planes of raw sample bits; caller buffers
//! are interleaved, row-major, and described by a `PixelFormat`. Conversion
//! honors the declared byte order and row alignment.

use jxs_core::{DataType, Endianness, JxsError, JxsResult, PixelFormat, Sample};

/// One channel's samples as raw storage bits, row-major.
#[derive(Debug, Clone)]
pub struct Plane {
    pub data_type: DataType,
    pub samples: Vec<u32>,
}

impl Plane {
    pub fn new(data_type: DataType, len: usize) -> Self {
        Self {
            data_type,
            samples: vec![0; len],
        }
    }
}

// F16 samples travel as raw u16 bit patterns.
fn read_sample(data: &[u8], offset: usize, ty: DataType, endianness: Endianness) -> u32 {
    let bytes = &data[offset..];
    match ty {
        DataType::U8 => u8::load(bytes, endianness).to_bits(),
        DataType::U16 | DataType::F16 => u16::load(bytes, endianness).to_bits(),
        DataType::F32 => Sample::to_bits(f32::load(bytes, endianness)),
    }
}

fn write_sample(data: &mut [u8], offset: usize, ty: DataType, endianness: Endianness, bits: u32) {
    let out = &mut data[offset..];
    match ty {
        DataType::U8 => u8::from_bits(bits).store(out, endianness),
        DataType::U16 | DataType::F16 => u16::from_bits(bits).store(out, endianness),
        DataType::F32 => <f32 as Sample>::from_bits(bits).store(out, endianness),
    }
}

/// Split an interleaved caller buffer into one plane per declared channel.
pub fn deinterleave(
    format: &PixelFormat,
    data: &[u8],
    width: u32,
    height: u32,
) -> JxsResult<Vec<Plane>> {
    format.validate_buffer(data.len(), width, height)?;

    let channels = format.num_channels as usize;
    let stride = format.row_stride(width);
    let bpp = format.bytes_per_pixel();
    let bps = format.data_type.bytes_per_sample();
    let pixel_count = width as usize * height as usize;

    let mut planes: Vec<Plane> = (0..channels)
        .map(|_| Plane::new(format.data_type, pixel_count))
        .collect();

    for y in 0..height as usize {
        let row = &data[y * stride..];
        for x in 0..width as usize {
            let base = x * bpp;
            for (c, plane) in planes.iter_mut().enumerate() {
                plane.samples[y * width as usize + x] =
                    read_sample(row, base + c * bps, format.data_type, format.endianness);
            }
        }
    }

    Ok(planes)
}

/// Interleave plane rows `rows` into the caller's output buffer.
///
/// `planes` supplies one plane per output channel, already in the caller's
/// channel order. Only the given row range is touched, which is what lets
/// band decoding fill the buffer progressively.
pub fn interleave_rows(
    format: &PixelFormat,
    planes: &[&Plane],
    width: u32,
    rows: std::ops::Range<usize>,
    out: &mut [u8],
) -> JxsResult<()> {
    if planes.len() != format.num_channels as usize {
        return Err(JxsError::InvalidParameter(format!(
            "expected {} planes, got {}",
            format.num_channels,
            planes.len()
        )));
    }

    let stride = format.row_stride(width);
    let bpp = format.bytes_per_pixel();
    let bps = format.data_type.bytes_per_sample();

    for y in rows {
        let row = &mut out[y * stride..(y + 1) * stride];
        for x in 0..width as usize {
            let base = x * bpp;
            for (c, plane) in planes.iter().enumerate() {
                write_sample(
                    row,
                    base + c * bps,
                    format.data_type,
                    format.endianness,
                    plane.samples[y * width as usize + x],
                );
            }
        }
    }

    Ok(())
}
