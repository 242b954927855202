//! Band (row-group) payload codec
//!
//! A frame's samples are split into horizontal bands so the decoder can fill
//! the output buffer progressively and `flush_image` has something to show
//! before the last byte arrives. Each plane within a band is delta-coded
//! independently with band-local prediction, so a band never depends on
//! earlier bands and channels can be coded in parallel.

use byteorder::{ByteOrder, LittleEndian};
use jxs_bitstream::{BitReader, BitWriter};
use jxs_core::{JxsError, JxsResult};
use rayon::prelude::*;

use crate::pixels::Plane;

/// Rows per band
pub const BAND_ROWS: usize = 64;

/// Number of bands needed to cover `height` rows.
pub fn band_count(height: u32) -> u32 {
    (height as u32).div_ceil(BAND_ROWS as u32).max(1)
}

/// Result of decoding one band section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBand {
    pub band_index: u32,
    pub rows: std::ops::Range<usize>,
}

fn quantize(bits: u32, quant: u32, is_float: bool) -> u32 {
    if quant <= 1 || is_float {
        bits
    } else {
        (bits + quant / 2) / quant
    }
}

fn dequantize(stored: u32, quant: u32, is_float: bool) -> JxsResult<u32> {
    if quant <= 1 || is_float {
        Ok(stored)
    } else {
        (stored as u64)
            .checked_mul(quant as u64)
            .filter(|v| *v <= u32::MAX as u64)
            .map(|v| v as u32)
            .ok_or_else(|| JxsError::InvalidBitstream("dequantized sample overflow".to_string()))
    }
}

/// Delta-code one plane's samples for the given rows.
///
/// Differential coding of the quantized values: each value is predicted by
/// its predecessor within the band, and the signed difference is written as
/// a sign bit, a 6-bit magnitude length, and the magnitude bits.
fn encode_plane_rows(
    plane: &Plane,
    width: usize,
    rows: &std::ops::Range<usize>,
    quant: u32,
) -> JxsResult<Vec<u8>> {
    let is_float = plane.data_type.is_float();
    let mut writer = BitWriter::new();
    let mut prev: i64 = 0;

    for y in rows.clone() {
        for x in 0..width {
            let bits = plane.samples[y * width + x];
            let value = quantize(bits, quant, is_float) as i64;
            let diff = value - prev;
            prev = value;

            writer.write_bit(diff < 0)?;
            let magnitude = diff.unsigned_abs();
            let bits_needed = if magnitude == 0 {
                0
            } else {
                64 - magnitude.leading_zeros() as usize
            };
            writer.write_bits(bits_needed as u64, 6)?;
            if bits_needed > 0 {
                writer.write_bits(magnitude, bits_needed)?;
            }
        }
    }

    Ok(writer.into_bytes())
}

fn decode_plane_rows(
    blob: &[u8],
    plane: &mut Plane,
    width: usize,
    rows: &std::ops::Range<usize>,
    quant: u32,
) -> JxsResult<()> {
    let is_float = plane.data_type.is_float();
    let mut reader = BitReader::new(blob);
    let mut prev: i64 = 0;

    for y in rows.clone() {
        for x in 0..width {
            let negative = reader.read_bit()?;
            let bits_needed = reader.read_bits(6)? as usize;
            if bits_needed > 33 {
                return Err(JxsError::InvalidBitstream(
                    "oversized sample delta".to_string(),
                ));
            }
            let magnitude = if bits_needed > 0 {
                reader.read_bits(bits_needed)? as i64
            } else {
                0
            };
            let diff = if negative { -magnitude } else { magnitude };
            let value = prev + diff;
            prev = value;

            if !(0..=u32::MAX as i64).contains(&value) {
                return Err(JxsError::InvalidBitstream(
                    "sample value out of range".to_string(),
                ));
            }
            plane.samples[y * width + x] = dequantize(value as u32, quant, is_float)?;
        }
    }

    Ok(())
}

/// Serialize one band section payload covering `rows` of every plane.
pub fn encode_band(
    band_index: u32,
    rows: std::ops::Range<usize>,
    width: usize,
    planes: &[Plane],
    quant: u32,
) -> JxsResult<Vec<u8>> {
    let blobs: Vec<Vec<u8>> = planes
        .par_iter()
        .map(|plane| encode_plane_rows(plane, width, &rows, quant))
        .collect::<JxsResult<_>>()?;

    let mut out = Vec::new();
    let mut scratch = [0u8; 4];
    LittleEndian::write_u32(&mut scratch, band_index);
    out.extend_from_slice(&scratch);
    LittleEndian::write_u32(&mut scratch, rows.len() as u32);
    out.extend_from_slice(&scratch);
    for blob in &blobs {
        LittleEndian::write_u32(&mut scratch, blob.len() as u32);
        out.extend_from_slice(&scratch);
        out.extend_from_slice(blob);
    }
    Ok(out)
}

/// Decode one band section payload into the frame's planes.
pub fn decode_band(
    payload: &[u8],
    width: usize,
    frame_height: usize,
    planes: &mut [Plane],
    quant: u32,
) -> JxsResult<DecodedBand> {
    if payload.len() < 8 {
        return Err(JxsError::InvalidBitstream("truncated band".to_string()));
    }
    let band_index = LittleEndian::read_u32(&payload[0..4]);
    let num_rows = LittleEndian::read_u32(&payload[4..8]) as usize;

    let row_start = band_index as usize * BAND_ROWS;
    let rows = row_start..row_start + num_rows;
    if num_rows == 0 || num_rows > BAND_ROWS || rows.end > frame_height {
        return Err(JxsError::InvalidBitstream(format!(
            "band {} covers invalid rows {}..{}",
            band_index, rows.start, rows.end
        )));
    }

    // Slice out each plane's blob, then decode the planes in parallel.
    let mut blobs = Vec::with_capacity(planes.len());
    let mut offset = 8usize;
    for _ in 0..planes.len() {
        if payload.len() < offset + 4 {
            return Err(JxsError::InvalidBitstream("truncated band".to_string()));
        }
        let len = LittleEndian::read_u32(&payload[offset..offset + 4]) as usize;
        offset += 4;
        if payload.len() < offset + len {
            return Err(JxsError::InvalidBitstream("truncated band".to_string()));
        }
        blobs.push(&payload[offset..offset + len]);
        offset += len;
    }
    if offset != payload.len() {
        return Err(JxsError::InvalidBitstream(
            "trailing bytes after band planes".to_string(),
        ));
    }

    planes
        .par_iter_mut()
        .zip(blobs.par_iter())
        .try_for_each(|(plane, blob)| decode_plane_rows(blob, plane, width, &rows, quant))?;

    Ok(DecodedBand { band_index, rows })
}
