//! Bitstream writer producing an in-memory payload

use jxs_core::{JxsError, JxsResult};

/// A bitstream writer for assembling section payloads
pub struct BitWriter {
    out: Vec<u8>,
    buffer: u64,
    bits_in_buffer: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            buffer: 0,
            bits_in_buffer: 0,
        }
    }

    /// Write up to 64 bits to the stream
    pub fn write_bits(&mut self, value: u64, num_bits: usize) -> JxsResult<()> {
        if num_bits > 64 {
            return Err(JxsError::InvalidParameter(
                "Cannot write more than 64 bits at once".to_string(),
            ));
        }

        let mask = if num_bits == 64 {
            u64::MAX
        } else {
            (1u64 << num_bits) - 1
        };
        self.buffer |= (value & mask) << self.bits_in_buffer;
        self.bits_in_buffer += num_bits;

        while self.bits_in_buffer >= 8 {
            self.out.push((self.buffer & 0xFF) as u8);
            self.buffer >>= 8;
            self.bits_in_buffer -= 8;
        }

        Ok(())
    }

    /// Write a single bit
    pub fn write_bit(&mut self, value: bool) -> JxsResult<()> {
        self.write_bits(value as u64, 1)
    }

    /// Write a variable-length integer; mirror of `BitReader::read_u32`.
    pub fn write_u32(&mut self, value: u32, selector: u32) -> JxsResult<()> {
        let max_direct = (1u64 << selector) - 1;
        if (value as u64) < max_direct {
            self.write_bits(value as u64, selector as usize)
        } else {
            self.write_bits(max_direct, selector as usize)?;
            let extra = value as u64 - max_direct;
            let extra_bits = if extra == 0 {
                0
            } else {
                64 - extra.leading_zeros() as usize
            };
            self.write_bits(extra_bits as u64, 6)?;
            self.write_bits(extra, extra_bits)
        }
    }

    /// Pad with zero bits to the next byte boundary
    pub fn align_to_byte(&mut self) -> JxsResult<()> {
        let bits_to_write = (8 - (self.bits_in_buffer % 8)) % 8;
        if bits_to_write > 0 {
            self.write_bits(0, bits_to_write)?;
        }
        Ok(())
    }

    /// Append raw bytes. The writer must be on a byte boundary.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> JxsResult<()> {
        if self.bits_in_buffer != 0 {
            return Err(JxsError::InvalidParameter(
                "write_bytes requires byte alignment".to_string(),
            ));
        }
        self.out.extend_from_slice(bytes);
        Ok(())
    }

    /// Flush any partial byte and return the assembled payload.
    pub fn into_bytes(mut self) -> Vec<u8> {
        if self.bits_in_buffer > 0 {
            self.out.push((self.buffer & 0xFF) as u8);
        }
        self.out
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BitReader;

    #[test]
    fn test_write_bits() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b1010, 4).unwrap();
        writer.write_bits(0b1010, 4).unwrap();
        writer.write_bits(0b11001100, 8).unwrap();

        assert_eq!(writer.into_bytes(), vec![0b10101010, 0b11001100]);
    }

    #[test]
    fn test_varint_roundtrip() {
        let values = [0u32, 1, 7, 8, 255, 256, 65535, 1 << 20, u32::MAX];
        for selector in [2u32, 4, 8, 9] {
            let mut writer = BitWriter::new();
            for &v in &values {
                writer.write_u32(v, selector).unwrap();
            }
            let bytes = writer.into_bytes();
            let mut reader = BitReader::new(&bytes);
            for &v in &values {
                assert_eq!(reader.read_u32(selector).unwrap(), v, "selector {selector}");
            }
        }
    }

    #[test]
    fn test_align_and_raw_bytes() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3).unwrap();
        writer.align_to_byte().unwrap();
        writer.write_bytes(&[0xAB, 0xCD]).unwrap();
        let bytes = writer.into_bytes();
        assert_eq!(bytes, vec![0b00000101, 0xAB, 0xCD]);

        let mut reader = BitReader::new(&bytes);
        reader.read_bits(3).unwrap();
        reader.align_to_byte().unwrap();
        assert_eq!(reader.remaining_bytes(), &[0xAB, 0xCD]);
    }
}
