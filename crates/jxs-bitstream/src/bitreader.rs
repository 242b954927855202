//! Bitstream reader over a byte slice

use jxs_core::{JxsError, JxsResult};

/// A bitstream reader for reading individual bits from a buffered payload
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buffer: u64,
    bits_in_buffer: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buffer: 0,
            bits_in_buffer: 0,
        }
    }

    /// Read up to 64 bits from the stream
    pub fn read_bits(&mut self, num_bits: usize) -> JxsResult<u64> {
        if num_bits > 64 {
            return Err(JxsError::InvalidParameter(
                "Cannot read more than 64 bits at once".to_string(),
            ));
        }

        while self.bits_in_buffer < num_bits {
            let byte = *self.data.get(self.pos).ok_or_else(|| {
                JxsError::InvalidBitstream("Unexpected end of payload".to_string())
            })?;
            self.pos += 1;
            self.buffer |= (byte as u64) << self.bits_in_buffer;
            self.bits_in_buffer += 8;
        }

        let mask = if num_bits == 64 {
            u64::MAX
        } else {
            (1u64 << num_bits) - 1
        };
        let result = self.buffer & mask;
        self.buffer >>= num_bits;
        self.bits_in_buffer -= num_bits;

        Ok(result)
    }

    /// Read a single bit
    pub fn read_bit(&mut self) -> JxsResult<bool> {
        self.read_bits(1).map(|b| b != 0)
    }

    /// Read a variable-length integer: `selector` direct bits, with an
    /// escape to a 6-bit length plus that many extra bits.
    pub fn read_u32(&mut self, selector: u32) -> JxsResult<u32> {
        let max_direct = (1u64 << selector) - 1;
        let n = self.read_bits(selector as usize)?;
        if n < max_direct {
            Ok(n as u32)
        } else {
            let extra_bits = self.read_bits(6)? as usize;
            if extra_bits > 32 {
                return Err(JxsError::InvalidBitstream(
                    "Oversized varint extension".to_string(),
                ));
            }
            let extra = self.read_bits(extra_bits)?;
            let value = max_direct + extra;
            u32::try_from(value)
                .map_err(|_| JxsError::InvalidBitstream("Varint out of u32 range".to_string()))
        }
    }

    /// Skip to the next byte boundary
    pub fn align_to_byte(&mut self) -> JxsResult<()> {
        let bits_to_skip = self.bits_in_buffer % 8;
        if bits_to_skip > 0 {
            self.read_bits(bits_to_skip)?;
        }
        Ok(())
    }

    /// Remaining whole bytes after the current bit position. Valid only on a
    /// byte boundary.
    pub fn remaining_bytes(&self) -> &'a [u8] {
        debug_assert_eq!(self.bits_in_buffer % 8, 0);
        let buffered = self.bits_in_buffer / 8;
        &self.data[self.pos - buffered..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits() {
        let data = [0b10101010, 0b11001100];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read_bits(4).unwrap(), 0b1010);
        assert_eq!(reader.read_bits(4).unwrap(), 0b1010);
        assert_eq!(reader.read_bits(8).unwrap(), 0b11001100);
    }

    #[test]
    fn test_read_bit() {
        let data = [0b10101010];
        let mut reader = BitReader::new(&data);

        assert!(!reader.read_bit().unwrap());
        assert!(reader.read_bit().unwrap());
        assert!(!reader.read_bit().unwrap());
        assert!(reader.read_bit().unwrap());
    }

    #[test]
    fn test_end_of_payload() {
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bits(8).is_ok());
        assert!(reader.read_bits(1).is_err());
    }

    #[test]
    fn test_remaining_bytes() {
        let data = [0x12, 0x34, 0x56];
        let mut reader = BitReader::new(&data);
        reader.read_bits(8).unwrap();
        assert_eq!(reader.remaining_bytes(), &[0x34, 0x56]);
    }
}
