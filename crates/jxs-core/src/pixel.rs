//! Pixel format contracts for input and output buffers

use crate::{JxsError, JxsResult};
use num_traits::NumCast;

/// Per-channel sample data type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 16-bit floating point (handled as raw bit patterns)
    F16,
    /// 32-bit floating point
    F32,
}

impl DataType {
    /// Size in bytes of one sample
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::U16 | DataType::F16 => 2,
            DataType::F32 => 4,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F16 | DataType::F32)
    }
}

/// Byte order for multi-byte sample types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endianness {
    #[default]
    Native,
    Little,
    Big,
}

impl Endianness {
    /// Whether samples of this byte order match the host layout.
    pub fn is_native(&self) -> bool {
        match self {
            Endianness::Native => true,
            Endianness::Little => cfg!(target_endian = "little"),
            Endianness::Big => cfg!(target_endian = "big"),
        }
    }
}

/// Caller-declared contract for a raw interleaved pixel buffer.
///
/// Supplied to the decoder for output buffers and to the encoder for input
/// buffers; buffer sizes are validated against it before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelFormat {
    /// Number of interleaved channels (1, 2, 3, or 4)
    pub num_channels: u32,
    /// Sample data type for every channel
    pub data_type: DataType,
    /// Byte order for samples wider than one byte
    pub endianness: Endianness,
    /// Row alignment in bytes; 0 means tightly packed
    pub align: usize,
}

impl PixelFormat {
    pub fn new(num_channels: u32, data_type: DataType) -> Self {
        Self {
            num_channels,
            data_type,
            endianness: Endianness::Native,
            align: 0,
        }
    }

    /// Bytes per pixel across all channels
    pub fn bytes_per_pixel(&self) -> usize {
        self.num_channels as usize * self.data_type.bytes_per_sample()
    }

    /// Stride in bytes for a row of `width` pixels, honoring `align`.
    pub fn row_stride(&self, width: u32) -> usize {
        let packed = width as usize * self.bytes_per_pixel();
        if self.align <= 1 {
            packed
        } else {
            packed.div_ceil(self.align) * self.align
        }
    }

    /// Minimum buffer size in bytes for a `width` x `height` image.
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        self.row_stride(width) * height as usize
    }

    /// Validate a declared buffer against this format and the image size.
    pub fn validate_buffer(&self, buffer_len: usize, width: u32, height: u32) -> JxsResult<()> {
        if !(1..=4).contains(&self.num_channels) {
            return Err(JxsError::InvalidParameter(format!(
                "{} channels not supported",
                self.num_channels
            )));
        }
        let expected = self.buffer_size(width, height);
        if buffer_len < expected {
            return Err(JxsError::BufferTooSmall {
                expected,
                actual: buffer_len,
            });
        }
        Ok(())
    }
}

/// Sample conversion trait used when packing decoded planes into caller
/// buffers and unpacking caller buffers into planes.
pub trait Sample: Copy + NumCast + PartialOrd {
    const DATA_TYPE: DataType;

    /// Raw storage bits of the sample.
    fn to_bits(self) -> u32;
    /// Reconstruct a sample from raw storage bits.
    fn from_bits(bits: u32) -> Self;
    /// Read one sample from the start of `bytes` in the given byte order.
    fn load(bytes: &[u8], endianness: Endianness) -> Self;
    /// Write this sample to the start of `out` in the given byte order.
    fn store(self, out: &mut [u8], endianness: Endianness);
}

impl Sample for u8 {
    const DATA_TYPE: DataType = DataType::U8;

    fn to_bits(self) -> u32 {
        self as u32
    }

    fn from_bits(bits: u32) -> Self {
        bits as u8
    }

    fn load(bytes: &[u8], _endianness: Endianness) -> Self {
        bytes[0]
    }

    fn store(self, out: &mut [u8], _endianness: Endianness) {
        out[0] = self;
    }
}

impl Sample for u16 {
    const DATA_TYPE: DataType = DataType::U16;

    fn to_bits(self) -> u32 {
        self as u32
    }

    fn from_bits(bits: u32) -> Self {
        bits as u16
    }

    fn load(bytes: &[u8], endianness: Endianness) -> Self {
        let raw = [bytes[0], bytes[1]];
        match endianness {
            Endianness::Big => u16::from_be_bytes(raw),
            Endianness::Little => u16::from_le_bytes(raw),
            Endianness::Native => u16::from_ne_bytes(raw),
        }
    }

    fn store(self, out: &mut [u8], endianness: Endianness) {
        let raw = match endianness {
            Endianness::Big => self.to_be_bytes(),
            Endianness::Little => self.to_le_bytes(),
            Endianness::Native => self.to_ne_bytes(),
        };
        out[..2].copy_from_slice(&raw);
    }
}

impl Sample for f32 {
    const DATA_TYPE: DataType = DataType::F32;

    fn to_bits(self) -> u32 {
        self.to_bits()
    }

    fn from_bits(bits: u32) -> Self {
        f32::from_bits(bits)
    }

    fn load(bytes: &[u8], endianness: Endianness) -> Self {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let bits = match endianness {
            Endianness::Big => u32::from_be_bytes(raw),
            Endianness::Little => u32::from_le_bytes(raw),
            Endianness::Native => u32::from_ne_bytes(raw),
        };
        f32::from_bits(bits)
    }

    fn store(self, out: &mut [u8], endianness: Endianness) {
        let raw = match endianness {
            Endianness::Big => Sample::to_bits(self).to_be_bytes(),
            Endianness::Little => Sample::to_bits(self).to_le_bytes(),
            Endianness::Native => Sample::to_bits(self).to_ne_bytes(),
        };
        out[..4].copy_from_slice(&raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        let fmt = PixelFormat::new(3, DataType::U8);
        assert_eq!(fmt.bytes_per_pixel(), 3);
        let fmt = PixelFormat::new(4, DataType::F32);
        assert_eq!(fmt.bytes_per_pixel(), 16);
    }

    #[test]
    fn test_row_alignment() {
        let mut fmt = PixelFormat::new(3, DataType::U8);
        fmt.align = 4;
        // 5 pixels * 3 bytes = 15, rounded up to 16
        assert_eq!(fmt.row_stride(5), 16);
        assert_eq!(fmt.buffer_size(5, 2), 32);
    }

    #[test]
    fn test_validate_buffer() {
        let fmt = PixelFormat::new(3, DataType::U8);
        assert!(fmt.validate_buffer(48, 4, 4).is_ok());
        let err = fmt.validate_buffer(47, 4, 4).unwrap_err();
        assert!(matches!(
            err,
            JxsError::BufferTooSmall {
                expected: 48,
                actual: 47
            }
        ));
    }

    #[test]
    fn test_sample_store_load_byte_order() {
        let mut buf = [0u8; 4];
        0x1234u16.store(&mut buf, Endianness::Big);
        assert_eq!(&buf[..2], &[0x12, 0x34]);
        assert_eq!(u16::load(&buf, Endianness::Big), 0x1234);
        assert_eq!(u16::load(&buf, Endianness::Little), 0x3412);

        let f = -1.25f32;
        f.store(&mut buf, Endianness::Little);
        assert_eq!(f32::load(&buf, Endianness::Little), f);

        0xabu8.store(&mut buf, Endianness::Native);
        assert_eq!(u8::load(&buf, Endianness::Native), 0xab);
    }

    #[test]
    fn test_sample_bits() {
        assert_eq!(u8::from_bits(200u8.to_bits()), 200);
        assert_eq!(u16::from_bits(40000u16.to_bits()), 40000);
        let f = -1.25f32;
        assert_eq!(f32::from_bits(Sample::to_bits(f)), f);
    }
}
