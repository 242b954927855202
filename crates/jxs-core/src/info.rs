//! Image header information

/// Image orientation (EXIF-style)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Orientation {
    #[default]
    Identity = 1,
    FlipHorizontal = 2,
    Rotate180 = 3,
    FlipVertical = 4,
    Transpose = 5,
    Rotate90Cw = 6,
    AntiTranspose = 7,
    Rotate90Ccw = 8,
}

impl Orientation {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Orientation::Identity),
            2 => Some(Orientation::FlipHorizontal),
            3 => Some(Orientation::Rotate180),
            4 => Some(Orientation::FlipVertical),
            5 => Some(Orientation::Transpose),
            6 => Some(Orientation::Rotate90Cw),
            7 => Some(Orientation::AntiTranspose),
            8 => Some(Orientation::Rotate90Ccw),
            _ => None,
        }
    }
}

/// Bit depth of the original samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitDepth {
    /// Bits per sample (1-32)
    pub bits_per_sample: u32,
    /// Exponent bits; 0 for integer samples
    pub exponent_bits_per_sample: u32,
}

impl BitDepth {
    pub fn integer(bits: u32) -> Self {
        Self {
            bits_per_sample: bits,
            exponent_bits_per_sample: 0,
        }
    }

    pub fn float(bits: u32, exp_bits: u32) -> Self {
        Self {
            bits_per_sample: bits,
            exponent_bits_per_sample: exp_bits,
        }
    }

    pub fn is_float(&self) -> bool {
        self.exponent_bits_per_sample > 0
    }
}

impl Default for BitDepth {
    fn default() -> Self {
        Self::integer(8)
    }
}

/// Animation timing declared in the image header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnimationHeader {
    /// Ticks per second numerator
    pub tps_numerator: u32,
    /// Ticks per second denominator
    pub tps_denominator: u32,
    /// Number of loops (0 = infinite)
    pub num_loops: u32,
    /// Whether frames carry explicit timecodes
    pub have_timecodes: bool,
}

impl Default for AnimationHeader {
    fn default() -> Self {
        Self {
            tps_numerator: 1000,
            tps_denominator: 1,
            num_loops: 0,
            have_timecodes: false,
        }
    }
}

/// Immutable-once-known image header.
///
/// Produced exactly once per stream by the decoder session after enough
/// bytes have been consumed; read-only to the caller thereafter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicInfo {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Bit depth of the original samples
    pub bit_depth: BitDepth,
    /// Number of color channels (1 = grayscale, 3 = RGB)
    pub num_color_channels: u32,
    /// Number of extra channels (alpha, depth, spot color, ...)
    pub num_extra_channels: u32,
    /// Whether the first alpha channel is premultiplied
    pub alpha_premultiplied: bool,
    /// Image orientation
    pub orientation: Orientation,
    /// Intrinsic display dimensions, when different from coded dimensions
    pub intrinsic_size: Option<(u32, u32)>,
    /// Preview image dimensions, when a preview is present
    pub preview_size: Option<(u32, u32)>,
    /// Animation timing, when the image is animated
    pub animation: Option<AnimationHeader>,
    /// Whether the decoded data keeps the original color profile
    pub uses_original_profile: bool,
}

impl Default for BasicInfo {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            bit_depth: BitDepth::default(),
            num_color_channels: 3,
            num_extra_channels: 0,
            alpha_premultiplied: false,
            orientation: Orientation::Identity,
            intrinsic_size: None,
            preview_size: None,
            animation: None,
            uses_original_profile: true,
        }
    }
}

impl BasicInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn is_animated(&self) -> bool {
        self.animation.is_some()
    }

    pub fn have_preview(&self) -> bool {
        self.preview_size.is_some()
    }

    /// Total channels: color plus extra.
    pub fn total_channels(&self) -> u32 {
        self.num_color_channels + self.num_extra_channels
    }
}
