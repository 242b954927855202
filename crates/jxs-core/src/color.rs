//! Structured color encodings and ICC profiles

/// Color space of the image samples
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorSpace {
    Rgb,
    Gray,
    Xyb,
    Unknown,
}

/// White point, named or as explicit chromaticity
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WhitePoint {
    D65,
    E,
    Dci,
    /// Explicit CIE xy chromaticity
    Custom { wx: f32, wy: f32 },
}

/// Color primaries, named or as explicit chromaticities
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Primaries {
    Srgb,
    Bt2100,
    P3,
    /// Explicit CIE xy chromaticities for red, green, and blue
    Custom {
        rx: f32,
        ry: f32,
        gx: f32,
        gy: f32,
        bx: f32,
        by: f32,
    },
}

/// Transfer function, named or as explicit gamma
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferFunction {
    Bt709,
    Linear,
    Srgb,
    Pq,
    Dci,
    Hlg,
    /// Explicit gamma exponent
    Gamma(f32),
}

/// Rendering intent for color management
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RenderingIntent {
    #[default]
    Perceptual,
    Relative,
    Saturation,
    Absolute,
}

/// Structured color profile
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorEncoding {
    pub color_space: ColorSpace,
    pub white_point: WhitePoint,
    pub primaries: Primaries,
    pub transfer_function: TransferFunction,
    pub rendering_intent: RenderingIntent,
}

impl ColorEncoding {
    /// Standard sRGB encoding
    pub fn srgb() -> Self {
        Self {
            color_space: ColorSpace::Rgb,
            white_point: WhitePoint::D65,
            primaries: Primaries::Srgb,
            transfer_function: TransferFunction::Srgb,
            rendering_intent: RenderingIntent::Perceptual,
        }
    }

    /// Linear sRGB encoding
    pub fn linear_srgb() -> Self {
        Self {
            transfer_function: TransferFunction::Linear,
            ..Self::srgb()
        }
    }

    /// sRGB-flavored grayscale encoding
    pub fn srgb_gray() -> Self {
        Self {
            color_space: ColorSpace::Gray,
            ..Self::srgb()
        }
    }
}

impl Default for ColorEncoding {
    fn default() -> Self {
        Self::srgb()
    }
}

/// A color profile: exactly one of the two representations is authoritative.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorProfile {
    /// Structured encoding
    Encoding(ColorEncoding),
    /// Opaque ICC profile bytes
    Icc(Vec<u8>),
}

impl ColorProfile {
    pub fn as_encoding(&self) -> Option<&ColorEncoding> {
        match self {
            ColorProfile::Encoding(enc) => Some(enc),
            ColorProfile::Icc(_) => None,
        }
    }

    pub fn as_icc(&self) -> Option<&[u8]> {
        match self {
            ColorProfile::Icc(data) => Some(data),
            ColorProfile::Encoding(_) => None,
        }
    }
}

/// Which profile the caller wants to query from the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorProfileTarget {
    /// The profile the image was encoded with
    Original,
    /// The profile of the decoded pixel data
    Data,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srgb_presets() {
        let srgb = ColorEncoding::srgb();
        assert_eq!(srgb.color_space, ColorSpace::Rgb);
        assert_eq!(srgb.transfer_function, TransferFunction::Srgb);

        let linear = ColorEncoding::linear_srgb();
        assert_eq!(linear.transfer_function, TransferFunction::Linear);
        assert_eq!(linear.primaries, Primaries::Srgb);

        let gray = ColorEncoding::srgb_gray();
        assert_eq!(gray.color_space, ColorSpace::Gray);
    }

    #[test]
    fn test_profile_accessors() {
        let p = ColorProfile::Encoding(ColorEncoding::srgb());
        assert!(p.as_encoding().is_some());
        assert!(p.as_icc().is_none());

        let p = ColorProfile::Icc(vec![1, 2, 3]);
        assert_eq!(p.as_icc(), Some(&[1u8, 2, 3][..]));
        assert!(p.as_encoding().is_none());
    }
}
