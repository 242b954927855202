//! Extra channel descriptions

use crate::info::BitDepth;
use crate::{JxsError, JxsResult};

/// Type of an extra channel beyond the base color channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExtraChannelType {
    Alpha = 0,
    Depth = 1,
    SpotColor = 2,
    SelectionMask = 3,
    Black = 4,
    Cfa = 5,
    Thermal = 6,
    Optional = 7,
}

impl ExtraChannelType {
    pub fn from_u32(value: u32) -> JxsResult<Self> {
        match value {
            0 => Ok(ExtraChannelType::Alpha),
            1 => Ok(ExtraChannelType::Depth),
            2 => Ok(ExtraChannelType::SpotColor),
            3 => Ok(ExtraChannelType::SelectionMask),
            4 => Ok(ExtraChannelType::Black),
            5 => Ok(ExtraChannelType::Cfa),
            6 => Ok(ExtraChannelType::Thermal),
            7 => Ok(ExtraChannelType::Optional),
            _ => Err(JxsError::InvalidHeader(format!(
                "invalid extra channel type: {}",
                value
            ))),
        }
    }
}

/// Description of one extra channel, indexed 0..num_extra_channels.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtraChannelInfo {
    pub channel_type: ExtraChannelType,
    pub bit_depth: BitDepth,
    /// Downsampling shift relative to the color channels (0 = full size)
    pub dim_shift: u32,
    /// Whether this alpha channel is premultiplied (alpha channels only)
    pub alpha_premultiplied: bool,
    /// Spot color in linear RGBA (spot color channels only)
    pub spot_color: Option<[f32; 4]>,
    /// Optional channel name
    pub name: Option<String>,
}

impl ExtraChannelInfo {
    pub fn new(channel_type: ExtraChannelType, bit_depth: BitDepth) -> Self {
        Self {
            channel_type,
            bit_depth,
            dim_shift: 0,
            alpha_premultiplied: false,
            spot_color: None,
            name: None,
        }
    }

    pub fn alpha(bit_depth: BitDepth, premultiplied: bool) -> Self {
        Self {
            alpha_premultiplied: premultiplied,
            ..Self::new(ExtraChannelType::Alpha, bit_depth)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_roundtrip() {
        for v in 0..8 {
            let ty = ExtraChannelType::from_u32(v).unwrap();
            assert_eq!(ty as u32, v);
        }
        assert!(ExtraChannelType::from_u32(42).is_err());
    }

    #[test]
    fn test_alpha_constructor() {
        let info = ExtraChannelInfo::alpha(BitDepth::integer(8), true);
        assert_eq!(info.channel_type, ExtraChannelType::Alpha);
        assert!(info.alpha_premultiplied);
        assert!(info.spot_color.is_none());
    }
}
