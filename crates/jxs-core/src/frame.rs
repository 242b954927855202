//! Per-frame metadata

/// How a frame combines with the canvas produced by earlier frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlendMode {
    /// Replace the canvas contents
    #[default]
    Replace = 0,
    /// Add sample values
    Add = 1,
    /// Alpha-blend over the canvas
    Blend = 2,
    /// Multiply with the canvas
    Multiply = 3,
}

impl BlendMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BlendMode::Replace),
            1 => Some(BlendMode::Add),
            2 => Some(BlendMode::Blend),
            3 => Some(BlendMode::Multiply),
            _ => None,
        }
    }
}

/// Blending parameters for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlendInfo {
    pub mode: BlendMode,
    /// Which saved reference slot to blend against (0 = previous canvas)
    pub source: u8,
    /// Index of the extra channel used as blend alpha
    pub alpha_channel: u32,
    /// Clamp sample values after blending
    pub clamp: bool,
}

/// Crop/layer placement of a frame within the image canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameRect {
    pub x0: i32,
    pub y0: i32,
    pub width: u32,
    pub height: u32,
}

/// Whether a frame is displayed or exists only as a blend reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameType {
    #[default]
    Regular = 0,
    /// Not displayed; only stored in a reference slot
    ReferenceOnly = 1,
}

/// Per-frame header.
///
/// Set by the caller before encoding a frame, or read from the decoder after
/// a frame-boundary event; immutable once the frame is finalized.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameHeader {
    pub frame_type: FrameType,
    /// Duration in animation ticks (0 for stills)
    pub duration: u32,
    /// Explicit timecode, when the animation header declares timecodes
    pub timecode: Option<u32>,
    /// Whether this is the last frame of the stream
    pub is_last: bool,
    /// Crop rectangle; `None` means the frame covers the whole canvas
    pub crop: Option<FrameRect>,
    pub blend: BlendInfo,
    /// Reference slot (1-3) this frame is saved to; 0 = not saved
    pub save_as_reference: u8,
    /// Optional frame name
    pub name: Option<String>,
}

impl FrameHeader {
    /// Whether this frame produces visible output.
    pub fn is_display(&self) -> bool {
        self.frame_type == FrameType::Regular
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_mode_roundtrip() {
        for mode in [
            BlendMode::Replace,
            BlendMode::Add,
            BlendMode::Blend,
            BlendMode::Multiply,
        ] {
            assert_eq!(BlendMode::from_u8(mode as u8), Some(mode));
        }
        assert_eq!(BlendMode::from_u8(4), None);
    }

    #[test]
    fn test_display_frames() {
        let mut header = FrameHeader::default();
        assert!(header.is_display());
        header.frame_type = FrameType::ReferenceOnly;
        assert!(!header.is_display());
    }
}
