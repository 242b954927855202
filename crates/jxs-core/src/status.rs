//! Status and event taxonomy for the session state machines

use std::ops::{BitOr, BitOrAssign};

/// Statuses returned by `DecoderSession::process_input`.
///
/// Informative events (basic info, color encoding, frame, ...) are only
/// surfaced when the caller subscribed to them; the pause statuses
/// (`NeedMoreInput`, `Need*OutBuffer`) are surfaced unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderStatus {
    /// All subscribed and required work is done for the whole stream.
    Success,
    /// Parsing cannot advance until more input bytes are supplied.
    NeedMoreInput,
    /// The current frame needs an image output buffer before it can decode.
    NeedImageOutBuffer,
    /// The preview image needs an output buffer before it can decode.
    NeedPreviewOutBuffer,
    /// The JPEG reconstruction buffer is full or missing; release/set it.
    JpegNeedMoreOutput,
    /// The box output buffer is full or missing; release/set it.
    BoxNeedMoreOutput,
    /// Basic image information is now queryable.
    BasicInfo,
    /// The color profile is now queryable.
    ColorEncoding,
    /// A preview image is available for decoding.
    PreviewImage,
    /// A frame boundary was reached; the frame header is now queryable.
    Frame,
    /// The current frame has been fully decoded into the output buffer.
    FullImage,
    /// Embedded JPEG reconstruction data is available.
    JpegReconstruction,
    /// A metadata box boundary was reached; the box type is now queryable.
    Box,
}

impl DecoderStatus {
    /// Whether this status is a resumable pause rather than an event.
    pub fn is_pause(&self) -> bool {
        matches!(
            self,
            DecoderStatus::NeedMoreInput
                | DecoderStatus::NeedImageOutBuffer
                | DecoderStatus::NeedPreviewOutBuffer
                | DecoderStatus::JpegNeedMoreOutput
                | DecoderStatus::BoxNeedMoreOutput
        )
    }
}

/// Statuses returned by `EncoderSession::process_output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderStatus {
    /// All enqueued frames and boxes have been encoded and closed.
    Success,
    /// More work remains; call `process_output` again.
    Pending,
}

/// Subscription mask for decoder events.
///
/// Subscribing to nothing means the session only pauses for genuine
/// need-more-input / need-output-buffer conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Events(u32);

impl Events {
    pub const NONE: Events = Events(0);
    pub const BASIC_INFO: Events = Events(1 << 0);
    pub const COLOR_ENCODING: Events = Events(1 << 1);
    pub const PREVIEW_IMAGE: Events = Events(1 << 2);
    pub const FRAME: Events = Events(1 << 3);
    pub const FULL_IMAGE: Events = Events(1 << 4);
    pub const JPEG_RECONSTRUCTION: Events = Events(1 << 5);
    pub const BOX: Events = Events(1 << 6);

    /// Every informative event.
    pub const ALL: Events = Events(0x7F);

    pub fn contains(&self, other: Events) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Events {
    type Output = Events;

    fn bitor(self, rhs: Events) -> Events {
        Events(self.0 | rhs.0)
    }
}

impl BitOrAssign for Events {
    fn bitor_assign(&mut self, rhs: Events) {
        self.0 |= rhs.0;
    }
}

/// Result of probing the leading bytes of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// Not enough bytes to decide.
    NotEnoughBytes,
    /// Not a JPEG XL stream.
    Invalid,
    /// Naked JPEG XL codestream.
    Codestream,
    /// BMFF-style container.
    Container,
}

/// Codestream conformance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodestreamLevel {
    Level5,
    Level10,
}

impl CodestreamLevel {
    pub fn as_i32(&self) -> i32 {
        match self {
            CodestreamLevel::Level5 => 5,
            CodestreamLevel::Level10 => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_mask_ops() {
        let mask = Events::BASIC_INFO | Events::FRAME;
        assert!(mask.contains(Events::BASIC_INFO));
        assert!(mask.contains(Events::FRAME));
        assert!(!mask.contains(Events::BOX));
        assert!(Events::ALL.contains(mask));
        assert!(Events::NONE.is_empty());
    }

    #[test]
    fn test_pause_statuses() {
        assert!(DecoderStatus::NeedMoreInput.is_pause());
        assert!(DecoderStatus::NeedImageOutBuffer.is_pause());
        assert!(!DecoderStatus::Frame.is_pause());
        assert!(!DecoderStatus::Success.is_pause());
    }
}
