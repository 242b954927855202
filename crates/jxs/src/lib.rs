//! Incremental JPEG XL decode/encode sessions
//!
//! This crate re-exports the session API: [`DecoderSession`] pulls events and
//! pixels out of a stream fed through input leases, and [`EncoderSession`]
//! multiplexes frames and metadata boxes into an append-only output stream.
//!
//! For the common whole-image cases, [`encode_image`] and [`decode_image`]
//! drive a session end to end:
//!
//! ```
//! use jxs::{decode_image, encode_image, BasicInfo, DataType, PixelFormat};
//!
//! let format = PixelFormat::new(3, DataType::U8);
//! let pixels = vec![128u8; 2 * 2 * 3];
//! let encoded = encode_image(&BasicInfo::new(2, 2), &format, &pixels).unwrap();
//!
//! let (info, decoded) = decode_image(&encoded, &format).unwrap();
//! assert_eq!((info.width, info.height), (2, 2));
//! assert_eq!(decoded, pixels);
//! ```

pub use jxs_core::{
    AnimationHeader, BasicInfo, BitDepth, BlendInfo, BlendMode, CodestreamLevel, ColorEncoding,
    ColorProfile, ColorProfileTarget, ColorSpace, DataType, DecoderStatus, EncoderStatus,
    Endianness, ErrorKind, Events, ExtraChannelInfo, ExtraChannelType, FrameHeader, FrameRect,
    FrameType, JxsError, JxsResult, Orientation, PixelFormat, Primaries, RenderingIntent,
    Signature, TransferFunction, WhitePoint,
};

pub use jxs_container::{check_signature, BoxType};
pub use jxs_decoder::DecoderSession;
pub use jxs_encoder::{EncoderSession, FrameOption, FrameSettingsId};

/// Encode a complete image losslessly in one call.
///
/// `format` describes the interleaved `pixels` buffer; with one extra channel
/// declared in `info` and a fourth format channel, the extra channel is
/// treated as straight alpha. Streams needing more control (animation, boxes,
/// lossy distance) use [`EncoderSession`] directly.
pub fn encode_image(info: &BasicInfo, format: &PixelFormat, pixels: &[u8]) -> JxsResult<Vec<u8>> {
    if info.num_extra_channels > 1 {
        return Err(JxsError::InvalidParameter(
            "encode_image supports at most one extra channel".to_string(),
        ));
    }

    let mut session = EncoderSession::new();
    session.set_basic_info(info.clone())?;
    let color = if info.num_color_channels == 1 {
        ColorEncoding::srgb_gray()
    } else {
        ColorEncoding::srgb()
    };
    session.set_color_encoding(color)?;
    if info.num_extra_channels == 1 {
        session.set_extra_channel_info(
            0,
            ExtraChannelInfo::alpha(info.bit_depth, info.alpha_premultiplied),
        )?;
    }

    let id = session.create_frame_settings();
    session.set_frame_lossless(id, true)?;
    session.set_frame_header(
        id,
        FrameHeader {
            is_last: true,
            ..FrameHeader::default()
        },
    )?;
    session.add_image_frame(id, format, pixels)?;
    session.close_input()?;

    let mut out = Vec::new();
    while session.process_output(&mut out)? == EncoderStatus::Pending {}
    Ok(out)
}

/// Decode a complete stream into an interleaved buffer in one call.
///
/// Returns the image information and the pixel buffer laid out per `format`.
pub fn decode_image(data: &[u8], format: &PixelFormat) -> JxsResult<(BasicInfo, Vec<u8>)> {
    let mut session = DecoderSession::new();
    session.subscribe_events(Events::BASIC_INFO | Events::FULL_IMAGE)?;
    session.set_input(data.to_vec())?;

    loop {
        match session.process_input()? {
            DecoderStatus::Success => break,
            DecoderStatus::NeedMoreInput => {
                return Err(JxsError::InvalidBitstream("truncated stream".to_string()));
            }
            DecoderStatus::NeedImageOutBuffer => {
                let basic = session.basic_info()?.clone();
                let buf = vec![0u8; format.buffer_size(basic.width, basic.height)];
                session.set_image_out_buffer(format, buf)?;
            }
            _ => {}
        }
    }

    let info = session.basic_info()?.clone();
    let pixels = session
        .take_image_out_buffer()
        .ok_or(JxsError::OutputBufferNotSet)?;
    Ok((info, pixels))
}
