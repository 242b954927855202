//! Encode/decode round trips across pixel formats and stream features

use jxs::{
    decode_image, encode_image, BasicInfo, BitDepth, DataType, DecoderSession, DecoderStatus,
    EncoderSession, EncoderStatus, Endianness, Events, FrameHeader, PixelFormat,
};

fn drain_encoder(session: &mut EncoderSession) -> Vec<u8> {
    let mut out = Vec::new();
    while session.process_output(&mut out).unwrap() == EncoderStatus::Pending {}
    out
}

#[test]
fn test_lossless_rgb_4x4() {
    let format = PixelFormat::new(3, DataType::U8);
    let pixels: Vec<u8> = std::iter::repeat([10u8, 20, 30]).take(16).flatten().collect();

    let encoded = encode_image(&BasicInfo::new(4, 4), &format, &pixels).unwrap();
    let (info, decoded) = decode_image(&encoded, &format).unwrap();

    assert_eq!((info.width, info.height), (4, 4));
    assert_eq!(decoded.len(), 48);
    assert_eq!(decoded, pixels);
}

#[test]
fn test_lossless_grayscale() {
    let format = PixelFormat::new(1, DataType::U8);
    let mut info = BasicInfo::new(8, 8);
    info.num_color_channels = 1;
    let pixels: Vec<u8> = (0..64).map(|i| (i * 4) as u8).collect();

    let encoded = encode_image(&info, &format, &pixels).unwrap();
    let (decoded_info, decoded) = decode_image(&encoded, &format).unwrap();
    assert_eq!(decoded_info.num_color_channels, 1);
    assert_eq!(decoded, pixels);
}

#[test]
fn test_lossless_u16_big_endian() {
    let mut format = PixelFormat::new(3, DataType::U16);
    format.endianness = Endianness::Big;
    let mut info = BasicInfo::new(5, 3);
    info.bit_depth = BitDepth::integer(12);

    let mut pixels = Vec::new();
    for i in 0..45u16 {
        pixels.extend_from_slice(&(i * 91).to_be_bytes());
    }

    let encoded = encode_image(&info, &format, &pixels).unwrap();
    let (decoded_info, decoded) = decode_image(&encoded, &format).unwrap();
    assert_eq!(decoded_info.bit_depth.bits_per_sample, 12);
    assert_eq!(decoded, pixels);
}

#[test]
fn test_lossless_rgba_with_alpha_channel() {
    let format = PixelFormat::new(4, DataType::U8);
    let mut info = BasicInfo::new(4, 4);
    info.num_extra_channels = 1;
    let pixels: Vec<u8> = (0..16u8)
        .flat_map(|i| [i, i.wrapping_mul(3), 255 - i, 100 + i])
        .collect();

    let encoded = encode_image(&info, &format, &pixels).unwrap();
    let (decoded_info, decoded) = decode_image(&encoded, &format).unwrap();
    assert_eq!(decoded_info.num_extra_channels, 1);
    assert_eq!(decoded, pixels);
}

#[test]
fn test_multi_band_image() {
    // Taller than one 64-row band, so the frame spans two band sections.
    let format = PixelFormat::new(3, DataType::U8);
    let pixels: Vec<u8> = (0..3 * 70 * 3).map(|i| (i % 251) as u8).collect();

    let encoded = encode_image(&BasicInfo::new(3, 70), &format, &pixels).unwrap();
    let (_, decoded) = decode_image(&encoded, &format).unwrap();
    assert_eq!(decoded, pixels);
}

#[test]
fn test_lossy_distance_bound() {
    let format = PixelFormat::new(3, DataType::U8);
    let pixels: Vec<u8> = (0..4 * 4 * 3).map(|i| (i * 5) as u8).collect();

    let mut session = EncoderSession::new();
    session.set_basic_info(BasicInfo::new(4, 4)).unwrap();
    session
        .set_color_encoding(jxs::ColorEncoding::srgb())
        .unwrap();
    let id = session.create_frame_settings();
    session.set_frame_distance(id, 4.0).unwrap();
    session
        .set_frame_header(
            id,
            FrameHeader {
                is_last: true,
                ..FrameHeader::default()
            },
        )
        .unwrap();
    session.add_image_frame(id, &format, &pixels).unwrap();
    session.close_input().unwrap();
    let encoded = drain_encoder(&mut session);

    let (_, decoded) = decode_image(&encoded, &format).unwrap();
    // distance 4.0 maps to quantization step 9; error is bounded by half a step
    for (orig, dec) in pixels.iter().zip(decoded.iter()) {
        assert!((*orig as i32 - *dec as i32).abs() <= 5);
    }
}

#[test]
fn test_preview_image() {
    let format = PixelFormat::new(3, DataType::U8);
    let mut info = BasicInfo::new(4, 4);
    info.preview_size = Some((2, 2));
    let pixels: Vec<u8> = (0..48).map(|i| i as u8).collect();
    let preview: Vec<u8> = (0..12).map(|i| (200 + i) as u8).collect();

    let mut session = EncoderSession::new();
    session.set_basic_info(info).unwrap();
    session
        .set_color_encoding(jxs::ColorEncoding::srgb())
        .unwrap();
    session.set_preview_image(&format, &preview).unwrap();
    let id = session.create_frame_settings();
    session.set_frame_lossless(id, true).unwrap();
    session.add_image_frame(id, &format, &pixels).unwrap();
    session.close_input().unwrap();
    let encoded = drain_encoder(&mut session);

    let mut decoder = DecoderSession::new();
    decoder
        .subscribe_events(Events::BASIC_INFO | Events::PREVIEW_IMAGE | Events::FULL_IMAGE)
        .unwrap();
    decoder.set_input(encoded).unwrap();
    let mut saw_preview = false;
    loop {
        match decoder.process_input().unwrap() {
            DecoderStatus::PreviewImage => saw_preview = true,
            DecoderStatus::NeedPreviewOutBuffer => {
                decoder
                    .set_preview_out_buffer(&format, vec![0; 12])
                    .unwrap();
            }
            DecoderStatus::NeedImageOutBuffer => {
                decoder.set_image_out_buffer(&format, vec![0; 48]).unwrap();
            }
            DecoderStatus::Success => break,
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            _ => {}
        }
    }
    assert!(saw_preview);
    assert_eq!(decoder.take_preview_out_buffer().unwrap(), preview);
    assert_eq!(decoder.take_image_out_buffer().unwrap(), pixels);
}

#[test]
fn test_extra_channel_out_buffer() {
    let rgba = PixelFormat::new(4, DataType::U8);
    let mut info = BasicInfo::new(4, 4);
    info.num_extra_channels = 1;
    let pixels: Vec<u8> = (0..16u8)
        .flat_map(|i| [i, i, i, 100 + i])
        .collect();
    let encoded = encode_image(&info, &rgba, &pixels).unwrap();

    let rgb = PixelFormat::new(3, DataType::U8);
    let single = PixelFormat::new(1, DataType::U8);
    let mut decoder = DecoderSession::new();
    decoder
        .subscribe_events(Events::BASIC_INFO | Events::FULL_IMAGE)
        .unwrap();
    decoder.set_input(encoded).unwrap();
    loop {
        match decoder.process_input().unwrap() {
            DecoderStatus::BasicInfo => {
                decoder
                    .set_extra_channel_out_buffer(0, &single, vec![0; 16])
                    .unwrap();
            }
            DecoderStatus::NeedImageOutBuffer => {
                decoder.set_image_out_buffer(&rgb, vec![0; 48]).unwrap();
            }
            DecoderStatus::Success => break,
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            _ => {}
        }
    }
    let alpha = decoder.take_extra_channel_out_buffer(0).unwrap();
    let expected: Vec<u8> = (0..16u8).map(|i| 100 + i).collect();
    assert_eq!(alpha, expected);
}

#[test]
fn test_animation_frames() {
    let format = PixelFormat::new(3, DataType::U8);
    let mut info = BasicInfo::new(2, 2);
    info.animation = Some(jxs::AnimationHeader {
        tps_numerator: 10,
        tps_denominator: 1,
        num_loops: 0,
        have_timecodes: false,
    });

    let frames: Vec<Vec<u8>> = (0..3u8)
        .map(|f| (0..12).map(|i| f * 50 + i).collect())
        .collect();

    let mut session = EncoderSession::new();
    session.set_basic_info(info).unwrap();
    session
        .set_color_encoding(jxs::ColorEncoding::srgb())
        .unwrap();
    let id = session.create_frame_settings();
    session.set_frame_lossless(id, true).unwrap();
    for (index, frame) in frames.iter().enumerate() {
        session
            .set_frame_header(
                id,
                FrameHeader {
                    duration: 2,
                    is_last: index == frames.len() - 1,
                    ..FrameHeader::default()
                },
            )
            .unwrap();
        session.add_image_frame(id, &format, frame).unwrap();
    }
    session.close_input().unwrap();
    let encoded = drain_encoder(&mut session);

    let mut decoder = DecoderSession::new();
    decoder
        .subscribe_events(Events::FRAME | Events::FULL_IMAGE)
        .unwrap();
    decoder.set_input(encoded).unwrap();
    let mut full_images = 0;
    loop {
        match decoder.process_input().unwrap() {
            DecoderStatus::Frame => {
                assert_eq!(decoder.frame_header().unwrap().duration, 2);
            }
            DecoderStatus::FullImage => full_images += 1,
            DecoderStatus::NeedImageOutBuffer => {
                decoder.set_image_out_buffer(&format, vec![0; 12]).unwrap();
            }
            DecoderStatus::Success => break,
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            _ => {}
        }
    }
    assert_eq!(full_images, 3);
    // The lease holds whichever frame decoded last.
    assert_eq!(decoder.take_image_out_buffer().unwrap(), frames[2]);
}
