//! Session protocol behavior: leases, pauses, event order, skip and rewind

use jxs::{
    encode_image, BasicInfo, DataType, DecoderSession, DecoderStatus, EncoderSession,
    EncoderStatus, Endianness, Events, FrameHeader, JxsError, PixelFormat,
};

const FORMAT: PixelFormat = PixelFormat {
    num_channels: 3,
    data_type: DataType::U8,
    endianness: Endianness::Native,
    align: 0,
};

fn sample_pixels(width: u32, height: u32, seed: u8) -> Vec<u8> {
    (0..width as usize * height as usize * 3)
        .map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed))
        .collect()
}

fn encode_animation(width: u32, height: u32, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut info = BasicInfo::new(width, height);
    info.animation = Some(jxs::AnimationHeader::default());
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
                    duration: 1,
                    is_last: index == frames.len() - 1,
                    ..FrameHeader::default()
                },
            )
            .unwrap();
        session.add_image_frame(id, &FORMAT, frame).unwrap();
    }
    session.close_input().unwrap();
    let mut out = Vec::new();
    while session.process_output(&mut out).unwrap() == EncoderStatus::Pending {}
    out
}

#[test]
fn test_chunked_feeding_matches_one_shot() {
    let pixels = sample_pixels(6, 5, 3);
    let encoded = encode_image(&BasicInfo::new(6, 5), &FORMAT, &pixels).unwrap();
    let (_, reference) = jxs::decode_image(&encoded, &FORMAT).unwrap();

    let mut session = DecoderSession::new();
    session
        .subscribe_events(Events::BASIC_INFO | Events::FULL_IMAGE)
        .unwrap();
    let mut chunks = encoded.chunks(7);
    let mut fed = 0;
    let mut pauses = 0;
    loop {
        match session.process_input().unwrap() {
            DecoderStatus::NeedMoreInput => {
                // Eagerly consumed: the released lease never has a tail.
                let (_, unconsumed) = session.release_input();
                assert_eq!(unconsumed, 0);
                let chunk = chunks.next().expect("stream is complete");
                fed += chunk.len();
                session.set_input(chunk.to_vec()).unwrap();
                pauses += 1;
            }
            DecoderStatus::NeedImageOutBuffer => {
                session
                    .set_image_out_buffer(&FORMAT, vec![0; pixels.len()])
                    .unwrap();
            }
            DecoderStatus::Success => break,
            _ => {}
        }
    }
    assert!(pauses > 2);
    assert_eq!(fed, encoded.len());
    assert_eq!(session.take_image_out_buffer().unwrap(), reference);
}

#[test]
fn test_monotonic_event_order() {
    let pixels = sample_pixels(4, 4, 0);
    let encoded = encode_image(&BasicInfo::new(4, 4), &FORMAT, &pixels).unwrap();

    let mut session = DecoderSession::new();
    session.subscribe_events(Events::ALL).unwrap();
    session.set_input(encoded).unwrap();
    let mut events = Vec::new();
    loop {
        let status = session.process_input().unwrap();
        match status {
            DecoderStatus::Success => break,
            DecoderStatus::NeedImageOutBuffer => {
                session
                    .set_image_out_buffer(&FORMAT, vec![0; pixels.len()])
                    .unwrap();
            }
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            status if !status.is_pause() => events.push(status),
            _ => {}
        }
    }
    assert_eq!(
        events,
        vec![
            DecoderStatus::BasicInfo,
            DecoderStatus::ColorEncoding,
            DecoderStatus::Frame,
            DecoderStatus::FullImage,
        ]
    );
}

#[test]
fn test_skip_frames_saturates() {
    let frames: Vec<Vec<u8>> = (0..3).map(|f| sample_pixels(2, 2, f * 10)).collect();
    let encoded = encode_animation(2, 2, &frames);

    let mut session = DecoderSession::new();
    session
        .subscribe_events(Events::FRAME | Events::FULL_IMAGE)
        .unwrap();
    session.skip_frames(10);
    session.set_input(encoded).unwrap();
    loop {
        match session.process_input().unwrap() {
            DecoderStatus::Frame | DecoderStatus::FullImage => {
                panic!("skipped frames must not surface events")
            }
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            DecoderStatus::Success => break,
            _ => {}
        }
    }
}

#[test]
fn test_skip_one_frame() {
    let frames: Vec<Vec<u8>> = (0..2).map(|f| sample_pixels(2, 2, 100 + f * 20)).collect();
    let encoded = encode_animation(2, 2, &frames);

    let mut session = DecoderSession::new();
    session
        .subscribe_events(Events::BASIC_INFO | Events::FRAME | Events::FULL_IMAGE)
        .unwrap();
    session.skip_frames(1);
    session.set_input(encoded).unwrap();
    let mut frame_events = 0;
    loop {
        match session.process_input().unwrap() {
            DecoderStatus::Frame => frame_events += 1,
            DecoderStatus::NeedImageOutBuffer => {
                session.set_image_out_buffer(&FORMAT, vec![0; 12]).unwrap();
            }
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            DecoderStatus::Success => break,
            _ => {}
        }
    }
    assert_eq!(frame_events, 1);
    assert_eq!(session.take_image_out_buffer().unwrap(), frames[1]);
}

#[test]
fn test_no_success_before_end_marker() {
    let pixels = sample_pixels(4, 4, 9);
    let encoded = encode_image(&BasicInfo::new(4, 4), &FORMAT, &pixels).unwrap();
    // The closing marker is the final five-byte section.
    let truncated = &encoded[..encoded.len() - 5];

    let mut session = DecoderSession::new();
    session.subscribe_events(Events::FULL_IMAGE).unwrap();
    session.set_input(truncated.to_vec()).unwrap();
    let mut saw_full_image = false;
    loop {
        match session.process_input().unwrap() {
            DecoderStatus::FullImage => saw_full_image = true,
            DecoderStatus::NeedImageOutBuffer => {
                session
                    .set_image_out_buffer(&FORMAT, vec![0; pixels.len()])
                    .unwrap();
            }
            DecoderStatus::NeedMoreInput => break,
            DecoderStatus::Success => panic!("no success before the stream is closed"),
            _ => {}
        }
    }
    assert!(saw_full_image);

    // Feeding the marker completes the session.
    session.release_input();
    session
        .set_input(encoded[encoded.len() - 5..].to_vec())
        .unwrap();
    loop {
        match session.process_input().unwrap() {
            DecoderStatus::Success => break,
            DecoderStatus::NeedMoreInput => panic!("marker supplied"),
            _ => {}
        }
    }
}

#[test]
fn test_image_out_buffer_lease_exclusive() {
    let pixels = sample_pixels(2, 2, 1);
    let encoded = encode_image(&BasicInfo::new(2, 2), &FORMAT, &pixels).unwrap();

    let mut session = DecoderSession::new();
    session.subscribe_events(Events::BASIC_INFO).unwrap();
    session.set_input(encoded).unwrap();
    loop {
        match session.process_input().unwrap() {
            DecoderStatus::BasicInfo => break,
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            _ => {}
        }
    }
    session.set_image_out_buffer(&FORMAT, vec![0; 12]).unwrap();
    assert!(matches!(
        session.set_image_out_buffer(&FORMAT, vec![0; 12]),
        Err(JxsError::LeaseActive("image output"))
    ));
    assert!(session.take_image_out_buffer().is_some());
    session.set_image_out_buffer(&FORMAT, vec![0; 12]).unwrap();

    session.set_jpeg_out_buffer(vec![0; 8]).unwrap();
    assert!(matches!(
        session.set_jpeg_out_buffer(vec![0; 8]),
        Err(JxsError::LeaseActive("JPEG output"))
    ));
    session.set_box_out_buffer(vec![0; 8]).unwrap();
    assert!(matches!(
        session.set_box_out_buffer(vec![0; 8]),
        Err(JxsError::LeaseActive("box output"))
    ));
}

#[test]
fn test_flush_classification() {
    let pixels = sample_pixels(4, 4, 2);
    let encoded = encode_image(&BasicInfo::new(4, 4), &FORMAT, &pixels).unwrap();

    let mut session = DecoderSession::new();
    session.subscribe_events(Events::FULL_IMAGE).unwrap();
    assert!(matches!(
        session.flush_image(),
        Err(JxsError::OutputBufferNotSet)
    ));

    session.set_input(encoded).unwrap();
    loop {
        match session.process_input().unwrap() {
            DecoderStatus::NeedImageOutBuffer => {
                session
                    .set_image_out_buffer(&FORMAT, vec![0; pixels.len()])
                    .unwrap();
            }
            DecoderStatus::Success => break,
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            _ => {}
        }
    }
    assert_eq!(session.flush_image().unwrap(), 4);
    assert!(matches!(
        session.flush_image(),
        Err(JxsError::NothingToFlush)
    ));
}

#[test]
fn test_rewind_keeps_skip_count() {
    let frames: Vec<Vec<u8>> = (0..2).map(|f| sample_pixels(2, 2, 30 + f * 40)).collect();
    let encoded = encode_animation(2, 2, &frames);

    let mut session = DecoderSession::new();
    session
        .subscribe_events(Events::FULL_IMAGE)
        .unwrap();
    session.set_input(encoded.clone()).unwrap();
    let mut full_images = 0;
    loop {
        match session.process_input().unwrap() {
            DecoderStatus::FullImage => full_images += 1,
            DecoderStatus::NeedImageOutBuffer => {
                session.set_image_out_buffer(&FORMAT, vec![0; 12]).unwrap();
            }
            DecoderStatus::Success => break,
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            _ => {}
        }
    }
    assert_eq!(full_images, 2);

    session.release_input();
    session.skip_frames(1);
    session.rewind().unwrap();
    session.set_input(encoded).unwrap();
    let mut full_images = 0;
    loop {
        match session.process_input().unwrap() {
            DecoderStatus::FullImage => full_images += 1,
            DecoderStatus::NeedImageOutBuffer => {
                session.set_image_out_buffer(&FORMAT, vec![0; 12]).unwrap();
            }
            DecoderStatus::Success => break,
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            _ => {}
        }
    }
    // The skip requested before rewind applies to the re-read.
    assert_eq!(full_images, 1);
    assert_eq!(session.take_image_out_buffer().unwrap(), frames[1]);
}

#[test]
fn test_no_pixel_pause_without_full_image_subscription() {
    let pixels = sample_pixels(4, 4, 6);
    let encoded = encode_image(&BasicInfo::new(4, 4), &FORMAT, &pixels).unwrap();

    // A caller consuming only metadata never supplies an image buffer and
    // must still run to completion.
    let mut session = DecoderSession::new();
    session.subscribe_events(Events::BASIC_INFO).unwrap();
    session.set_input(encoded).unwrap();
    loop {
        match session.process_input().unwrap() {
            DecoderStatus::NeedImageOutBuffer => {
                panic!("pixel buffer demanded without a full-image subscription")
            }
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            DecoderStatus::Success => break,
            _ => {}
        }
    }
}

#[test]
fn test_queries_are_idempotent() {
    let pixels = sample_pixels(3, 3, 4);
    let encoded = encode_image(&BasicInfo::new(3, 3), &FORMAT, &pixels).unwrap();

    let mut session = DecoderSession::new();
    session.subscribe_events(Events::BASIC_INFO).unwrap();
    assert!(matches!(session.basic_info(), Err(JxsError::NotReady(_))));

    session.set_input(encoded).unwrap();
    loop {
        match session.process_input().unwrap() {
            DecoderStatus::BasicInfo => break,
            DecoderStatus::NeedMoreInput => panic!("stream is complete"),
            _ => {}
        }
    }
    let first = session.basic_info().unwrap().clone();
    let second = session.basic_info().unwrap().clone();
    assert_eq!(first, second);
    assert_eq!(first.width, 3);
}
