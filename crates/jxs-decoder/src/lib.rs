//! Event-driven incremental decoder session
//!
//! The session is a pull-based state machine: the caller feeds input bytes
//! through an ownership-transfer lease and repeatedly calls `process_input`,
//! which returns either a subscribed event, a resumable pause (more input or
//! an output buffer is needed), or `Success`. No callbacks, no threads; the
//! caller owns the loop.
//!
//! Pauses are always resumable: supplying what the pause asked for and
//! calling `process_input` again continues exactly where parsing stopped.
//! An `Err` return is terminal and only `reset` recovers the session.

use std::collections::VecDeque;

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, trace};

use jxs_codestream::{
    decode_band, decode_frame_section, decode_image_header, read_section, interleave_rows,
    FramePayloadKind, ImageHeader, Plane, SectionTag, SECTION_HEADER_LEN,
};
use jxs_container::{
    check_signature, decompress_box_payload, read_box_header, BoxType, CODESTREAM_SIGNATURE,
    CONTAINER_SIGNATURE,
};
use jxs_core::{
    BasicInfo, BitDepth, CodestreamLevel, ColorEncoding, ColorProfile, ColorProfileTarget,
    DataType, DecoderStatus, Events, ExtraChannelInfo, FrameHeader, JxsError, JxsResult,
    PixelFormat, Signature,
};

struct InputLease {
    buf: Vec<u8>,
    cursor: usize,
}

struct PixelLease {
    format: PixelFormat,
    buf: Vec<u8>,
}

struct ByteLease {
    buf: Vec<u8>,
    written: usize,
}

/// Bytes staged for delivery into a caller-supplied byte lease.
struct ByteStream {
    data: Vec<u8>,
    offset: usize,
}

impl ByteStream {
    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

enum MetaKind {
    /// `ftyp`: validated, then dropped
    FileType,
    /// `jxll`: parsed into the stream's declared level
    Level,
    /// Surfaced to the caller as a box event
    Surface,
    /// Skipped without surfacing
    Discard,
}

struct MetaBox {
    box_type: BoxType,
    remaining: u64,
    payload: Vec<u8>,
    kind: MetaKind,
}

/// Container demultiplexer state: routes box payloads either into the
/// codestream buffer (`jxlc`/`jxlp`) or through the metadata box path.
#[derive(Default)]
struct Demux {
    codestream_remaining: u64,
    /// Payload length (minus the sequence field) of a `jxlp` box whose
    /// sequence number has not been read yet
    jxlp_pending: Option<u64>,
    next_jxlp_seq: u32,
    saw_final_jxlp: bool,
    meta: Option<MetaBox>,
}

struct FrameState {
    meta: jxs_codestream::FrameMeta,
    width: u32,
    height: u32,
    planes: Vec<Plane>,
    bands_done: u32,
    skipping: bool,
    jpeg_event_sent: bool,
}

enum SectionOutcome {
    /// Section fully handled; drop its bytes and keep going
    Consume,
    /// Section stays buffered; events were queued or state was updated and
    /// the section will be revisited
    Hold,
    /// Section stays buffered; surface a pause to the caller
    Pause(DecoderStatus),
}

/// Incremental decoder session.
#[derive(Default)]
pub struct DecoderSession {
    events: Events,
    started: bool,
    failed: bool,
    finished: bool,

    input: Option<InputLease>,
    /// Raw bytes pulled from input leases, not yet routed
    buffered: Vec<u8>,
    /// Codestream bytes awaiting section parsing
    cs: Vec<u8>,

    signature_done: bool,
    is_container: bool,
    /// Whether the codestream signature inside the container's `jxlc`/`jxlp`
    /// payload has been consumed
    cs_signature_done: bool,
    demux: Demux,
    level: Option<CodestreamLevel>,

    header: Option<ImageHeader>,
    preview_event_sent: bool,
    preview_done: bool,
    frame: Option<FrameState>,
    last_frame_header: Option<FrameHeader>,
    skip_remaining: u64,
    flush_rows: usize,
    rows_flushed: usize,

    pending: VecDeque<DecoderStatus>,

    image_out: Option<PixelLease>,
    preview_out: Option<PixelLease>,
    extra_out: Vec<Option<PixelLease>>,
    jpeg_out: Option<ByteLease>,
    box_out: Option<ByteLease>,
    decompress_boxes: bool,

    box_stream: Option<ByteStream>,
    current_box_type: Option<BoxType>,
    jpeg_stream: Option<ByteStream>,
}

fn plane_data_type(depth: &BitDepth) -> DataType {
    if depth.is_float() {
        DataType::F32
    } else if depth.bits_per_sample <= 8 {
        DataType::U8
    } else {
        DataType::U16
    }
}

fn validate_output_type(format: &PixelFormat, depth: &BitDepth) -> JxsResult<()> {
    if depth.is_float() != format.data_type.is_float() {
        return Err(JxsError::InvalidParameter(format!(
            "{:?} output does not match the sample bit depth",
            format.data_type
        )));
    }
    if !depth.is_float() {
        if depth.bits_per_sample > 16 {
            return Err(JxsError::UnsupportedFeature(
                "integer samples wider than 16 bits".to_string(),
            ));
        }
        if depth.bits_per_sample > 8 && format.data_type == DataType::U8 {
            return Err(JxsError::InvalidParameter(format!(
                "{}-bit samples do not fit a U8 output",
                depth.bits_per_sample
            )));
        }
    }
    Ok(())
}

impl DecoderSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select which informative events `process_input` surfaces.
    ///
    /// Must be called before the first `process_input`; the subscription is
    /// fixed for the life of the session (it survives `rewind`).
    pub fn subscribe_events(&mut self, events: Events) -> JxsResult<()> {
        if self.started {
            return Err(JxsError::OutOfOrder(
                "subscribe_events after processing started".to_string(),
            ));
        }
        self.events = events;
        Ok(())
    }

    /// Lease an input buffer to the session.
    pub fn set_input(&mut self, buf: Vec<u8>) -> JxsResult<()> {
        if self.input.is_some() {
            return Err(JxsError::LeaseActive("input"));
        }
        self.input = Some(InputLease { buf, cursor: 0 });
        Ok(())
    }

    /// Return the leased input buffer and the number of unconsumed bytes at
    /// its tail. With no active lease this is a no-op returning an empty
    /// buffer.
    pub fn release_input(&mut self) -> (Vec<u8>, usize) {
        match self.input.take() {
            Some(lease) => {
                let unconsumed = lease.buf.len() - lease.cursor;
                (lease.buf, unconsumed)
            }
            None => (Vec::new(), 0),
        }
    }

    /// Advance the state machine and report the next event or pause.
    pub fn process_input(&mut self) -> JxsResult<DecoderStatus> {
        if self.failed {
            return Err(JxsError::SessionFailed);
        }
        self.started = true;
        loop {
            if let Some(event) = self.pending.pop_front() {
                trace!(?event, "event");
                return Ok(event);
            }
            if self.finished {
                return Ok(DecoderStatus::Success);
            }
            match self.advance() {
                Ok(Some(pause)) => return Ok(pause),
                Ok(None) => continue,
                Err(err) => {
                    self.failed = true;
                    return Err(err);
                }
            }
        }
    }

    fn advance(&mut self) -> JxsResult<Option<DecoderStatus>> {
        self.pull_input();

        // Staged deliveries finish before any further parsing so the
        // caller-visible order matches the stream order.
        if let Some(pause) = self.pump_box_stream() {
            return Ok(Some(pause));
        }
        if let Some(pause) = self.pump_jpeg_stream() {
            return Ok(Some(pause));
        }

        if !self.signature_done {
            return self.resolve_signature();
        }

        if self.is_container {
            self.strip_embedded_signature()?;
            // Drain fully buffered codestream sections before demuxing
            // further boxes so events surface in stream order.
            if !self.cs_signature_done || read_section(&self.cs)?.is_none() {
                self.demux_container()?;
                self.strip_embedded_signature()?;
                if !self.pending.is_empty() {
                    return Ok(None);
                }
                if let Some(pause) = self.pump_box_stream() {
                    return Ok(Some(pause));
                }
            }
        } else {
            let mut raw = std::mem::take(&mut self.buffered);
            self.cs.append(&mut raw);
        }

        self.parse_codestream()
    }

    fn pull_input(&mut self) {
        if let Some(lease) = self.input.as_mut() {
            if lease.cursor < lease.buf.len() {
                self.buffered.extend_from_slice(&lease.buf[lease.cursor..]);
                lease.cursor = lease.buf.len();
            }
        }
    }

    fn resolve_signature(&mut self) -> JxsResult<Option<DecoderStatus>> {
        match check_signature(&self.buffered) {
            Signature::NotEnoughBytes => Ok(Some(DecoderStatus::NeedMoreInput)),
            Signature::Invalid => Err(JxsError::InvalidSignature),
            Signature::Codestream => {
                self.buffered.drain(..CODESTREAM_SIGNATURE.len());
                self.signature_done = true;
                self.is_container = false;
                debug!("naked codestream");
                Ok(None)
            }
            Signature::Container => {
                self.buffered.drain(..CONTAINER_SIGNATURE.len());
                self.signature_done = true;
                self.is_container = true;
                debug!("container stream");
                Ok(None)
            }
        }
    }

    fn pump_box_stream(&mut self) -> Option<DecoderStatus> {
        let stream = self.box_stream.as_mut()?;
        let lease = match self.box_out.as_mut() {
            Some(lease) => lease,
            None => return Some(DecoderStatus::BoxNeedMoreOutput),
        };
        let n = (lease.buf.len() - lease.written).min(stream.remaining());
        lease.buf[lease.written..lease.written + n]
            .copy_from_slice(&stream.data[stream.offset..stream.offset + n]);
        lease.written += n;
        stream.offset += n;
        if stream.remaining() == 0 {
            self.box_stream = None;
            None
        } else {
            Some(DecoderStatus::BoxNeedMoreOutput)
        }
    }

    fn pump_jpeg_stream(&mut self) -> Option<DecoderStatus> {
        let stream = self.jpeg_stream.as_mut()?;
        let lease = match self.jpeg_out.as_mut() {
            Some(lease) => lease,
            None => return Some(DecoderStatus::JpegNeedMoreOutput),
        };
        let n = (lease.buf.len() - lease.written).min(stream.remaining());
        lease.buf[lease.written..lease.written + n]
            .copy_from_slice(&stream.data[stream.offset..stream.offset + n]);
        lease.written += n;
        stream.offset += n;
        if stream.remaining() == 0 {
            self.jpeg_stream = None;
            None
        } else {
            Some(DecoderStatus::JpegNeedMoreOutput)
        }
    }

    /// The codestream carried inside `jxlc`/`jxlp` payloads starts with its
    /// own two-byte signature; consume it before section parsing.
    fn strip_embedded_signature(&mut self) -> JxsResult<()> {
        if self.cs_signature_done || self.cs.len() < CODESTREAM_SIGNATURE.len() {
            return Ok(());
        }
        if self.cs[..CODESTREAM_SIGNATURE.len()] != CODESTREAM_SIGNATURE {
            return Err(JxsError::InvalidBitstream(
                "boxed codestream without its signature".to_string(),
            ));
        }
        self.cs.drain(..CODESTREAM_SIGNATURE.len());
        self.cs_signature_done = true;
        Ok(())
    }

    fn demux_container(&mut self) -> JxsResult<()> {
        loop {
            if self.demux.codestream_remaining > 0 {
                if self.buffered.is_empty() {
                    return Ok(());
                }
                let n = (self.demux.codestream_remaining as usize).min(self.buffered.len());
                self.cs.extend_from_slice(&self.buffered[..n]);
                self.buffered.drain(..n);
                self.demux.codestream_remaining -= n as u64;
                continue;
            }

            if let Some(after_seq) = self.demux.jxlp_pending {
                if self.buffered.len() < 4 {
                    return Ok(());
                }
                let seq = BigEndian::read_u32(&self.buffered[..4]);
                self.buffered.drain(..4);
                self.demux.jxlp_pending = None;
                let index = seq & 0x7FFF_FFFF;
                if index != self.demux.next_jxlp_seq {
                    return Err(JxsError::InvalidBitstream(format!(
                        "jxlp sequence {} where {} was expected",
                        index, self.demux.next_jxlp_seq
                    )));
                }
                self.demux.next_jxlp_seq += 1;
                self.demux.saw_final_jxlp = seq & 0x8000_0000 != 0;
                self.demux.codestream_remaining = after_seq;
                continue;
            }

            if let Some(meta) = self.demux.meta.as_mut() {
                let n = (meta.remaining as usize).min(self.buffered.len());
                meta.payload.extend_from_slice(&self.buffered[..n]);
                self.buffered.drain(..n);
                meta.remaining -= n as u64;
                if meta.remaining > 0 {
                    return Ok(());
                }
                let meta = match self.demux.meta.take() {
                    Some(meta) => meta,
                    None => continue,
                };
                self.finish_meta_box(meta)?;
                if self.box_stream.is_some() || !self.pending.is_empty() {
                    return Ok(());
                }
                continue;
            }

            let header = match read_box_header(&self.buffered)? {
                Some(header) => header,
                None => return Ok(()),
            };
            self.buffered.drain(..header.header_len);
            trace!(box_type = ?header.box_type, len = header.payload_len, "box");
            match header.box_type {
                BoxType::Codestream => {
                    if self.demux.saw_final_jxlp || self.demux.next_jxlp_seq > 0 {
                        return Err(JxsError::InvalidBitstream(
                            "jxlc after jxlp boxes".to_string(),
                        ));
                    }
                    self.demux.codestream_remaining = header.payload_len;
                }
                BoxType::PartialCodestream => {
                    if self.demux.saw_final_jxlp {
                        return Err(JxsError::InvalidBitstream(
                            "jxlp after the final jxlp".to_string(),
                        ));
                    }
                    if header.payload_len < 4 {
                        return Err(JxsError::InvalidBitstream(
                            "jxlp too short for its sequence field".to_string(),
                        ));
                    }
                    self.demux.jxlp_pending = Some(header.payload_len - 4);
                }
                BoxType::FileType => {
                    self.demux.meta = Some(MetaBox {
                        box_type: header.box_type,
                        remaining: header.payload_len,
                        payload: Vec::new(),
                        kind: MetaKind::FileType,
                    });
                }
                BoxType::Level => {
                    self.demux.meta = Some(MetaBox {
                        box_type: header.box_type,
                        remaining: header.payload_len,
                        payload: Vec::new(),
                        kind: MetaKind::Level,
                    });
                }
                other => {
                    let kind = if self.events.contains(Events::BOX) {
                        MetaKind::Surface
                    } else {
                        MetaKind::Discard
                    };
                    self.demux.meta = Some(MetaBox {
                        box_type: other,
                        remaining: header.payload_len,
                        payload: Vec::new(),
                        kind,
                    });
                }
            }
        }
    }

    fn finish_meta_box(&mut self, meta: MetaBox) -> JxsResult<()> {
        match meta.kind {
            MetaKind::FileType => {
                if meta.payload.len() < 4 || meta.payload[0..4] != *b"jxl " {
                    return Err(JxsError::InvalidBitstream(
                        "ftyp box without the jxl brand".to_string(),
                    ));
                }
            }
            MetaKind::Level => {
                self.level = match meta.payload.as_slice() {
                    [5] => Some(CodestreamLevel::Level5),
                    [10] => Some(CodestreamLevel::Level10),
                    _ => {
                        return Err(JxsError::InvalidBitstream(
                            "unrecognized codestream level".to_string(),
                        ))
                    }
                };
            }
            MetaKind::Surface => {
                let (box_type, data) = if self.decompress_boxes && meta.box_type == BoxType::Brotli
                {
                    decompress_box_payload(&meta.payload)?
                } else {
                    (meta.box_type, meta.payload)
                };
                self.current_box_type = Some(box_type);
                self.box_stream = Some(ByteStream { data, offset: 0 });
                self.pending.push_back(DecoderStatus::Box);
                debug!(?box_type, "box surfaced");
            }
            MetaKind::Discard => {}
        }
        Ok(())
    }

    fn parse_codestream(&mut self) -> JxsResult<Option<DecoderStatus>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            let (tag, total) = match read_section(&self.cs)? {
                None => return Ok(Some(DecoderStatus::NeedMoreInput)),
                Some((tag, _, total)) => (tag, total),
            };
            let outcome = self.handle_section(tag, total)?;
            match outcome {
                SectionOutcome::Consume => {
                    self.cs.drain(..total);
                    if !self.pending.is_empty() || self.jpeg_stream.is_some() {
                        return Ok(None);
                    }
                }
                SectionOutcome::Hold => return Ok(None),
                SectionOutcome::Pause(status) => return Ok(Some(status)),
            }
        }
    }

    fn handle_section(&mut self, tag: SectionTag, total: usize) -> JxsResult<SectionOutcome> {
        match tag {
            SectionTag::ImageHeader => {
                if self.header.is_some() {
                    return Err(JxsError::OutOfOrder("second image header".to_string()));
                }
                let payload = &self.cs[SECTION_HEADER_LEN..total];
                let header = decode_image_header(payload)?;
                debug!(
                    width = header.basic.width,
                    height = header.basic.height,
                    "image header"
                );
                self.extra_out
                    .resize_with(header.basic.num_extra_channels as usize, || None);
                self.header = Some(header);
                if self.events.contains(Events::BASIC_INFO) {
                    self.pending.push_back(DecoderStatus::BasicInfo);
                }
                if self.events.contains(Events::COLOR_ENCODING) {
                    self.pending.push_back(DecoderStatus::ColorEncoding);
                }
                Ok(SectionOutcome::Consume)
            }

            SectionTag::Preview => {
                let header = self
                    .header
                    .as_ref()
                    .ok_or_else(|| JxsError::OutOfOrder("preview before header".to_string()))?;
                let (pw, ph) = match header.basic.preview_size {
                    Some(size) if !self.preview_done => size,
                    _ => {
                        return Err(JxsError::OutOfOrder(
                            "unexpected preview section".to_string(),
                        ))
                    }
                };
                if !self.events.contains(Events::PREVIEW_IMAGE) {
                    self.preview_done = true;
                    return Ok(SectionOutcome::Consume);
                }
                if !self.preview_event_sent {
                    self.preview_event_sent = true;
                    self.pending.push_back(DecoderStatus::PreviewImage);
                    return Ok(SectionOutcome::Hold);
                }
                let lease = match self.preview_out.as_mut() {
                    Some(lease) => lease,
                    None => {
                        return Ok(SectionOutcome::Pause(DecoderStatus::NeedPreviewOutBuffer))
                    }
                };
                let channels = lease.format.num_channels as usize;
                let sample_type = plane_data_type(&header.basic.bit_depth);
                let mut planes: Vec<Plane> = (0..channels)
                    .map(|_| Plane::new(sample_type, pw as usize * ph as usize))
                    .collect();
                let payload = &self.cs[SECTION_HEADER_LEN..total];
                let band = decode_band(payload, pw as usize, ph as usize, &mut planes, 1)?;
                let refs: Vec<&Plane> = planes.iter().collect();
                interleave_rows(&lease.format, &refs, pw, band.rows, &mut lease.buf)?;
                self.preview_done = true;
                Ok(SectionOutcome::Consume)
            }

            SectionTag::FrameHeader => {
                let header = self
                    .header
                    .as_ref()
                    .ok_or_else(|| JxsError::OutOfOrder("frame before header".to_string()))?;
                if self.frame.is_some() {
                    return Err(JxsError::OutOfOrder(
                        "frame header inside a frame".to_string(),
                    ));
                }
                let payload = &self.cs[SECTION_HEADER_LEN..total];
                let (frame_header, meta) = decode_frame_section(payload)?;
                let (width, height) = match frame_header.crop {
                    Some(rect) => (rect.width, rect.height),
                    None => (header.basic.width, header.basic.height),
                };
                let skipping = frame_header.is_display() && self.skip_remaining > 0;

                let mut plane_types = Vec::with_capacity(header.basic.total_channels() as usize);
                for _ in 0..header.basic.num_color_channels {
                    plane_types.push(plane_data_type(&header.basic.bit_depth));
                }
                for extra in &header.extra {
                    plane_types.push(plane_data_type(&extra.bit_depth));
                }
                let planes = plane_types
                    .into_iter()
                    .map(|ty| Plane::new(ty, width as usize * height as usize))
                    .collect();

                debug!(width, height, skipping, "frame header");
                self.last_frame_header = Some(frame_header);
                self.flush_rows = 0;
                self.rows_flushed = 0;
                if !skipping && self.events.contains(Events::FRAME) {
                    self.pending.push_back(DecoderStatus::Frame);
                }
                self.frame = Some(FrameState {
                    meta,
                    width,
                    height,
                    planes,
                    bands_done: 0,
                    skipping,
                    jpeg_event_sent: false,
                });
                Ok(SectionOutcome::Consume)
            }

            SectionTag::Band => {
                let frame = self
                    .frame
                    .as_mut()
                    .ok_or_else(|| JxsError::OutOfOrder("band outside a frame".to_string()))?;
                if frame.meta.kind != FramePayloadKind::Pixels {
                    return Err(JxsError::OutOfOrder("band in a JPEG frame".to_string()));
                }
                // Only a FULL_IMAGE subscriber is owed pixels; anyone else
                // decodes and discards, like the skip path.
                if !frame.skipping
                    && self.image_out.is_none()
                    && self.events.contains(Events::FULL_IMAGE)
                {
                    return Ok(SectionOutcome::Pause(DecoderStatus::NeedImageOutBuffer));
                }
                let payload = &self.cs[SECTION_HEADER_LEN..total];
                let band = decode_band(
                    payload,
                    frame.width as usize,
                    frame.height as usize,
                    &mut frame.planes,
                    frame.meta.quant_step,
                )?;

                if !frame.skipping {
                    if let Some(lease) = self.image_out.as_mut() {
                        let channels = lease.format.num_channels as usize;
                        let required = lease.format.buffer_size(frame.width, frame.height);
                        if lease.buf.len() < required {
                            return Err(JxsError::BufferTooSmall {
                                expected: required,
                                actual: lease.buf.len(),
                            });
                        }
                        let refs: Vec<&Plane> = frame.planes[..channels].iter().collect();
                        interleave_rows(
                            &lease.format,
                            &refs,
                            frame.width,
                            band.rows.clone(),
                            &mut lease.buf,
                        )?;
                    }
                    let color_channels = frame
                        .planes
                        .len()
                        .saturating_sub(self.extra_out.len());
                    for (index, slot) in self.extra_out.iter_mut().enumerate() {
                        if let Some(lease) = slot.as_mut() {
                            let plane = &frame.planes[color_channels + index];
                            interleave_rows(
                                &lease.format,
                                &[plane],
                                frame.width,
                                band.rows.clone(),
                                &mut lease.buf,
                            )?;
                        }
                    }
                    self.flush_rows = self.flush_rows.max(band.rows.end);
                }

                frame.bands_done += 1;
                if frame.bands_done >= frame.meta.band_count {
                    let frame = match self.frame.take() {
                        Some(frame) => frame,
                        None => return Err(JxsError::SessionFailed),
                    };
                    debug!(bands = frame.bands_done, "frame complete");
                    if frame.skipping {
                        self.skip_remaining -= 1;
                    } else if self.events.contains(Events::FULL_IMAGE) {
                        self.pending.push_back(DecoderStatus::FullImage);
                    }
                }
                Ok(SectionOutcome::Consume)
            }

            SectionTag::JpegData => {
                let frame = self
                    .frame
                    .as_mut()
                    .ok_or_else(|| JxsError::OutOfOrder("JPEG data outside a frame".to_string()))?;
                if frame.meta.kind != FramePayloadKind::Jpeg {
                    return Err(JxsError::OutOfOrder(
                        "JPEG data in a pixel frame".to_string(),
                    ));
                }
                let deliver =
                    !frame.skipping && self.events.contains(Events::JPEG_RECONSTRUCTION);
                if deliver && !frame.jpeg_event_sent {
                    frame.jpeg_event_sent = true;
                    self.pending.push_back(DecoderStatus::JpegReconstruction);
                    return Ok(SectionOutcome::Hold);
                }
                if deliver {
                    let payload = &self.cs[SECTION_HEADER_LEN..total];
                    self.jpeg_stream = Some(ByteStream {
                        data: payload.to_vec(),
                        offset: 0,
                    });
                }
                let frame = match self.frame.take() {
                    Some(frame) => frame,
                    None => return Err(JxsError::SessionFailed),
                };
                if frame.skipping {
                    self.skip_remaining -= 1;
                }
                Ok(SectionOutcome::Consume)
            }

            SectionTag::End => {
                if self.frame.is_some() {
                    return Err(JxsError::InvalidBitstream(
                        "stream ended inside a frame".to_string(),
                    ));
                }
                if self.header.is_none() {
                    return Err(JxsError::InvalidBitstream(
                        "stream ended before the image header".to_string(),
                    ));
                }
                debug!("end of codestream");
                self.finished = true;
                Ok(SectionOutcome::Consume)
            }
        }
    }

    // ---- queries -------------------------------------------------------

    /// Basic image information; `NotReady` until the header is parsed.
    pub fn basic_info(&self) -> JxsResult<&BasicInfo> {
        self.header
            .as_ref()
            .map(|h| &h.basic)
            .ok_or(JxsError::NotReady("basic info"))
    }

    /// Structured color encoding, when the stream carries one.
    pub fn color_as_encoded_profile(
        &self,
        _target: ColorProfileTarget,
    ) -> JxsResult<ColorEncoding> {
        let header = self.header.as_ref().ok_or(JxsError::NotReady("color"))?;
        match &header.color {
            ColorProfile::Encoding(enc) => Ok(*enc),
            ColorProfile::Icc(_) => Err(JxsError::UnsupportedFeature(
                "ICC profile has no structured encoding".to_string(),
            )),
        }
    }

    /// Raw ICC profile bytes, when the stream carries an ICC profile.
    pub fn color_as_icc_profile(&self, _target: ColorProfileTarget) -> JxsResult<&[u8]> {
        let header = self.header.as_ref().ok_or(JxsError::NotReady("color"))?;
        match &header.color {
            ColorProfile::Icc(data) => Ok(data),
            ColorProfile::Encoding(_) => Err(JxsError::UnsupportedFeature(
                "structured encoding has no ICC representation".to_string(),
            )),
        }
    }

    /// Description of extra channel `index`.
    pub fn extra_channel_info(&self, index: usize) -> JxsResult<&ExtraChannelInfo> {
        let header = self
            .header
            .as_ref()
            .ok_or(JxsError::NotReady("extra channel info"))?;
        header.extra.get(index).ok_or_else(|| {
            JxsError::InvalidParameter(format!("extra channel {} out of range", index))
        })
    }

    /// Header of the most recent frame; `NotReady` before the first frame
    /// event.
    pub fn frame_header(&self) -> JxsResult<&FrameHeader> {
        self.last_frame_header
            .as_ref()
            .ok_or(JxsError::NotReady("frame header"))
    }

    /// Type of the box being delivered; `NotReady` outside a box read.
    pub fn box_type(&self) -> JxsResult<BoxType> {
        self.current_box_type.ok_or(JxsError::NotReady("box type"))
    }

    /// Codestream level declared by the container, when present.
    pub fn codestream_level(&self) -> Option<CodestreamLevel> {
        self.level
    }

    // ---- output leases -------------------------------------------------

    /// Lease the frame output buffer. Requires the header to be known so the
    /// format can be validated against it.
    pub fn set_image_out_buffer(&mut self, format: &PixelFormat, buf: Vec<u8>) -> JxsResult<()> {
        let basic = self.basic_info()?.clone();
        if self.image_out.is_some() {
            return Err(JxsError::LeaseActive("image output"));
        }
        validate_output_type(format, &basic.bit_depth)?;
        if format.num_channels > basic.total_channels() {
            return Err(JxsError::InvalidParameter(format!(
                "{} output channels but the image has {}",
                format.num_channels,
                basic.total_channels()
            )));
        }
        format.validate_buffer(buf.len(), basic.width, basic.height)?;
        self.image_out = Some(PixelLease {
            format: *format,
            buf,
        });
        Ok(())
    }

    /// Take back the image output buffer, ending the lease.
    pub fn take_image_out_buffer(&mut self) -> Option<Vec<u8>> {
        self.image_out.take().map(|lease| lease.buf)
    }

    /// Lease the preview output buffer.
    pub fn set_preview_out_buffer(&mut self, format: &PixelFormat, buf: Vec<u8>) -> JxsResult<()> {
        let basic = self.basic_info()?.clone();
        let (pw, ph) = basic
            .preview_size
            .ok_or_else(|| JxsError::InvalidParameter("no preview image declared".to_string()))?;
        if self.preview_out.is_some() {
            return Err(JxsError::LeaseActive("preview output"));
        }
        validate_output_type(format, &basic.bit_depth)?;
        if format.num_channels != basic.num_color_channels {
            return Err(JxsError::InvalidParameter(format!(
                "preview output must have {} channels",
                basic.num_color_channels
            )));
        }
        format.validate_buffer(buf.len(), pw, ph)?;
        self.preview_out = Some(PixelLease {
            format: *format,
            buf,
        });
        Ok(())
    }

    pub fn take_preview_out_buffer(&mut self) -> Option<Vec<u8>> {
        self.preview_out.take().map(|lease| lease.buf)
    }

    /// Lease an output buffer for extra channel `index`.
    pub fn set_extra_channel_out_buffer(
        &mut self,
        index: usize,
        format: &PixelFormat,
        buf: Vec<u8>,
    ) -> JxsResult<()> {
        let basic = self.basic_info()?.clone();
        let info = self.extra_channel_info(index)?.clone();
        if format.num_channels != 1 {
            return Err(JxsError::InvalidParameter(
                "extra channel output must be single-channel".to_string(),
            ));
        }
        validate_output_type(format, &info.bit_depth)?;
        format.validate_buffer(buf.len(), basic.width, basic.height)?;
        let slot = &mut self.extra_out[index];
        if slot.is_some() {
            return Err(JxsError::LeaseActive("extra channel output"));
        }
        *slot = Some(PixelLease {
            format: *format,
            buf,
        });
        Ok(())
    }

    pub fn take_extra_channel_out_buffer(&mut self, index: usize) -> Option<Vec<u8>> {
        self.extra_out
            .get_mut(index)
            .and_then(|slot| slot.take())
            .map(|lease| lease.buf)
    }

    /// Lease a buffer for reconstructed JPEG bytes.
    pub fn set_jpeg_out_buffer(&mut self, buf: Vec<u8>) -> JxsResult<()> {
        if self.jpeg_out.is_some() {
            return Err(JxsError::LeaseActive("JPEG output"));
        }
        self.jpeg_out = Some(ByteLease { buf, written: 0 });
        Ok(())
    }

    /// Release the JPEG buffer; returns it and the number of unused bytes at
    /// its tail.
    pub fn release_jpeg_out_buffer(&mut self) -> (Vec<u8>, usize) {
        match self.jpeg_out.take() {
            Some(lease) => {
                let unused = lease.buf.len() - lease.written;
                (lease.buf, unused)
            }
            None => (Vec::new(), 0),
        }
    }

    /// Lease a buffer for metadata box contents.
    pub fn set_box_out_buffer(&mut self, buf: Vec<u8>) -> JxsResult<()> {
        if self.box_out.is_some() {
            return Err(JxsError::LeaseActive("box output"));
        }
        self.box_out = Some(ByteLease { buf, written: 0 });
        Ok(())
    }

    pub fn release_box_out_buffer(&mut self) -> (Vec<u8>, usize) {
        match self.box_out.take() {
            Some(lease) => {
                let unused = lease.buf.len() - lease.written;
                (lease.buf, unused)
            }
            None => (Vec::new(), 0),
        }
    }

    /// Transparently unwrap `brob` boxes before delivery. Cannot be toggled
    /// while a box is being delivered.
    pub fn set_decompress_boxes(&mut self, on: bool) -> JxsResult<()> {
        if self.box_stream.is_some() {
            return Err(JxsError::OutOfOrder(
                "set_decompress_boxes during a box read".to_string(),
            ));
        }
        self.decompress_boxes = on;
        Ok(())
    }

    // ---- flow control --------------------------------------------------

    /// Make rows decoded so far visible in the output buffer.
    ///
    /// Returns the number of rows available. `OutputBufferNotSet` and
    /// `NothingToFlush` classify the two non-fatal failure modes.
    pub fn flush_image(&mut self) -> JxsResult<usize> {
        if self.image_out.is_none() {
            return Err(JxsError::OutputBufferNotSet);
        }
        if self.flush_rows == self.rows_flushed || self.flush_rows == 0 {
            return Err(JxsError::NothingToFlush);
        }
        self.rows_flushed = self.flush_rows;
        Ok(self.flush_rows)
    }

    /// Skip the next `n` displayed frames. Counts accumulate and saturate at
    /// the end of the stream; reference-only frames never count.
    pub fn skip_frames(&mut self, n: usize) {
        self.skip_remaining = self.skip_remaining.saturating_add(n as u64);
    }

    /// Return to the start of the stream, keeping event subscriptions, the
    /// pending skip count, and output leases. The caller re-feeds the input
    /// from the beginning.
    pub fn rewind(&mut self) -> JxsResult<()> {
        if self.failed {
            return Err(JxsError::SessionFailed);
        }
        if self.input.is_some() {
            return Err(JxsError::LeaseActive("input"));
        }
        self.buffered.clear();
        self.cs.clear();
        self.signature_done = false;
        self.is_container = false;
        self.cs_signature_done = false;
        self.demux = Demux::default();
        self.level = None;
        self.header = None;
        self.preview_event_sent = false;
        self.preview_done = false;
        self.frame = None;
        self.last_frame_header = None;
        self.flush_rows = 0;
        self.rows_flushed = 0;
        self.pending.clear();
        self.finished = false;
        self.box_stream = None;
        self.current_box_type = None;
        self.jpeg_stream = None;
        Ok(())
    }

    /// Restore the session to its freshly constructed state.
    pub fn reset(&mut self) {
        *self = DecoderSession::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jxs_codestream::{encode_image_header, write_section};
    use jxs_container::{file_type_payload, write_box};

    fn minimal_codestream() -> Vec<u8> {
        let header = ImageHeader {
            basic: BasicInfo::new(1, 1),
            color: ColorProfile::Encoding(ColorEncoding::srgb()),
            extra: Vec::new(),
        };
        let mut cs = Vec::new();
        cs.extend_from_slice(&CODESTREAM_SIGNATURE);
        write_section(
            &mut cs,
            SectionTag::ImageHeader,
            &encode_image_header(&header).unwrap(),
        );
        write_section(&mut cs, SectionTag::End, &[]);
        cs
    }

    fn wrap_in_container(cs: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&CONTAINER_SIGNATURE);
        write_box(&mut out, BoxType::FileType, &file_type_payload()).unwrap();
        write_box(&mut out, BoxType::Codestream, cs).unwrap();
        out
    }

    #[test]
    fn test_boxed_codestream_keeps_its_signature() {
        let mut session = DecoderSession::new();
        session.subscribe_events(Events::BASIC_INFO).unwrap();
        session
            .set_input(wrap_in_container(&minimal_codestream()))
            .unwrap();
        assert_eq!(session.process_input().unwrap(), DecoderStatus::BasicInfo);
        assert_eq!(session.basic_info().unwrap().width, 1);
        assert_eq!(session.process_input().unwrap(), DecoderStatus::Success);
    }

    #[test]
    fn test_boxed_codestream_without_signature_rejected() {
        // jxlc payload starting straight at the first section is malformed.
        let cs = minimal_codestream();
        let bare = &cs[CODESTREAM_SIGNATURE.len()..];
        let mut session = DecoderSession::new();
        session.set_input(wrap_in_container(bare)).unwrap();
        assert!(matches!(
            session.process_input(),
            Err(JxsError::InvalidBitstream(_))
        ));
    }

    #[test]
    fn test_fresh_session_needs_input() {
        let mut session = DecoderSession::new();
        assert_eq!(
            session.process_input().unwrap(),
            DecoderStatus::NeedMoreInput
        );
    }

    #[test]
    fn test_subscribe_locked_after_start() {
        let mut session = DecoderSession::new();
        session.process_input().unwrap();
        assert!(matches!(
            session.subscribe_events(Events::ALL),
            Err(JxsError::OutOfOrder(_))
        ));
    }

    #[test]
    fn test_input_lease_exclusive() {
        let mut session = DecoderSession::new();
        session.set_input(vec![0xFF]).unwrap();
        assert!(matches!(
            session.set_input(vec![0x0A]),
            Err(JxsError::LeaseActive("input"))
        ));
        let (buf, unconsumed) = session.release_input();
        assert_eq!(buf, vec![0xFF]);
        assert_eq!(unconsumed, 1);
    }

    #[test]
    fn test_invalid_signature_is_terminal() {
        let mut session = DecoderSession::new();
        session.set_input(b"not a jxl stream".to_vec()).unwrap();
        assert!(matches!(
            session.process_input(),
            Err(JxsError::InvalidSignature)
        ));
        assert!(matches!(
            session.process_input(),
            Err(JxsError::SessionFailed)
        ));
        session.reset();
        assert_eq!(
            session.process_input().unwrap(),
            DecoderStatus::NeedMoreInput
        );
    }

    #[test]
    fn test_queries_not_ready() {
        let session = DecoderSession::new();
        assert!(matches!(
            session.basic_info(),
            Err(JxsError::NotReady("basic info"))
        ));
        assert!(matches!(
            session.frame_header(),
            Err(JxsError::NotReady("frame header"))
        ));
        assert!(matches!(session.box_type(), Err(JxsError::NotReady(_))));
    }

    #[test]
    fn test_flush_without_buffer() {
        let mut session = DecoderSession::new();
        assert!(matches!(
            session.flush_image(),
            Err(JxsError::OutputBufferNotSet)
        ));
    }

    #[test]
    fn test_rewind_blocked_by_input_lease() {
        let mut session = DecoderSession::new();
        session.set_input(vec![0xFF, 0x0A]).unwrap();
        assert!(matches!(
            session.rewind(),
            Err(JxsError::LeaseActive("input"))
        ));
        session.release_input();
        session.rewind().unwrap();
    }

    #[test]
    fn test_output_type_validation() {
        let depth = BitDepth::integer(12);
        assert!(validate_output_type(&PixelFormat::new(3, DataType::U16), &depth).is_ok());
        assert!(validate_output_type(&PixelFormat::new(3, DataType::U8), &depth).is_err());
        assert!(validate_output_type(&PixelFormat::new(3, DataType::F32), &depth).is_err());

        let float_depth = BitDepth::float(32, 8);
        assert!(validate_output_type(&PixelFormat::new(3, DataType::F32), &float_depth).is_ok());
        assert!(validate_output_type(&PixelFormat::new(3, DataType::U16), &float_depth).is_err());
    }
}
