//! Incremental multiplexed encoder session
//!
//! Frames, metadata boxes, and configuration are enqueued on the session;
//! `process_output` drains the queue one item at a time, serializing into an
//! internal buffer and handing the bytes to the caller's sink with a single
//! write per call. Bytes already written are never revised, so the sink only
//! ever appends.
//!
//! The output stalls at `Pending` until the caller closes what it opened:
//! `close_frames` finishes the codestream, `close_boxes` finishes the box
//! stream, and `close_input` does both.

use std::collections::VecDeque;
use std::io::Write;

use tracing::{debug, trace};

use jxs_codestream::{
    band_count, deinterleave, encode_band, encode_frame_section, encode_image_header,
    write_section, FrameMeta, FramePayloadKind, ImageHeader, Plane, SectionTag, BAND_ROWS,
};
use jxs_container::{
    compress_box_payload, file_type_payload, write_box, BoxType, CODESTREAM_SIGNATURE,
    CONTAINER_SIGNATURE,
};
use jxs_core::{
    BasicInfo, CodestreamLevel, ColorEncoding, ColorProfile, DataType, EncoderStatus, ErrorKind,
    ExtraChannelInfo, FrameHeader, JxsError, JxsResult, PixelFormat,
};

const JXLP_FINAL_BIT: u32 = 0x8000_0000;

/// Handle to a set of per-frame encoder settings.
///
/// The handle is an index into a session-owned arena; it never keeps the
/// settings alive. Handles go stale when `close_frames` retires the arena,
/// and using one afterwards returns `JxsError::StaleFrameSettings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSettingsId(usize);

/// Per-frame integer options settable through `set_frame_option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOption {
    /// Encode effort, 1 (fastest) to 9 (most thorough)
    Effort,
    /// Decode speed tier, 0 (default) to 4 (fastest)
    DecodingSpeed,
}

#[derive(Clone)]
struct FrameSettings {
    distance: f32,
    lossless: bool,
    effort: u32,
    decoding_speed: u32,
    header: FrameHeader,
    /// Extra channel planes staged for the next `add_image_frame`
    staged_extra: Vec<Option<Plane>>,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            distance: 1.0,
            lossless: false,
            effort: 7,
            decoding_speed: 0,
            header: FrameHeader::default(),
            staged_extra: Vec::new(),
        }
    }
}

impl FrameSettings {
    fn quant_step(&self) -> u32 {
        if self.lossless || self.distance == 0.0 {
            1
        } else {
            1 + (self.distance * 2.0).round() as u32
        }
    }
}

enum QueueItem {
    /// Codestream bytes: header sections or one frame's sections
    Codestream(Vec<u8>),
    /// A complete metadata box payload, already brob-wrapped if requested
    MetaBox { box_type: BoxType, payload: Vec<u8> },
    /// Codestream terminator; carries the final-jxlp marker in container mode
    End,
}

/// Incremental encoder session.
#[derive(Default)]
pub struct EncoderSession {
    basic: Option<BasicInfo>,
    color: Option<ColorProfile>,
    extra: Vec<Option<ExtraChannelInfo>>,
    preview_payload: Option<Vec<u8>>,

    container: bool,
    store_jpeg_metadata: bool,
    level: Option<CodestreamLevel>,
    boxes_enabled: bool,

    frames_closed: bool,
    boxes_closed: bool,
    started_output: bool,
    header_queued: bool,
    preamble_written: bool,

    settings: Vec<Option<FrameSettings>>,
    queue: VecDeque<QueueItem>,
    next_jxlp_seq: u32,
    buf: Vec<u8>,
    last_error: Option<ErrorKind>,
}

fn validate_input_type(format: &PixelFormat, basic: &BasicInfo) -> JxsResult<()> {
    let depth = &basic.bit_depth;
    if depth.is_float() != format.data_type.is_float() {
        return Err(JxsError::InvalidParameter(format!(
            "{:?} input does not match the declared bit depth",
            format.data_type
        )));
    }
    if !depth.is_float() && depth.bits_per_sample > 8 && format.data_type == DataType::U8 {
        return Err(JxsError::InvalidParameter(format!(
            "U8 input cannot carry {}-bit samples",
            depth.bits_per_sample
        )));
    }
    Ok(())
}

impl EncoderSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, err: JxsError) -> JxsError {
        self.last_error = Some(err.kind());
        err
    }

    fn frozen(&self) -> bool {
        self.started_output || self.header_queued
    }

    // ---- one-time configuration ----------------------------------------

    /// Declare the image dimensions, bit depth, and channel layout.
    pub fn set_basic_info(&mut self, info: BasicInfo) -> JxsResult<()> {
        if self.frozen() {
            return Err(self.fail(JxsError::OutOfOrder(
                "set_basic_info after encoding started".to_string(),
            )));
        }
        if info.width == 0 || info.height == 0 {
            return Err(self.fail(JxsError::InvalidDimensions {
                width: info.width,
                height: info.height,
            }));
        }
        if info.num_color_channels != 1 && info.num_color_channels != 3 {
            return Err(self.fail(JxsError::InvalidParameter(format!(
                "{} color channels not supported",
                info.num_color_channels
            ))));
        }
        self.extra
            .resize_with(info.num_extra_channels as usize, || None);
        self.basic = Some(info);
        Ok(())
    }

    pub fn set_color_encoding(&mut self, encoding: ColorEncoding) -> JxsResult<()> {
        if self.frozen() {
            return Err(self.fail(JxsError::OutOfOrder(
                "set_color_encoding after encoding started".to_string(),
            )));
        }
        self.color = Some(ColorProfile::Encoding(encoding));
        Ok(())
    }

    pub fn set_icc_profile(&mut self, icc: Vec<u8>) -> JxsResult<()> {
        if self.frozen() {
            return Err(self.fail(JxsError::OutOfOrder(
                "set_icc_profile after encoding started".to_string(),
            )));
        }
        if icc.is_empty() {
            return Err(self.fail(JxsError::InvalidParameter(
                "empty ICC profile".to_string(),
            )));
        }
        self.color = Some(ColorProfile::Icc(icc));
        Ok(())
    }

    /// Describe extra channel `index`; every declared channel must be
    /// described before the first frame.
    pub fn set_extra_channel_info(&mut self, index: usize, info: ExtraChannelInfo) -> JxsResult<()> {
        if self.frozen() {
            return Err(self.fail(JxsError::OutOfOrder(
                "set_extra_channel_info after encoding started".to_string(),
            )));
        }
        match self.extra.get_mut(index) {
            Some(slot) => {
                *slot = Some(info);
                Ok(())
            }
            None => Err(self.fail(JxsError::InvalidParameter(format!(
                "extra channel {} out of range",
                index
            )))),
        }
    }

    /// Supply preview pixels; the header must declare a preview size.
    pub fn set_preview_image(&mut self, format: &PixelFormat, pixels: &[u8]) -> JxsResult<()> {
        match self.set_preview_image_inner(format, pixels) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn set_preview_image_inner(&mut self, format: &PixelFormat, pixels: &[u8]) -> JxsResult<()> {
        if self.frozen() {
            return Err(JxsError::OutOfOrder(
                "set_preview_image after encoding started".to_string(),
            ));
        }
        let basic = self
            .basic
            .as_ref()
            .ok_or_else(|| JxsError::OutOfOrder("set_preview_image before set_basic_info".to_string()))?;
        let (pw, ph) = basic.preview_size.ok_or_else(|| {
            JxsError::InvalidParameter("basic info declares no preview".to_string())
        })?;
        if format.num_channels != basic.num_color_channels {
            return Err(JxsError::InvalidParameter(format!(
                "preview must have {} channels",
                basic.num_color_channels
            )));
        }
        validate_input_type(format, basic)?;
        let planes = deinterleave(format, pixels, pw, ph)?;
        self.preview_payload = Some(encode_band(0, 0..ph as usize, pw as usize, &planes, 1)?);
        Ok(())
    }

    // ---- output policy -------------------------------------------------

    /// Wrap the codestream in a box container.
    pub fn use_container(&mut self, on: bool) -> JxsResult<()> {
        if self.started_output {
            return Err(self.fail(JxsError::OutOfOrder(
                "use_container after output started".to_string(),
            )));
        }
        if !on && (self.boxes_enabled || self.store_jpeg_metadata) {
            return Err(self.fail(JxsError::InvalidParameter(
                "boxes and JPEG metadata require the container".to_string(),
            )));
        }
        self.container = on;
        Ok(())
    }

    /// Duplicate JPEG passthrough bytes into a `jbrd` box. Implies the
    /// container.
    pub fn store_jpeg_metadata(&mut self, on: bool) -> JxsResult<()> {
        if self.started_output {
            return Err(self.fail(JxsError::OutOfOrder(
                "store_jpeg_metadata after output started".to_string(),
            )));
        }
        self.store_jpeg_metadata = on;
        if on {
            self.container = true;
        }
        Ok(())
    }

    /// Declare the conformance level written to the `jxll` box.
    pub fn set_codestream_level(&mut self, level: CodestreamLevel) -> JxsResult<()> {
        if self.started_output {
            return Err(self.fail(JxsError::OutOfOrder(
                "set_codestream_level after output started".to_string(),
            )));
        }
        match self.required_codestream_level() {
            None => {
                return Err(self.fail(JxsError::UnsupportedFeature(
                    "image is not encodable at any level".to_string(),
                )))
            }
            Some(required) if required.as_i32() > level.as_i32() => {
                return Err(self.fail(JxsError::InvalidParameter(format!(
                    "image requires level {}",
                    required.as_i32()
                ))))
            }
            Some(_) => {}
        }
        self.level = Some(level);
        self.container = true;
        Ok(())
    }

    /// Allow `add_box` calls. Implies the container.
    pub fn use_boxes(&mut self) -> JxsResult<()> {
        if self.started_output {
            return Err(self.fail(JxsError::OutOfOrder(
                "use_boxes after output started".to_string(),
            )));
        }
        self.boxes_enabled = true;
        self.container = true;
        Ok(())
    }

    /// The lowest conformance level this image fits, or `None` when it is
    /// not encodable at any level.
    pub fn required_codestream_level(&self) -> Option<CodestreamLevel> {
        let basic = match self.basic.as_ref() {
            Some(basic) => basic,
            None => return Some(CodestreamLevel::Level5),
        };
        let limit_l10 = 1u64 << 30;
        if basic.width as u64 > limit_l10 || basic.height as u64 > limit_l10 {
            return None;
        }
        let limit_l5 = 1u64 << 18;
        let big = basic.width as u64 > limit_l5 || basic.height as u64 > limit_l5;
        if big || basic.bit_depth.bits_per_sample > 16 || basic.num_extra_channels > 4 {
            Some(CodestreamLevel::Level10)
        } else {
            Some(CodestreamLevel::Level5)
        }
    }

    /// Classification of the most recent error, for diagnostics after the
    /// original `Err` has been consumed.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    // ---- frame settings arena ------------------------------------------

    pub fn create_frame_settings(&mut self) -> FrameSettingsId {
        self.settings.push(Some(FrameSettings::default()));
        FrameSettingsId(self.settings.len() - 1)
    }

    /// Duplicate a live settings slot; staged extra channel buffers are not
    /// carried over.
    pub fn clone_frame_settings(&mut self, id: FrameSettingsId) -> JxsResult<FrameSettingsId> {
        let mut copy = self.settings_ref(id)?.clone();
        copy.staged_extra.clear();
        self.settings.push(Some(copy));
        Ok(FrameSettingsId(self.settings.len() - 1))
    }

    fn settings_ref(&mut self, id: FrameSettingsId) -> JxsResult<&FrameSettings> {
        if self.settings.get(id.0).and_then(Option::as_ref).is_none() {
            return Err(self.fail(JxsError::StaleFrameSettings));
        }
        Ok(self.settings[id.0].as_ref().ok_or(JxsError::StaleFrameSettings)?)
    }

    fn settings_mut(&mut self, id: FrameSettingsId) -> JxsResult<&mut FrameSettings> {
        if self.settings.get(id.0).and_then(Option::as_ref).is_none() {
            return Err(self.fail(JxsError::StaleFrameSettings));
        }
        Ok(self.settings[id.0].as_mut().ok_or(JxsError::StaleFrameSettings)?)
    }

    /// Butteraugli-style distance; 0 is lossless, larger is lossier.
    pub fn set_frame_distance(&mut self, id: FrameSettingsId, distance: f32) -> JxsResult<()> {
        if !(0.0..=25.0).contains(&distance) {
            return Err(self.fail(JxsError::InvalidParameter(format!(
                "distance {} out of range",
                distance
            ))));
        }
        self.settings_mut(id)?.distance = distance;
        Ok(())
    }

    pub fn set_frame_lossless(&mut self, id: FrameSettingsId, lossless: bool) -> JxsResult<()> {
        self.settings_mut(id)?.lossless = lossless;
        Ok(())
    }

    pub fn set_frame_option(
        &mut self,
        id: FrameSettingsId,
        option: FrameOption,
        value: i64,
    ) -> JxsResult<()> {
        let valid = match option {
            FrameOption::Effort => (1..=9).contains(&value),
            FrameOption::DecodingSpeed => (0..=4).contains(&value),
        };
        if !valid {
            return Err(self.fail(JxsError::InvalidParameter(format!(
                "{:?} value {} out of range",
                option, value
            ))));
        }
        let settings = self.settings_mut(id)?;
        match option {
            FrameOption::Effort => settings.effort = value as u32,
            FrameOption::DecodingSpeed => settings.decoding_speed = value as u32,
        }
        Ok(())
    }

    pub fn set_frame_header(&mut self, id: FrameSettingsId, header: FrameHeader) -> JxsResult<()> {
        self.settings_mut(id)?.header = header;
        Ok(())
    }

    /// Stage pixels for extra channel `index`, consumed by the next
    /// `add_image_frame` on the same settings.
    pub fn set_extra_channel_buffer(
        &mut self,
        id: FrameSettingsId,
        index: usize,
        format: &PixelFormat,
        data: &[u8],
    ) -> JxsResult<()> {
        match self.set_extra_channel_buffer_inner(id, index, format, data) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn set_extra_channel_buffer_inner(
        &mut self,
        id: FrameSettingsId,
        index: usize,
        format: &PixelFormat,
        data: &[u8],
    ) -> JxsResult<()> {
        let basic = self
            .basic
            .as_ref()
            .ok_or_else(|| {
                JxsError::OutOfOrder("set_extra_channel_buffer before set_basic_info".to_string())
            })?
            .clone();
        if index >= basic.num_extra_channels as usize {
            return Err(JxsError::InvalidParameter(format!(
                "extra channel {} out of range",
                index
            )));
        }
        if format.num_channels != 1 {
            return Err(JxsError::InvalidParameter(
                "extra channel buffers are single-channel".to_string(),
            ));
        }
        if self.settings.get(id.0).and_then(Option::as_ref).is_none() {
            return Err(JxsError::StaleFrameSettings);
        }
        let (width, height) = {
            let settings = self.settings[id.0].as_ref().ok_or(JxsError::StaleFrameSettings)?;
            match settings.header.crop {
                Some(rect) => (rect.width, rect.height),
                None => (basic.width, basic.height),
            }
        };
        let mut planes = deinterleave(format, data, width, height)?;
        let plane = planes.swap_remove(0);
        let settings = self.settings[id.0].as_mut().ok_or(JxsError::StaleFrameSettings)?;
        if settings.staged_extra.len() < basic.num_extra_channels as usize {
            settings
                .staged_extra
                .resize_with(basic.num_extra_channels as usize, || None);
        }
        settings.staged_extra[index] = Some(plane);
        Ok(())
    }

    // ---- enqueueing ----------------------------------------------------

    fn ensure_header_queued(&mut self) -> JxsResult<()> {
        if self.header_queued {
            return Ok(());
        }
        let basic = self
            .basic
            .clone()
            .ok_or_else(|| JxsError::OutOfOrder("no basic info set".to_string()))?;
        let color = self
            .color
            .clone()
            .ok_or_else(|| JxsError::OutOfOrder("no color profile set".to_string()))?;
        let mut extra = Vec::with_capacity(self.extra.len());
        for (index, slot) in self.extra.iter().enumerate() {
            match slot {
                Some(info) => extra.push(info.clone()),
                None => {
                    return Err(JxsError::OutOfOrder(format!(
                        "extra channel {} was never described",
                        index
                    )))
                }
            }
        }

        let header = ImageHeader {
            basic,
            color,
            extra,
        };
        let mut cs = Vec::new();
        cs.extend_from_slice(&CODESTREAM_SIGNATURE);
        write_section(&mut cs, SectionTag::ImageHeader, &encode_image_header(&header)?);
        if let Some(preview) = self.preview_payload.take() {
            write_section(&mut cs, SectionTag::Preview, &preview);
        }
        self.queue.push_back(QueueItem::Codestream(cs));
        self.header_queued = true;
        debug!("image header queued");
        Ok(())
    }

    /// Encode one frame from an interleaved pixel buffer.
    ///
    /// The settings are snapshotted: later changes through `id` do not
    /// affect this frame. Staged extra channel buffers on `id` are consumed.
    pub fn add_image_frame(
        &mut self,
        id: FrameSettingsId,
        format: &PixelFormat,
        pixels: &[u8],
    ) -> JxsResult<()> {
        match self.add_image_frame_inner(id, format, pixels) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn add_image_frame_inner(
        &mut self,
        id: FrameSettingsId,
        format: &PixelFormat,
        pixels: &[u8],
    ) -> JxsResult<()> {
        if self.frames_closed {
            return Err(JxsError::OutOfOrder(
                "add_image_frame after close_frames".to_string(),
            ));
        }
        let basic = self
            .basic
            .as_ref()
            .ok_or_else(|| JxsError::OutOfOrder("add_image_frame before set_basic_info".to_string()))?
            .clone();
        validate_input_type(format, &basic)?;
        if self.settings.get(id.0).and_then(Option::as_ref).is_none() {
            return Err(JxsError::StaleFrameSettings);
        }
        self.ensure_header_queued()?;

        let mut settings = match self.settings[id.0].as_mut() {
            Some(settings) => {
                let snapshot = settings.clone();
                settings.staged_extra.clear();
                snapshot
            }
            None => return Err(JxsError::StaleFrameSettings),
        };

        let (width, height) = match settings.header.crop {
            Some(rect) => (rect.width, rect.height),
            None => (basic.width, basic.height),
        };

        // Interleaved input covers the color channels (plus alpha when the
        // format carries a fourth channel); any remaining extra channels
        // must have been staged on the settings.
        let interleaved = format.num_channels;
        if interleaved < basic.num_color_channels
            || interleaved > basic.total_channels()
        {
            return Err(JxsError::InvalidParameter(format!(
                "{} input channels for an image with {} color and {} extra channels",
                interleaved, basic.num_color_channels, basic.num_extra_channels
            )));
        }
        let mut planes = deinterleave(format, pixels, width, height)?;
        let pixel_count = width as usize * height as usize;
        for index in (interleaved - basic.num_color_channels) as usize
            ..basic.num_extra_channels as usize
        {
            let plane = settings
                .staged_extra
                .get_mut(index)
                .and_then(Option::take)
                .ok_or_else(|| {
                    JxsError::InvalidParameter(format!(
                        "no data supplied for extra channel {}",
                        index
                    ))
                })?;
            if plane.samples.len() != pixel_count {
                return Err(JxsError::InvalidParameter(format!(
                    "extra channel {} buffer does not match the frame size",
                    index
                )));
            }
            planes.push(plane);
        }

        let quant = settings.quant_step();
        let bands = band_count(height);
        let meta = FrameMeta {
            kind: FramePayloadKind::Pixels,
            quant_step: quant,
            band_count: bands,
        };

        let mut cs = Vec::new();
        write_section(
            &mut cs,
            SectionTag::FrameHeader,
            &encode_frame_section(&settings.header, &meta)?,
        );
        for band_index in 0..bands {
            let row_start = band_index as usize * BAND_ROWS;
            let row_end = (row_start + BAND_ROWS).min(height as usize);
            let payload = encode_band(
                band_index,
                row_start..row_end,
                width as usize,
                &planes,
                quant,
            )?;
            write_section(&mut cs, SectionTag::Band, &payload);
        }
        trace!(width, height, bands, quant, "frame queued");
        self.queue.push_back(QueueItem::Codestream(cs));
        Ok(())
    }

    /// Enqueue an opaque JPEG passthrough frame.
    pub fn add_jpeg_frame(&mut self, id: FrameSettingsId, jpeg: &[u8]) -> JxsResult<()> {
        match self.add_jpeg_frame_inner(id, jpeg) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn add_jpeg_frame_inner(&mut self, id: FrameSettingsId, jpeg: &[u8]) -> JxsResult<()> {
        if self.frames_closed {
            return Err(JxsError::OutOfOrder(
                "add_jpeg_frame after close_frames".to_string(),
            ));
        }
        if jpeg.is_empty() {
            return Err(JxsError::InvalidParameter("empty JPEG data".to_string()));
        }
        let header = {
            let settings = match self.settings.get(id.0).and_then(Option::as_ref) {
                Some(settings) => settings,
                None => return Err(JxsError::StaleFrameSettings),
            };
            settings.header.clone()
        };
        self.ensure_header_queued()?;

        let meta = FrameMeta {
            kind: FramePayloadKind::Jpeg,
            quant_step: 1,
            band_count: 0,
        };
        let mut cs = Vec::new();
        write_section(
            &mut cs,
            SectionTag::FrameHeader,
            &encode_frame_section(&header, &meta)?,
        );
        write_section(&mut cs, SectionTag::JpegData, jpeg);

        if self.store_jpeg_metadata {
            self.queue.push_back(QueueItem::MetaBox {
                box_type: BoxType::JpegReconstruction,
                payload: jpeg.to_vec(),
            });
        }
        self.queue.push_back(QueueItem::Codestream(cs));
        Ok(())
    }

    /// Enqueue a metadata box, optionally Brotli-wrapped in a `brob` box.
    pub fn add_box(&mut self, box_type: BoxType, contents: &[u8], compress: bool) -> JxsResult<()> {
        match self.add_box_inner(box_type, contents, compress) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn add_box_inner(&mut self, box_type: BoxType, contents: &[u8], compress: bool) -> JxsResult<()> {
        if !self.boxes_enabled {
            return Err(JxsError::OutOfOrder(
                "add_box before use_boxes".to_string(),
            ));
        }
        if self.boxes_closed {
            return Err(JxsError::OutOfOrder(
                "add_box after close_boxes".to_string(),
            ));
        }
        if box_type.is_codestream() || box_type == BoxType::Brotli {
            return Err(JxsError::InvalidParameter(format!(
                "{:?} boxes cannot be added directly",
                box_type
            )));
        }
        let item = if compress {
            QueueItem::MetaBox {
                box_type: BoxType::Brotli,
                payload: compress_box_payload(box_type, contents)?,
            }
        } else {
            QueueItem::MetaBox {
                box_type,
                payload: contents.to_vec(),
            }
        };
        self.queue.push_back(item);
        Ok(())
    }

    // ---- closing -------------------------------------------------------

    /// No more frames will be added; queues the codestream terminator and
    /// retires every frame settings slot.
    pub fn close_frames(&mut self) -> JxsResult<()> {
        if self.frames_closed {
            return Ok(());
        }
        match self.ensure_header_queued() {
            Ok(()) => {}
            Err(err) => return Err(self.fail(err)),
        }
        self.queue.push_back(QueueItem::End);
        self.frames_closed = true;
        for slot in &mut self.settings {
            *slot = None;
        }
        debug!("frames closed");
        Ok(())
    }

    /// No more boxes will be added.
    pub fn close_boxes(&mut self) {
        self.boxes_closed = true;
    }

    /// Close both the frame and box streams.
    pub fn close_input(&mut self) -> JxsResult<()> {
        self.close_frames()?;
        self.close_boxes();
        Ok(())
    }

    // ---- output --------------------------------------------------------

    fn reserve_output(&mut self, needed: usize) {
        if self.buf.capacity() < needed {
            let mut cap = self.buf.capacity().max(64);
            while cap < needed {
                cap *= 4;
            }
            self.buf.reserve_exact(cap - self.buf.len());
        }
    }

    fn is_done(&self) -> bool {
        self.queue.is_empty() && self.frames_closed && (!self.boxes_enabled || self.boxes_closed)
    }

    /// Serialize the next queued item and append it to `sink` with a single
    /// write. Returns `Pending` while work remains or the streams are still
    /// open, and `Success` once everything queued has been written and
    /// closed.
    pub fn process_output<W: Write>(&mut self, sink: &mut W) -> JxsResult<EncoderStatus> {
        self.started_output = true;
        let item = match self.queue.pop_front() {
            Some(item) => item,
            None => {
                return Ok(if self.is_done() {
                    EncoderStatus::Success
                } else {
                    EncoderStatus::Pending
                })
            }
        };

        self.buf.clear();
        let preamble = self.container && !self.preamble_written;
        if preamble {
            let estimate = CONTAINER_SIGNATURE.len() + 20 + 9;
            self.reserve_output(estimate);
            self.buf.extend_from_slice(&CONTAINER_SIGNATURE);
            let ftyp = file_type_payload();
            let mut out = std::mem::take(&mut self.buf);
            let result = write_box(&mut out, BoxType::FileType, &ftyp);
            self.buf = out;
            result.map_err(|err| self.fail(err))?;
            if let Some(level) = self.level {
                let mut out = std::mem::take(&mut self.buf);
                let result = write_box(&mut out, BoxType::Level, &[level.as_i32() as u8]);
                self.buf = out;
                result.map_err(|err| self.fail(err))?;
            }
            self.preamble_written = true;
        }

        match item {
            QueueItem::Codestream(bytes) => {
                if self.container {
                    self.write_jxlp(&bytes, false).map_err(|err| self.fail(err))?;
                } else {
                    self.reserve_output(self.buf.len() + bytes.len());
                    self.buf.extend_from_slice(&bytes);
                }
            }
            QueueItem::MetaBox { box_type, payload } => {
                self.reserve_output(self.buf.len() + payload.len() + 16);
                let mut out = std::mem::take(&mut self.buf);
                let result = write_box(&mut out, box_type, &payload);
                self.buf = out;
                result.map_err(|err| self.fail(err))?;
            }
            QueueItem::End => {
                let mut bytes = Vec::new();
                write_section(&mut bytes, SectionTag::End, &[]);
                if self.container {
                    self.write_jxlp(&bytes, true).map_err(|err| self.fail(err))?;
                } else {
                    self.reserve_output(self.buf.len() + bytes.len());
                    self.buf.extend_from_slice(&bytes);
                }
            }
        }

        let buf = std::mem::take(&mut self.buf);
        let result = sink.write_all(&buf);
        self.buf = buf;
        result.map_err(|err| self.fail(JxsError::IoError(err)))?;
        trace!(bytes = self.buf.len(), "output chunk written");

        Ok(if self.is_done() {
            EncoderStatus::Success
        } else {
            EncoderStatus::Pending
        })
    }

    fn write_jxlp(&mut self, payload: &[u8], final_part: bool) -> JxsResult<()> {
        let seq = if final_part {
            self.next_jxlp_seq | JXLP_FINAL_BIT
        } else {
            self.next_jxlp_seq
        };
        self.next_jxlp_seq += 1;
        let mut boxed = Vec::with_capacity(4 + payload.len());
        boxed.extend_from_slice(&seq.to_be_bytes());
        boxed.extend_from_slice(payload);
        self.reserve_output(self.buf.len() + boxed.len() + 16);
        let mut out = std::mem::take(&mut self.buf);
        let result = write_box(&mut out, BoxType::PartialCodestream, &boxed);
        self.buf = out;
        result
    }
}
