//! VA-API H.264 encode session.
//!
//! `VaapiEncoder` owns the whole hardware state: driver config and
//! context, the source/reconstruction surface pools, the coded-buffer
//! pool, and the GOP/reference bookkeeping. Frame submission is
//! non-blocking with respect to output delivery: each submitted picture
//! is handed to the accelerator, enqueued as a [`FrameTask`], and drained
//! by the output worker (or inline in synchronous mode).

use std::ffi::c_void;
use std::mem;
use std::ptr;
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};
use va_sys as va;

use super::display::{Display, VaStatusExt};
use super::output::{spawn_worker, OutputContext};
use crate::csc::convert_to_nv12;
use crate::gop::{
    frame_kind_for, FrameKind, PocCounter, RefPicture, ReferenceList, LOG2_MAX_FRAME_NUM,
    LOG2_MAX_PIC_ORDER_CNT_LSB, MAX_FRAME_NUM, MAX_PIC_ORDER_CNT_LSB,
};
use crate::nal::{build_pps, build_sei, build_sps, PackedHeader, SeiTiming};
use crate::pipeline::{task_channel, FrameTask, SurfaceTracker, SURFACE_COUNT};
use crate::traits::{SinkSet, VideoEncoder};
use crate::types::{EncoderConfig, EntropyMode, Profile, RateControl};
use crate::CodecError;

fn va_profile(profile: Profile) -> va::VAProfile {
    match profile {
        // Plain baseline was retired from libva; constrained baseline is
        // what encoders actually implement.
        Profile::Baseline | Profile::ConstrainedBaseline => va::VAProfileH264ConstrainedBaseline,
        Profile::Main => va::VAProfileH264Main,
        Profile::High => va::VAProfileH264High,
    }
}

fn va_rc_mode(mode: RateControl) -> u32 {
    match mode {
        RateControl::None => va::VA_RC_NONE,
        RateControl::Cbr => va::VA_RC_CBR,
        RateControl::Vbr => va::VA_RC_VBR,
        RateControl::Vcm => va::VA_RC_VCM,
        RateControl::Cqp => va::VA_RC_CQP,
        RateControl::VbrConstrained => va::VA_RC_VBR_CONSTRAINED,
    }
}

/// Hardware H.264 encoder running on the VA-API slice encoding
/// entrypoint.
pub struct VaapiEncoder {
    display: Arc<Display>,
    config: EncoderConfig,
    config_id: va::VAConfigID,
    context_id: va::VAContextID,
    src_surfaces: Vec<va::VASurfaceID>,
    ref_surfaces: Vec<va::VASurfaceID>,
    coded_bufs: Vec<va::VABufferID>,
    tracker: Arc<SurfaceTracker>,
    tasks: Option<Sender<FrameTask>>,
    worker: Option<std::thread::JoinHandle<()>>,
    sync_output: Option<OutputContext>,
    /// Packed-header kinds the driver accepts, as `VA_ENC_PACKED_HEADER_*`
    /// bits.
    packed_headers: u32,
    max_ref_l0: usize,
    max_ref_l1: usize,
    encode_order: u64,
    frame_num: u32,
    idr_display_anchor: u64,
    idr_pic_id: u16,
    idr_count: u64,
    poc: PocCounter,
    refs: ReferenceList,
    pool_primed: bool,
}

// All hardware handles are owned here and only touched from the submit
// path; the output worker holds its own context.
unsafe impl Send for VaapiEncoder {}

impl VaapiEncoder {
    /// Bring up the hardware session and register the output sinks.
    ///
    /// Any failure here is a bring-up failure in the sense of the error
    /// policy: the caller is expected to abort startup.
    pub fn new(config: EncoderConfig, sinks: SinkSet) -> Result<Self, CodecError> {
        config.validate()?;
        let display = Arc::new(Display::open()?);
        let dpy = display.handle();
        let profile = va_profile(config.profile);

        // The slice entrypoint must be there before anything is created.
        let max_entrypoints = unsafe { va::vaMaxNumEntrypoints(dpy) }.max(1) as usize;
        let mut entrypoints = vec![0 as va::VAEntrypoint; max_entrypoints];
        let mut num_entrypoints = 0;
        unsafe {
            va::vaQueryConfigEntrypoints(
                dpy,
                profile,
                entrypoints.as_mut_ptr(),
                &mut num_entrypoints,
            )
        }
        .check("vaQueryConfigEntrypoints")?;
        entrypoints.truncate(num_entrypoints.max(0) as usize);
        if !entrypoints.contains(&va::VAEntrypointEncSlice) {
            return Err(CodecError::UnsupportedEntrypoint);
        }

        let mut attribs = [
            va::VAConfigAttrib {
                type_: va::VAConfigAttribRTFormat,
                value: 0,
            },
            va::VAConfigAttrib {
                type_: va::VAConfigAttribRateControl,
                value: 0,
            },
            va::VAConfigAttrib {
                type_: va::VAConfigAttribEncPackedHeaders,
                value: 0,
            },
            va::VAConfigAttrib {
                type_: va::VAConfigAttribEncMaxRefFrames,
                value: 0,
            },
        ];
        unsafe {
            va::vaGetConfigAttributes(
                dpy,
                profile,
                va::VAEntrypointEncSlice,
                attribs.as_mut_ptr(),
                attribs.len() as i32,
            )
        }
        .check("vaGetConfigAttributes")?;

        if attribs[0].value & va::VA_RT_FORMAT_YUV420 == 0 {
            return Err(CodecError::va_call(
                "vaGetConfigAttributes",
                "driver does not support YUV 4:2:0 render targets",
            ));
        }
        let rc_bit = va_rc_mode(config.rate_control);
        if attribs[1].value == va::VA_ATTRIB_NOT_SUPPORTED || attribs[1].value & rc_bit == 0 {
            return Err(CodecError::UnsupportedRateControl);
        }
        let packed_headers = if attribs[2].value == va::VA_ATTRIB_NOT_SUPPORTED {
            0
        } else {
            attribs[2].value
        };
        let (max_ref_l0, max_ref_l1) = if attribs[3].value == va::VA_ATTRIB_NOT_SUPPORTED {
            (1, 1)
        } else {
            (
                (attribs[3].value & 0xffff).max(1) as usize,
                ((attribs[3].value >> 16) & 0xffff).max(1) as usize,
            )
        };

        let mut config_attribs = [
            va::VAConfigAttrib {
                type_: va::VAConfigAttribRTFormat,
                value: va::VA_RT_FORMAT_YUV420,
            },
            va::VAConfigAttrib {
                type_: va::VAConfigAttribRateControl,
                value: rc_bit,
            },
        ];
        let mut config_id = 0;
        unsafe {
            va::vaCreateConfig(
                dpy,
                profile,
                va::VAEntrypointEncSlice,
                config_attribs.as_mut_ptr(),
                config_attribs.len() as i32,
                &mut config_id,
            )
        }
        .check("vaCreateConfig")?;

        let coded_width = config.width_in_mbs() * 16;
        let coded_height = config.height_in_mbs() * 16;

        let mut pixel_format = va::VASurfaceAttrib {
            type_: va::VASurfaceAttribPixelFormat,
            flags: va::VA_SURFACE_ATTRIB_SETTABLE,
            value: va::VAGenericValue {
                type_: va::VAGenericValueTypeInteger,
                value: va::VAGenericValueUnion {
                    i: va::VA_FOURCC_NV12 as i32,
                },
            },
        };
        let mut create_surfaces = |label: &'static str| -> Result<Vec<va::VASurfaceID>, CodecError> {
            let mut surfaces = vec![va::VA_INVALID_SURFACE; SURFACE_COUNT];
            unsafe {
                va::vaCreateSurfaces(
                    dpy,
                    va::VA_RT_FORMAT_YUV420,
                    coded_width,
                    coded_height,
                    surfaces.as_mut_ptr(),
                    surfaces.len() as u32,
                    &mut pixel_format,
                    1,
                )
            }
            .check(label)?;
            Ok(surfaces)
        };
        let src_surfaces = create_surfaces("vaCreateSurfaces(source)")?;
        let ref_surfaces = create_surfaces("vaCreateSurfaces(reference)")?;

        let mut render_targets: Vec<va::VASurfaceID> = src_surfaces
            .iter()
            .chain(ref_surfaces.iter())
            .copied()
            .collect();
        let mut context_id = 0;
        unsafe {
            va::vaCreateContext(
                dpy,
                config_id,
                coded_width as i32,
                coded_height as i32,
                va::VA_PROGRESSIVE,
                render_targets.as_mut_ptr(),
                render_targets.len() as i32,
                &mut context_id,
            )
        }
        .check("vaCreateContext")?;

        // Worst case per frame: raw 4:2:0 size plus headroom for headers
        // and a stream the rate control refuses to compress.
        let coded_buf_size = coded_width * coded_height * 400 / 256;
        let mut coded_bufs = Vec::with_capacity(SURFACE_COUNT);
        for _ in 0..SURFACE_COUNT {
            let mut buf = 0;
            unsafe {
                va::vaCreateBuffer(
                    dpy,
                    context_id,
                    va::VAEncCodedBufferType,
                    coded_buf_size,
                    1,
                    ptr::null_mut(),
                    &mut buf,
                )
            }
            .check("vaCreateBuffer(coded)")?;
            coded_bufs.push(buf);
        }

        let tracker = Arc::new(SurfaceTracker::new(SURFACE_COUNT));
        let output = OutputContext {
            display: Arc::clone(&display),
            src_surfaces: src_surfaces.clone(),
            coded_bufs: coded_bufs.clone(),
            tracker: Arc::clone(&tracker),
            sinks,
        };

        let (tasks, worker, sync_output) = if config.synchronous {
            (None, None, Some(output))
        } else {
            let (tx, rx) = task_channel(SURFACE_COUNT);
            let handle = spawn_worker(output, rx);
            (Some(tx), Some(handle), None)
        };

        info!(
            width = config.width,
            height = config.height,
            fps = config.frame_rate,
            bitrate = config.bitrate,
            rc = %config.rate_control,
            profile = %config.profile,
            packed_headers = format_args!("{packed_headers:#x}"),
            synchronous = config.synchronous,
            "VA-API encode session ready"
        );

        let num_ref_frames = config.num_ref_frames;
        Ok(Self {
            display,
            config,
            config_id,
            context_id,
            src_surfaces,
            ref_surfaces,
            coded_bufs,
            tracker,
            tasks,
            worker,
            sync_output,
            packed_headers,
            max_ref_l0,
            max_ref_l1,
            encode_order: 0,
            frame_num: 0,
            idr_display_anchor: 0,
            idr_pic_id: 0,
            idr_count: 0,
            poc: PocCounter::new(),
            refs: ReferenceList::new(num_ref_frames),
            pool_primed: false,
        })
    }

    /// Frames submitted so far.
    #[must_use]
    pub fn frames_submitted(&self) -> u64 {
        self.encode_order
    }

    // -- buffer helpers ----------------------------------------------------

    fn create_param_buffer<T>(
        &self,
        type_: va::VABufferType,
        data: &T,
    ) -> Result<va::VABufferID, CodecError> {
        let mut id = 0;
        unsafe {
            va::vaCreateBuffer(
                self.display.handle(),
                self.context_id,
                type_,
                mem::size_of::<T>() as u32,
                1,
                data as *const T as *mut c_void,
                &mut id,
            )
        }
        .check("vaCreateBuffer")?;
        Ok(id)
    }

    fn create_data_buffer(
        &self,
        type_: va::VABufferType,
        data: &[u8],
    ) -> Result<va::VABufferID, CodecError> {
        let mut id = 0;
        unsafe {
            va::vaCreateBuffer(
                self.display.handle(),
                self.context_id,
                type_,
                data.len() as u32,
                1,
                data.as_ptr() as *mut c_void,
                &mut id,
            )
        }
        .check("vaCreateBuffer")?;
        Ok(id)
    }

    /// Create a misc parameter buffer: driver-allocated, filled through a
    /// map because the payload sits behind a flexible header in C.
    fn create_misc_buffer<T: Copy>(
        &self,
        misc_type: va::VAEncMiscParameterType,
        payload: &T,
    ) -> Result<va::VABufferID, CodecError> {
        let mut id = 0;
        unsafe {
            va::vaCreateBuffer(
                self.display.handle(),
                self.context_id,
                va::VAEncMiscParameterBufferType,
                va::misc_buffer_size::<T>() as u32,
                1,
                ptr::null_mut(),
                &mut id,
            )
        }
        .check("vaCreateBuffer(misc)")?;

        let mut mapped: *mut c_void = ptr::null_mut();
        unsafe { va::vaMapBuffer(self.display.handle(), id, &mut mapped) }
            .check("vaMapBuffer(misc)")?;
        unsafe {
            va::write_misc_parameter(mapped, misc_type, payload);
            va::vaUnmapBuffer(self.display.handle(), id)
        }
        .check("vaUnmapBuffer(misc)")?;
        Ok(id)
    }

    /// Submit one parameter buffer to the in-progress picture and release
    /// our handle on it.
    fn render_buffer(&self, buf: va::VABufferID) -> Result<(), CodecError> {
        let mut id = buf;
        let rendered = unsafe {
            va::vaRenderPicture(self.display.handle(), self.context_id, &mut id, 1)
        }
        .check("vaRenderPicture");
        unsafe {
            va::vaDestroyBuffer(self.display.handle(), buf);
        }
        rendered
    }

    // -- raw frame upload --------------------------------------------------

    fn upload_nv12(&self, surface: va::VASurfaceID, nv12: &[u8]) -> Result<(), CodecError> {
        let dpy = self.display.handle();
        let width = self.config.width as usize;
        let height = self.config.height as usize;

        let mut image = va::VAImage::default();
        unsafe { va::vaDeriveImage(dpy, surface, &mut image) }.check("vaDeriveImage")?;

        let mut mapped: *mut c_void = ptr::null_mut();
        if let Err(err) = unsafe { va::vaMapBuffer(dpy, image.buf, &mut mapped) }
            .check("vaMapBuffer(image)")
        {
            unsafe {
                va::vaDestroyImage(dpy, image.image_id);
            }
            return Err(err);
        }

        let base = mapped as *mut u8;
        let luma_pitch = image.pitches[0] as usize;
        let chroma_pitch = image.pitches[1] as usize;
        unsafe {
            for row in 0..height {
                ptr::copy_nonoverlapping(
                    nv12.as_ptr().add(row * width),
                    base.add(image.offsets[0] as usize + row * luma_pitch),
                    width,
                );
            }
            let chroma = &nv12[width * height..];
            for row in 0..height / 2 {
                ptr::copy_nonoverlapping(
                    chroma.as_ptr().add(row * width),
                    base.add(image.offsets[1] as usize + row * chroma_pitch),
                    width,
                );
            }
        }

        let unmapped = unsafe { va::vaUnmapBuffer(dpy, image.buf) }.check("vaUnmapBuffer(image)");
        unsafe {
            va::vaDestroyImage(dpy, image.image_id);
        }
        unmapped
    }

    // -- parameter rendering -----------------------------------------------

    fn render_sequence(&self) -> Result<(), CodecError> {
        let config = &self.config;
        let coded_width = config.width_in_mbs() * 16;
        let coded_height = config.height_in_mbs() * 16;

        let mut seq = va::VAEncSequenceParameterBufferH264::default();
        seq.seq_parameter_set_id = 0;
        seq.level_idc = config.level_idc as u8;
        seq.intra_period = config.intra_period;
        seq.intra_idr_period = config.intra_idr_period;
        seq.ip_period = config.ip_period;
        seq.bits_per_second = config.bitrate;
        seq.max_num_ref_frames = config.num_ref_frames;
        seq.picture_width_in_mbs = config.width_in_mbs() as u16;
        seq.picture_height_in_mbs = config.height_in_mbs() as u16;
        seq.seq_fields = (1 << va::SEQ_CHROMA_FORMAT_IDC_SHIFT)
            | (1 << va::SEQ_FRAME_MBS_ONLY_FLAG_SHIFT)
            | (1 << va::SEQ_DIRECT_8X8_INFERENCE_FLAG_SHIFT)
            | ((LOG2_MAX_FRAME_NUM - 4) << va::SEQ_LOG2_MAX_FRAME_NUM_MINUS4_SHIFT)
            | ((LOG2_MAX_PIC_ORDER_CNT_LSB - 4)
                << va::SEQ_LOG2_MAX_PIC_ORDER_CNT_LSB_MINUS4_SHIFT);
        seq.num_units_in_tick = 1;
        seq.time_scale = config.frame_rate * 2;
        if coded_width != config.width || coded_height != config.height {
            seq.frame_cropping_flag = 1;
            seq.frame_crop_right_offset = (coded_width - config.width) / 2;
            seq.frame_crop_bottom_offset = (coded_height - config.height) / 2;
        }
        seq.vui_parameters_present_flag = 1;
        seq.vui_fields = (1 << va::VUI_TIMING_INFO_PRESENT_FLAG_SHIFT)
            | (1 << va::VUI_FIXED_FRAME_RATE_FLAG_SHIFT);

        let buf = self.create_param_buffer(va::VAEncSequenceParameterBufferType, &seq)?;
        self.render_buffer(buf)?;

        if config.rate_control != RateControl::Cqp {
            let rc = va::VAEncMiscParameterRateControl {
                bits_per_second: config.bitrate,
                target_percentage: if config.rate_control == RateControl::Cbr {
                    100
                } else {
                    66
                },
                window_size: 1000,
                initial_qp: config.initial_qp,
                min_qp: config.minimal_qp,
                basic_unit_size: 0,
                rc_flags: 1 << va::RC_FLAG_DISABLE_BIT_STUFFING_SHIFT,
            };
            let buf = self.create_misc_buffer(va::VAEncMiscParameterTypeRateControl, &rc)?;
            self.render_buffer(buf)?;
        }
        Ok(())
    }

    fn render_hrd(&self) -> Result<(), CodecError> {
        let buffer_size = self
            .config
            .bitrate
            .saturating_mul(self.config.hrd_bitrate_multiplier.max(1));
        let hrd = va::VAEncMiscParameterHRD {
            initial_buffer_fullness: buffer_size / 2,
            buffer_size,
        };
        let buf = self.create_misc_buffer(va::VAEncMiscParameterTypeHRD, &hrd)?;
        self.render_buffer(buf)
    }

    fn current_picture(&self, slot: usize, top_foc: i32) -> va::VAPictureH264 {
        va::VAPictureH264 {
            picture_id: self.ref_surfaces[slot],
            frame_idx: self.frame_num,
            flags: 0,
            TopFieldOrderCnt: top_foc,
            BottomFieldOrderCnt: top_foc,
        }
    }

    fn render_picture(
        &self,
        curr_pic: &va::VAPictureH264,
        slot: usize,
        kind: FrameKind,
    ) -> Result<(), CodecError> {
        let config = &self.config;
        let mut pic = va::VAEncPictureParameterBufferH264 {
            CurrPic: *curr_pic,
            coded_buf: self.coded_bufs[slot],
            frame_num: self.frame_num as u16,
            pic_init_qp: config.initial_qp as u8,
            ..Default::default()
        };
        for (dst, src) in pic
            .ReferenceFrames
            .iter_mut()
            .zip(self.refs.entries().iter())
        {
            *dst = reference_pic(src);
        }
        pic.pic_fields = (u32::from(kind == FrameKind::Idr) << va::PIC_IDR_PIC_FLAG_SHIFT)
            | (u32::from(kind.is_reference()) << va::PIC_REFERENCE_PIC_FLAG_SHIFT)
            | (u32::from(config.entropy == EntropyMode::Cabac)
                << va::PIC_ENTROPY_CODING_MODE_FLAG_SHIFT)
            | (1 << va::PIC_DEBLOCKING_FILTER_CONTROL_PRESENT_FLAG_SHIFT)
            | (u32::from(config.profile.is_high()) << va::PIC_TRANSFORM_8X8_MODE_FLAG_SHIFT);

        let buf = self.create_param_buffer(va::VAEncPictureParameterBufferType, &pic)?;
        self.render_buffer(buf)
    }

    fn render_packed_header(&self, type_: u32, header: &PackedHeader) -> Result<(), CodecError> {
        let param = va::VAEncPackedHeaderParameterBuffer {
            type_,
            bit_length: header.bit_len as u32,
            has_emulation_bytes: 0,
        };
        let param_buf =
            self.create_param_buffer(va::VAEncPackedHeaderParameterBufferType, &param)?;
        self.render_buffer(param_buf)?;
        let data_buf =
            self.create_data_buffer(va::VAEncPackedHeaderDataBufferType, &header.data)?;
        self.render_buffer(data_buf)
    }

    fn render_packed_sei(&self, display_order: u64) -> Result<(), CodecError> {
        let initial = SeiTiming::initial_delay_for_bitrate(self.config.bitrate);
        let timing = SeiTiming {
            initial_cpb_removal_delay: initial,
            initial_cpb_removal_delay_offset: 0,
            // Two clock ticks per frame on the 2x field clock.
            cpb_removal_delay: 2 * ((display_order - self.idr_display_anchor) as u32),
            dpb_output_delay: 2,
        };
        let sei = build_sei(&timing);
        self.render_packed_header(va::VAEncPackedHeaderH264_SEI, &sei)
    }

    fn render_slice(
        &mut self,
        slot: usize,
        kind: FrameKind,
        poc_lsb: u32,
        top_foc: i32,
    ) -> Result<(), CodecError> {
        let config = &self.config;
        let mut slice = va::VAEncSliceParameterBufferH264::default();
        slice.macroblock_address = 0;
        slice.num_macroblocks = config.width_in_mbs() * config.height_in_mbs();
        slice.macroblock_info = va::VA_INVALID_ID;
        slice.slice_type = match kind {
            FrameKind::P => va::SLICE_TYPE_P,
            FrameKind::B => va::SLICE_TYPE_B,
            FrameKind::I | FrameKind::Idr => va::SLICE_TYPE_I,
        };
        slice.pic_parameter_set_id = 0;
        slice.pic_order_cnt_lsb = poc_lsb as u16;
        slice.direct_spatial_mv_pred_flag = 1;

        match kind {
            FrameKind::Idr => {
                if self.idr_count > 0 {
                    self.idr_pic_id = self.idr_pic_id.wrapping_add(1);
                }
                self.idr_count += 1;
                slice.idr_pic_id = self.idr_pic_id;
            }
            FrameKind::P => {
                let list0 = self.refs.ref_list_p();
                for (dst, src) in slice
                    .RefPicList0
                    .iter_mut()
                    .zip(list0.iter().take(self.max_ref_l0))
                {
                    *dst = reference_pic(src);
                }
            }
            FrameKind::B => {
                let (list0, list1) = self.refs.ref_lists_b(top_foc);
                for (dst, src) in slice
                    .RefPicList0
                    .iter_mut()
                    .zip(list0.iter().take(self.max_ref_l0))
                {
                    *dst = reference_pic(src);
                }
                for (dst, src) in slice
                    .RefPicList1
                    .iter_mut()
                    .zip(list1.iter().take(self.max_ref_l1))
                {
                    *dst = reference_pic(src);
                }
            }
            FrameKind::I => {}
        }

        let buf = self.create_param_buffer(va::VAEncSliceParameterBufferType, &slice)?;
        self.render_buffer(buf)
    }

    // -- per-frame drive ---------------------------------------------------

    fn encode_picture(
        &mut self,
        display_order: u64,
        slot: usize,
        kind: FrameKind,
    ) -> Result<(), CodecError> {
        let dpy = self.display.handle();
        unsafe { va::vaBeginPicture(dpy, self.context_id, self.src_surfaces[slot]) }
            .check("vaBeginPicture")?;

        if kind == FrameKind::Idr {
            self.render_sequence()?;
        }

        let poc_lsb = ((display_order - self.idr_display_anchor) % u64::from(MAX_PIC_ORDER_CNT_LSB))
            as u32;
        let top_foc = self.poc.top_field_order_cnt(poc_lsb, kind);
        let curr_pic = self.current_picture(slot, top_foc);
        self.render_picture(&curr_pic, slot, kind)?;

        if kind == FrameKind::Idr && self.packed_headers & va::VA_ENC_PACKED_HEADER_SEQUENCE != 0 {
            self.render_packed_header(va::VAEncPackedHeaderSequence, &build_sps(&self.config))?;
            self.render_packed_header(va::VAEncPackedHeaderPicture, &build_pps(&self.config))?;
        }
        if self.config.rate_control == RateControl::Cbr {
            if self.packed_headers != 0 {
                self.render_packed_sei(display_order)?;
            }
            self.render_hrd()?;
        }

        self.render_slice(slot, kind, poc_lsb, top_foc)?;
        unsafe { va::vaEndPicture(dpy, self.context_id) }.check("vaEndPicture")?;

        let task = FrameTask {
            display_order,
            encode_order: self.encode_order,
            keyframe: kind.is_intra(),
        };
        self.tracker.mark_in_flight(slot);
        if let Some(output) = self.sync_output.as_mut() {
            output.drain_task(&task);
        } else if let Some(tasks) = &self.tasks {
            if tasks.send(task).is_err() {
                // Worker is gone; reclaim the slot so submission cannot
                // wedge on a surface nobody will drain.
                self.tracker.mark_free(slot);
                return Err(CodecError::ShuttingDown);
            }
        }

        if kind.is_reference() {
            self.refs.push(RefPicture {
                surface_id: self.ref_surfaces[slot],
                frame_num: self.frame_num,
                poc: top_foc,
            });
            self.frame_num = (self.frame_num + 1) % MAX_FRAME_NUM;
        }
        Ok(())
    }
}

fn reference_pic(entry: &RefPicture) -> va::VAPictureH264 {
    va::VAPictureH264 {
        picture_id: entry.surface_id,
        frame_idx: entry.frame_num,
        flags: va::VA_PICTURE_H264_SHORT_TERM_REFERENCE,
        TopFieldOrderCnt: entry.poc,
        BottomFieldOrderCnt: entry.poc,
    }
}

impl VideoEncoder for VaapiEncoder {
    fn submit_frame(&mut self, frame: &[u8]) -> Result<bool, CodecError> {
        let expected = self.config.frame_size();
        if frame.len() != expected {
            warn!(
                got = frame.len(),
                expected, "dropping frame with mismatched byte length"
            );
            return Ok(true);
        }

        let (display_order, kind) = frame_kind_for(
            self.encode_order,
            self.config.intra_period,
            self.config.intra_idr_period,
            self.config.ip_period,
        );
        let slot = (display_order % SURFACE_COUNT as u64) as usize;

        if kind == FrameKind::Idr {
            self.refs.clear();
            self.frame_num = 0;
            self.idr_display_anchor = display_order;
        }

        // Backpressure: the slot must have drained its previous coded
        // data before it can carry a new picture.
        self.tracker.wait_free(slot);

        let nv12 = convert_to_nv12(
            self.config.source_format,
            frame,
            self.config.width,
            self.config.height,
        )?;
        let upload = if self.pool_primed {
            self.upload_nv12(self.src_surfaces[slot], &nv12)
        } else {
            // The accelerator may read any pool surface as a reference on
            // the very first pictures; fill them all once.
            let primed = self
                .src_surfaces
                .clone()
                .into_iter()
                .try_for_each(|surface| self.upload_nv12(surface, &nv12));
            self.pool_primed = primed.is_ok();
            primed
        };
        if let Err(err) = upload {
            warn!(%err, encode_order = self.encode_order, "frame upload failed, skipping");
            self.encode_order += 1;
            return Ok(true);
        }

        if let Err(err) = self.encode_picture(display_order, slot, kind) {
            warn!(%err, encode_order = self.encode_order, "frame encode failed, skipping");
            self.encode_order += 1;
            return Ok(true);
        }

        debug!(
            encode_order = self.encode_order,
            display_order,
            ?kind,
            in_flight = self.tracker.in_flight(),
            "frame submitted"
        );
        self.encode_order += 1;
        Ok(true)
    }

    fn flush(&mut self) -> Result<(), CodecError> {
        self.tracker.wait_all_free();
        Ok(())
    }
}

impl Drop for VaapiEncoder {
    fn drop(&mut self) {
        // Close the queue and join the worker before touching any buffer
        // it might still be mapping.
        self.tasks.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.sync_output.take();

        let dpy = self.display.handle();
        unsafe {
            for &buf in &self.coded_bufs {
                va::vaDestroyBuffer(dpy, buf);
            }
            va::vaDestroyContext(dpy, self.context_id);
            va::vaDestroyConfig(dpy, self.config_id);
            va::vaDestroySurfaces(
                dpy,
                self.src_surfaces.as_mut_ptr(),
                self.src_surfaces.len() as i32,
            );
            va::vaDestroySurfaces(
                dpy,
                self.ref_surfaces.as_mut_ptr(),
                self.ref_surfaces.len() as i32,
            );
        }
    }
}
