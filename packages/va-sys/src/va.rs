//! Core VA-API types, constants and entry points from `va/va.h`.

use std::os::raw::{c_char, c_int, c_void};

/// Connection to a VA-API driver instance.
pub type VADisplay = *mut c_void;

/// Status code returned by every VA-API call.
pub type VAStatus = c_int;

pub type VAConfigID = u32;
pub type VAContextID = u32;
pub type VASurfaceID = u32;
pub type VABufferID = u32;
pub type VAImageID = u32;

pub type VAProfile = c_int;
pub type VAEntrypoint = c_int;
pub type VABufferType = c_int;
pub type VAConfigAttribType = c_int;
pub type VASurfaceAttribType = c_int;
pub type VAGenericValueType = c_int;
pub type VAEncMiscParameterType = c_int;

pub const VA_INVALID_ID: u32 = 0xFFFFFFFF;
pub const VA_INVALID_SURFACE: VASurfaceID = VA_INVALID_ID;

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

pub const VA_STATUS_SUCCESS: VAStatus = 0x00000000;
pub const VA_STATUS_ERROR_OPERATION_FAILED: VAStatus = 0x00000001;
pub const VA_STATUS_ERROR_ALLOCATION_FAILED: VAStatus = 0x00000002;
pub const VA_STATUS_ERROR_INVALID_DISPLAY: VAStatus = 0x00000003;
pub const VA_STATUS_ERROR_INVALID_CONFIG: VAStatus = 0x00000004;
pub const VA_STATUS_ERROR_INVALID_CONTEXT: VAStatus = 0x00000005;
pub const VA_STATUS_ERROR_INVALID_SURFACE: VAStatus = 0x00000006;
pub const VA_STATUS_ERROR_INVALID_BUFFER: VAStatus = 0x00000007;
pub const VA_STATUS_ERROR_INVALID_IMAGE: VAStatus = 0x00000008;
pub const VA_STATUS_ERROR_ATTR_NOT_SUPPORTED: VAStatus = 0x0000000A;
pub const VA_STATUS_ERROR_MAX_NUM_EXCEEDED: VAStatus = 0x0000000B;
pub const VA_STATUS_ERROR_UNSUPPORTED_PROFILE: VAStatus = 0x0000000C;
pub const VA_STATUS_ERROR_UNSUPPORTED_ENTRYPOINT: VAStatus = 0x0000000D;
pub const VA_STATUS_ERROR_UNSUPPORTED_RT_FORMAT: VAStatus = 0x0000000E;
pub const VA_STATUS_ERROR_UNSUPPORTED_BUFFERTYPE: VAStatus = 0x0000000F;
pub const VA_STATUS_ERROR_SURFACE_BUSY: VAStatus = 0x00000010;
pub const VA_STATUS_ERROR_INVALID_PARAMETER: VAStatus = 0x00000012;
pub const VA_STATUS_ERROR_RESOLUTION_NOT_SUPPORTED: VAStatus = 0x00000013;
pub const VA_STATUS_ERROR_ENCODING_ERROR: VAStatus = 0x00000018;
pub const VA_STATUS_ERROR_HW_BUSY: VAStatus = 0x00000022;
pub const VA_STATUS_ERROR_TIMEDOUT: VAStatus = 0x00000026;

// ---------------------------------------------------------------------------
// Profiles and entrypoints
// ---------------------------------------------------------------------------

pub const VAProfileNone: VAProfile = -1;
pub const VAProfileH264Baseline: VAProfile = 5;
pub const VAProfileH264Main: VAProfile = 6;
pub const VAProfileH264High: VAProfile = 7;
pub const VAProfileH264ConstrainedBaseline: VAProfile = 13;

pub const VAEntrypointVLD: VAEntrypoint = 1;
pub const VAEntrypointEncSlice: VAEntrypoint = 6;
pub const VAEntrypointEncPicture: VAEntrypoint = 7;

// ---------------------------------------------------------------------------
// Config attributes
// ---------------------------------------------------------------------------

pub const VAConfigAttribRTFormat: VAConfigAttribType = 0;
pub const VAConfigAttribRateControl: VAConfigAttribType = 5;
pub const VAConfigAttribEncPackedHeaders: VAConfigAttribType = 10;
pub const VAConfigAttribEncInterlaced: VAConfigAttribType = 11;
pub const VAConfigAttribEncMaxRefFrames: VAConfigAttribType = 13;

pub const VA_ATTRIB_NOT_SUPPORTED: u32 = 0x80000000;

pub const VA_RT_FORMAT_YUV420: u32 = 0x00000001;
pub const VA_RT_FORMAT_YUV422: u32 = 0x00000002;
pub const VA_RT_FORMAT_YUV444: u32 = 0x00000004;

/// Rate control modes, reported and selected through
/// [`VAConfigAttribRateControl`].
pub const VA_RC_NONE: u32 = 0x00000001;
pub const VA_RC_CBR: u32 = 0x00000002;
pub const VA_RC_VBR: u32 = 0x00000004;
pub const VA_RC_VCM: u32 = 0x00000008;
pub const VA_RC_CQP: u32 = 0x00000010;
pub const VA_RC_VBR_CONSTRAINED: u32 = 0x00000020;

/// Packed header support flags, reported through
/// [`VAConfigAttribEncPackedHeaders`].
pub const VA_ENC_PACKED_HEADER_NONE: u32 = 0x00000000;
pub const VA_ENC_PACKED_HEADER_SEQUENCE: u32 = 0x00000001;
pub const VA_ENC_PACKED_HEADER_PICTURE: u32 = 0x00000002;
pub const VA_ENC_PACKED_HEADER_SLICE: u32 = 0x00000004;
pub const VA_ENC_PACKED_HEADER_MISC: u32 = 0x00000008;
pub const VA_ENC_PACKED_HEADER_RAW_DATA: u32 = 0x00000010;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VAConfigAttrib {
    pub type_: VAConfigAttribType,
    pub value: u32,
}

// ---------------------------------------------------------------------------
// Generic values and surface attributes
// ---------------------------------------------------------------------------

pub const VAGenericValueTypeInteger: VAGenericValueType = 1;
pub const VAGenericValueTypeFloat: VAGenericValueType = 2;
pub const VAGenericValueTypePointer: VAGenericValueType = 3;
pub const VAGenericValueTypeFunc: VAGenericValueType = 4;

#[repr(C)]
#[derive(Clone, Copy)]
pub union VAGenericValueUnion {
    pub i: c_int,
    pub f: f32,
    pub p: *mut c_void,
    pub func: Option<extern "C" fn()>,
}

impl Default for VAGenericValueUnion {
    fn default() -> Self {
        VAGenericValueUnion { i: 0 }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct VAGenericValue {
    pub type_: VAGenericValueType,
    pub value: VAGenericValueUnion,
}

pub const VASurfaceAttribNone: VASurfaceAttribType = 0;
pub const VASurfaceAttribPixelFormat: VASurfaceAttribType = 1;
pub const VASurfaceAttribMemoryType: VASurfaceAttribType = 9;

pub const VA_SURFACE_ATTRIB_GETTABLE: u32 = 0x00000001;
pub const VA_SURFACE_ATTRIB_SETTABLE: u32 = 0x00000002;

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct VASurfaceAttrib {
    pub type_: VASurfaceAttribType,
    pub flags: u32,
    pub value: VAGenericValue,
}

pub const VA_FOURCC_NV12: u32 = u32::from_le_bytes(*b"NV12");
pub const VA_FOURCC_YUY2: u32 = u32::from_le_bytes(*b"YUY2");
pub const VA_FOURCC_I420: u32 = u32::from_le_bytes(*b"I420");

// ---------------------------------------------------------------------------
// Buffer types
// ---------------------------------------------------------------------------

pub const VAPictureParameterBufferType: VABufferType = 0;
pub const VASliceParameterBufferType: VABufferType = 4;
pub const VASliceDataBufferType: VABufferType = 5;
pub const VAEncCodedBufferType: VABufferType = 21;
pub const VAEncSequenceParameterBufferType: VABufferType = 22;
pub const VAEncPictureParameterBufferType: VABufferType = 23;
pub const VAEncSliceParameterBufferType: VABufferType = 24;
pub const VAEncPackedHeaderParameterBufferType: VABufferType = 25;
pub const VAEncPackedHeaderDataBufferType: VABufferType = 26;
pub const VAEncMiscParameterBufferType: VABufferType = 27;

pub const VAEncMiscParameterTypeFrameRate: VAEncMiscParameterType = 0;
pub const VAEncMiscParameterTypeRateControl: VAEncMiscParameterType = 1;
pub const VAEncMiscParameterTypeMaxSliceSize: VAEncMiscParameterType = 2;
pub const VAEncMiscParameterTypeMaxFrameSize: VAEncMiscParameterType = 4;
pub const VAEncMiscParameterTypeHRD: VAEncMiscParameterType = 5;
pub const VAEncMiscParameterTypeQualityLevel: VAEncMiscParameterType = 6;

/// Packed header types used in [`VAEncPackedHeaderParameterBuffer::type_`].
pub const VAEncPackedHeaderSequence: u32 = 1;
pub const VAEncPackedHeaderPicture: u32 = 2;
pub const VAEncPackedHeaderSlice: u32 = 3;
pub const VAEncPackedHeaderRawData: u32 = 4;
/// Codec-specific packed headers carry this mask plus a codec-defined id.
pub const VAEncPackedHeaderMiscMask: u32 = 0x80000000;
/// Packed SEI message for H.264.
pub const VAEncPackedHeaderH264_SEI: u32 = VAEncPackedHeaderMiscMask | 1;

// ---------------------------------------------------------------------------
// Images and coded buffers
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VAImageFormat {
    pub fourcc: u32,
    pub byte_order: u32,
    pub bits_per_pixel: u32,
    pub depth: u32,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
    pub alpha_mask: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VAImage {
    pub image_id: VAImageID,
    pub format: VAImageFormat,
    pub buf: VABufferID,
    pub width: u16,
    pub height: u16,
    pub data_size: u32,
    pub num_planes: u32,
    pub pitches: [u32; 3],
    pub offsets: [u32; 3],
    pub num_palette_entries: i32,
    pub entry_bytes: i32,
    pub component_order: [i8; 4],
}

impl Default for VAImage {
    fn default() -> Self {
        // VA_INVALID_ID marks an image the driver has not yet filled in.
        VAImage {
            image_id: VA_INVALID_ID,
            format: VAImageFormat::default(),
            buf: VA_INVALID_ID,
            width: 0,
            height: 0,
            data_size: 0,
            num_planes: 0,
            pitches: [0; 3],
            offsets: [0; 3],
            num_palette_entries: 0,
            entry_bytes: 0,
            component_order: [0; 4],
        }
    }
}

/// One segment of coded output. Segments form a singly linked list via
/// `next`; the full coded frame is the concatenation of all segments.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VACodedBufferSegment {
    pub size: u32,
    pub bit_offset: u32,
    pub status: u32,
    pub reserved: u32,
    pub buf: *mut c_void,
    pub next: *mut VACodedBufferSegment,
}

/// Bits of [`VACodedBufferSegment::status`].
pub const VA_CODED_BUF_STATUS_PICTURE_AVE_QP_MASK: u32 = 0xff;
pub const VA_CODED_BUF_STATUS_LARGE_SLICE_MASK: u32 = 0x100;
pub const VA_CODED_BUF_STATUS_SLICE_OVERFLOW_MASK: u32 = 0x200;
pub const VA_CODED_BUF_STATUS_FRAME_SIZE_OVERFLOW: u32 = 0x1000;

// ---------------------------------------------------------------------------
// H.264 picture descriptor (shared between decode and encode APIs)
// ---------------------------------------------------------------------------

pub const VA_PICTURE_H264_INVALID: u32 = 0x00000001;
pub const VA_PICTURE_H264_TOP_FIELD: u32 = 0x00000002;
pub const VA_PICTURE_H264_BOTTOM_FIELD: u32 = 0x00000004;
pub const VA_PICTURE_H264_SHORT_TERM_REFERENCE: u32 = 0x00000008;
pub const VA_PICTURE_H264_LONG_TERM_REFERENCE: u32 = 0x00000010;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VAPictureH264 {
    pub picture_id: VASurfaceID,
    pub frame_idx: u32,
    pub flags: u32,
    pub TopFieldOrderCnt: i32,
    pub BottomFieldOrderCnt: i32,
}

impl Default for VAPictureH264 {
    fn default() -> Self {
        VAPictureH264 {
            picture_id: VA_INVALID_SURFACE,
            frame_idx: 0,
            flags: VA_PICTURE_H264_INVALID,
            TopFieldOrderCnt: 0,
            BottomFieldOrderCnt: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Context flags
// ---------------------------------------------------------------------------

pub const VA_PROGRESSIVE: c_int = 0x1;

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

#[link(name = "va")]
extern "C" {
    pub fn vaInitialize(
        dpy: VADisplay,
        major_version: *mut c_int,
        minor_version: *mut c_int,
    ) -> VAStatus;

    pub fn vaTerminate(dpy: VADisplay) -> VAStatus;

    pub fn vaErrorStr(error_status: VAStatus) -> *const c_char;

    pub fn vaMaxNumEntrypoints(dpy: VADisplay) -> c_int;

    pub fn vaQueryConfigEntrypoints(
        dpy: VADisplay,
        profile: VAProfile,
        entrypoint_list: *mut VAEntrypoint,
        num_entrypoints: *mut c_int,
    ) -> VAStatus;

    pub fn vaGetConfigAttributes(
        dpy: VADisplay,
        profile: VAProfile,
        entrypoint: VAEntrypoint,
        attrib_list: *mut VAConfigAttrib,
        num_attribs: c_int,
    ) -> VAStatus;

    pub fn vaCreateConfig(
        dpy: VADisplay,
        profile: VAProfile,
        entrypoint: VAEntrypoint,
        attrib_list: *mut VAConfigAttrib,
        num_attribs: c_int,
        config_id: *mut VAConfigID,
    ) -> VAStatus;

    pub fn vaDestroyConfig(dpy: VADisplay, config_id: VAConfigID) -> VAStatus;

    pub fn vaCreateSurfaces(
        dpy: VADisplay,
        format: u32,
        width: u32,
        height: u32,
        surfaces: *mut VASurfaceID,
        num_surfaces: u32,
        attrib_list: *mut VASurfaceAttrib,
        num_attribs: u32,
    ) -> VAStatus;

    pub fn vaDestroySurfaces(
        dpy: VADisplay,
        surfaces: *mut VASurfaceID,
        num_surfaces: c_int,
    ) -> VAStatus;

    pub fn vaCreateContext(
        dpy: VADisplay,
        config_id: VAConfigID,
        picture_width: c_int,
        picture_height: c_int,
        flag: c_int,
        render_targets: *mut VASurfaceID,
        num_render_targets: c_int,
        context: *mut VAContextID,
    ) -> VAStatus;

    pub fn vaDestroyContext(dpy: VADisplay, context: VAContextID) -> VAStatus;

    pub fn vaCreateBuffer(
        dpy: VADisplay,
        context: VAContextID,
        type_: VABufferType,
        size: u32,
        num_elements: u32,
        data: *mut c_void,
        buf_id: *mut VABufferID,
    ) -> VAStatus;

    pub fn vaDestroyBuffer(dpy: VADisplay, buffer_id: VABufferID) -> VAStatus;

    pub fn vaMapBuffer(dpy: VADisplay, buf_id: VABufferID, pbuf: *mut *mut c_void) -> VAStatus;

    pub fn vaUnmapBuffer(dpy: VADisplay, buf_id: VABufferID) -> VAStatus;

    pub fn vaBeginPicture(
        dpy: VADisplay,
        context: VAContextID,
        render_target: VASurfaceID,
    ) -> VAStatus;

    pub fn vaRenderPicture(
        dpy: VADisplay,
        context: VAContextID,
        buffers: *mut VABufferID,
        num_buffers: c_int,
    ) -> VAStatus;

    pub fn vaEndPicture(dpy: VADisplay, context: VAContextID) -> VAStatus;

    pub fn vaSyncSurface(dpy: VADisplay, render_target: VASurfaceID) -> VAStatus;

    pub fn vaDeriveImage(dpy: VADisplay, surface: VASurfaceID, image: *mut VAImage) -> VAStatus;

    pub fn vaDestroyImage(dpy: VADisplay, image: VAImageID) -> VAStatus;
}
