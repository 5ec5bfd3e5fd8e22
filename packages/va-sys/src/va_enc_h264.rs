//! H.264 encode parameter buffers from `va/va_enc_h264.h` and the generic
//! misc-parameter carriers from `va/va_enc.h`.
//!
//! The C headers pack several flags into anonymous bitfield unions
//! (`seq_fields`, `pic_fields`, `vui_fields`). Each union occupies exactly
//! one 32-bit word, so the bindings carry them as plain `u32` values with
//! the bit positions published as `*_SHIFT` constants alongside.

use std::os::raw::c_void;

use crate::va::{VABufferID, VAEncMiscParameterType, VAPictureH264};

// ---------------------------------------------------------------------------
// VAEncSequenceParameterBufferH264.seq_fields bit positions
// ---------------------------------------------------------------------------

pub const SEQ_CHROMA_FORMAT_IDC_SHIFT: u32 = 0; // 2 bits
pub const SEQ_FRAME_MBS_ONLY_FLAG_SHIFT: u32 = 2;
pub const SEQ_MB_ADAPTIVE_FRAME_FIELD_FLAG_SHIFT: u32 = 3;
pub const SEQ_SCALING_MATRIX_PRESENT_FLAG_SHIFT: u32 = 4;
pub const SEQ_DIRECT_8X8_INFERENCE_FLAG_SHIFT: u32 = 5;
pub const SEQ_LOG2_MAX_FRAME_NUM_MINUS4_SHIFT: u32 = 6; // 4 bits
pub const SEQ_PIC_ORDER_CNT_TYPE_SHIFT: u32 = 10; // 2 bits
pub const SEQ_LOG2_MAX_PIC_ORDER_CNT_LSB_MINUS4_SHIFT: u32 = 12; // 4 bits
pub const SEQ_DELTA_PIC_ORDER_ALWAYS_ZERO_FLAG_SHIFT: u32 = 16;

// ---------------------------------------------------------------------------
// VAEncSequenceParameterBufferH264.vui_fields bit positions
// ---------------------------------------------------------------------------

pub const VUI_ASPECT_RATIO_INFO_PRESENT_FLAG_SHIFT: u32 = 0;
pub const VUI_TIMING_INFO_PRESENT_FLAG_SHIFT: u32 = 1;
pub const VUI_BITSTREAM_RESTRICTION_FLAG_SHIFT: u32 = 2;
pub const VUI_LOG2_MAX_MV_LENGTH_HORIZONTAL_SHIFT: u32 = 3; // 5 bits
pub const VUI_LOG2_MAX_MV_LENGTH_VERTICAL_SHIFT: u32 = 8; // 5 bits
pub const VUI_FIXED_FRAME_RATE_FLAG_SHIFT: u32 = 13;
pub const VUI_LOW_DELAY_HRD_FLAG_SHIFT: u32 = 14;
pub const VUI_MOTION_VECTORS_OVER_PIC_BOUNDARIES_FLAG_SHIFT: u32 = 15;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VAEncSequenceParameterBufferH264 {
    pub seq_parameter_set_id: u8,
    pub level_idc: u8,
    pub intra_period: u32,
    pub intra_idr_period: u32,
    pub ip_period: u32,
    pub bits_per_second: u32,
    pub max_num_ref_frames: u32,
    pub picture_width_in_mbs: u16,
    pub picture_height_in_mbs: u16,
    /// Bitfield union, see the `SEQ_*_SHIFT` constants.
    pub seq_fields: u32,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub num_ref_frames_in_pic_order_cnt_cycle: u8,
    pub offset_for_non_ref_pic: i32,
    pub offset_for_top_to_bottom_field: i32,
    pub offset_for_ref_frame: [i32; 256],
    pub frame_cropping_flag: u8,
    pub frame_crop_left_offset: u32,
    pub frame_crop_right_offset: u32,
    pub frame_crop_top_offset: u32,
    pub frame_crop_bottom_offset: u32,
    pub vui_parameters_present_flag: u8,
    /// Bitfield union, see the `VUI_*_SHIFT` constants.
    pub vui_fields: u32,
    pub aspect_ratio_idc: u8,
    pub sar_width: u32,
    pub sar_height: u32,
    pub num_units_in_tick: u32,
    pub time_scale: u32,
}

impl Default for VAEncSequenceParameterBufferH264 {
    fn default() -> Self {
        // Zeroed is the documented baseline for every parameter buffer; the
        // large ref-frame offset table makes a field-by-field init unviable.
        unsafe { std::mem::zeroed() }
    }
}

// ---------------------------------------------------------------------------
// VAEncPictureParameterBufferH264.pic_fields bit positions
// ---------------------------------------------------------------------------

pub const PIC_IDR_PIC_FLAG_SHIFT: u32 = 0;
pub const PIC_REFERENCE_PIC_FLAG_SHIFT: u32 = 1; // 2 bits
pub const PIC_ENTROPY_CODING_MODE_FLAG_SHIFT: u32 = 3;
pub const PIC_WEIGHTED_PRED_FLAG_SHIFT: u32 = 4;
pub const PIC_WEIGHTED_BIPRED_IDC_SHIFT: u32 = 5; // 2 bits
pub const PIC_CONSTRAINED_INTRA_PRED_FLAG_SHIFT: u32 = 7;
pub const PIC_TRANSFORM_8X8_MODE_FLAG_SHIFT: u32 = 8;
pub const PIC_DEBLOCKING_FILTER_CONTROL_PRESENT_FLAG_SHIFT: u32 = 9;
pub const PIC_REDUNDANT_PIC_CNT_PRESENT_FLAG_SHIFT: u32 = 10;
pub const PIC_PIC_ORDER_PRESENT_FLAG_SHIFT: u32 = 11;
pub const PIC_PIC_SCALING_MATRIX_PRESENT_FLAG_SHIFT: u32 = 12;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VAEncPictureParameterBufferH264 {
    pub CurrPic: VAPictureH264,
    pub ReferenceFrames: [VAPictureH264; 16],
    pub coded_buf: VABufferID,
    pub pic_parameter_set_id: u8,
    pub seq_parameter_set_id: u8,
    pub last_picture: u8,
    pub frame_num: u16,
    pub pic_init_qp: u8,
    pub num_ref_idx_l0_active_minus1: u8,
    pub num_ref_idx_l1_active_minus1: u8,
    pub chroma_qp_index_offset: i8,
    pub second_chroma_qp_index_offset: i8,
    /// Bitfield union, see the `PIC_*_SHIFT` constants.
    pub pic_fields: u32,
}

impl Default for VAEncPictureParameterBufferH264 {
    fn default() -> Self {
        VAEncPictureParameterBufferH264 {
            CurrPic: VAPictureH264::default(),
            ReferenceFrames: [VAPictureH264::default(); 16],
            coded_buf: crate::va::VA_INVALID_ID,
            pic_parameter_set_id: 0,
            seq_parameter_set_id: 0,
            last_picture: 0,
            frame_num: 0,
            pic_init_qp: 26,
            num_ref_idx_l0_active_minus1: 0,
            num_ref_idx_l1_active_minus1: 0,
            chroma_qp_index_offset: 0,
            second_chroma_qp_index_offset: 0,
            pic_fields: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Slice parameters
// ---------------------------------------------------------------------------

/// `slice_type` values accepted by the encode slice parameter buffer.
pub const SLICE_TYPE_P: u8 = 0;
pub const SLICE_TYPE_B: u8 = 1;
pub const SLICE_TYPE_I: u8 = 2;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VAEncSliceParameterBufferH264 {
    pub macroblock_address: u32,
    pub num_macroblocks: u32,
    pub macroblock_info: VABufferID,
    pub slice_type: u8,
    pub pic_parameter_set_id: u8,
    pub idr_pic_id: u16,
    pub pic_order_cnt_lsb: u16,
    pub delta_pic_order_cnt_bottom: i32,
    pub delta_pic_order_cnt: [i32; 2],
    pub direct_spatial_mv_pred_flag: u8,
    pub num_ref_idx_active_override_flag: u8,
    pub num_ref_idx_l0_active_minus1: u8,
    pub num_ref_idx_l1_active_minus1: u8,
    pub RefPicList0: [VAPictureH264; 32],
    pub RefPicList1: [VAPictureH264; 32],
    pub luma_log2_weight_denom: u8,
    pub chroma_log2_weight_denom: u8,
    pub luma_weight_l0_flag: u8,
    pub luma_weight_l0: [i16; 32],
    pub luma_offset_l0: [i16; 32],
    pub chroma_weight_l0_flag: u8,
    pub chroma_weight_l0: [[i16; 2]; 32],
    pub chroma_offset_l0: [[i16; 2]; 32],
    pub luma_weight_l1_flag: u8,
    pub luma_weight_l1: [i16; 32],
    pub luma_offset_l1: [i16; 32],
    pub chroma_weight_l1_flag: u8,
    pub chroma_weight_l1: [[i16; 2]; 32],
    pub chroma_offset_l1: [[i16; 2]; 32],
    pub cabac_init_idc: u8,
    pub slice_qp_delta: i8,
    pub disable_deblocking_filter_idc: u8,
    pub slice_alpha_c0_offset_div2: i8,
    pub slice_beta_offset_div2: i8,
}

impl Default for VAEncSliceParameterBufferH264 {
    fn default() -> Self {
        let mut slice: VAEncSliceParameterBufferH264 = unsafe { std::mem::zeroed() };
        for pic in slice
            .RefPicList0
            .iter_mut()
            .chain(slice.RefPicList1.iter_mut())
        {
            *pic = VAPictureH264::default();
        }
        slice
    }
}

// ---------------------------------------------------------------------------
// Misc parameters (rate control, HRD) and packed headers
// ---------------------------------------------------------------------------

/// Header of every misc parameter buffer; the typed payload follows it
/// in-line in driver memory (`data[]` flexible array member in C).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VAEncMiscParameterBuffer {
    pub type_: VAEncMiscParameterType,
}

pub const RC_FLAG_RESET_SHIFT: u32 = 0;
pub const RC_FLAG_DISABLE_FRAME_SKIP_SHIFT: u32 = 1;
pub const RC_FLAG_DISABLE_BIT_STUFFING_SHIFT: u32 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VAEncMiscParameterRateControl {
    /// Peak rate in bits per second.
    pub bits_per_second: u32,
    /// Target percentage of the peak rate (100 for CBR).
    pub target_percentage: u32,
    /// Rate-control window in milliseconds.
    pub window_size: u32,
    pub initial_qp: u32,
    pub min_qp: u32,
    pub basic_unit_size: u32,
    /// Bitfield union, see the `RC_FLAG_*_SHIFT` constants.
    pub rc_flags: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VAEncMiscParameterHRD {
    pub initial_buffer_fullness: u32,
    pub buffer_size: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VAEncMiscParameterFrameRate {
    /// Packed rate: numerator in the low 16 bits, denominator in the high
    /// 16 bits (0 denominator means 1).
    pub framerate: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VAEncPackedHeaderParameterBuffer {
    /// One of `VAEncPackedHeader*` from [`crate::va`].
    pub type_: u32,
    /// Length of the packed header payload in bits.
    pub bit_length: u32,
    /// Non-zero when the payload already contains emulation prevention
    /// bytes.
    pub has_emulation_bytes: u8,
}

/// Byte length of a misc buffer holding payload `T` behind the header.
pub const fn misc_buffer_size<T>() -> usize {
    std::mem::size_of::<VAEncMiscParameterBuffer>() + std::mem::size_of::<T>()
}

/// Writes `payload` behind the misc-parameter header at `mapped`, tagging
/// the header with `type_`. `mapped` must point at a mapped VA buffer of at
/// least [`misc_buffer_size::<T>()`] bytes.
///
/// # Safety
///
/// `mapped` must be valid for writes of `misc_buffer_size::<T>()` bytes.
pub unsafe fn write_misc_parameter<T: Copy>(
    mapped: *mut c_void,
    type_: VAEncMiscParameterType,
    payload: &T,
) {
    let header = mapped as *mut VAEncMiscParameterBuffer;
    (*header).type_ = type_;
    let data = (header.add(1)) as *mut T;
    data.write_unaligned(*payload);
}
