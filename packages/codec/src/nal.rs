//! Hand-built H.264 NAL units: SPS, PPS and the buffering-period /
//! picture-timing SEI message.
//!
//! Each builder returns a complete Annex-B unit: 4-byte start code, NAL
//! header byte, then the RBSP payload with trailing bits. The payloads are
//! emitted emulation-prevention-free; the accelerator inserts emulation
//! bytes when it packs the headers into the coded stream.

use crate::bitstream::Bitstream;
use crate::gop::{LOG2_MAX_FRAME_NUM, LOG2_MAX_PIC_ORDER_CNT_LSB};
use crate::types::{EncoderConfig, EntropyMode, RateControl};

/// NAL unit types.
pub const NAL_NON_IDR: u32 = 1;
pub const NAL_IDR: u32 = 5;
pub const NAL_SEI: u32 = 6;
pub const NAL_SPS: u32 = 7;
pub const NAL_PPS: u32 = 8;

/// `nal_ref_idc` values.
pub const NAL_REF_IDC_NONE: u32 = 0;
pub const NAL_REF_IDC_LOW: u32 = 1;
pub const NAL_REF_IDC_MEDIUM: u32 = 2;
pub const NAL_REF_IDC_HIGH: u32 = 3;

/// Field width of the HRD removal-delay counters, matching the
/// `*_length_minus1 = 23` values written into the SPS HRD block.
pub const CPB_REMOVAL_DELAY_BITS: u32 = 24;

/// A finished header NAL ready to hand to the accelerator as packed
/// header data.
#[derive(Debug, Clone)]
pub struct PackedHeader {
    /// Annex-B bytes, zero-padded to the final byte boundary.
    pub data: Vec<u8>,
    /// Exact payload length in bits, as the packed-header parameter
    /// buffer wants it.
    pub bit_len: usize,
}

impl PackedHeader {
    fn from_bitstream(bs: &Bitstream) -> Self {
        Self {
            data: bs.to_bytes(),
            bit_len: bs.bit_len(),
        }
    }
}

fn nal_start_code(bs: &mut Bitstream) {
    bs.put_ui(0x0000_0001, 32);
}

fn nal_header(bs: &mut Bitstream, nal_ref_idc: u32, nal_unit_type: u32) {
    bs.put_ui(0, 1); // forbidden_zero_bit
    bs.put_ui(nal_ref_idc, 2);
    bs.put_ui(nal_unit_type, 5);
}

/// Build the sequence parameter set for `config`.
#[must_use]
pub fn build_sps(config: &EncoderConfig) -> PackedHeader {
    let mut bs = Bitstream::new();
    nal_start_code(&mut bs);
    nal_header(&mut bs, NAL_REF_IDC_HIGH, NAL_SPS);

    let profile_idc = config.profile.profile_idc();
    let constraint = config.profile.constraint_set_flags();

    bs.put_ui(profile_idc, 8);
    bs.put_ui(constraint & 0x1, 1); // constraint_set0_flag
    bs.put_ui((constraint >> 1) & 0x1, 1); // constraint_set1_flag
    bs.put_ui((constraint >> 2) & 0x1, 1); // constraint_set2_flag
    bs.put_ui((constraint >> 3) & 0x1, 1); // constraint_set3_flag
    bs.put_ui(0, 4); // reserved_zero_4bits
    bs.put_ui(config.level_idc, 8);
    bs.put_ue(0); // seq_parameter_set_id

    if config.profile.is_high() {
        bs.put_ue(1); // chroma_format_idc: 4:2:0
        bs.put_ue(0); // bit_depth_luma_minus8
        bs.put_ue(0); // bit_depth_chroma_minus8
        bs.put_ui(0, 1); // qpprime_y_zero_transform_bypass_flag
        bs.put_ui(0, 1); // seq_scaling_matrix_present_flag
    }

    bs.put_ue(LOG2_MAX_FRAME_NUM - 4);
    bs.put_ue(0); // pic_order_cnt_type
    bs.put_ue(LOG2_MAX_PIC_ORDER_CNT_LSB - 4);
    bs.put_ue(config.num_ref_frames);
    bs.put_ui(0, 1); // gaps_in_frame_num_value_allowed_flag
    bs.put_ue(config.width_in_mbs() - 1);
    bs.put_ue(config.height_in_mbs() - 1);
    bs.put_ui(1, 1); // frame_mbs_only_flag
    bs.put_ui(1, 1); // direct_8x8_inference_flag

    let coded_width = config.width_in_mbs() * 16;
    let coded_height = config.height_in_mbs() * 16;
    let cropping = coded_width != config.width || coded_height != config.height;
    bs.put_ui(u32::from(cropping), 1); // frame_cropping_flag
    if cropping {
        // Crop units are 2 luma samples for 4:2:0 frame coding.
        bs.put_ue(0); // frame_crop_left_offset
        bs.put_ue((coded_width - config.width) / 2);
        bs.put_ue(0); // frame_crop_top_offset
        bs.put_ue((coded_height - config.height) / 2);
    }

    bs.put_ui(1, 1); // vui_parameters_present_flag
    bs.put_ui(0, 1); // aspect_ratio_info_present_flag
    bs.put_ui(0, 1); // overscan_info_present_flag
    bs.put_ui(0, 1); // video_signal_type_present_flag
    bs.put_ui(0, 1); // chroma_loc_info_present_flag
    bs.put_ui(1, 1); // timing_info_present_flag
    bs.put_ui(1, 32); // num_units_in_tick
    bs.put_ui(config.frame_rate * 2, 32); // time_scale
    bs.put_ui(1, 1); // fixed_frame_rate_flag

    let nal_hrd = config.rate_control == RateControl::Cbr;
    bs.put_ui(u32::from(nal_hrd), 1); // nal_hrd_parameters_present_flag
    if nal_hrd {
        bs.put_ue(0); // cpb_cnt_minus1
        bs.put_ui(4, 4); // bit_rate_scale
        bs.put_ui(6, 4); // cpb_size_scale
        // Both scales put the value units at 1024 bits.
        let kbits = (config.bitrate >> 10).max(1);
        bs.put_ue(kbits - 1); // bit_rate_value_minus1[0]
        bs.put_ue(kbits * config.hrd_bitrate_multiplier - 1); // cpb_size_value_minus1[0]
        bs.put_ui(1, 1); // cbr_flag[0]
        bs.put_ui(CPB_REMOVAL_DELAY_BITS - 1, 5); // initial_cpb_removal_delay_length_minus1
        bs.put_ui(CPB_REMOVAL_DELAY_BITS - 1, 5); // cpb_removal_delay_length_minus1
        bs.put_ui(CPB_REMOVAL_DELAY_BITS - 1, 5); // dpb_output_delay_length_minus1
        bs.put_ui(CPB_REMOVAL_DELAY_BITS - 1, 5); // time_offset_length
    }
    bs.put_ui(0, 1); // vcl_hrd_parameters_present_flag
    if nal_hrd {
        bs.put_ui(0, 1); // low_delay_hrd_flag
    }
    bs.put_ui(0, 1); // pic_struct_present_flag
    bs.put_ui(0, 1); // bitstream_restriction_flag

    bs.rbsp_trailing_bits();
    PackedHeader::from_bitstream(&bs)
}

/// Build the picture parameter set for `config`.
#[must_use]
pub fn build_pps(config: &EncoderConfig) -> PackedHeader {
    let mut bs = Bitstream::new();
    nal_start_code(&mut bs);
    nal_header(&mut bs, NAL_REF_IDC_HIGH, NAL_PPS);

    bs.put_ue(0); // pic_parameter_set_id
    bs.put_ue(0); // seq_parameter_set_id
    bs.put_ui(
        u32::from(config.entropy == EntropyMode::Cabac),
        1, // entropy_coding_mode_flag
    );
    bs.put_ui(0, 1); // bottom_field_pic_order_in_frame_present_flag
    bs.put_ue(0); // num_slice_groups_minus1
    bs.put_ue(0); // num_ref_idx_l0_default_active_minus1
    bs.put_ue(0); // num_ref_idx_l1_default_active_minus1
    bs.put_ui(0, 1); // weighted_pred_flag
    bs.put_ui(0, 2); // weighted_bipred_idc
    bs.put_se(config.initial_qp as i32 - 26); // pic_init_qp_minus26
    bs.put_se(0); // pic_init_qs_minus26
    bs.put_se(0); // chroma_qp_index_offset
    bs.put_ui(1, 1); // deblocking_filter_control_present_flag
    bs.put_ui(0, 1); // constrained_intra_pred_flag
    bs.put_ui(0, 1); // redundant_pic_cnt_present_flag
    if config.profile.is_high() {
        bs.put_ui(1, 1); // transform_8x8_mode_flag
        bs.put_ui(0, 1); // pic_scaling_matrix_present_flag
        bs.put_se(0); // second_chroma_qp_index_offset
    }

    bs.rbsp_trailing_bits();
    PackedHeader::from_bitstream(&bs)
}

/// HRD timing values carried by the per-frame SEI message.
#[derive(Debug, Clone, Copy)]
pub struct SeiTiming {
    /// 90 kHz delay before the first CPB removal.
    pub initial_cpb_removal_delay: u32,
    pub initial_cpb_removal_delay_offset: u32,
    /// Clock ticks between this picture's removal and the previous
    /// buffering period.
    pub cpb_removal_delay: u32,
    pub dpb_output_delay: u32,
}

impl SeiTiming {
    /// Initial CPB removal delay for `bitrate`, assuming the decoder
    /// buffer starts half full: `0.5 * cpb_bits / bitrate` seconds on the
    /// 90 kHz clock.
    #[must_use]
    pub fn initial_delay_for_bitrate(bitrate: u32) -> u32 {
        let cpb_size_kb = f64::from(bitrate) * 8.0 / 1024.0;
        (cpb_size_kb * 0.5 * 1024.0 / f64::from(bitrate) * 90000.0) as u32
    }
}

/// Build the buffering-period + picture-timing SEI message.
#[must_use]
pub fn build_sei(timing: &SeiTiming) -> PackedHeader {
    // Buffering period payload.
    let mut bp = Bitstream::new();
    bp.put_ue(0); // seq_parameter_set_id
    bp.put_ui(timing.initial_cpb_removal_delay, CPB_REMOVAL_DELAY_BITS);
    bp.put_ui(
        timing.initial_cpb_removal_delay_offset,
        CPB_REMOVAL_DELAY_BITS,
    );
    if bp.bit_len() % 8 != 0 {
        bp.put_ui(1, 1); // payload stop bit
    }
    let bp_bytes = bp.to_bytes();

    // Picture timing payload.
    let mut pt = Bitstream::new();
    pt.put_ui(timing.cpb_removal_delay, CPB_REMOVAL_DELAY_BITS);
    pt.put_ui(timing.dpb_output_delay, CPB_REMOVAL_DELAY_BITS);
    if pt.bit_len() % 8 != 0 {
        pt.put_ui(1, 1);
    }
    let pt_bytes = pt.to_bytes();

    let mut bs = Bitstream::new();
    nal_start_code(&mut bs);
    nal_header(&mut bs, NAL_REF_IDC_NONE, NAL_SEI);

    bs.put_ui(0, 8); // payload type: buffering period
    bs.put_ui(bp_bytes.len() as u32, 8);
    bs.put_bytes(&bp_bytes);

    bs.put_ui(1, 8); // payload type: picture timing
    bs.put_ui(pt_bytes.len() as u32, 8);
    bs.put_bytes(&pt_bytes);

    bs.rbsp_trailing_bits();
    PackedHeader::from_bitstream(&bs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Profile;

    struct BitReader<'a> {
        bytes: &'a [u8],
        pos: usize,
    }

    impl<'a> BitReader<'a> {
        fn new(bytes: &'a [u8]) -> Self {
            Self { bytes, pos: 0 }
        }

        fn read_bits(&mut self, n: u32) -> u32 {
            let mut v = 0;
            for _ in 0..n {
                let byte = self.bytes[self.pos / 8];
                v = (v << 1) | u32::from((byte >> (7 - (self.pos % 8))) & 1);
                self.pos += 1;
            }
            v
        }

        fn read_ue(&mut self) -> u32 {
            let mut zeros = 0;
            while self.read_bits(1) == 0 {
                zeros += 1;
            }
            let suffix = if zeros == 0 { 0 } else { self.read_bits(zeros) };
            (1 << zeros) - 1 + suffix
        }

        fn read_se(&mut self) -> i32 {
            let code = self.read_ue();
            if code % 2 == 0 {
                -((code / 2) as i32)
            } else {
                ((code + 1) / 2) as i32
            }
        }
    }

    #[test]
    fn test_sps_envelope_and_profile() {
        let config = EncoderConfig::new(1920, 1080);
        let sps = build_sps(&config);
        assert_eq!(&sps.data[..4], &[0x00, 0x00, 0x00, 0x01]);
        // nal_ref_idc 3, type 7
        assert_eq!(sps.data[4], 0x67);
        assert_eq!(sps.data[5], 100); // high profile_idc
        assert_eq!(sps.bit_len % 8, 0);
        assert_eq!(sps.bit_len / 8, sps.data.len());
    }

    #[test]
    fn test_sps_dimension_fields() {
        let mut config = EncoderConfig::new(1920, 1080);
        config.profile = Profile::Main;
        let sps = build_sps(&config);
        // Skip start code + NAL header + profile/constraint/level bytes.
        let mut reader = BitReader::new(&sps.data[8..]);
        assert_eq!(reader.read_ue(), 0); // seq_parameter_set_id
        assert_eq!(reader.read_ue(), LOG2_MAX_FRAME_NUM - 4);
        assert_eq!(reader.read_ue(), 0); // pic_order_cnt_type
        assert_eq!(reader.read_ue(), LOG2_MAX_PIC_ORDER_CNT_LSB - 4);
        assert_eq!(reader.read_ue(), config.num_ref_frames);
        assert_eq!(reader.read_bits(1), 0); // gaps_in_frame_num
        assert_eq!(reader.read_ue(), 119); // 1920/16 - 1
        assert_eq!(reader.read_ue(), 67); // ceil(1080/16) - 1
        assert_eq!(reader.read_bits(1), 1); // frame_mbs_only_flag
        assert_eq!(reader.read_bits(1), 1); // direct_8x8_inference_flag
        assert_eq!(reader.read_bits(1), 1); // frame_cropping_flag (1080 -> 1088)
        assert_eq!(reader.read_ue(), 0);
        assert_eq!(reader.read_ue(), 0);
        assert_eq!(reader.read_ue(), 0);
        assert_eq!(reader.read_ue(), 4); // (1088 - 1080) / 2
    }

    #[test]
    fn test_sps_no_cropping_on_aligned_dimensions() {
        let mut config = EncoderConfig::new(720, 480);
        config.profile = Profile::Main;
        let sps = build_sps(&config);
        let mut reader = BitReader::new(&sps.data[8..]);
        for _ in 0..5 {
            reader.read_ue();
        }
        reader.read_bits(1);
        reader.read_ue();
        reader.read_ue();
        reader.read_bits(2);
        assert_eq!(reader.read_bits(1), 0); // frame_cropping_flag
    }

    #[test]
    fn test_sps_hrd_only_under_cbr() {
        let vbr = build_sps(&EncoderConfig::new(720, 480));
        let cbr = build_sps(&EncoderConfig::new(720, 480).rate_control(RateControl::Cbr));
        // The CBR SPS carries the whole HRD block on top of the VBR one.
        assert!(cbr.bit_len > vbr.bit_len + 40);
    }

    #[test]
    fn test_pps_fields_decode() {
        let config = EncoderConfig::new(720, 480); // high profile, CABAC
        let pps = build_pps(&config);
        assert_eq!(&pps.data[..4], &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(pps.data[4], 0x68);
        let mut reader = BitReader::new(&pps.data[5..]);
        assert_eq!(reader.read_ue(), 0); // pic_parameter_set_id
        assert_eq!(reader.read_ue(), 0); // seq_parameter_set_id
        assert_eq!(reader.read_bits(1), 1); // CABAC
        assert_eq!(reader.read_bits(1), 0);
        assert_eq!(reader.read_ue(), 0); // num_slice_groups_minus1
        assert_eq!(reader.read_ue(), 0);
        assert_eq!(reader.read_ue(), 0);
        assert_eq!(reader.read_bits(1), 0); // weighted_pred_flag
        assert_eq!(reader.read_bits(2), 0); // weighted_bipred_idc
        assert_eq!(reader.read_se(), 0); // pic_init_qp_minus26 (qp 26)
        assert_eq!(reader.read_se(), 0);
        assert_eq!(reader.read_se(), 0);
        assert_eq!(reader.read_bits(1), 1); // deblocking control present
    }

    #[test]
    fn test_pps_qp_offset() {
        let mut config = EncoderConfig::new(720, 480);
        config.initial_qp = 30;
        let pps = build_pps(&config);
        let mut reader = BitReader::new(&pps.data[5..]);
        for _ in 0..2 {
            reader.read_ue();
        }
        reader.read_bits(2);
        for _ in 0..3 {
            reader.read_ue();
        }
        reader.read_bits(3);
        assert_eq!(reader.read_se(), 4); // 30 - 26
    }

    #[test]
    fn test_sei_payload_structure() {
        let timing = SeiTiming {
            initial_cpb_removal_delay: 45000,
            initial_cpb_removal_delay_offset: 0,
            cpb_removal_delay: 2,
            dpb_output_delay: 0,
        };
        let sei = build_sei(&timing);
        assert_eq!(&sei.data[..4], &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(sei.data[4], 0x06);
        // Buffering period: payload type 0, then ue(0) + 2x24 bits + stop
        // bit = 7 bytes.
        assert_eq!(sei.data[5], 0x00);
        let bp_size = sei.data[6] as usize;
        assert_eq!(bp_size, 7);
        // Picture timing follows immediately: payload type 1, 48 bits = 6
        // bytes.
        assert_eq!(sei.data[7 + bp_size], 0x01);
        assert_eq!(sei.data[8 + bp_size], 6);

        let mut reader = BitReader::new(&sei.data[7..]);
        assert_eq!(reader.read_ue(), 0); // seq_parameter_set_id
        assert_eq!(reader.read_bits(24), 45000);
        assert_eq!(reader.read_bits(24), 0);
    }

    #[test]
    fn test_sei_initial_delay_formula() {
        // 0.5 seconds of buffer at 90 kHz, independent of the bitrate.
        assert_eq!(SeiTiming::initial_delay_for_bitrate(3_000_000), 45000);
        assert_eq!(SeiTiming::initial_delay_for_bitrate(1_000_000), 45000);
    }
}
