//! Core types for the encoding pipeline.

use std::fmt;
use std::str::FromStr;

use crate::CodecError;

/// Rate control mode for encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateControl {
    /// No rate control.
    None,
    /// Constant bitrate - strict bitrate control with HRD conformance.
    Cbr,
    /// Variable bitrate - targets average bitrate.
    Vbr,
    /// Video conferencing mode.
    Vcm,
    /// Constant QP - fixed quality, variable bitrate.
    Cqp,
    /// Variable bitrate with a peak-rate constraint.
    VbrConstrained,
}

impl Default for RateControl {
    fn default() -> Self {
        Self::Vbr
    }
}

impl FromStr for RateControl {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, CodecError> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "CBR" => Ok(Self::Cbr),
            "VBR" => Ok(Self::Vbr),
            "VCM" => Ok(Self::Vcm),
            "CQP" => Ok(Self::Cqp),
            "VBR_CONSTRAINED" => Ok(Self::VbrConstrained),
            _ => Err(CodecError::UnknownRateControl(s.to_string())),
        }
    }
}

impl fmt::Display for RateControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::Cbr => "CBR",
            Self::Vbr => "VBR",
            Self::Vcm => "VCM",
            Self::Cqp => "CQP",
            Self::VbrConstrained => "VBR_CONSTRAINED",
        };
        f.write_str(name)
    }
}

/// H.264 profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// Baseline profile (no CABAC, no B-frames).
    Baseline,
    /// Constrained baseline profile.
    ConstrainedBaseline,
    /// Main profile.
    Main,
    /// High profile (8x8 transform, extended chroma signaling).
    High,
}

impl Profile {
    /// The `profile_idc` value carried in the SPS.
    #[must_use]
    pub fn profile_idc(self) -> u32 {
        match self {
            Self::Baseline | Self::ConstrainedBaseline => 66,
            Self::Main => 77,
            Self::High => 100,
        }
    }

    /// Returns true for the high profile.
    #[must_use]
    pub fn is_high(self) -> bool {
        matches!(self, Self::High)
    }

    /// `constraint_set` flags for the SPS, bit 0 = constraint_set0_flag.
    #[must_use]
    pub fn constraint_set_flags(self) -> u32 {
        match self {
            // constraint_set0 + constraint_set1
            Self::ConstrainedBaseline => 0x3,
            Self::Baseline => 0x1,
            Self::Main => 0x2,
            Self::High => 0x0,
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::High
    }
}

impl FromStr for Profile {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, CodecError> {
        match s.to_ascii_uppercase().as_str() {
            "BP" => Ok(Self::Baseline),
            "CBP" => Ok(Self::ConstrainedBaseline),
            "MP" => Ok(Self::Main),
            "HP" => Ok(Self::High),
            _ => Err(CodecError::UnknownProfile(s.to_string())),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Baseline => "BP",
            Self::ConstrainedBaseline => "CBP",
            Self::Main => "MP",
            Self::High => "HP",
        };
        f.write_str(name)
    }
}

/// Entropy coding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntropyMode {
    /// Context-adaptive variable-length coding.
    Cavlc,
    /// Context-adaptive binary arithmetic coding.
    Cabac,
}

impl Default for EntropyMode {
    fn default() -> Self {
        Self::Cabac
    }
}

/// Pixel format of raw frames entering the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// NV12 (YUV 4:2:0, planar Y + interleaved UV) - the accelerator's
    /// native layout.
    Nv12,
    /// I420/YUV420P (YUV 4:2:0, planar Y + U + V).
    I420,
    /// YUYV (YUV 4:2:2 packed) - common V4L2 capture format.
    Yuyv,
}

impl PixelFormat {
    /// Byte length of one frame at `width` x `height`.
    #[must_use]
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Nv12 | Self::I420 => pixels * 3 / 2,
            Self::Yuyv => pixels * 2,
        }
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::Nv12
    }
}

/// Configuration for creating an encode session.
///
/// Created once at startup from CLI options and capture negotiation;
/// immutable for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub frame_rate: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// Initial quantization parameter.
    pub initial_qp: u32,
    /// Minimum quantization parameter (0 = driver default).
    pub minimal_qp: u32,
    /// Frames between intra pictures. 0 = only the leading IDR, 1 = every
    /// frame is intra.
    pub intra_period: u32,
    /// Frames between IDR resets. 0 = never reset after the first IDR.
    pub intra_idr_period: u32,
    /// Spacing of P frames among B frames. 1 = no B frames.
    pub ip_period: u32,
    /// H.264 profile.
    pub profile: Profile,
    /// Entropy coding mode.
    pub entropy: EntropyMode,
    /// Rate control mode.
    pub rate_control: RateControl,
    /// CPB size multiplier for the hypothetical reference decoder.
    pub hrd_bitrate_multiplier: u32,
    /// level_idc carried in the SPS.
    pub level_idc: u32,
    /// Short-term reference picture count (DPB ring size, at most 16).
    pub num_ref_frames: u32,
    /// Pixel format frames arrive in.
    pub source_format: PixelFormat,
    /// Run coded-data retrieval inline on the submit path instead of on
    /// the output worker thread. Deterministic, but loses pipelining.
    pub synchronous: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 480,
            frame_rate: 30,
            bitrate: 3_000_000,
            initial_qp: 26,
            minimal_qp: 0,
            intra_period: 30,
            intra_idr_period: 60,
            ip_period: 1,
            profile: Profile::High,
            entropy: EntropyMode::Cabac,
            rate_control: RateControl::Vbr,
            hrd_bitrate_multiplier: 16,
            level_idc: 41,
            num_ref_frames: 2,
            source_format: PixelFormat::Nv12,
            synchronous: false,
        }
    }
}

impl EncoderConfig {
    /// Create a configuration with the given dimensions and defaults
    /// everywhere else.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Set the frame rate.
    #[must_use]
    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps;
        self
    }

    /// Set the target bitrate in bits per second.
    #[must_use]
    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Set the rate control mode.
    #[must_use]
    pub fn rate_control(mut self, mode: RateControl) -> Self {
        self.rate_control = mode;
        self
    }

    /// Set the H.264 profile.
    #[must_use]
    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Set the GOP periods.
    #[must_use]
    pub fn gop(mut self, intra_period: u32, intra_idr_period: u32, ip_period: u32) -> Self {
        self.intra_period = intra_period;
        self.intra_idr_period = intra_idr_period;
        self.ip_period = ip_period;
        self
    }

    /// Set the source pixel format.
    #[must_use]
    pub fn source_format(mut self, format: PixelFormat) -> Self {
        self.source_format = format;
        self
    }

    /// Select synchronous (inline) coded-data retrieval.
    #[must_use]
    pub fn synchronous(mut self, on: bool) -> Self {
        self.synchronous = on;
        self
    }

    /// Coded picture width in macroblocks.
    #[must_use]
    pub fn width_in_mbs(&self) -> u32 {
        (self.width + 15) / 16
    }

    /// Coded picture height in macroblocks.
    #[must_use]
    pub fn height_in_mbs(&self) -> u32 {
        (self.height + 15) / 16
    }

    /// Byte length of one raw source frame.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.source_format.frame_size(self.width, self.height)
    }

    /// Validate the configuration before any hardware resource is touched.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.width == 0 || self.height == 0 {
            return Err(CodecError::invalid_config(format!(
                "dimensions {}x{} are not encodable",
                self.width, self.height
            )));
        }
        if self.frame_rate == 0 {
            return Err(CodecError::invalid_config("frame rate must be non-zero"));
        }
        if self.ip_period == 0 {
            return Err(CodecError::invalid_config("ip_period must be at least 1"));
        }
        if self.ip_period > 1 && self.intra_idr_period == 0 && self.intra_period == 0 {
            return Err(CodecError::invalid_config(
                "B frames require a bounded GOP (set intra_period or idr_period)",
            ));
        }
        if self.intra_period != 0 && self.intra_period % self.ip_period != 0 {
            return Err(CodecError::invalid_config(format!(
                "intra_period {} must be a multiple of ip_period {}",
                self.intra_period, self.ip_period
            )));
        }
        if self.intra_period != 0
            && self.intra_idr_period != 0
            && self.intra_idr_period % self.intra_period != 0
        {
            return Err(CodecError::invalid_config(format!(
                "idr_period {} must be a multiple of intra_period {}",
                self.intra_idr_period, self.intra_period
            )));
        }
        if self.initial_qp > 51 || self.minimal_qp > 51 {
            return Err(CodecError::invalid_config("QP values must be within 0..=51"));
        }
        if self.num_ref_frames == 0 || self.num_ref_frames > 16 {
            return Err(CodecError::invalid_config(
                "num_ref_frames must be within 1..=16",
            ));
        }
        if self.profile == Profile::Baseline && self.entropy == EntropyMode::Cabac {
            return Err(CodecError::invalid_config(
                "baseline profile cannot use CABAC entropy coding",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rc_mode_parsing_round_trip() {
        for mode in [
            RateControl::None,
            RateControl::Cbr,
            RateControl::Vbr,
            RateControl::Vcm,
            RateControl::Cqp,
            RateControl::VbrConstrained,
        ] {
            assert_eq!(mode.to_string().parse::<RateControl>().unwrap(), mode);
        }
        assert!("TURBO".parse::<RateControl>().is_err());
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("HP".parse::<Profile>().unwrap(), Profile::High);
        assert_eq!("bp".parse::<Profile>().unwrap(), Profile::Baseline);
        assert!("XP".parse::<Profile>().is_err());
        assert_eq!(Profile::High.profile_idc(), 100);
        assert_eq!(Profile::Main.profile_idc(), 77);
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(PixelFormat::Nv12.frame_size(720, 480), 720 * 480 * 3 / 2);
        assert_eq!(PixelFormat::Yuyv.frame_size(720, 480), 720 * 480 * 2);
    }

    #[test]
    fn test_validate_gop_invariants() {
        let ok = EncoderConfig::new(720, 480).gop(30, 60, 1);
        assert!(ok.validate().is_ok());

        let bad_idr = EncoderConfig::new(720, 480).gop(30, 45, 1);
        assert!(bad_idr.validate().is_err());

        let bad_ip = EncoderConfig::new(720, 480).gop(30, 60, 4);
        assert!(bad_ip.validate().is_err());

        let zero_ip = EncoderConfig::new(720, 480).gop(30, 60, 0);
        assert!(zero_ip.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_baseline_cabac() {
        let mut config = EncoderConfig::new(720, 480);
        config.profile = Profile::Baseline;
        config.entropy = EntropyMode::Cabac;
        assert!(config.validate().is_err());
        config.entropy = EntropyMode::Cavlc;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mb_rounding() {
        let config = EncoderConfig::new(1920, 1080);
        assert_eq!(config.width_in_mbs(), 120);
        assert_eq!(config.height_in_mbs(), 68); // 1088 coded lines
    }
}
