//! V4L2 capture source.
//!
//! The hardware encoder ingests raw YUV, so negotiation insists on YUYV:
//! the device is asked for the requested resolution first via
//! VIDIOC_ENUM_FRAMESIZES, then through `set_format`, and whatever the
//! driver settles on becomes authoritative for the encoder.

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use v4l::buffer::Type;
use v4l::framesize::FrameSizeEnum;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};
use vastream_codec::PixelFormat;

use super::{CaptureFormat, CaptureSource};

/// Ask V4L2 whether `fourcc` at `width`x`height` is an advertised frame
/// size. Returns `true` if the enumeration fails (driver doesn't support
/// it - fall through to the set_format check).
fn device_supports_resolution(device: &Device, fourcc: FourCC, width: u32, height: u32) -> bool {
    let framesizes = match device.enum_framesizes(fourcc) {
        Ok(sizes) => sizes,
        Err(_) => return true,
    };
    if framesizes.is_empty() {
        return true;
    }
    for fs in framesizes {
        match fs.size {
            FrameSizeEnum::Discrete(d) => {
                if d.width == width && d.height == height {
                    return true;
                }
            }
            FrameSizeEnum::Stepwise(s) => {
                let w_ok = width >= s.min_width
                    && width <= s.max_width
                    && (s.step_width == 0 || (width - s.min_width) % s.step_width == 0);
                let h_ok = height >= s.min_height
                    && height <= s.max_height
                    && (s.step_height == 0 || (height - s.min_height) % s.step_height == 0);
                if w_ok && h_ok {
                    return true;
                }
            }
        }
    }
    false
}

/// A V4L2 capture device delivering YUYV frames.
pub struct V4lSource {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    frame_rate: u32,
    expected_len: usize,
}

// v4l types are Send; the stream is only driven from the capture loop.
unsafe impl Send for V4lSource {}

impl V4lSource {
    /// Open `path` and negotiate YUYV at the requested geometry.
    pub fn open(path: &str, width: u32, height: u32, frame_rate: u32) -> Result<Self> {
        let device = Device::with_path(path).with_context(|| format!("opening {path}"))?;

        let yuyv = FourCC::new(b"YUYV");
        if !device_supports_resolution(&device, yuyv, width, height) {
            warn!(width, height, "driver does not advertise YUYV at this size");
        }

        let mut format = device.format().context("querying device format")?;
        format.width = width;
        format.height = height;
        format.fourcc = yuyv;
        let actual = device.set_format(&format).context("setting YUYV format")?;
        if actual.fourcc != yuyv {
            bail!(
                "{path} cannot capture YUYV (driver insists on {}), refusing to encode",
                actual.fourcc
            );
        }

        let mut params = device.params().context("querying stream parameters")?;
        params.interval = v4l::Fraction::new(1, frame_rate.max(1));
        let actual_params = device
            .set_params(&params)
            .context("setting capture frame rate")?;
        let actual_fps = if actual_params.interval.numerator == 0 {
            frame_rate
        } else {
            actual_params.interval.denominator / actual_params.interval.numerator
        };

        info!(
            device = path,
            width = actual.width,
            height = actual.height,
            fps = actual_fps,
            "V4L capture negotiated"
        );

        // The stream borrows the device; leak it for the 'static lifetime
        // the mmap stream wants.
        let device = Box::leak(Box::new(device));
        let stream =
            Stream::with_buffers(device, Type::VideoCapture, 4).context("starting mmap stream")?;

        Ok(Self {
            stream,
            width: actual.width,
            height: actual.height,
            frame_rate: actual_fps.max(1),
            expected_len: PixelFormat::Yuyv.frame_size(actual.width, actual.height),
        })
    }
}

impl CaptureSource for V4lSource {
    fn name(&self) -> &'static str {
        "v4l"
    }

    fn format(&self) -> CaptureFormat {
        CaptureFormat {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            pixel_format: PixelFormat::Yuyv,
        }
    }

    fn next_frame(&mut self) -> Result<Vec<u8>> {
        let (data, _meta) = self.stream.next().context("dequeueing capture buffer")?;
        if data.len() < self.expected_len {
            // Short buffers happen on signal loss; hand them up anyway and
            // let the encoder's length check drop them.
            warn!(got = data.len(), expected = self.expected_len, "short capture buffer");
        }
        Ok(data.to_vec())
    }
}
