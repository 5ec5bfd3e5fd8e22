//! Colorspace/layout conversions into the accelerator's native NV12
//! sampling layout.
//!
//! These are pure byte-shuffling transforms with fixed input/output
//! contracts; chroma is averaged vertically when converting from 4:2:2.

use crate::types::PixelFormat;
use crate::CodecError;

/// Convert one frame of `format` into tightly packed NV12.
///
/// Input length must match `format.frame_size(width, height)`; output is
/// `width * height * 3 / 2` bytes.
pub fn convert_to_nv12(
    format: PixelFormat,
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, CodecError> {
    let expected = format.frame_size(width, height);
    if data.len() != expected {
        return Err(CodecError::FrameSizeMismatch {
            got: data.len(),
            expected,
        });
    }
    match format {
        PixelFormat::Nv12 => Ok(data.to_vec()),
        PixelFormat::I420 => Ok(i420_to_nv12(data, width, height)),
        PixelFormat::Yuyv => Ok(yuyv_to_nv12(data, width, height)),
    }
}

fn i420_to_nv12(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let y_len = w * h;
    let c_len = y_len / 4;

    let mut out = Vec::with_capacity(y_len * 3 / 2);
    out.extend_from_slice(&data[..y_len]);

    let u = &data[y_len..y_len + c_len];
    let v = &data[y_len + c_len..y_len + 2 * c_len];
    for i in 0..c_len {
        out.push(u[i]);
        out.push(v[i]);
    }
    out
}

fn yuyv_to_nv12(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut out = vec![0u8; w * h * 3 / 2];
    let (y_plane, uv_plane) = out.split_at_mut(w * h);

    for row in 0..h {
        let src_row = &data[row * w * 2..(row + 1) * w * 2];
        let dst_row = &mut y_plane[row * w..(row + 1) * w];
        for x in 0..w {
            dst_row[x] = src_row[x * 2];
        }
    }

    // 4:2:2 -> 4:2:0: average the chroma of each vertical line pair.
    for pair in 0..h / 2 {
        let top = &data[(pair * 2) * w * 2..(pair * 2 + 1) * w * 2];
        let bottom = &data[(pair * 2 + 1) * w * 2..(pair * 2 + 2) * w * 2];
        let dst = &mut uv_plane[pair * w..(pair + 1) * w];
        for x in (0..w).step_by(2) {
            let u = (u16::from(top[x * 2 + 1]) + u16::from(bottom[x * 2 + 1])) / 2;
            let v = (u16::from(top[x * 2 + 3]) + u16::from(bottom[x * 2 + 3])) / 2;
            dst[x] = u as u8;
            dst[x + 1] = v as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nv12_passthrough() {
        let frame = vec![7u8; PixelFormat::Nv12.frame_size(16, 16)];
        let out = convert_to_nv12(PixelFormat::Nv12, &frame, 16, 16).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let frame = vec![0u8; 10];
        assert!(convert_to_nv12(PixelFormat::Nv12, &frame, 16, 16).is_err());
    }

    #[test]
    fn test_i420_interleaves_chroma() {
        let w = 4usize;
        let h = 2usize;
        let mut frame = vec![0u8; w * h * 3 / 2];
        // Y = 0x10, U = 0x20, V = 0x30
        frame[..w * h].fill(0x10);
        frame[w * h..w * h + w * h / 4].fill(0x20);
        frame[w * h + w * h / 4..].fill(0x30);

        let out = convert_to_nv12(PixelFormat::I420, &frame, w as u32, h as u32).unwrap();
        assert!(out[..w * h].iter().all(|&b| b == 0x10));
        assert_eq!(&out[w * h..], &[0x20, 0x30, 0x20, 0x30]);
    }

    #[test]
    fn test_yuyv_split_and_average() {
        // 2x2 frame: Y0 U0 Y1 V0 per row.
        let top = [10u8, 100, 20, 200];
        let bottom = [30u8, 120, 40, 220];
        let mut frame = Vec::new();
        frame.extend_from_slice(&top);
        frame.extend_from_slice(&bottom);

        let out = convert_to_nv12(PixelFormat::Yuyv, &frame, 2, 2).unwrap();
        assert_eq!(&out[..4], &[10, 20, 30, 40]); // luma rows
        assert_eq!(&out[4..], &[110, 210]); // averaged U, V
    }
}
