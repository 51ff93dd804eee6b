use fast_image_resize as fr;
use fr::images::Image;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};

use crate::error::{AnalysisError, Result};
use crate::source::Frame;

/// Compress raw RGB pixel data to JPEG at the given quality (1-100).
pub fn compress_jpeg(data: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let img: ImageBuffer<Rgb<u8>, _> = ImageBuffer::from_raw(width, height, data)
        .ok_or_else(|| AnalysisError::Encode(format!("invalid buffer for {width}x{height}")))?;

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)
        .map_err(|e| AnalysisError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Downscale an RGB buffer to `dst_width` x `dst_height`.
///
/// Uses `fast_image_resize` for SIMD-accelerated resizing.
pub fn downscale(
    data: &[u8],
    width: u32,
    height: u32,
    dst_width: u32,
    dst_height: u32,
) -> Result<Vec<u8>> {
    let src_image = Image::from_vec_u8(width, height, data.to_vec(), fr::PixelType::U8x3)
        .map_err(|e| AnalysisError::Encode(e.to_string()))?;
    let mut dst_image = Image::new(dst_width, dst_height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, None)
        .map_err(|e| AnalysisError::Encode(e.to_string()))?;

    Ok(dst_image.into_vec())
}

/// Turns sampled frames into transmittable payloads.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
    divisor: u32,
}

impl FrameEncoder {
    pub fn new(quality: u8, divisor: u32) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            divisor: divisor.max(1),
        }
    }

    /// Output dimensions for a frame, never below 1x1.
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            (width / self.divisor).max(1),
            (height / self.divisor).max(1),
        )
    }

    /// Reduce each linear dimension by the divisor, then JPEG-encode.
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let (w, h) = self.target_size(frame.width, frame.height);
        if (w, h) == (frame.width, frame.height) {
            return compress_jpeg(&frame.data, w, h, self.quality);
        }
        let resized = downscale(&frame.data, frame.width, frame.height, w, h)?;
        compress_jpeg(&resized, w, h, self.quality)
    }
}
