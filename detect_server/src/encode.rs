//! JPEG encoding of annotated frames.
//!
use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, ColorType, RgbImage};

use crate::error::PipelineError;

/// Quality of every encoded frame.
pub const JPEG_QUALITY: u8 = 90;

/// Compress a frame to JPEG.
pub fn encode_jpeg(frame: &RgbImage) -> Result<Bytes, PipelineError> {
    let (width, height) = frame.dimensions();
    let mut buf = Vec::with_capacity((width * height) as usize / 4);

    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode(
        frame,
        width,
        height,
        ColorType::Rgb8,
    )?;
    log::debug!("Image encoded ({} bytes)", buf.len());

    Ok(Bytes::from(buf))
}
