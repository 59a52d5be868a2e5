//! Frame sources feeding the detection pipeline.
//!
//! A source hands out one decoded RGB frame at a time. `Ok(None)` signals the end of the stream,
//! after which the caller stops pulling.
pub mod folder;
pub mod sensors;

use image::RgbImage;

pub use folder::ImageFolder;
pub use sensors::V4lCamera;

/// Producer of decoded frames.
pub trait FrameSource: Send {
    /// Get the next frame, or `None` once the source cannot produce any more frames.
    fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
        (**self).next_frame()
    }
}
