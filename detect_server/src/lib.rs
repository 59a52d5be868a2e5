//! Stream a webcam to the browser with object detections drawn onto every frame.
pub mod annotate;
pub mod app;
pub mod config;
pub mod encode;
pub mod endpoints;
pub mod error;
pub mod meter;
pub mod multipart;
pub mod nn;
pub mod pipeline;
pub mod tracker;
pub mod utils;

pub use error::PipelineError;
