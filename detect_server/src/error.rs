//! Errors ending a video stream.
//!
use thiserror::Error;

/// Failure of one pipeline stage.
///
/// None of these has a recovery path: the current response ends after the error is reported.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture device failed: {0:#}")]
    Device(anyhow::Error),

    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),

    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
