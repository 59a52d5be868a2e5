//! Frame processing from capture to multipart stream item.
//!
//! Every frame runs through source, detector, annotator and encoder before the next one is
//! captured. Nothing is buffered beyond the frame in flight.
use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use bytes::Bytes;
use cam_source::FrameSource;
use futures::Stream;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use crate::{
    annotate::Annotator, encode::encode_jpeg, error::PipelineError, meter::METER,
    multipart::as_jpeg_stream_item, nn::Detector,
};

pub struct Pipeline {
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    annotator: Annotator,
    threshold: f32,
}

impl Pipeline {
    /// Create a new instance.
    ///
    /// Detections with a confidence not above `threshold` are not drawn.
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        annotator: Annotator,
        threshold: f32,
    ) -> Self {
        Self {
            source,
            detector,
            annotator,
            threshold,
        }
    }

    /// Capture, annotate and encode the next frame as stream item.
    ///
    /// Returns `None` once the source has ended.
    pub fn next_part(&mut self) -> Result<Option<Bytes>, PipelineError> {
        let mut frame = match self.source.next_frame().map_err(PipelineError::Device)? {
            Some(frame) => frame,
            None => return Ok(None),
        };
        log::debug!("Image read");

        let start = Instant::now();
        let detections = self
            .detector
            .detect(&frame)
            .map_err(PipelineError::Inference)?;
        METER.record_inference(start.elapsed());
        log::debug!("Inference done");

        self.annotator.annotate(&mut frame, &detections, self.threshold);
        let jpeg = encode_jpeg(&frame)?;

        Ok(Some(as_jpeg_stream_item(&jpeg)))
    }
}

/// Stream of multipart items pulled from a shared pipeline.
///
/// `permit` is held for the lifetime of the stream. The stream ends when the source ends, after
/// yielding the first error, or when `shutdown` is cancelled before the next frame.
///
/// The token is only checked when the stream is polled. A client that stops reading keeps its
/// connection open until the server's shutdown deadline, see [`crate::app::serve`].
///
/// A panic in one of the stages ends the current stream. The next stream continues with the
/// same pipeline.
pub fn frame_stream(
    pipeline: Arc<Mutex<Pipeline>>,
    permit: OwnedSemaphorePermit,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Bytes, PipelineError>> + Send + 'static {
    async_stream::stream! {
        let _permit = permit;

        loop {
            if shutdown.is_cancelled() {
                log::info!("Shutdown requested, closing video stream");
                break;
            }

            let pipeline = Arc::clone(&pipeline);
            let result = match tokio::task::spawn_blocking(move || {
                let mut guard = pipeline.lock().unwrap_or_else(|poisoned| {
                    log::warn!("Pipeline panicked during an earlier frame, continuing");
                    pipeline.clear_poison();
                    poisoned.into_inner()
                });
                guard.next_part()
            })
            .await
            {
                Ok(result) => result,
                Err(err) => Err(PipelineError::from(err)),
            };

            match result {
                Ok(Some(part)) => {
                    METER.tick_streamed();
                    yield Ok(part);
                }
                Ok(None) => {
                    log::info!("Frame source ended, closing video stream");
                    break;
                }
                Err(err) => {
                    log::error!("Closing video stream: {err}");
                    yield Err(err);
                    break;
                }
            }
        }
    }
}
