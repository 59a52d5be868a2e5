//! Application context and HTTP router.
//!
use std::{
    net::TcpListener,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use axum::{routing::get, Extension, Router};
use bytes::Bytes;
use cam_source::{FrameSource, ImageFolder, V4lCamera};
use common::Palette;
use futures::Stream;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::{
    annotate::{load_font, Annotator},
    config::Config,
    endpoints::{healthcheck, index, video_feed},
    error::PipelineError,
    nn::{Detector, YoloModel},
    pipeline::{frame_stream, Pipeline},
    tracker::Tracking,
    utils::resolve_model,
};

/// Resources shared by all requests.
///
/// The capture device and the model live in the pipeline, which only one video stream may use at
/// a time.
pub struct AppContext {
    pipeline: Arc<Mutex<Pipeline>>,
    stream_slot: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(pipeline: Pipeline, shutdown: CancellationToken) -> Self {
        Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            stream_slot: Arc::new(Semaphore::new(1)),
            shutdown,
        }
    }

    /// Start a video stream, or `None` if another client is already streaming.
    pub fn open_stream(
        &self,
    ) -> Option<impl Stream<Item = Result<Bytes, PipelineError>> + Send + 'static> {
        let permit = Arc::clone(&self.stream_slot).try_acquire_owned().ok()?;
        Some(frame_stream(
            Arc::clone(&self.pipeline),
            permit,
            self.shutdown.clone(),
        ))
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// Time open connections get to finish after shutdown was requested.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Build HTTP server with endpoints.
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/healthcheck", get(healthcheck))
        .layer(Extension(ctx))
}

/// Serve HTTP requests on `listener` until the context's shutdown token is cancelled.
///
/// Connections still open `grace` after cancellation are dropped, e.g. a video client that
/// stopped reading.
pub async fn serve(ctx: Arc<AppContext>, listener: TcpListener, grace: Duration) -> Result<()> {
    let shutdown = ctx.shutdown_token().clone();
    let signal = shutdown.clone();
    let server = axum::Server::from_tcp(listener)?
        .serve(build_router(ctx).into_make_service())
        .with_graceful_shutdown(async move { signal.cancelled().await });

    let deadline = async {
        shutdown.cancelled().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result?,
        _ = deadline => {
            log::warn!("Connections still open {:?} after shutdown, closing them", grace);
        }
    }

    Ok(())
}

/// Open the frame source, load the model and font. Any failure here is fatal.
pub async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let source: Box<dyn FrameSource> = match &config.image_dir {
        Some(dir) => Box::new(ImageFolder::open(dir, true)?),
        None => Box::new(V4lCamera::open(
            &config.device,
            config.resolution(),
            &config.format,
            config.frame_interval,
        )?),
    };

    let model_path = resolve_model(&config.model, config.model_url.as_deref()).await?;
    let model = YoloModel::load(
        &model_path,
        config.input_size,
        config.min_confidence,
        config.nms_iou,
    )?;
    let detector: Box<dyn Detector> = match config.no_tracking {
        true => Box::new(model),
        false => Box::new(Tracking::new(model)),
    };

    let font = load_font(config.font.as_deref())?;
    let annotator = Annotator::new(Palette::new(), font);

    Ok(Pipeline::new(
        source,
        detector,
        annotator,
        config.confidence_threshold,
    ))
}
