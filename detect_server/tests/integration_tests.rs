use std::{net::TcpListener, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use cam_source::FrameSource;
use common::{BBox, Detection, Palette, PALETTE_SIZE};
use detect_server::{
    annotate::{bundled_font, Annotator},
    app::{serve, AppContext},
    multipart::{CONTENT_TYPE, PART_HEADER},
    nn::Detector,
    pipeline::Pipeline,
    PipelineError,
};
use futures::StreamExt;
use image::{ImageFormat, Rgb, RgbImage};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

/// Yields gray frames, a limited number of them if `remaining` is set.
struct SyntheticSource {
    remaining: Option<usize>,
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match self.remaining.as_mut() {
            Some(0) => return Ok(None),
            Some(remaining) => *remaining -= 1,
            None => (),
        }
        Ok(Some(RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([128, 128, 128]))))
    }
}

/// Yields `good_frames` gray frames, then fails.
struct FailingSource {
    good_frames: usize,
}

impl FrameSource for FailingSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.good_frames == 0 {
            bail!("camera unplugged");
        }
        self.good_frames -= 1;
        Ok(Some(RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([128, 128, 128]))))
    }
}

/// Returns fixed detections, failing on the frame with index `fail_on`.
struct ScriptedDetector {
    detections: Vec<Detection>,
    fail_on: Option<usize>,
    calls: usize,
}

impl ScriptedDetector {
    fn empty() -> Self {
        Self {
            detections: Vec::new(),
            fail_on: None,
            calls: 0,
        }
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        let call = self.calls;
        self.calls += 1;
        if Some(call) == self.fail_on {
            bail!("model exploded");
        }
        Ok(self.detections.clone())
    }
}

/// Panics on the first frame, finds nothing afterwards.
#[derive(Default)]
struct PanicOnceDetector {
    panicked: bool,
}

impl Detector for PanicOnceDetector {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        if !self.panicked {
            self.panicked = true;
            panic!("detector crashed");
        }
        Ok(Vec::new())
    }
}

fn annotator(palette: Palette) -> Annotator {
    Annotator::new(palette, bundled_font().expect("bundled font is valid"))
}

fn context_with(
    source: impl FrameSource + 'static,
    detector: impl Detector + 'static,
) -> AppContext {
    let pipeline = Pipeline::new(
        Box::new(source),
        Box::new(detector),
        annotator(Palette::new()),
        0.4,
    );
    AppContext::new(pipeline, CancellationToken::new())
}

fn context(frames: Option<usize>, detector: ScriptedDetector) -> AppContext {
    context_with(SyntheticSource { remaining: frames }, detector)
}

fn count_parts(body: &[u8]) -> usize {
    body.windows(PART_HEADER.len())
        .filter(|window| *window == PART_HEADER)
        .count()
}

fn decode_part(part: &[u8]) -> Result<RgbImage> {
    assert!(part.starts_with(PART_HEADER));
    assert!(part.ends_with(b"\r\n"));
    let jpeg = &part[PART_HEADER.len()..part.len() - 2];
    Ok(image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8())
}

/// Three frames without detections, then the source ends.
#[tokio::test]
async fn stream_ends_cleanly_with_source() -> Result<()> {
    let ctx = context(Some(3), ScriptedDetector::empty());
    let stream = ctx.open_stream().expect("stream slot is free");

    let items: Vec<_> = stream.collect().await;
    assert_eq!(items.len(), 3);
    for item in items {
        let frame = decode_part(&item?)?;
        assert_eq!(frame.dimensions(), (WIDTH, HEIGHT));
    }

    Ok(())
}

/// The detector fails on the second of three frames.
#[tokio::test]
async fn stream_ends_after_inference_error() -> Result<()> {
    let detector = ScriptedDetector {
        fail_on: Some(1),
        ..ScriptedDetector::empty()
    };
    let ctx = context(Some(3), detector);
    let mut stream = Box::pin(ctx.open_stream().expect("stream slot is free"));

    let first = stream.next().await.expect("first part")?;
    decode_part(&first)?;

    match stream.next().await {
        Some(Err(PipelineError::Inference(err))) => assert_eq!(err.to_string(), "model exploded"),
        other => panic!("expected inference error, got {other:?}"),
    }
    assert!(stream.next().await.is_none());

    Ok(())
}

#[tokio::test]
async fn stream_ends_after_device_error() -> Result<()> {
    let ctx = context_with(FailingSource { good_frames: 1 }, ScriptedDetector::empty());
    let mut stream = Box::pin(ctx.open_stream().expect("stream slot is free"));

    let first = stream.next().await.expect("first part")?;
    decode_part(&first)?;

    match stream.next().await {
        Some(Err(PipelineError::Device(err))) => assert_eq!(err.to_string(), "camera unplugged"),
        other => panic!("expected device error, got {other:?}"),
    }
    assert!(stream.next().await.is_none());

    Ok(())
}

#[tokio::test]
async fn panic_ends_only_the_current_stream() -> Result<()> {
    let ctx = context_with(SyntheticSource { remaining: None }, PanicOnceDetector::default());

    let mut stream = Box::pin(ctx.open_stream().expect("stream slot is free"));
    match stream.next().await {
        Some(Err(PipelineError::Join(err))) => assert!(err.is_panic()),
        other => panic!("expected panicked task, got {other:?}"),
    }
    assert!(stream.next().await.is_none());
    drop(stream);

    // Later clients are served by the same pipeline
    for _ in 0..2 {
        let mut stream = Box::pin(ctx.open_stream().expect("stream slot is free"));
        let part = stream.next().await.expect("part after panic")?;
        decode_part(&part)?;
    }

    Ok(())
}

#[tokio::test]
async fn only_one_stream_at_a_time() -> Result<()> {
    let ctx = context(None, ScriptedDetector::empty());

    let first = ctx.open_stream().expect("stream slot is free");
    assert!(ctx.open_stream().is_none());

    drop(first);
    assert!(ctx.open_stream().is_some());

    Ok(())
}

#[tokio::test]
async fn shutdown_ends_stream_before_next_frame() -> Result<()> {
    let ctx = context(None, ScriptedDetector::empty());
    let mut stream = Box::pin(ctx.open_stream().expect("stream slot is free"));

    assert!(stream.next().await.is_some());
    ctx.shutdown_token().cancel();
    assert!(stream.next().await.is_none());

    Ok(())
}

/// Sum of absolute channel differences.
fn distance(pixel: [u8; 3], expected: [u8; 3]) -> u32 {
    pixel
        .iter()
        .zip(expected)
        .map(|(a, b)| (*a as i32 - b as i32).unsigned_abs())
        .sum()
}

#[tokio::test]
async fn confident_detections_are_drawn() -> Result<()> {
    let gray = [128, 128, 128];
    let palette = Palette::new();
    // Class with a color that stands out against the gray frame
    let class_id = (0..PALETTE_SIZE)
        .max_by_key(|&id| distance(palette.color(id), gray))
        .unwrap_or(0);
    let color = palette.color(class_id);

    let detector = ScriptedDetector {
        detections: vec![
            Detection::new(BBox::new(8.0, 8.0, 40.0, 40.0), class_id, 0.95),
            Detection::new(BBox::new(50.0, 8.0, 60.0, 40.0), class_id, 0.2),
        ],
        ..ScriptedDetector::empty()
    };
    let mut pipeline = Pipeline::new(
        Box::new(SyntheticSource { remaining: Some(1) }),
        Box::new(detector),
        annotator(palette),
        0.4,
    );

    let part = pipeline.next_part()?.expect("one frame");
    let frame = decode_part(&part)?;

    // Compare with tolerance, the frame went through lossy compression
    let on_box = frame.get_pixel(8, 24).0;
    assert!(distance(on_box, color) < distance(on_box, gray));
    assert!(distance(frame.get_pixel(24, 24).0, gray) < 30);
    assert!(distance(frame.get_pixel(50, 24).0, gray) < 30);

    assert!(pipeline.next_part()?.is_none());

    Ok(())
}

fn spawn_server(ctx: AppContext) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    tokio::spawn(serve(Arc::new(ctx), listener, Duration::from_secs(1)));

    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn serves_index_page() -> Result<()> {
    let base = spawn_server(context(Some(1), ScriptedDetector::empty()))?;

    let resp = reqwest::get(format!("{base}/")).await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let page = resp.text().await?;
    assert!(page.contains(r#"src="/video_feed""#));

    let resp = reqwest::get(format!("{base}/healthcheck")).await?;
    assert_eq!(resp.text().await?, "healthy");

    Ok(())
}

#[tokio::test]
async fn serves_video_feed_until_source_ends() -> Result<()> {
    let base = spawn_server(context(Some(3), ScriptedDetector::empty()))?;

    let resp = reqwest::get(format!("{base}/video_feed")).await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some(CONTENT_TYPE)
    );

    let body = resp.bytes().await?;
    assert!(body.starts_with(PART_HEADER));
    assert_eq!(count_parts(&body), 3);
    assert!(body.ends_with(b"\r\n"));

    Ok(())
}

#[tokio::test]
async fn second_video_client_is_rejected() -> Result<()> {
    let base = spawn_server(context(None, ScriptedDetector::empty()))?;

    let first = reqwest::get(format!("{base}/video_feed")).await?;
    assert_eq!(first.status(), reqwest::StatusCode::OK);

    let second = reqwest::get(format!("{base}/video_feed")).await?;
    assert_eq!(second.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    drop(first);
    Ok(())
}

#[tokio::test]
async fn shutdown_drops_stalled_video_clients() -> Result<()> {
    let ctx = Arc::new(context(None, ScriptedDetector::empty()));
    let shutdown = ctx.shutdown_token().clone();
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(serve(ctx, listener, Duration::from_millis(200)));

    // Request the video feed, but never read the response
    let mut client = tokio::net::TcpStream::connect(addr).await?;
    client.write_all(b"GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n").await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    shutdown.cancel();
    let served = tokio::time::timeout(Duration::from_secs(5), server).await??;
    served?;

    drop(client);
    Ok(())
}
