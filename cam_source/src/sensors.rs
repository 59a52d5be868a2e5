//! Sensors module.
//!
use anyhow::{bail, Context, Result};
use image::{ImageFormat, RgbImage};
use rscam::{Camera, Config, Frame};
use simple_error::simple_error;

use crate::FrameSource;

/// Webcam opened through Video4Linux.
///
/// The device is opened and started once. The driver may pick a different resolution than the
/// requested one, in which case the largest supported resolution of the format is used instead.
pub struct V4lCamera {
    cam: Camera,
    device_name: String,
    format: [u8; 4],
}

impl V4lCamera {
    /// Open a video device on a Linux machine and start capturing.
    pub fn open(
        device_name: &str,
        resolution: (u32, u32),
        format: &str,
        frame_rate: Option<(u32, u32)>,
    ) -> Result<Self> {
        let format: [u8; 4] = format
            .as_bytes()
            .try_into()
            .map_err(|_| simple_error!("Format must be a four character code, got {}", format))?;
        match &format {
            b"MJPG" | b"RGB3" => (),
            _ => bail!("Unsupported format {}", String::from_utf8_lossy(&format)),
        }

        let mut cam = Camera::new(device_name)
            .with_context(|| format!("failed to open camera {device_name}"))?;
        log_supported_formats(&cam, &format);

        log::info!("Using camera {}", device_name);

        let frame_rate = frame_rate
            .map(Ok)
            .unwrap_or_else(|| get_max_frame_rate(&cam, &format, resolution))?;

        let resolution = match start(&mut cam, resolution, &format, frame_rate) {
            Ok(()) => resolution,
            Err(rscam::Error::BadResolution) | Err(rscam::Error::BadInterval) => {
                let fallback = get_max_resolution(&cam, &format)?;
                log::warn!(
                    "Camera rejected resolution {:?}, falling back to {:?}",
                    resolution,
                    fallback
                );
                let frame_rate = get_max_frame_rate(&cam, &format, fallback)?;
                start(&mut cam, fallback, &format, frame_rate)?;
                fallback
            }
            Err(err) => return Err(err.into()),
        };

        log::info!(
            "Capturing {:?} frames at {}x{}",
            String::from_utf8_lossy(&format),
            resolution.0,
            resolution.1
        );

        Ok(Self {
            cam,
            device_name: device_name.to_owned(),
            format,
        })
    }

    fn decode(&self, frame: &Frame) -> Result<RgbImage> {
        match &self.format {
            b"MJPG" => Ok(image::load_from_memory_with_format(&frame[..], ImageFormat::Jpeg)
                .context("failed to decode MJPG frame")?
                .to_rgb8()),
            _ => {
                let (width, height) = frame.resolution;
                RgbImage::from_raw(width, height, frame[..].to_vec()).ok_or_else(|| {
                    simple_error!(
                        "Frame of {} bytes does not fit {}x{} RGB",
                        frame.len(),
                        width,
                        height
                    )
                    .into()
                })
            }
        }
    }
}

impl FrameSource for V4lCamera {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match self.cam.capture() {
            Ok(frame) => {
                log::debug!("Captured frame ({} bytes)", frame.len());
                self.decode(&frame).map(Some)
            }
            Err(err) => {
                log::error!("Error capturing frame from {}: {}", &self.device_name, err);
                Ok(None)
            }
        }
    }
}

fn start(
    cam: &mut Camera,
    resolution: (u32, u32),
    format: &[u8],
    frame_rate: (u32, u32),
) -> Result<(), rscam::Error> {
    cam.start(&Config {
        interval: frame_rate,
        resolution,
        format,
        ..Default::default()
    })
}

/// Get the maximum supported resolution for the given format.
pub fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32)> {
    let resolution_info = cam.resolutions(format)?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    match resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions
            .into_iter()
            // Highest resolution in terms of number of pixels
            .max_by_key(|res| res.0 * res.1),
        rscam::ResolutionInfo::Stepwise { max, .. } => Some(max),
    }
    .ok_or_else(|| simple_error!("No resolution found").into())
}

/// Get the maximum supported frame rate for the given format and resolution.
///
/// Frame rates are reported as intervals `(numerator, denominator)` in seconds per frame.
pub fn get_max_frame_rate(
    cam: &Camera,
    format: &[u8],
    resolution: (u32, u32),
) -> Result<(u32, u32)> {
    let interval_info = match cam.intervals(format, resolution) {
        Ok(info) => info,
        Err(err) => {
            // Some drivers cannot enumerate intervals for a resolution they will adjust anyway
            log::debug!("Could not enumerate frame rates for {:?}: {}", resolution, err);
            return Ok((1, 30));
        }
    };
    log::debug!("Found frame rates: {:?}", &interval_info);
    match interval_info {
        rscam::IntervalInfo::Discretes(intervals) => intervals
            .into_iter()
            .filter(|(numerator, _)| *numerator > 0)
            // Shortest interval is the highest frame rate
            .max_by(|a, b| {
                let rate_a = a.1 as f64 / a.0 as f64;
                let rate_b = b.1 as f64 / b.0 as f64;
                rate_a.total_cmp(&rate_b)
            }),
        rscam::IntervalInfo::Stepwise { min, .. } => Some(min),
    }
    .ok_or_else(|| simple_error!("No frame rate found").into())
}

fn log_supported_formats(cam: &Camera, format: &[u8]) {
    let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        String::from_utf8_lossy(format)
    );
}
