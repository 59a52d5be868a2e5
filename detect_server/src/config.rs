//! Startup configuration.
//!
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use clap::Parser;

/// Stream a webcam with object detections to the browser.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Config {
    /// Video device to capture from
    #[clap(long, default_value = "/dev/video0")]
    pub device: String,

    /// Requested capture width, the camera may choose another one
    #[clap(long, default_value_t = 640)]
    pub width: u32,

    /// Requested capture height, the camera may choose another one
    #[clap(long, default_value_t = 480)]
    pub height: u32,

    /// Capture format, `MJPG` or `RGB3`
    #[clap(long, default_value = "MJPG")]
    pub format: String,

    /// Capture interval as `numerator/denominator` seconds, highest frame rate if unset
    #[clap(long, value_parser = parse_interval)]
    pub frame_interval: Option<(u32, u32)>,

    /// Replay the images of this directory in a loop instead of capturing from the camera
    #[clap(long)]
    pub image_dir: Option<PathBuf>,

    /// Detections with a confidence not above this are not drawn
    #[clap(long, default_value_t = 0.4)]
    pub confidence_threshold: f32,

    /// YOLO model exported to ONNX
    #[clap(long, default_value = "yolov9s.onnx")]
    pub model: PathBuf,

    /// Download the model from here into the cache directory if `--model` does not exist
    #[clap(long)]
    pub model_url: Option<String>,

    /// Side length of the square model input
    #[clap(long, default_value_t = 640)]
    pub input_size: u32,

    /// Candidates below this score are discarded before non-maximum suppression
    #[clap(long, default_value_t = 0.25)]
    pub min_confidence: f32,

    /// Maximum overlap of two detections of the same class
    #[clap(long, default_value_t = 0.45)]
    pub nms_iou: f32,

    /// Do not assign track ids across frames
    #[clap(long)]
    pub no_tracking: bool,

    /// TrueType font for labels, the bundled DejaVu Sans Mono if unset
    #[clap(long)]
    pub font: Option<PathBuf>,

    /// Port on which to serve
    #[clap(short, long, default_value_t = 5000)]
    pub port: u16,

    /// Bind to all IP addresses
    #[clap(short, long)]
    pub bindall: bool,
}

impl Config {
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Address the HTTP server binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        let ip = match self.bindall {
            true => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            false => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        SocketAddr::new(ip, self.port)
    }
}

fn parse_interval(value: &str) -> Result<(u32, u32), String> {
    let (numerator, denominator) = value
        .split_once('/')
        .ok_or_else(|| format!("expected `numerator/denominator`, got {value:?}"))?;
    let numerator: u32 = numerator.trim().parse().map_err(|e| format!("{e}"))?;
    let denominator: u32 = denominator.trim().parse().map_err(|e| format!("{e}"))?;
    if numerator == 0 || denominator == 0 {
        return Err("interval parts must be positive".into());
    }

    Ok((numerator, denominator))
}
