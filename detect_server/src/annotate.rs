//! Drawing of detections onto frames.
//!
use std::path::Path;

use anyhow::{Context, Result};
use common::{class_name, Detection, Palette};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use rusttype::{Font, Scale};

/// Height of label text in pixels.
pub const LABEL_SCALE: f32 = 16.0;

/// Line width of bounding boxes in pixels.
pub const BOX_THICKNESS: i32 = 2;

/// Font compiled into the binary, used unless another one is configured.
const BUNDLED_FONT: &[u8] = include_bytes!("../../resources/DejaVuSansMono.ttf");

/// Draws boxes and labels of confident detections, colored by class.
pub struct Annotator {
    palette: Palette,
    font: Font<'static>,
}

impl Annotator {
    pub fn new(palette: Palette, font: Font<'static>) -> Self {
        Self { palette, font }
    }

    /// Draw every detection with a confidence above `threshold` onto the frame.
    pub fn annotate(&self, frame: &mut RgbImage, detections: &[Detection], threshold: f32) {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let (max_x, max_y) = ((width - 1) as f32, (height - 1) as f32);

        for detection in detections.iter().filter(|d| d.confidence > threshold) {
            let bbox = &detection.bbox;
            if bbox.x2 < 0.0 || bbox.y2 < 0.0 || bbox.x1 > max_x || bbox.y1 > max_y {
                log::debug!("Skipping detection outside of frame: {:?}", bbox);
                continue;
            }
            let bbox = bbox.clamp(max_x, max_y);

            // Coordinates of top-left and bottom-right points, both inclusive
            let (x_tl, y_tl) = (bbox.x1.round() as i32, bbox.y1.round() as i32);
            let (x_br, y_br) = (bbox.x2.round() as i32, bbox.y2.round() as i32);

            let color = Rgb(self.palette.color(detection.class_id));

            for inset in 0..BOX_THICKNESS {
                let rect_width = x_br - x_tl + 1 - 2 * inset;
                let rect_height = y_br - y_tl + 1 - 2 * inset;
                if rect_width <= 0 || rect_height <= 0 {
                    break;
                }
                let rect = Rect::at(x_tl + inset, y_tl + inset)
                    .of_size(rect_width as u32, rect_height as u32);
                draw_hollow_rect_mut(frame, rect, color);
            }

            let (x, y) = label_origin(x_tl, y_tl);
            draw_text_mut(
                frame,
                color,
                x,
                y,
                Scale::uniform(LABEL_SCALE),
                &self.font,
                &label(detection),
            );
        }
    }
}

/// Text drawn next to a detection.
pub fn label(detection: &Detection) -> String {
    format!("{} {:.2}", class_name(detection.class_id), detection.confidence)
}

/// Top-left corner of the label of a box, kept inside the frame.
pub fn label_origin(x_tl: i32, y_tl: i32) -> (i32, i32) {
    (x_tl.max(0), (y_tl - LABEL_SCALE as i32).max(0))
}

/// Load the label font.
///
/// A configured path must hold a valid font, otherwise the bundled font is used.
pub fn load_font(path: Option<&Path>) -> Result<Font<'static>> {
    match path {
        Some(path) => {
            let font_data = std::fs::read(path)
                .with_context(|| format!("failed to read font {}", path.display()))?;
            let font = Font::try_from_vec(font_data)
                .with_context(|| format!("invalid font data in {}", path.display()))?;
            log::info!("Using font {}", path.display());
            Ok(font)
        }
        None => bundled_font(),
    }
}

/// The font compiled into the binary.
pub fn bundled_font() -> Result<Font<'static>> {
    Font::try_from_bytes(BUNDLED_FONT).context("invalid bundled font data")
}
