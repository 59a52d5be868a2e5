//! Object detection with YOLO models exported to ONNX.
//!
//! The model is an Ultralytics YOLO (v8/v9) export taking a square `[1, 3, S, S]` input and
//! producing `[1, 4 + num_classes, num_anchors]`. Each anchor column holds a box in center form
//! followed by one score per class.
use std::path::Path;

use anyhow::{bail, Context, Result};
use common::{BBox, Detection};
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Value of letterbox padding, on a `[0, 255]` scale.
const PAD_VALUE: f32 = 114.0;

/// Something returning detections for a frame.
///
/// Implementations may keep state between frames, e.g. to track objects.
pub trait Detector: Send {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }
}

pub struct YoloModel {
    model: NnModel,
    input_size: u32,
    min_confidence: f32,
    max_iou: f32,
}

impl YoloModel {
    /// Load and optimize a model from an `.onnx` file.
    pub fn load(
        path: impl AsRef<Path>,
        input_size: u32,
        min_confidence: f32,
        max_iou: f32,
    ) -> Result<Self> {
        let path = path.as_ref();
        let side = input_size as usize;
        let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side));
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to read model {}", path.display()))?
            .with_input_fact(0, input_fact)?
            .into_optimized()?
            .into_runnable()?;
        log::info!("Loaded model {} ({side}x{side})", path.display());

        Ok(Self {
            model,
            input_size,
            min_confidence,
            max_iou,
        })
    }

    fn preproc(&self, frame: &RgbImage) -> (Tensor, Letterbox) {
        let letterbox = Letterbox::fit(frame.dimensions(), self.input_size);
        let (scaled_width, scaled_height) = letterbox.scaled_size(frame.dimensions());
        let resized = image::imageops::resize(
            frame,
            scaled_width,
            scaled_height,
            FilterType::Triangle,
        );

        let (pad_x, pad_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
        let side = self.input_size as usize;
        let tensor: Tensor =
            tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
                let inside = x >= pad_x
                    && y >= pad_y
                    && x < pad_x + scaled_width as usize
                    && y < pad_y + scaled_height as usize;
                let value = match inside {
                    true => resized[((x - pad_x) as u32, (y - pad_y) as u32)][c] as f32,
                    false => PAD_VALUE,
                };
                value / 255.0
            })
            .into();

        (tensor, letterbox)
    }

    fn postproc(
        &self,
        raw_nn_out: &Tensor,
        letterbox: &Letterbox,
        frame_size: (u32, u32),
    ) -> Result<Vec<Detection>> {
        let output = raw_nn_out.to_array_view::<f32>()?;
        let shape = output.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            bail!("unexpected model output shape {:?}", shape);
        }
        let preds = output
            .index_axis(tract_ndarray::Axis(0), 0)
            .into_dimensionality::<tract_ndarray::Ix2>()?;

        // Exports differ in putting anchors last or first, there are always more anchors than
        // box values and class scores.
        let anchor_axis = match shape[1] < shape[2] {
            true => tract_ndarray::Axis(1),
            false => tract_ndarray::Axis(0),
        };
        let num_values = shape[1].min(shape[2]);
        if num_values <= 4 {
            bail!("model output has no class scores: {:?}", shape);
        }

        let (frame_width, frame_height) = (frame_size.0 as f32, frame_size.1 as f32);
        let mut candidates = Vec::new();
        for anchor in preds.axis_iter(anchor_axis) {
            let (class_id, confidence) = anchor
                .iter()
                .skip(4)
                .cloned()
                .enumerate()
                .fold((0, f32::MIN), |best, score| match score.1 > best.1 {
                    true => score,
                    false => best,
                });

            if confidence < self.min_confidence {
                continue;
            }

            let bbox = BBox::from_cxcywh(anchor[0], anchor[1], anchor[2], anchor[3]);
            let bbox = letterbox.to_frame(&bbox).clamp(frame_width, frame_height);
            candidates.push(Detection::new(bbox, class_id, confidence));
        }

        Ok(non_maximum_suppression(candidates, self.max_iou))
    }
}

impl Detector for YoloModel {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let (input, letterbox) = self.preproc(frame);
        let raw_nn_out = self.model.run(tvec!(input.into()))?;
        let detections = self.postproc(&raw_nn_out[0], &letterbox, frame.dimensions())?;
        log::debug!("Found {} objects in frame", detections.len());

        Ok(detections)
    }
}

/// Aspect-preserving resize of a frame into the square model input, padded on both sides.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Fit a frame of `(width, height)` into a square of `side` pixels.
    pub fn fit((width, height): (u32, u32), side: u32) -> Self {
        let scale = f32::min(side as f32 / width as f32, side as f32 / height as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, side);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, side);

        Self {
            scale,
            pad_x: (side - scaled_width) / 2,
            pad_y: (side - scaled_height) / 2,
        }
    }

    /// Size of the frame after scaling, before padding.
    pub fn scaled_size(&self, (width, height): (u32, u32)) -> (u32, u32) {
        (
            ((width as f32 * self.scale).round() as u32).max(1),
            ((height as f32 * self.scale).round() as u32).max(1),
        )
    }

    /// Map a box from model input coordinates back onto the original frame.
    pub fn to_frame(&self, bbox: &BBox) -> BBox {
        let (pad_x, pad_y) = (self.pad_x as f32, self.pad_y as f32);
        BBox::new(
            (bbox.x1 - pad_x) / self.scale,
            (bbox.y1 - pad_y) / self.scale,
            (bbox.x2 - pad_x) / self.scale,
            (bbox.y2 - pad_y) / self.scale,
        )
    }
}

/// Run class-aware non-maximum-suppression on candidate detections.
///
/// Start with the most confident detection and iterate over all others in the order of sinking
/// confidence. A candidate is kept only if it does not overlap by more than `max_iou` with an
/// already kept detection of the same class. The result is sorted by descending confidence.
pub fn non_maximum_suppression(mut candidates: Vec<Detection>, max_iou: f32) -> Vec<Detection> {
    // Ascending, so that popping yields the most confident one
    candidates.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));

    let mut selected: Vec<Detection> = Vec::new();
    'candidates: while let Some(candidate) = candidates.pop() {
        for kept in selected.iter() {
            if kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) > max_iou {
                continue 'candidates;
            }
        }

        selected.push(candidate);
    }

    selected
}
