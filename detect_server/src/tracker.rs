//! Assignment of track ids across frames.
//!
use anyhow::Result;
use common::{BBox, Detection};
use image::RgbImage;

use crate::nn::Detector;

/// Minimum overlap for a detection to continue a track.
pub const DEFAULT_MIN_IOU: f32 = 0.3;

/// Number of frames a track survives without a matching detection.
pub const DEFAULT_MAX_LOST: u32 = 30;

#[derive(Debug)]
struct Track {
    id: u32,
    class_id: usize,
    bbox: BBox,
    frames_lost: u32,
}

/// Greedy IoU tracker.
///
/// Detections are matched to live tracks of the same class, best overlap first. Unmatched
/// detections open new tracks.
#[derive(Debug)]
pub struct IouTracker {
    tracks: Vec<Track>,
    next_id: u32,
    min_iou: f32,
    max_lost: u32,
}

impl IouTracker {
    pub fn new(min_iou: f32, max_lost: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            min_iou,
            max_lost,
        }
    }

    /// Assign a track id to every detection of the current frame.
    pub fn update(&mut self, detections: &mut [Detection]) {
        let mut pairs = Vec::new();
        for (det_idx, detection) in detections.iter().enumerate() {
            for (track_idx, track) in self.tracks.iter().enumerate() {
                if track.class_id != detection.class_id {
                    continue;
                }
                let iou = track.bbox.iou(&detection.bbox);
                if iou >= self.min_iou {
                    pairs.push((iou, det_idx, track_idx));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut track_matched = vec![false; self.tracks.len()];
        for (_, det_idx, track_idx) in pairs {
            if track_matched[track_idx] || detections[det_idx].track_id.is_some() {
                continue;
            }
            track_matched[track_idx] = true;

            let track = &mut self.tracks[track_idx];
            track.bbox = detections[det_idx].bbox;
            track.frames_lost = 0;
            detections[det_idx].track_id = Some(track.id);
        }

        for (track, matched) in self.tracks.iter_mut().zip(track_matched) {
            if !matched {
                track.frames_lost += 1;
            }
        }
        let max_lost = self.max_lost;
        self.tracks.retain(|track| track.frames_lost <= max_lost);

        for detection in detections.iter_mut().filter(|d| d.track_id.is_none()) {
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(Track {
                id,
                class_id: detection.class_id,
                bbox: detection.bbox,
                frames_lost: 0,
            });
            detection.track_id = Some(id);
        }
    }

    /// Number of live tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_IOU, DEFAULT_MAX_LOST)
    }
}

/// Detector whose detections carry track ids.
pub struct Tracking<D> {
    detector: D,
    tracker: IouTracker,
}

impl<D: Detector> Tracking<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            tracker: IouTracker::default(),
        }
    }
}

impl<D: Detector> Detector for Tracking<D> {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let mut detections = self.detector.detect(frame)?;
        self.tracker.update(&mut detections);

        Ok(detections)
    }
}
