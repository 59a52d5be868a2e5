//! Common types shared between `cam_source` and `detect_server`.
pub mod coco;
pub mod detection;
pub mod palette;

pub use coco::{class_name, COCO_CLASSES};
pub use detection::{BBox, Detection};
pub use palette::{Palette, PALETTE_SEED, PALETTE_SIZE};
