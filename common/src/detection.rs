//! Bounding boxes and detections.
//!

/// Positive additive constant to avoid divide-by-zero.
const EPS: f32 = 1.0e-7;

/// Axis-aligned bounding box in pixel coordinates.
///
/// The box is stored as two corner points `(x1, y1)` top-left and `(x2, y2)` bottom-right with
/// the coordinate frame basis on the top left corner of the image.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    /// Create a box from two corner points, swapping coordinates so that `x1 <= x2, y1 <= y2`.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Create a box from its center point, width and height.
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Area enclosed by the box.
    ///
    /// If the box is ill-defined by having the bottom-right point above/to the left of the
    /// top-left point, the area is zero.
    pub fn area(&self) -> f32 {
        let (width, height) = (self.width(), self.height());
        if width < 0.0 || height < 0.0 {
            return 0.0;
        }

        width * height
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &BBox) -> f32 {
        // Corners of the overlap are ill defined for disjoint boxes, which yields a zero area
        let overlap = BBox {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        let overlap_area = overlap.area();

        overlap_area / (self.area() + other.area() - overlap_area + EPS)
    }

    /// Clamp the box into an image of the given size.
    pub fn clamp(&self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
        }
    }
}

/// One object predicted on a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub class_id: usize,
    /// Score in `[0, 1]`.
    pub confidence: f32,
    /// Identifier correlating the same object across frames, if a tracker assigned one.
    pub track_id: Option<u32>,
}

impl Detection {
    pub fn new(bbox: BBox, class_id: usize, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
            track_id: None,
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn new_orders_corners() {
        let bbox = BBox::new(50.0, 40.0, 10.0, 20.0);
        assert_eq!(bbox, BBox::new(10.0, 20.0, 50.0, 40.0));
        assert_eq!(bbox.width(), 40.0);
        assert_eq!(bbox.height(), 20.0);
    }

    #[test]
    fn center_form_conversion() {
        let bbox = BBox::from_cxcywh(30.0, 30.0, 40.0, 20.0);
        assert_eq!(bbox, BBox::new(10.0, 20.0, 50.0, 40.0));
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-5);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 15.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn clamp_into_frame() {
        let bbox = BBox::new(-5.0, -5.0, 700.0, 300.0).clamp(640.0, 480.0);
        assert_eq!(bbox, BBox::new(0.0, 0.0, 640.0, 300.0));
    }
}
