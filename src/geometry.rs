//! Box and point arithmetic shared by the correlator and the normalizer.
//!
//! Everything here is a pure function over pixel coordinates. Detector boxes
//! arrive as (x1, y1, x2, y2) with x1 < x2 and y1 < y2; they may touch or
//! exceed the frame bounds until clamped by `padded_crop_rect`.

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Geometric center, ((x1+x2)/2, (y1+y2)/2).
    pub fn centroid(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    /// Point containment, edges inclusive.
    pub fn contains(&self, (px, py): (f32, f32)) -> bool {
        self.x1 <= px && px <= self.x2 && self.y1 <= py && py <= self.y2
    }

    /// Intersection-over-Union with the intersection clamped to zero on each
    /// axis, so disjoint boxes score 0.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Crop rectangle for this box: padded by `pad` pixels on every side and
    /// clamped to the frame. Returns (x, y, width, height) in whole pixels,
    /// or None when the clamped region is empty.
    pub fn padded_crop_rect(
        &self,
        pad: u32,
        frame_w: u32,
        frame_h: u32,
    ) -> Option<(u32, u32, u32, u32)> {
        let pad = pad as f32;
        let x1 = (self.x1 - pad).max(0.0) as u32;
        let y1 = (self.y1 - pad).max(0.0) as u32;
        let x2 = ((self.x2 + pad).max(0.0) as u32).min(frame_w);
        let y2 = ((self.y2 + pad).max(0.0) as u32).min(frame_h);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// Euclidean distance between two points.
pub fn distance((ax, ay): (f32, f32), (bx, by): (f32, f32)) -> f32 {
    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
}

/// Order four quadrilateral corners as [top-left, top-right, bottom-right,
/// bottom-left]. Top-left minimizes x+y, bottom-right maximizes it; the
/// remaining pair is split on y-x (top-right minimal, bottom-left maximal).
pub fn order_corners(pts: [(f32, f32); 4]) -> [(f32, f32); 4] {
    let by_sum = |p: &(f32, f32)| p.0 + p.1;
    let by_diff = |p: &(f32, f32)| p.1 - p.0;

    let mut tl = pts[0];
    let mut br = pts[0];
    let mut tr = pts[0];
    let mut bl = pts[0];
    for p in pts.iter().skip(1) {
        if by_sum(p) < by_sum(&tl) {
            tl = *p;
        }
        if by_sum(p) > by_sum(&br) {
            br = *p;
        }
        if by_diff(p) < by_diff(&tr) {
            tr = *p;
        }
        if by_diff(p) > by_diff(&bl) {
            bl = *p;
        }
    }
    [tl, tr, br, bl]
}

/// Fold a min-area-rect angle into the [-45, 45] band: text lines tilted by
/// a near-vertical rectangle read as a 90-degree complement.
pub fn normalize_skew_angle(angle_deg: f32) -> f32 {
    if angle_deg < -45.0 {
        angle_deg + 90.0
    } else if angle_deg > 45.0 {
        angle_deg - 90.0
    } else {
        angle_deg
    }
}

/// Skew below half a degree is not worth a resampling pass.
pub const MIN_SKEW_DEG: f32 = 0.5;

pub fn is_visible_skew(angle_deg: f32) -> bool {
    angle_deg.abs() >= MIN_SKEW_DEG
}
