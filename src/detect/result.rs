use crate::geometry::BoundingBox;

/// Classes the external detector is trained to emit.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    Helmet,
    NoHelmet,
    Rider,
    Plate,
}

/// One labeled box from the detector. Immutable, scoped to a single frame.
#[derive(Clone, Debug)]
pub struct Detection {
    pub class: ObjectClass,
    pub bbox: BoundingBox,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
}

/// Per-frame detections grouped by class, preserving detector emission order
/// within each group. Owned by the correlator for the frame, then discarded.
#[derive(Clone, Debug, Default)]
pub struct FrameDetections {
    pub helmets: Vec<Detection>,
    pub no_helmets: Vec<Detection>,
    pub riders: Vec<Detection>,
    pub plates: Vec<Detection>,
}

impl FrameDetections {
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        let mut grouped = Self::default();
        for det in detections {
            match det.class {
                ObjectClass::Helmet => grouped.helmets.push(det),
                ObjectClass::NoHelmet => grouped.no_helmets.push(det),
                ObjectClass::Rider => grouped.riders.push(det),
                ObjectClass::Plate => grouped.plates.push(det),
            }
        }
        grouped
    }

    pub fn is_empty(&self) -> bool {
        self.helmets.is_empty()
            && self.no_helmets.is_empty()
            && self.riders.is_empty()
            && self.plates.is_empty()
    }
}
