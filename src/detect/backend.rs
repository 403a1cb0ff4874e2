use anyhow::Result;
use image::RgbImage;

use super::Detection;

/// Detector boundary. Implementations run object detection on one frame and
/// return labeled boxes in model emission order; the association logic
/// downstream depends on that order, so backends must not re-sort.
pub trait DetectorBackend {
    fn name(&self) -> &str;

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;
}
