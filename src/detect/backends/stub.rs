use anyhow::Result;
use image::RgbImage;

use crate::detect::{Detection, DetectorBackend};

/// Scripted detector for tests and the stub daemon. Plays back a fixed
/// sequence of per-frame detection sets; once the script runs out it emits
/// empty frames.
#[derive(Default)]
pub struct StubBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Vec<Vec<Detection>>) -> Self {
        Self { script, cursor: 0 }
    }

    /// Repeat one detection set on every frame.
    pub fn repeating(detections: Vec<Detection>) -> Self {
        Self {
            script: vec![detections],
            cursor: usize::MAX,
        }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        if self.cursor == usize::MAX {
            return Ok(self.script.first().cloned().unwrap_or_default());
        }
        let out = self.script.get(self.cursor).cloned().unwrap_or_default();
        self.cursor += 1;
        Ok(out)
    }
}
