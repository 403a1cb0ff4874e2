//! OCR engine boundary.
//!
//! The engine is a black box: crop in, text and confidence out. An empty
//! string means "no text found" and is not an error; engine faults are errors
//! and are degraded to an empty zero-confidence reading by the dispatcher.

use anyhow::Result;
use image::RgbImage;
use std::sync::{Arc, Mutex};

/// One recognition attempt.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OcrReading {
    pub text: String,
    /// Engine confidence in [0, 1].
    pub confidence: f32,
}

impl OcrReading {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Every OCR backend implements this. Engines are typically not thread-safe
/// or are memory-heavy, so the dispatcher serializes all calls onto one
/// worker; implementations only need `Send`.
pub trait Recognizer: Send {
    fn name(&self) -> &str;

    fn recognize(&mut self, crop: &RgbImage) -> Result<OcrReading>;
}

/// Scripted recognizer for tests and the stub daemon: plays back a fixed
/// response sequence (repeating the last one) and records every call so
/// tests can assert ordering and attempt counts.
#[derive(Clone, Default)]
pub struct StubRecognizer {
    responses: Vec<OcrReading>,
    calls: Arc<Mutex<Vec<(u32, u32)>>>,
    cursor: usize,
}

impl StubRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<OcrReading>) -> Self {
        Self {
            responses,
            ..Self::default()
        }
    }

    /// Crop dimensions seen by the engine, in call order.
    pub fn call_log(&self) -> Arc<Mutex<Vec<(u32, u32)>>> {
        self.calls.clone()
    }
}

impl Recognizer for StubRecognizer {
    fn name(&self) -> &str {
        "stub"
    }

    fn recognize(&mut self, crop: &RgbImage) -> Result<OcrReading> {
        self.calls
            .lock()
            .map_err(|_| anyhow::anyhow!("stub recognizer call log poisoned"))?
            .push((crop.width(), crop.height()));
        let reading = if self.responses.is_empty() {
            OcrReading::empty()
        } else {
            let idx = self.cursor.min(self.responses.len() - 1);
            self.cursor += 1;
            self.responses[idx].clone()
        };
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_repeats_last_response() {
        let mut stub = StubRecognizer::with_responses(vec![
            OcrReading {
                text: "B 1234 XY".into(),
                confidence: 0.9,
            },
            OcrReading::empty(),
        ]);
        let crop = RgbImage::new(4, 4);
        assert_eq!(stub.recognize(&crop).unwrap().text, "B 1234 XY");
        assert_eq!(stub.recognize(&crop).unwrap(), OcrReading::empty());
        assert_eq!(stub.recognize(&crop).unwrap(), OcrReading::empty());
        assert_eq!(stub.call_log().lock().unwrap().len(), 3);
    }
}
