//! Frame acquisition.
//!
//! Sources produce frames one at a time; `None` means the stream ended. The
//! daemon reads through a `SharedSource` so an operator-triggered source swap
//! and an in-progress read never interleave: the swap replaces the inner
//! source between frames. Recognition work already queued from the old source
//! is not cancelled by a swap.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::sync::{Arc, Mutex};

pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// Blocking read of the next frame; `Ok(None)` is a clean end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

// ----------------------------------------------------------------------------
// Synthetic source
// ----------------------------------------------------------------------------

/// Deterministic procedural frames for tests and dry runs: a gradient that
/// scrolls one pixel per frame, so consecutive frames differ.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    produced: u64,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            produced: 0,
            limit: None,
        }
    }

    /// Stop after `limit` frames instead of running forever.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Some(limit) = self.limit {
            if self.produced >= limit {
                return Ok(None);
            }
        }
        let shift = self.produced;
        let frame = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                ((x as u64 + shift) % 256) as u8,
                ((y as u64 + shift) % 256) as u8,
                ((x as u64 + y as u64) % 256) as u8,
            ])
        });
        self.produced += 1;
        Ok(Some(frame))
    }
}

// ----------------------------------------------------------------------------
// Shared handle
// ----------------------------------------------------------------------------

/// Clonable handle over a swappable source. All access goes through one
/// mutex, so `swap` waits for any in-flight `next_frame` to finish.
#[derive(Clone)]
pub struct SharedSource {
    inner: Arc<Mutex<Box<dyn FrameSource>>>,
}

impl SharedSource {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(source)),
        }
    }

    /// Replace the inner source; takes effect at the next read.
    pub fn swap(&self, source: Box<dyn FrameSource>) -> Result<()> {
        let mut guard = self.inner.lock().map_err(|_| anyhow!("source poisoned"))?;
        log::info!("frame source swapped: {} -> {}", guard.name(), source.name());
        *guard = source;
        Ok(())
    }

    pub fn next_frame(&self) -> Result<Option<RgbImage>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("source poisoned"))?
            .next_frame()
    }

    pub fn name(&self) -> Result<String> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| anyhow!("source poisoned"))?
            .name()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_honors_its_limit() {
        let mut source = SyntheticSource::new(8, 8).with_limit(3);
        for _ in 0..3 {
            assert!(source.next_frame().unwrap().is_some());
        }
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn consecutive_synthetic_frames_differ() {
        let mut source = SyntheticSource::new(16, 16);
        let a = source.next_frame().unwrap().unwrap();
        let b = source.next_frame().unwrap().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn swap_takes_effect_at_the_next_read() {
        let shared = SharedSource::new(Box::new(SyntheticSource::new(8, 8).with_limit(1)));
        assert!(shared.next_frame().unwrap().is_some());
        assert!(shared.next_frame().unwrap().is_none());

        shared
            .swap(Box::new(SyntheticSource::new(4, 4).with_limit(1)))
            .unwrap();
        let frame = shared.next_frame().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (4, 4));
    }
}
