//! Bounded single-worker recognition dispatcher.
//!
//! The frame loop must never block on OCR, so submissions go through a
//! bounded channel with non-blocking send; a full queue drops the job with a
//! warning. One worker thread owns the recognizer and the event log store and
//! processes jobs strictly in arrival order. Shutdown closes the channel and
//! joins the worker, which drains whatever is already queued.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;

use crate::events::{EventLogStore, LogEntry, ViolationType};
use crate::geometry::BoundingBox;
use crate::normalize::normalize_plate;
use crate::recognize::{OcrReading, Recognizer};

pub const DEFAULT_QUEUE_DEPTH: usize = 8;
pub const DEFAULT_RETRY_THRESHOLD: f32 = 0.7;

#[derive(Clone, Debug)]
pub struct DispatchSettings {
    /// Jobs the queue holds before submissions start dropping.
    pub queue_depth: usize,
    /// Raw readings below this confidence get one normalized retry.
    pub retry_threshold: f32,
    /// Where violation and failed-OCR crops are persisted.
    pub crops_dir: PathBuf,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            retry_threshold: DEFAULT_RETRY_THRESHOLD,
            crops_dir: PathBuf::from("crops"),
        }
    }
}

/// One plate crop queued for recognition. The crop is a deep copy; the frame
/// buffer it came from is long gone by the time the worker runs.
pub struct RecognitionJob {
    pub crop: RgbImage,
    /// Plate box in frame coordinates, for log context.
    pub plate_box: BoundingBox,
    /// Unix seconds at submission.
    pub submitted_at: u64,
    /// Monotonic job number; keeps persisted filenames unique even when two
    /// plates from one frame are submitted in the same second.
    pub seq: u64,
}

pub struct RecognitionDispatcher {
    sender: Option<SyncSender<RecognitionJob>>,
    worker: Option<JoinHandle<()>>,
}

impl RecognitionDispatcher {
    /// Start the worker thread. The recognizer and store move into it and are
    /// never touched from any other thread.
    pub fn spawn(
        settings: DispatchSettings,
        recognizer: Box<dyn Recognizer>,
        store: Box<dyn EventLogStore>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&settings.crops_dir)
            .with_context(|| format!("creating crops dir {}", settings.crops_dir.display()))?;

        let (sender, receiver) = mpsc::sync_channel::<RecognitionJob>(settings.queue_depth);
        let worker = std::thread::Builder::new()
            .name("recognition".into())
            .spawn(move || {
                let mut recognizer = recognizer;
                let mut store = store;
                while let Ok(job) = receiver.recv() {
                    process_job(&settings, recognizer.as_mut(), store.as_mut(), job);
                }
                log::debug!("recognition worker drained, exiting");
            })
            .context("spawning recognition worker")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Non-blocking submit. Returns false when the job was dropped because
    /// the queue is full or the worker is gone.
    pub fn submit(&self, job: RecognitionJob) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                log::warn!(
                    "recognition queue full, dropping job seq={} plate={:?}",
                    job.seq,
                    job.plate_box
                );
                false
            }
            Err(TrySendError::Disconnected(job)) => {
                log::error!("recognition worker gone, dropping job seq={}", job.seq);
                false
            }
        }
    }

    /// Close the queue and wait for the worker to finish the jobs already
    /// accepted. Nothing submitted before this call is lost.
    pub fn shutdown(mut self) -> Result<()> {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("recognition worker panicked"))?;
        }
        Ok(())
    }
}

impl Drop for RecognitionDispatcher {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// ----------------------------------------------------------------------------
// Worker
// ----------------------------------------------------------------------------

fn process_job(
    settings: &DispatchSettings,
    recognizer: &mut dyn Recognizer,
    store: &mut dyn EventLogStore,
    job: RecognitionJob,
) {
    let mut reading = OcrReading::empty();
    if job.crop.width() == 0 || job.crop.height() == 0 {
        log::warn!("zero-area crop on job seq={}, skipping recognition", job.seq);
    } else {
        reading = attempt(recognizer, &job.crop, job.seq, "raw");
        if reading.confidence < settings.retry_threshold {
            let normalized = normalize_plate(&job.crop);
            let retry = attempt(recognizer, &normalized, job.seq, "normalized");
            // Strict improvement only; an equal retry keeps the raw reading.
            if retry.confidence > reading.confidence {
                reading = retry;
            }
        }
    }

    if reading.text.is_empty() {
        let path = settings
            .crops_dir
            .join(format!("failed_ocr_{}_{}.jpg", job.submitted_at, job.seq));
        if let Err(err) = job.crop.save(&path) {
            log::warn!("saving failed-OCR crop {}: {}", path.display(), err);
        }
        log::info!("no text read from plate seq={}", job.seq);
        return;
    }

    let path = settings
        .crops_dir
        .join(format!("violation_{}_{}.jpg", job.submitted_at, job.seq));
    if let Err(err) = job.crop.save(&path) {
        log::warn!("saving violation crop {}: {}", path.display(), err);
    }

    let entry = LogEntry {
        timestamp: job.submitted_at,
        plate_text: reading.text.clone(),
        confidence: reading.confidence,
        image_path: path.to_string_lossy().into_owned(),
        violation_type: ViolationType::NoHelmet,
    };
    if let Err(err) = store.append(std::slice::from_ref(&entry)) {
        log::error!("appending violation entry seq={}: {}", job.seq, err);
        return;
    }
    log::info!(
        "violation logged seq={} plate={:?} conf={:.2}",
        job.seq,
        reading.text,
        reading.confidence
    );
}

/// One engine call, degraded to an empty reading on engine fault so a flaky
/// engine never kills the worker.
fn attempt(recognizer: &mut dyn Recognizer, crop: &RgbImage, seq: u64, stage: &str) -> OcrReading {
    match recognizer.recognize(crop) {
        Ok(reading) => reading,
        Err(err) => {
            log::warn!(
                "{} OCR ({}) failed on job seq={}: {}",
                recognizer.name(),
                stage,
                seq,
                err
            );
            OcrReading::empty()
        }
    }
}
