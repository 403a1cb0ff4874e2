//! Helmet Sentinel
//!
//! This crate implements the correlation and recognition pipeline behind a
//! helmet-violation camera daemon. An external detector emits labeled boxes
//! per frame; the pipeline turns them into persisted violation events.
//!
//! # Architecture
//!
//! Frame loop (synchronous): detector output -> correlator -> dedup gate ->
//! recognition dispatcher. The dispatcher owns the only background worker;
//! it normalizes plate crops, calls the OCR engine, and appends successful
//! reads to the event log. The frame thread never waits on recognition.
//!
//! # Module Structure
//!
//! - `geometry`: boxes, centroids, IoU, corner ordering (pure functions)
//! - `detect`: detector boundary types and backends
//! - `correlate`: no-helmet -> rider -> plate association
//! - `dedup`: spatio-temporal duplicate-plate filter
//! - `normalize`: rectify/deskew/enhance cascade for plate crops
//! - `recognize`: OCR engine boundary
//! - `dispatch`: bounded single-worker recognition queue
//! - `events`: append-only violation log
//! - `session`: per-stream pipeline context
//! - `ingest`: frame sources

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod correlate;
pub mod dedup;
pub mod detect;
pub mod dispatch;
pub mod events;
pub mod geometry;
pub mod ingest;
pub mod normalize;
pub mod recognize;
pub mod session;

pub use config::{PipelineSettings, SentinelConfig, SourceSettings};
pub use correlate::{correlate_frame, CandidateStatus, ViolationCandidate};
pub use dedup::DedupCache;
pub use detect::{Detection, DetectorBackend, FrameDetections, ObjectClass, StubBackend};
pub use dispatch::{DispatchSettings, RecognitionDispatcher, RecognitionJob};
pub use events::{EventLogStore, InMemoryEventLog, JsonFileEventLog, LogEntry, ViolationType};
pub use geometry::BoundingBox;
pub use ingest::{FrameSource, SharedSource, SyntheticSource};
pub use normalize::normalize_plate;
pub use recognize::{OcrReading, Recognizer, StubRecognizer};
pub use session::{CandidateOutcome, PipelineSession};

/// Current unix time in fractional seconds, used for dedup-window arithmetic.
pub fn now_secs_f64() -> Result<f64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs_f64())
}
