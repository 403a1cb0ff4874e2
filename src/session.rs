//! Per-stream pipeline context.
//!
//! One session per video stream. It owns everything the frame loop mutates
//! between frames: the frame counter, the dedup cache, the job sequence and
//! the dispatcher handle. Nothing here is shared; swapping streams tears the
//! session down (draining in-flight recognition) and builds a fresh one.

use anyhow::Result;
use image::{imageops, RgbImage};

use crate::correlate::{correlate_frame, CandidateStatus, ViolationCandidate};
use crate::dedup::DedupCache;
use crate::detect::FrameDetections;
use crate::dispatch::{RecognitionDispatcher, RecognitionJob};
use crate::now_secs_f64;

/// Padding around the plate box before cropping, pixels per side.
pub const CROP_PAD_PX: u32 = 5;

pub const DEFAULT_OCR_STRIDE: u64 = 10;

/// One correlated candidate plus what the pipeline did about its plate this
/// frame. `status` is None when no plate was associated.
#[derive(Clone, Debug)]
pub struct CandidateOutcome {
    pub candidate: ViolationCandidate,
    pub status: Option<CandidateStatus>,
}

pub struct PipelineSession {
    dispatcher: RecognitionDispatcher,
    dedup: DedupCache,
    ocr_stride: u64,
    frame_count: u64,
    job_seq: u64,
}

impl PipelineSession {
    pub fn new(ocr_stride: u64, dedup: DedupCache, dispatcher: RecognitionDispatcher) -> Self {
        Self {
            dispatcher,
            dedup,
            ocr_stride: ocr_stride.max(1),
            frame_count: 0,
            job_seq: 0,
        }
    }

    /// Run the gates for one frame against the wall clock.
    pub fn process_frame(
        &mut self,
        frame: &RgbImage,
        detections: &FrameDetections,
    ) -> Result<Vec<CandidateOutcome>> {
        let now = now_secs_f64()?;
        Ok(self.process_frame_at(frame, detections, now))
    }

    /// Same as `process_frame` but against an explicit clock. Gate behavior
    /// is deterministic given the clock, which is what the tests rely on.
    pub fn process_frame_at(
        &mut self,
        frame: &RgbImage,
        detections: &FrameDetections,
        now: f64,
    ) -> Vec<CandidateOutcome> {
        self.frame_count += 1;
        // Stride gate is evaluated once per frame, before any dedup lookup,
        // so an off-stride frame never consumes or registers dedup entries.
        let on_stride = self.frame_count % self.ocr_stride == 0;

        correlate_frame(detections)
            .into_iter()
            .map(|candidate| {
                let status = candidate
                    .plate
                    .as_ref()
                    .map(|plate| self.gate_plate(frame, &plate.bbox, on_stride, now));
                CandidateOutcome { candidate, status }
            })
            .collect()
    }

    fn gate_plate(
        &mut self,
        frame: &RgbImage,
        plate: &crate::geometry::BoundingBox,
        on_stride: bool,
        now: f64,
    ) -> CandidateStatus {
        if !on_stride {
            return CandidateStatus::PlateDetected;
        }
        if !self.dedup.accept(plate.centroid(), now) {
            return CandidateStatus::SkippedRecent;
        }

        let Some((x, y, w, h)) = plate.padded_crop_rect(CROP_PAD_PX, frame.width(), frame.height())
        else {
            log::warn!("plate box {:?} outside frame, skipping crop", plate);
            return CandidateStatus::SkippedRecent;
        };
        // Deep copy: the frame buffer is reused before the worker runs.
        let crop = imageops::crop_imm(frame, x, y, w, h).to_image();

        self.job_seq += 1;
        let job = RecognitionJob {
            crop,
            plate_box: *plate,
            submitted_at: now as u64,
            seq: self.job_seq,
        };
        // A full queue drops the job; the dedup entry stays registered so the
        // same plate is not hammered at the next stride frame either way.
        self.dispatcher.submit(job);
        CandidateStatus::Processing
    }

    pub fn frames_seen(&self) -> u64 {
        self.frame_count
    }

    pub fn jobs_submitted(&self) -> u64 {
        self.job_seq
    }

    /// Tear the session down, draining recognition work already accepted.
    pub fn shutdown(self) -> Result<()> {
        self.dispatcher.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchSettings;
    use crate::detect::{Detection, ObjectClass};
    use crate::events::InMemoryEventLog;
    use crate::geometry::BoundingBox;
    use crate::recognize::{OcrReading, StubRecognizer};

    fn violation_frame() -> FrameDetections {
        let det = |class, x1, y1, x2, y2| Detection {
            class,
            bbox: BoundingBox::new(x1, y1, x2, y2),
            confidence: 0.9,
        };
        FrameDetections {
            helmets: vec![],
            no_helmets: vec![det(ObjectClass::NoHelmet, 40.0, 10.0, 60.0, 30.0)],
            riders: vec![det(ObjectClass::Rider, 30.0, 5.0, 70.0, 90.0)],
            plates: vec![det(ObjectClass::Plate, 42.0, 70.0, 62.0, 80.0)],
        }
    }

    fn session(stride: u64, crops_dir: &std::path::Path) -> (PipelineSession, StubRecognizer) {
        let stub = StubRecognizer::with_responses(vec![OcrReading {
            text: "B 1234 XY".into(),
            confidence: 0.9,
        }]);
        let dispatcher = RecognitionDispatcher::spawn(
            DispatchSettings {
                crops_dir: crops_dir.to_path_buf(),
                ..Default::default()
            },
            Box::new(stub.clone()),
            Box::new(InMemoryEventLog::new()),
        )
        .unwrap();
        (
            PipelineSession::new(stride, DedupCache::default(), dispatcher),
            stub,
        )
    }

    #[test]
    fn off_stride_frames_only_annotate() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _stub) = session(10, dir.path());
        let frame = RgbImage::new(100, 100);
        let detections = violation_frame();

        for _ in 0..9 {
            let out = session.process_frame_at(&frame, &detections, 100.0);
            assert_eq!(out[0].status, Some(CandidateStatus::PlateDetected));
        }
        assert_eq!(session.jobs_submitted(), 0);

        let out = session.process_frame_at(&frame, &detections, 100.0);
        assert_eq!(out[0].status, Some(CandidateStatus::Processing));
        assert_eq!(session.jobs_submitted(), 1);
        session.shutdown().unwrap();
    }

    #[test]
    fn dedup_suppresses_the_next_stride_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _stub) = session(1, dir.path());
        let frame = RgbImage::new(100, 100);
        let detections = violation_frame();

        let out = session.process_frame_at(&frame, &detections, 100.0);
        assert_eq!(out[0].status, Some(CandidateStatus::Processing));
        let out = session.process_frame_at(&frame, &detections, 100.5);
        assert_eq!(out[0].status, Some(CandidateStatus::SkippedRecent));
        // Window elapsed, same plate goes through again.
        let out = session.process_frame_at(&frame, &detections, 103.6);
        assert_eq!(out[0].status, Some(CandidateStatus::Processing));
        assert_eq!(session.jobs_submitted(), 2);
        session.shutdown().unwrap();
    }

    #[test]
    fn off_stride_frames_do_not_touch_the_dedup_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _stub) = session(10, dir.path());
        let frame = RgbImage::new(100, 100);
        let detections = violation_frame();

        // Nine off-stride sightings must not pre-register the plate.
        for _ in 0..9 {
            session.process_frame_at(&frame, &detections, 100.0);
        }
        let out = session.process_frame_at(&frame, &detections, 100.0);
        assert_eq!(out[0].status, Some(CandidateStatus::Processing));
        session.shutdown().unwrap();
    }

    #[test]
    fn candidate_without_plate_has_no_status() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _stub) = session(1, dir.path());
        let frame = RgbImage::new(100, 100);
        let detections = FrameDetections {
            helmets: vec![],
            no_helmets: vec![Detection {
                class: ObjectClass::NoHelmet,
                bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                confidence: 0.9,
            }],
            riders: vec![],
            plates: vec![],
        };
        let out = session.process_frame_at(&frame, &detections, 100.0);
        assert!(out[0].status.is_none());
        assert_eq!(session.jobs_submitted(), 0);
        session.shutdown().unwrap();
    }

    #[test]
    fn crop_is_padded_and_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, stub) = session(1, dir.path());
        let calls = stub.call_log();
        let frame = RgbImage::new(100, 100);
        // Plate touches the right edge: pad clamps to the frame there.
        let detections = FrameDetections {
            helmets: vec![],
            no_helmets: vec![Detection {
                class: ObjectClass::NoHelmet,
                bbox: BoundingBox::new(40.0, 10.0, 60.0, 30.0),
                confidence: 0.9,
            }],
            riders: vec![Detection {
                class: ObjectClass::Rider,
                bbox: BoundingBox::new(30.0, 5.0, 100.0, 95.0),
                confidence: 0.9,
            }],
            plates: vec![Detection {
                class: ObjectClass::Plate,
                bbox: BoundingBox::new(78.0, 70.0, 98.0, 80.0),
                confidence: 0.9,
            }],
        };
        session.process_frame_at(&frame, &detections, 100.0);
        session.shutdown().unwrap();

        // x: 73..100 (right pad clamped), y: 65..85.
        assert_eq!(*calls.lock().unwrap(), vec![(27, 20)]);
    }
}
