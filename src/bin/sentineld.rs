//! sentineld - helmet violation sentinel daemon
//!
//! This daemon:
//! 1. Ingests frames from the configured source
//! 2. Runs the detector and correlates no-helmet riders with plates
//! 3. Gates plate crops through the frame stride and the dedup cache
//! 4. Hands surviving crops to the recognition worker
//! 5. Appends successful plate reads to the violation log

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use helmet_sentinel::{
    CandidateStatus, DedupCache, DetectorBackend, DispatchSettings, FrameDetections,
    JsonFileEventLog, PipelineSession, RecognitionDispatcher, SentinelConfig, SharedSource,
    StubBackend, StubRecognizer, SyntheticSource,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SentinelConfig::load()?;
    log::info!(
        "sentineld {} starting, source={} log={}",
        env!("CARGO_PKG_VERSION"),
        cfg.source.url,
        cfg.log_path.display()
    );

    let store = JsonFileEventLog::open(&cfg.log_path)?;
    let dispatcher = RecognitionDispatcher::spawn(
        DispatchSettings {
            queue_depth: cfg.pipeline.queue_depth,
            retry_threshold: cfg.pipeline.retry_threshold,
            crops_dir: cfg.crops_dir.clone(),
        },
        Box::new(StubRecognizer::new()),
        Box::new(store),
    )?;
    let mut session = PipelineSession::new(
        cfg.pipeline.ocr_stride,
        DedupCache::new(cfg.pipeline.dedup_distance_px, cfg.pipeline.dedup_window_seconds),
        dispatcher,
    );

    let source = SharedSource::new(build_source(&cfg.source.url)?);
    let mut detector = StubBackend::repeating(vec![]);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let frame_interval = Duration::from_millis(1000 / u64::from(cfg.source.target_fps).max(1));
    let mut last_health_log = Instant::now();
    let mut submitted = 0u64;
    let mut suppressed = 0u64;

    while running.load(Ordering::SeqCst) {
        let Some(frame) = source.next_frame()? else {
            log::info!("frame source ended");
            break;
        };

        let detections = FrameDetections::from_detections(detector.detect(&frame)?);
        if !detections.is_empty() {
            let outcomes = session.process_frame(&frame, &detections)?;
            for outcome in &outcomes {
                match outcome.status {
                    Some(CandidateStatus::Processing) => submitted += 1,
                    Some(CandidateStatus::SkippedRecent) => suppressed += 1,
                    _ => {}
                }
            }
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            log::info!(
                "health source={} frames={} submitted={} suppressed={}",
                source.name()?,
                session.frames_seen(),
                submitted,
                suppressed
            );
            last_health_log = Instant::now();
        }

        std::thread::sleep(frame_interval);
    }

    log::info!(
        "shutting down after {} frames, draining recognition queue",
        session.frames_seen()
    );
    session.shutdown()?;
    Ok(())
}

fn build_source(url: &str) -> Result<Box<dyn helmet_sentinel::FrameSource>> {
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(640, 480)));
    }
    Err(anyhow!("unsupported source url: {}", url))
}
