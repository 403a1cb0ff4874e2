use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_SOURCE_URL: &str = "stub://gate_camera";
const DEFAULT_TARGET_FPS: u32 = 15;
const DEFAULT_OCR_STRIDE: u64 = 10;
const DEFAULT_DEDUP_DISTANCE_PX: f32 = 50.0;
const DEFAULT_DEDUP_WINDOW_SECONDS: f64 = 3.0;
const DEFAULT_RETRY_THRESHOLD: f32 = 0.7;
const DEFAULT_QUEUE_DEPTH: usize = 8;
const DEFAULT_LOG_PATH: &str = "violations.json";
const DEFAULT_CROPS_DIR: &str = "crops";

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    source: Option<SourceConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    log_path: Option<PathBuf>,
    crops_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    ocr_stride: Option<u64>,
    dedup_distance_px: Option<f32>,
    dedup_window_seconds: Option<f64>,
    retry_threshold: Option<f32>,
    queue_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub source: SourceSettings,
    pub pipeline: PipelineSettings,
    pub log_path: PathBuf,
    pub crops_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// OCR is attempted on every Nth frame only.
    pub ocr_stride: u64,
    pub dedup_distance_px: f32,
    pub dedup_window_seconds: f64,
    /// Raw readings below this confidence get one normalized retry.
    pub retry_threshold: f32,
    pub queue_depth: usize,
}

impl SentinelConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Self {
        let source = SourceSettings {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
        };
        let pipeline = PipelineSettings {
            ocr_stride: file
                .pipeline
                .as_ref()
                .and_then(|pipeline| pipeline.ocr_stride)
                .unwrap_or(DEFAULT_OCR_STRIDE),
            dedup_distance_px: file
                .pipeline
                .as_ref()
                .and_then(|pipeline| pipeline.dedup_distance_px)
                .unwrap_or(DEFAULT_DEDUP_DISTANCE_PX),
            dedup_window_seconds: file
                .pipeline
                .as_ref()
                .and_then(|pipeline| pipeline.dedup_window_seconds)
                .unwrap_or(DEFAULT_DEDUP_WINDOW_SECONDS),
            retry_threshold: file
                .pipeline
                .as_ref()
                .and_then(|pipeline| pipeline.retry_threshold)
                .unwrap_or(DEFAULT_RETRY_THRESHOLD),
            queue_depth: file
                .pipeline
                .as_ref()
                .and_then(|pipeline| pipeline.queue_depth)
                .unwrap_or(DEFAULT_QUEUE_DEPTH),
        };
        let log_path = file
            .log_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH));
        let crops_dir = file
            .crops_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CROPS_DIR));
        Self {
            source,
            pipeline,
            log_path,
            crops_dir,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SENTINEL_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(stride) = std::env::var("SENTINEL_OCR_STRIDE") {
            self.pipeline.ocr_stride = stride
                .parse()
                .map_err(|_| anyhow!("SENTINEL_OCR_STRIDE must be a positive integer"))?;
        }
        if let Ok(distance) = std::env::var("SENTINEL_DEDUP_DISTANCE_PX") {
            self.pipeline.dedup_distance_px = distance
                .parse()
                .map_err(|_| anyhow!("SENTINEL_DEDUP_DISTANCE_PX must be a number of pixels"))?;
        }
        if let Ok(window) = std::env::var("SENTINEL_DEDUP_WINDOW_SECS") {
            self.pipeline.dedup_window_seconds = window
                .parse()
                .map_err(|_| anyhow!("SENTINEL_DEDUP_WINDOW_SECS must be a number of seconds"))?;
        }
        if let Ok(path) = std::env::var("SENTINEL_LOG_PATH") {
            if !path.trim().is_empty() {
                self.log_path = PathBuf::from(path);
            }
        }
        if let Ok(dir) = std::env::var("SENTINEL_CROPS_DIR") {
            if !dir.trim().is_empty() {
                self.crops_dir = PathBuf::from(dir);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.source.target_fps == 0 {
            return Err(anyhow!("target_fps must be greater than zero"));
        }
        if self.pipeline.ocr_stride == 0 {
            return Err(anyhow!("ocr_stride must be greater than zero"));
        }
        if self.pipeline.dedup_distance_px <= 0.0 {
            return Err(anyhow!("dedup_distance_px must be greater than zero"));
        }
        if self.pipeline.dedup_window_seconds <= 0.0 {
            return Err(anyhow!("dedup_window_seconds must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.pipeline.retry_threshold) {
            return Err(anyhow!("retry_threshold must be within [0, 1]"));
        }
        if self.pipeline.queue_depth == 0 {
            return Err(anyhow!("queue_depth must be greater than zero"));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(anyhow!("log_path must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
