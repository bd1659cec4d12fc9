//! NPELO features for videos, one row per group of decoded frames

use crate::analysis::process_isolation::{IsolationConfigBuilder, ProcessIsolation};
use crate::core::config::PipelineConfig;
use crate::core::errors::{ErrorContext, StegError};
use crate::core::models::{FeatureMap, FrameGroup};
use crate::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Features emitted per frame group
pub const NPELO_FEATURES: usize = 36;

const DECODED_MARKER: &str = "frames are decoded";
const OUTPUT_FILE_NAME: &str = "features.csv";

/// Source of per-frame-group video features
#[async_trait]
pub trait VideoFeatureSource: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<Vec<FrameGroup>>;
}

/// Column names `NPELO_1..NPELO_36`
pub fn npelo_feature_names() -> Vec<String> {
    (1..=NPELO_FEATURES).map(|i| format!("NPELO_{}", i)).collect()
}

/// Row identifier of the `index`-th (1-based) frame group of `file`
pub fn frame_group_id(file: &str, index: usize) -> String {
    format!("{}_f{}", file, index)
}

static FRAME_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("frame count pattern is valid"));

/// Number of decoded frames reported by the extractor.
///
/// The first integer on a line containing "frames are decoded" is the count;
/// when several lines match, the last one wins.
pub fn parse_decoded_frames(stdout: &str) -> Result<u64> {
    let mut frames = None;
    for line in stdout.lines().filter(|line| line.contains(DECODED_MARKER)) {
        match FRAME_COUNT.find(line) {
            Some(m) => {
                let count = m
                    .as_str()
                    .parse::<u64>()
                    .map_err(|e| StegError::data_format(format!("bad frame count '{}': {}", m.as_str(), e)))?;
                frames = Some(count);
            }
            None => warn!("Frame count line without a number: {}", line),
        }
    }

    frames.ok_or_else(|| StegError::data_format("extractor did not report decoded frames"))
}

/// `ceil(frames / step)`
pub fn expected_frame_groups(frames: u64, step: u32) -> usize {
    let step = u64::from(step.max(1));
    ((frames + step - 1) / step) as usize
}

/// Read the first `expected` rows of the extractor's space-delimited output
pub fn read_frame_groups(csv_path: &Path, file: &str, expected: usize) -> Result<Vec<FrameGroup>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .from_path(csv_path)
        .map_err(|e| StegError::data_format(format!("cannot open extractor output: {}", e)))?;

    let names = npelo_feature_names();
    let mut groups = Vec::with_capacity(expected);

    for (i, record) in reader.records().enumerate() {
        if i == expected {
            break;
        }
        let record = record.map_err(|e| StegError::data_format(format!("row {}: {}", i + 1, e)))?;
        let values = record
            .iter()
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .take(NPELO_FEATURES)
            .map(|field| {
                field.parse::<f64>().map_err(|e| {
                    StegError::data_format(format!("row {}: '{}' is not a number: {}", i + 1, field, e))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        if values.len() != NPELO_FEATURES {
            return Err(StegError::data_format(format!(
                "row {} has {} features, expected {}",
                i + 1,
                values.len(),
                NPELO_FEATURES
            )));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(StegError::data_format(format!("row {} feature {} is not finite", i + 1, pos + 1)));
        }

        let features: FeatureMap = names.iter().cloned().zip(values).collect();
        groups.push(FrameGroup {
            row_id: frame_group_id(file, i + 1),
            features,
        });
    }

    if groups.len() < expected {
        return Err(StegError::data_format(format!(
            "extractor wrote {} rows, expected {}",
            groups.len(),
            expected
        )));
    }

    Ok(groups)
}

/// Runs the Windows NPELO extractor through a compatibility shim
pub struct NpeloExtractor {
    shim: String,
    extractor: PathBuf,
    frame_step: u32,
    scratch_dir: PathBuf,
    timeout: Duration,
    sanitize_env: bool,
}

impl NpeloExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            shim: config.video_shim.clone(),
            extractor: config.video_extractor.clone(),
            frame_step: config.frame_step,
            scratch_dir: config.scratch_dir.clone(),
            timeout: config.video_timeout,
            sanitize_env: config.sanitize_tool_env,
        }
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            self.extractor.clone().into_os_string(),
            "-s".into(),
            "-t".into(),
            self.frame_step.to_string().into(),
            "-i".into(),
            input.as_os_str().to_os_string(),
            "-o".into(),
            output.as_os_str().to_os_string(),
        ]
    }
}

#[async_trait]
impl VideoFeatureSource for NpeloExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<FrameGroup>> {
        let file = path.display().to_string();
        let context = || {
            ErrorContext::new("npelo_extraction")
                .with_file_path(path)
                .with_media_kind("video")
                .with_diagnostic("frame_step", self.frame_step.to_string())
        };

        // One scratch directory per call; concurrent extractions never share an output file.
        let scratch = tempfile::Builder::new().prefix(".npelo-").tempdir_in(&self.scratch_dir)?;
        let output = scratch.path().join(OUTPUT_FILE_NAME);

        let isolation = ProcessIsolation::with_config(
            IsolationConfigBuilder::new()
                .timeout(self.timeout)
                .env_var("WINEDEBUG", "-all")
                .sanitize_env(self.sanitize_env)
                .build(),
        );

        debug!("Extracting NPELO features from {}", file);
        let result = isolation
            .execute_isolated(&self.shim, self.build_args(path, &output))
            .await
            .map_err(|e| e.with_context(context()))?;
        let stdout = result
            .into_stdout(&self.shim, self.timeout)
            .map_err(|e| e.with_context(context()))?;

        let frames = parse_decoded_frames(&String::from_utf8_lossy(&stdout)).map_err(|e| e.with_context(context()))?;
        if frames == 0 {
            return Err(StegError::data_format("extractor decoded zero frames").with_context(context()));
        }
        let expected = expected_frame_groups(frames, self.frame_step);
        debug!("{}: {} frames decoded, expecting {} feature rows", file, frames, expected);

        if !output.exists() {
            return Err(StegError::data_format("extractor produced no feature file").with_context(context()));
        }
        let groups = read_frame_groups(&output, &file, expected).map_err(|e| e.with_context(context()))?;

        Ok(groups)
    }
}
