//! Pipeline configuration

use crate::core::errors::StegError;
use crate::core::models::{ClassifierKind, MediaKind};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Helper shipped with this crate under `scripts/`
const DEFAULT_IMAGE_HELPER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/scripts/p2-img-feature-extraction.py");

/// Settings shared by the training and inference pipelines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Interpreter that runs the image feature helper
    pub image_helper_interpreter: String,
    /// Helper script emitting per-channel features as JSON arrays
    pub image_helper_script: PathBuf,
    /// Feature group argument passed to the helper
    pub image_feature_group: String,
    /// Bytes of stdout to discard before the JSON arrays
    pub image_helper_preamble_bytes: usize,
    /// Compatibility shim used to launch the video extractor
    pub video_shim: String,
    pub video_extractor: PathBuf,
    /// Directory receiving the per-invocation scratch directories of the video extractor
    pub scratch_dir: PathBuf,
    /// Frames aggregated into one feature row
    pub frame_step: u32,
    /// Content-type heuristic tool used when signature sniffing fails
    pub content_type_tool: String,
    pub sniff_header_bytes: usize,
    #[serde(with = "duration_secs")]
    pub image_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub video_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub content_type_timeout: Duration,
    /// Run the external tools with a stripped environment and a fixed PATH
    pub sanitize_tool_env: bool,
    pub model_dir: PathBuf,
    pub image_features_csv: PathBuf,
    pub video_features_csv: PathBuf,
    pub results_csv: PathBuf,
    pub test_ratio: f64,
    /// Fixed seed for the train/test split; `None` draws from entropy
    pub split_seed: Option<u64>,
    pub lr_max_iterations: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_helper_interpreter: "python2.7".to_string(),
            image_helper_script: PathBuf::from(DEFAULT_IMAGE_HELPER),
            image_feature_group: "farid".to_string(),
            image_helper_preamble_bytes: 254,
            video_shim: "wine".to_string(),
            video_extractor: PathBuf::from("NPELO_extractor/extractor.exe"),
            scratch_dir: PathBuf::from("."),
            frame_step: 12,
            content_type_tool: "file".to_string(),
            sniff_header_bytes: 128,
            image_timeout: Duration::from_secs(120),
            video_timeout: Duration::from_secs(600),
            content_type_timeout: Duration::from_secs(10),
            sanitize_tool_env: false,
            model_dir: PathBuf::from("."),
            image_features_csv: PathBuf::from("img-features.csv"),
            video_features_csv: PathBuf::from("vid-features.csv"),
            results_csv: PathBuf::from("classifications.csv"),
            test_ratio: 0.2,
            split_seed: None,
            lr_max_iterations: 100,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON configuration file; absent keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StegError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&raw).map_err(|e| {
            StegError::ConfigError(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_step == 0 {
            return Err(StegError::ConfigError("frame_step must be at least 1".to_string()));
        }
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(StegError::ConfigError(format!(
                "test_ratio must be between 0 and 1, got {}",
                self.test_ratio
            )));
        }
        if self.sniff_header_bytes == 0 {
            return Err(StegError::ConfigError("sniff_header_bytes must be positive".to_string()));
        }
        Ok(())
    }

    /// File name of the artifact for a (media, classifier) pair, e.g. `img-svm.json`
    pub fn artifact_name(media: MediaKind, classifier: ClassifierKind) -> String {
        format!("{}-{}.json", media.short_name(), classifier.short_name())
    }

    pub fn artifact_path(&self, media: MediaKind, classifier: ClassifierKind) -> PathBuf {
        self.model_dir.join(Self::artifact_name(media, classifier))
    }

    pub fn features_csv(&self, media: MediaKind) -> &Path {
        match media {
            MediaKind::Video => &self.video_features_csv,
            _ => &self.image_features_csv,
        }
    }
}

/// Builder for `PipelineConfig`
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    pub fn from_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = dir.into();
        self
    }

    pub fn results_csv<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.results_csv = path.into();
        self
    }

    pub fn features_csvs<P: Into<PathBuf>, Q: Into<PathBuf>>(mut self, image: P, video: Q) -> Self {
        self.config.image_features_csv = image.into();
        self.config.video_features_csv = video.into();
        self
    }

    pub fn split_seed(mut self, seed: Option<u64>) -> Self {
        self.config.split_seed = seed;
        self
    }

    pub fn test_ratio(mut self, ratio: f64) -> Self {
        self.config.test_ratio = ratio;
        self
    }

    pub fn image_helper<S: Into<String>, P: Into<PathBuf>>(mut self, interpreter: S, script: P) -> Self {
        self.config.image_helper_interpreter = interpreter.into();
        self.config.image_helper_script = script.into();
        self
    }

    pub fn image_helper_preamble_bytes(mut self, bytes: usize) -> Self {
        self.config.image_helper_preamble_bytes = bytes;
        self
    }

    pub fn video_extractor<S: Into<String>, P: Into<PathBuf>>(mut self, shim: S, extractor: P) -> Self {
        self.config.video_shim = shim.into();
        self.config.video_extractor = extractor.into();
        self
    }

    pub fn scratch_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn content_type_tool<S: Into<String>>(mut self, tool: S) -> Self {
        self.config.content_type_tool = tool.into();
        self
    }

    pub fn sanitize_tool_env(mut self, sanitize: bool) -> Self {
        self.config.sanitize_tool_env = sanitize;
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_artifact_names() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.artifact_path(MediaKind::Image, ClassifierKind::Svm),
            PathBuf::from("./img-svm.json")
        );
        assert_eq!(
            PipelineConfig::artifact_name(MediaKind::Video, ClassifierKind::LogisticRegression),
            "vid-lr.json"
        );
    }

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steg.json");
        std::fs::write(&path, r#"{ "frame_step": 6, "video_timeout": 30, "split_seed": 7 }"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.frame_step, 6);
        assert_eq!(config.video_timeout, Duration::from_secs(30));
        assert_eq!(config.split_seed, Some(7));
        assert_eq!(config.video_shim, "wine");
    }

    #[test]
    fn test_default_image_helper_is_shipped() {
        let config = PipelineConfig::default();
        assert!(config.image_helper_script.is_file());
        assert!(!config.sanitize_tool_env);
    }

    #[test]
    fn test_builder_rejects_bad_ratio() {
        assert!(PipelineConfigBuilder::new().test_ratio(1.5).build().is_err());
        assert!(PipelineConfigBuilder::new().test_ratio(0.25).build().is_ok());
    }
}
