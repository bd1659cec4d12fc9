//! File type sniffing: image, video or unsupported

use crate::analysis::process_isolation::{IsolationConfigBuilder, ProcessIsolation};
use crate::core::config::PipelineConfig;
use crate::core::errors::StegError;
use crate::core::models::{MediaKind, Sample};
use crate::Result;
use infer::MatcherType;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Marker the content-type tool prints for raw H.264 elementary streams
const H264_MARKER: &str = "H.264";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffResult {
    pub kind: MediaKind,
    /// Best-guess extension without the leading dot
    pub extension: String,
}

impl SniffResult {
    fn new(kind: MediaKind, extension: impl Into<String>) -> Self {
        Self {
            kind,
            extension: extension.into(),
        }
    }
}

pub struct FileSniffer {
    header_bytes: usize,
    content_type_tool: String,
    tool_timeout: Duration,
    sanitize_env: bool,
}

impl FileSniffer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            header_bytes: config.sniff_header_bytes,
            content_type_tool: config.content_type_tool.clone(),
            tool_timeout: config.content_type_timeout,
            sanitize_env: config.sanitize_tool_env,
        }
    }

    /// Classify a file. Fails only when the file cannot be opened or read.
    pub async fn sniff(&self, path: &Path) -> Result<SniffResult> {
        let header = self.read_header(path)?;

        if let Some(result) = Self::sniff_header(&header) {
            debug!("{}: signature match {:?} ({})", path.display(), result.kind, result.extension);
            return Ok(result);
        }

        match self.describe_content(path).await {
            Some(description) if description.contains(H264_MARKER) => {
                debug!("{}: content type reports H.264 stream", path.display());
                Ok(SniffResult::new(MediaKind::Video, "h264"))
            }
            description => {
                debug!("{}: unsupported ({:?})", path.display(), description);
                Ok(SniffResult::new(MediaKind::Unsupported, path_extension(path)))
            }
        }
    }

    /// Sniff `path` and wrap the result in a fresh `Sample`
    pub async fn sample_for(&self, path: &Path) -> Result<Sample> {
        let result = self.sniff(path).await?;
        let size = std::fs::metadata(path)?.len();
        Ok(Sample::new(path, result.kind, result.extension, size))
    }

    /// Signature-based classification of a file header
    pub fn sniff_header(header: &[u8]) -> Option<SniffResult> {
        let detected = infer::get(header)?;
        let kind = match detected.matcher_type() {
            MatcherType::Image => MediaKind::Image,
            MatcherType::Video => MediaKind::Video,
            _ => return None,
        };
        Some(SniffResult::new(kind, detected.extension()))
    }

    fn read_header(&self, path: &Path) -> Result<Vec<u8>> {
        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StegError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => StegError::FileError(e),
        })?;

        let mut header = Vec::with_capacity(self.header_bytes);
        file.take(self.header_bytes as u64).read_to_end(&mut header)?;
        Ok(header)
    }

    /// Ask the content-type tool for a description; any failure counts as "no description"
    async fn describe_content(&self, path: &Path) -> Option<String> {
        let isolation = ProcessIsolation::with_config(
            IsolationConfigBuilder::new()
                .timeout(self.tool_timeout)
                .max_output_size(64 * 1024)
                .sanitize_env(self.sanitize_env)
                .build(),
        );
        let arg = path.as_os_str().to_os_string();

        match isolation.execute_isolated(&self.content_type_tool, [std::ffi::OsString::from("-b"), arg]).await {
            Ok(result) if result.succeeded() => Some(result.stdout_text().trim().to_string()),
            Ok(result) => {
                warn!(
                    "{} could not describe {} (exit {:?}, timed out: {})",
                    self.content_type_tool,
                    path.display(),
                    result.exit_code,
                    result.timed_out
                );
                None
            }
            Err(e) => {
                warn!("{} unavailable: {}", self.content_type_tool, e);
                None
            }
        }
    }
}

fn path_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_string()
}
