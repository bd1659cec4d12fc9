//! Farid wavelet features for images, computed by an external helper

use crate::analysis::process_isolation::{IsolationConfigBuilder, ProcessIsolation};
use crate::core::config::PipelineConfig;
use crate::core::errors::{ErrorContext, StegError};
use crate::core::models::FeatureMap;
use crate::Result;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Features computed per colour channel
pub const FARID_FEATURES_PER_CHANNEL: usize = 36;

/// Channel order used by the helper and in feature names
pub const CHANNELS: [char; 3] = ['r', 'g', 'b'];

/// Source of the 108 per-channel image features
#[async_trait]
pub trait ImageFeatureSource: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<FeatureMap>;
}

/// Feature names in output order: `farid_r_1..36`, `farid_g_1..36`, `farid_b_1..36`
pub fn farid_feature_names() -> Vec<String> {
    CHANNELS
        .iter()
        .flat_map(|channel| (1..=FARID_FEATURES_PER_CHANNEL).map(move |i| format!("farid_{}_{}", channel, i)))
        .collect()
}

/// Parse the helper's stdout: a fixed-length preamble followed by three
/// newline-delimited JSON arrays (red, green, blue).
pub fn parse_farid_output(stdout: &[u8], preamble_bytes: usize) -> Result<FeatureMap> {
    if stdout.len() < preamble_bytes {
        return Err(StegError::data_format(format!(
            "helper output is {} bytes, shorter than the {} byte preamble",
            stdout.len(),
            preamble_bytes
        )));
    }

    let body = std::str::from_utf8(&stdout[preamble_bytes..])
        .map_err(|e| StegError::data_format(format!("helper output is not UTF-8: {}", e)))?;
    let lines: Vec<&str> = body.split('\n').collect();
    if lines.len() < CHANNELS.len() {
        return Err(StegError::data_format(format!(
            "expected {} feature lines, found {}",
            CHANNELS.len(),
            lines.len()
        )));
    }

    let mut features = FeatureMap::with_capacity(CHANNELS.len() * FARID_FEATURES_PER_CHANNEL);
    for (channel, line) in CHANNELS.iter().zip(lines.iter()) {
        let values: Vec<f64> = serde_json::from_str(line.trim()).map_err(|e| {
            StegError::data_format(format!("channel '{}' is not a JSON number array: {}", channel, e))
        })?;

        if values.len() != FARID_FEATURES_PER_CHANNEL {
            return Err(StegError::data_format(format!(
                "channel '{}' has {} features, expected {}",
                channel,
                values.len(),
                FARID_FEATURES_PER_CHANNEL
            )));
        }

        for (i, value) in values.into_iter().enumerate() {
            if !value.is_finite() {
                return Err(StegError::data_format(format!(
                    "channel '{}' feature {} is not finite",
                    channel,
                    i + 1
                )));
            }
            features.insert(format!("farid_{}_{}", channel, i + 1), value);
        }
    }

    Ok(features)
}

/// Runs the legacy helper script (`<interpreter> <script> <group> <path>`)
pub struct FaridExtractor {
    interpreter: String,
    script: PathBuf,
    feature_group: String,
    preamble_bytes: usize,
    timeout: Duration,
    sanitize_env: bool,
}

impl FaridExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            interpreter: config.image_helper_interpreter.clone(),
            script: config.image_helper_script.clone(),
            feature_group: config.image_feature_group.clone(),
            preamble_bytes: config.image_helper_preamble_bytes,
            timeout: config.image_timeout,
            sanitize_env: config.sanitize_tool_env,
        }
    }
}

#[async_trait]
impl ImageFeatureSource for FaridExtractor {
    async fn extract(&self, path: &Path) -> Result<FeatureMap> {
        let context = || {
            ErrorContext::new("farid_extraction")
                .with_file_path(path)
                .with_media_kind("image")
                .with_diagnostic("helper", self.script.display().to_string())
        };

        let isolation = ProcessIsolation::with_config(
            IsolationConfigBuilder::new()
                .timeout(self.timeout)
                .env_var("PYTHONWARNINGS", "ignore")
                .sanitize_env(self.sanitize_env)
                .build(),
        );

        debug!("Extracting Farid features from {}", path.display());
        let result = isolation
            .execute_isolated(
                &self.interpreter,
                [
                    self.script.as_os_str(),
                    OsStr::new(&self.feature_group),
                    path.as_os_str(),
                ],
            )
            .await
            .map_err(|e| e.with_context(context()))?;

        let stdout = result
            .into_stdout(&self.interpreter, self.timeout)
            .map_err(|e| e.with_context(context()))?;

        let features = parse_farid_output(&stdout, self.preamble_bytes).map_err(|e| e.with_context(context()))?;
        debug!("Extracted {} Farid features from {}", features.len(), path.display());
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_line(base: f64) -> String {
        let values: Vec<String> = (0..FARID_FEATURES_PER_CHANNEL)
            .map(|i| format!("{}", base + i as f64 * 0.01))
            .collect();
        format!("[{}]", values.join(", "))
    }

    fn helper_output(preamble: usize) -> Vec<u8> {
        let mut out = vec![b'#'; preamble];
        out.extend_from_slice(
            format!("{}\n{}\n{}\n", channel_line(0.1), channel_line(0.2), channel_line(0.3)).as_bytes(),
        );
        out
    }

    #[test]
    fn test_feature_names_order() {
        let names = farid_feature_names();
        assert_eq!(names.len(), 108);
        assert_eq!(names[0], "farid_r_1");
        assert_eq!(names[35], "farid_r_36");
        assert_eq!(names[36], "farid_g_1");
        assert_eq!(names[107], "farid_b_36");
    }

    #[test]
    fn test_parse_farid_output() {
        let features = parse_farid_output(&helper_output(254), 254).unwrap();
        assert_eq!(features.len(), 108);
        assert!(features.all_finite());
        assert_eq!(features.get("farid_r_1"), Some(0.1));
        assert_eq!(features.get("farid_b_1"), Some(0.3));

        let names: Vec<&str> = features.names().collect();
        let expected = farid_feature_names();
        assert_eq!(names, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_parse_rejects_short_channel() {
        let mut out = vec![b'#'; 4];
        out.extend_from_slice(format!("[1.0, 2.0]\n{}\n{}\n", channel_line(0.2), channel_line(0.3)).as_bytes());
        assert!(matches!(parse_farid_output(&out, 4), Err(StegError::DataFormatError { .. })));
    }

    #[test]
    fn test_parse_rejects_missing_channel_and_garbage() {
        let mut out = vec![b'#'; 4];
        out.extend_from_slice(channel_line(0.1).as_bytes());
        assert!(parse_farid_output(&out, 4).is_err());

        let garbage = b"Traceback (most recent call last):".to_vec();
        assert!(parse_farid_output(&garbage, 4).is_err());
        assert!(parse_farid_output(b"ab", 254).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extractor_runs_helper() {
        use crate::core::config::PipelineConfigBuilder;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("helper-output.txt");
        std::fs::write(&payload, helper_output(10)).unwrap();

        // Stands in for the interpreter: ignores the script and prints canned output.
        let interpreter = dir.path().join("fake-python");
        std::fs::write(
            &interpreter,
            format!("#!/bin/sh\n[ \"$2\" = farid ] || exit 3\ncat '{}'\n", payload.display()),
        )
        .unwrap();
        std::fs::set_permissions(&interpreter, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = PipelineConfigBuilder::new()
            .image_helper(interpreter.display().to_string(), "helper.py")
            .image_helper_preamble_bytes(10)
            .build()
            .unwrap();
        let features = FaridExtractor::new(&config).extract(Path::new("cat.png")).await.unwrap();
        assert_eq!(features.len(), 108);
    }

    const FAKE_CV2: &str = "\
import os

class Image(object):
    def __init__(self, channels):
        self.channels = list(channels)

    def copy(self):
        return Image(self.channels)

    def __setitem__(self, key, value):
        self.channels[key[2]] = value

def imread(path):
    return Image([1, 2, 3]) if os.path.exists(path) else None
";

    const FAKE_FARID: &str = "\
def farid36(img):
    c = img.channels
    return [c[0] * 100 + c[1] * 10 + c[2] + i * 0.001 for i in range(36)]
";

    /// Shipped helper copied next to stand-in `cv2` and `pysteg` modules
    fn helper_with_fake_modules(dir: &Path) -> PathBuf {
        let script = dir.join("p2-img-feature-extraction.py");
        std::fs::copy(PipelineConfig::default().image_helper_script, &script).unwrap();
        std::fs::write(dir.join("cv2.py"), FAKE_CV2).unwrap();
        std::fs::create_dir(dir.join("pysteg")).unwrap();
        std::fs::write(dir.join("pysteg/__init__.py"), "print('pysteg ok')\n").unwrap();
        std::fs::write(dir.join("pysteg/features.py"), FAKE_FARID).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shipped_helper_isolates_channels() {
        use crate::core::config::PipelineConfigBuilder;

        if std::process::Command::new("python3").arg("--version").output().is_err() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let script = helper_with_fake_modules(dir.path());
        let image = dir.path().join("cat.png");
        std::fs::write(&image, b"img").unwrap();

        let config = PipelineConfigBuilder::new()
            .image_helper("python3", &script)
            .image_helper_preamble_bytes("pysteg ok\n".len())
            .build()
            .unwrap();
        let extractor = FaridExtractor::new(&config);

        let features = extractor.extract(&image).await.unwrap();
        assert_eq!(features.len(), 108);
        // Each copy keeps one channel, indexed as the image array stores them
        assert_eq!(features.get("farid_r_1"), Some(100.0));
        assert_eq!(features.get("farid_g_1"), Some(20.0));
        assert_eq!(features.get("farid_b_1"), Some(3.0));
        assert!((features.get("farid_b_36").unwrap() - 3.035).abs() < 1e-9);

        let err = extractor.extract(&dir.path().join("missing.png")).await.unwrap_err();
        assert!(matches!(err, StegError::ExternalToolError { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extractor_surfaces_helper_failure() {
        use crate::core::config::PipelineConfigBuilder;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let interpreter = dir.path().join("failing-python");
        std::fs::write(&interpreter, "#!/bin/sh\necho 'IOError: no such image' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&interpreter, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = PipelineConfigBuilder::new()
            .image_helper(interpreter.display().to_string(), "helper.py")
            .build()
            .unwrap();
        let err = FaridExtractor::new(&config).extract(Path::new("cat.png")).await.unwrap_err();
        assert!(matches!(err, StegError::ExternalToolError { .. }));
        assert_eq!(err.context().map(|c| c.operation.as_str()), Some("farid_extraction"));
    }
}
