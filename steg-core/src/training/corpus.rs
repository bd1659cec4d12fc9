//! Training corpus: labelled feature tables built from a directory tree
//!
//! Expected layout under the root:
//!
//! ```text
//! images/stego  images/clean
//! videos/stego  videos/clean
//! ```

use crate::analysis::feature_sources::FeatureSources;
use crate::analysis::file_sniffer::FileSniffer;
use crate::core::config::PipelineConfig;
use crate::core::error_handler::ErrorHandler;
use crate::core::errors::StegError;
use crate::core::models::{
    Label, MediaKind, ProgressCallback, ProgressEvent, SampleFailure, SampleFeatures,
};
use crate::core::step_logger::{StepLogger, StepLoggerConfig};
use crate::table::feature_table::FeatureTable;
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const PARTITIONS: [Label; 2] = [Label::Stego, Label::Clean];

/// Directory name holding samples of `media` under the corpus root
pub fn media_dir_name(media: MediaKind) -> &'static str {
    match media {
        MediaKind::Video => "videos",
        _ => "images",
    }
}

/// Directory name of a label partition
pub fn label_dir_name(label: Label) -> &'static str {
    match label {
        Label::Stego => "stego",
        Label::Clean => "clean",
    }
}

/// Per (media, label) file counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionCounts {
    pub listed: usize,
    pub extracted: usize,
    /// Rows contributed to the table (frame groups for videos)
    pub rows: usize,
}

#[derive(Debug)]
pub struct MediaCorpus {
    pub media: MediaKind,
    pub table: FeatureTable,
    pub csv_path: PathBuf,
    pub stego: PartitionCounts,
    pub clean: PartitionCounts,
}

#[derive(Debug)]
pub struct TrainingCorpus {
    pub images: MediaCorpus,
    pub videos: MediaCorpus,
    pub failures: Vec<SampleFailure>,
}

impl TrainingCorpus {
    pub fn for_media(&self, media: MediaKind) -> &MediaCorpus {
        match media {
            MediaKind::Video => &self.videos,
            _ => &self.images,
        }
    }
}

pub struct CorpusBuilder {
    config: PipelineConfig,
    sniffer: FileSniffer,
    sources: FeatureSources,
    steps: StepLogger,
    progress: Option<ProgressCallback>,
}

impl CorpusBuilder {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_sources(config, FeatureSources::from_config(config))
    }

    pub fn with_sources(config: &PipelineConfig, sources: FeatureSources) -> Self {
        Self {
            config: config.clone(),
            sniffer: FileSniffer::new(config),
            sources,
            steps: StepLogger::new(StepLoggerConfig::default()),
            progress: None,
        }
    }

    pub fn with_step_logger(mut self, config: StepLoggerConfig) -> Self {
        self.steps = StepLogger::new(config);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn step_logger(&self) -> &StepLogger {
        &self.steps
    }

    /// Extract features for every labelled sample under `root` and write
    /// the image and video feature CSVs.
    pub async fn build(&mut self, root: &Path) -> Result<TrainingCorpus> {
        if !root.is_dir() {
            return Err(StegError::InvalidInput(format!(
                "training directory {} does not exist",
                root.display()
            )));
        }

        let mut errors = ErrorHandler::default();
        let images = self.build_media(root, MediaKind::Image, &mut errors).await?;
        let videos = self.build_media(root, MediaKind::Video, &mut errors).await?;

        Ok(TrainingCorpus {
            images,
            videos,
            failures: errors.into_failures(),
        })
    }

    async fn build_media(&mut self, root: &Path, media: MediaKind, errors: &mut ErrorHandler) -> Result<MediaCorpus> {
        self.steps
            .start_step(format!("{}_corpus", media.short_name()), format!("Build {} feature table", media));

        let mut table = FeatureTable::new();
        let mut counts = Vec::with_capacity(PARTITIONS.len());
        for label in PARTITIONS {
            let dir = root.join(media_dir_name(media)).join(label_dir_name(label));
            let paths = Self::collect_samples(&dir)?;
            info!("[*] {} {} {} files found in {}", paths.len(), label, media, dir.display());
            let partition = self.extract_partition(media, label, &paths, &mut table, errors).await;
            counts.push(partition);
        }

        let csv_path = self.config.features_csv(media).to_path_buf();
        self.steps.add_diagnostic("rows", table.len().to_string());
        self.steps.add_diagnostic("columns", table.columns().len().to_string());
        if let Err(e) = table.write_csv(&csv_path) {
            self.steps.complete_step(false, Some(e.to_string()));
            return Err(e);
        }
        info!("[*] Wrote {} rows to {}", table.len(), csv_path.display());
        self.steps.complete_step(true, None);

        let clean = counts.pop().unwrap_or_default();
        let stego = counts.pop().unwrap_or_default();
        Ok(MediaCorpus {
            media,
            table,
            csv_path,
            stego,
            clean,
        })
    }

    /// Regular files directly inside `dir`, sorted by name; a missing directory yields none
    pub fn collect_samples(dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            warn!("{} does not exist, no samples taken from it", dir.display());
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Sniff and extract each path, appending rows labelled `label` to `table`.
    /// Sample-level failures are recorded in `errors` and skipped.
    pub async fn extract_partition(
        &self,
        media: MediaKind,
        label: Label,
        paths: &[PathBuf],
        table: &mut FeatureTable,
        errors: &mut ErrorHandler,
    ) -> PartitionCounts {
        let mut counts = PartitionCounts {
            listed: paths.len(),
            ..Default::default()
        };

        for (i, path) in paths.iter().enumerate() {
            let mut sample = match self.sniffer.sample_for(path).await {
                Ok(sample) => sample,
                Err(e) => {
                    errors.record_sample_failure(path, "sniffing", &e);
                    continue;
                }
            };

            if sample.kind != media {
                warn!("Skipping {}: {} found among {} samples", path.display(), sample.kind, media);
                errors.record_rejection(path, "sniffing", format!("{} file in {} directory", sample.kind, media));
                continue;
            }

            if let Some(progress) = &self.progress {
                progress(&ProgressEvent {
                    index: i + 1,
                    total: paths.len(),
                    file_name: sample.file_name(),
                    kind: sample.kind,
                });
            }

            if let Err(e) = self.sources.extract(&mut sample).await {
                errors.record_sample_failure(path, "feature_extraction", &e);
                continue;
            }

            counts.extracted += 1;
            match &sample.features {
                SampleFeatures::Image(features) => {
                    table.push_row(sample.file_name(), features, label);
                    counts.rows += 1;
                }
                SampleFeatures::Video(groups) => {
                    for group in groups {
                        table.push_row(group.row_id.clone(), &group.features, label);
                    }
                    counts.rows += groups.len();
                }
                SampleFeatures::Pending => {}
            }
        }

        counts
    }
}
