//! Per-file classification with the loaded classifier set

use crate::analysis::feature_sources::FeatureSources;
use crate::analysis::file_sniffer::FileSniffer;
use crate::core::config::PipelineConfig;
use crate::core::error_handler::ErrorHandler;
use crate::core::errors::StegError;
use crate::core::models::{
    ClassificationRow, ClassifierKind, FeatureMap, Label, ProgressCallback, ProgressEvent, Sample,
    SampleFailure, SampleFeatures,
};
use crate::core::step_logger::{StepLogger, StepLoggerConfig};
use crate::inference::report::ClassificationTable;
use crate::model::artifact::ModelArtifact;
use crate::model::classifier_set::ClassifierSet;
use crate::Result;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug)]
pub struct InferenceReport {
    pub input_count: usize,
    /// Inputs that exist and sniffed as image or video
    pub valid_count: usize,
    pub table: ClassificationTable,
    pub failures: Vec<SampleFailure>,
}

pub struct InferenceRunner<'a> {
    classifiers: &'a ClassifierSet,
    sniffer: FileSniffer,
    sources: FeatureSources,
    steps: StepLogger,
    progress: Option<ProgressCallback>,
}

impl<'a> InferenceRunner<'a> {
    pub fn new(config: &PipelineConfig, classifiers: &'a ClassifierSet) -> Self {
        Self::with_sources(config, classifiers, FeatureSources::from_config(config))
    }

    pub fn with_sources(config: &PipelineConfig, classifiers: &'a ClassifierSet, sources: FeatureSources) -> Self {
        Self {
            classifiers,
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

    /// Sniff, extract and classify `paths` in order. Files that fail are
    /// reported in `failures` and left out of the table.
    pub async fn run(&mut self, paths: &[PathBuf]) -> Result<InferenceReport> {
        let mut errors = ErrorHandler::default();

        self.steps.start_step("discover", "Sniff input files");
        let samples = self.discover(paths, &mut errors).await;
        self.steps.add_diagnostic("input_files", paths.len().to_string());
        self.steps.add_diagnostic("valid_files", samples.len().to_string());
        self.steps.complete_step(true, None);
        info!("[*] {} input files", paths.len());
        info!("[*] {} valid images/videos in input files", samples.len());

        self.steps.start_step("classify", "Extract features and classify");
        let valid_count = samples.len();
        let mut rows = Vec::with_capacity(valid_count);
        for (i, mut sample) in samples.into_iter().enumerate() {
            if let Some(progress) = &self.progress {
                progress(&ProgressEvent {
                    index: i + 1,
                    total: valid_count,
                    file_name: sample.file_name(),
                    kind: sample.kind,
                });
            }

            match self.classify_sample(&mut sample).await {
                Ok(row) => rows.push(row),
                Err(e) if e.is_sample_level() => {
                    errors.record_sample_failure(&sample.path, "classification", &e);
                }
                Err(e) => {
                    self.steps.complete_step(false, Some(e.to_string()));
                    return Err(e);
                }
            }
        }
        self.steps.add_diagnostic("classified", rows.len().to_string());
        self.steps.complete_step(true, None);

        Ok(InferenceReport {
            input_count: paths.len(),
            valid_count,
            table: ClassificationTable::from_rows(rows),
            failures: errors.into_failures(),
        })
    }

    /// Keep the paths that exist and are images or videos, in input order
    pub async fn discover(&self, paths: &[PathBuf], errors: &mut ErrorHandler) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(paths.len());
        for path in paths {
            match self.sniffer.sample_for(path).await {
                Ok(sample) if sample.kind.is_supported() => {
                    debug!("{}: {} ({}, {} bytes)", path.display(), sample.kind, sample.extension, sample.size);
                    samples.push(sample);
                }
                Ok(sample) => {
                    let err = StegError::UnsupportedType {
                        path: path.clone(),
                        extension: sample.extension,
                    };
                    errors.record_sample_failure(path, "sniffing", &err);
                }
                Err(e) => errors.record_sample_failure(path, "sniffing", &e),
            }
        }
        samples
    }

    /// Extract features for one sample and predict with both classifiers of its media kind
    pub async fn classify_sample(&self, sample: &mut Sample) -> Result<ClassificationRow> {
        self.sources.extract(sample).await?;
        let models = self.classifiers.for_media(sample.kind)?;

        let rows: Vec<FeatureMap> = match &sample.features {
            SampleFeatures::Image(features) => vec![features.clone()],
            SampleFeatures::Video(groups) => groups.iter().map(|g| g.features.clone()).collect(),
            SampleFeatures::Pending => {
                return Err(StegError::data_format(format!("no features for {}", sample.file_name())))
            }
        };

        sample.set_classification(ClassifierKind::Svm, aggregate(models.svm, &rows)?);
        sample.set_classification(ClassifierKind::LogisticRegression, aggregate(models.lr, &rows)?);

        let row = ClassificationRow::from_sample(sample)
            .ok_or_else(|| StegError::data_format(format!("{} was not labelled", sample.file_name())))?;
        debug!("{}: SVM {} / LR {}", row.file_name, row.svm, row.lr);
        Ok(row)
    }
}

/// One label per file: stego if any row is predicted stego
fn aggregate(model: &ModelArtifact, rows: &[FeatureMap]) -> Result<Label> {
    let labels = model.predict_rows(rows)?;
    if labels.is_empty() {
        return Err(StegError::data_format("nothing to classify"));
    }
    Ok(Label::from_prediction(labels.iter().any(Label::is_stego)))
}
