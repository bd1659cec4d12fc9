//! Steganalysis core library
//!
//! Sniffs images and videos, extracts steganalysis features through the
//! external Farid and NPELO extractors, builds labelled training tables,
//! fits SVM and logistic-regression classifiers and classifies new files.

pub mod analysis;
pub mod core;
pub mod inference;
pub mod model;
pub mod table;
pub mod training;

// Re-export commonly used types
pub use crate::core::{
    config::{PipelineConfig, PipelineConfigBuilder},
    error_handler::{ErrorHandler, ErrorHandlerConfig},
    errors::{ErrorCategory, ErrorContext, StegError, UserFriendlyError},
    models::{ClassificationRow, ClassifierKind, FeatureMap, FrameGroup, Label, MediaKind, ProgressEvent, Sample},
    step_logger::{ProcessingSummary, StepLogger, StepLoggerConfig},
};

pub use crate::analysis::{
    feature_sources::FeatureSources,
    file_sniffer::{FileSniffer, SniffResult},
    image_features::{FaridExtractor, ImageFeatureSource},
    process_isolation::{IsolationConfig, IsolationConfigBuilder, IsolationResult, ProcessIsolation},
    video_features::{NpeloExtractor, VideoFeatureSource},
};

pub use crate::inference::{
    report::ClassificationTable,
    runner::{InferenceReport, InferenceRunner},
};
pub use crate::model::{artifact::ModelArtifact, classifier_set::ClassifierSet};
pub use crate::table::feature_table::FeatureTable;
pub use crate::training::{
    corpus::{CorpusBuilder, TrainingCorpus},
    trainer::{ClassifierTrainer, TrainingOutcome},
};

/// Result type used throughout the steganalysis pipeline
pub type Result<T> = std::result::Result<T, StegError>;
