//! Core data models for the steganalysis pipeline

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Media family a sample belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Unsupported,
}

impl MediaKind {
    pub fn is_supported(&self) -> bool {
        !matches!(self, MediaKind::Unsupported)
    }

    /// Prefix used in artifact file names
    pub fn short_name(&self) -> &'static str {
        match self {
            MediaKind::Image => "img",
            MediaKind::Video => "vid",
            MediaKind::Unsupported => "other",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Unsupported => write!(f, "other"),
        }
    }
}

/// Binary classification outcome
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Label {
    Clean,
    Stego,
}

impl Label {
    /// Class value as stored in the feature CSVs (1 = stego, 0 = clean)
    pub fn class_value(&self) -> u8 {
        match self {
            Label::Clean => 0,
            Label::Stego => 1,
        }
    }

    pub fn from_class_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Label::Clean),
            1 => Some(Label::Stego),
            _ => None,
        }
    }

    pub fn from_prediction(stego: bool) -> Self {
        if stego {
            Label::Stego
        } else {
            Label::Clean
        }
    }

    pub fn is_stego(&self) -> bool {
        matches!(self, Label::Stego)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Clean => write!(f, "clean"),
            Label::Stego => write!(f, "stego"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ClassifierKind {
    Svm,
    LogisticRegression,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 2] = [ClassifierKind::Svm, ClassifierKind::LogisticRegression];

    pub fn short_name(&self) -> &'static str {
        match self {
            ClassifierKind::Svm => "svm",
            ClassifierKind::LogisticRegression => "lr",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierKind::Svm => write!(f, "SVM"),
            ClassifierKind::LogisticRegression => write!(f, "Logistic Regression"),
        }
    }
}

/// Ordered feature name -> value mapping
///
/// Insertion order is kept because the first-seen order of feature names
/// becomes the column order of the training CSVs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMap {
    entries: Vec<(String, f64)>,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert or overwrite a feature value
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn all_finite(&self) -> bool {
        self.entries.iter().all(|(_, v)| v.is_finite())
    }

    /// Values laid out in `schema` order. Fails with the offending names when
    /// the feature name set differs from the schema in either direction.
    pub fn to_row(&self, schema: &[String]) -> std::result::Result<Vec<f64>, SchemaDiff> {
        let lookup: HashMap<&str, f64> = self.iter().collect();
        let schema_set: HashSet<&str> = schema.iter().map(String::as_str).collect();

        let missing: Vec<String> = schema
            .iter()
            .filter(|name| !lookup.contains_key(name.as_str()))
            .cloned()
            .collect();
        let unexpected: Vec<String> = self
            .names()
            .filter(|name| !schema_set.contains(name))
            .map(str::to_string)
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(SchemaDiff { missing, unexpected });
        }

        Ok(schema.iter().map(|name| lookup[name.as_str()]).collect())
    }
}

impl FromIterator<(String, f64)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut map = FeatureMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// Difference between a feature map and an expected schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDiff {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview = |names: &[String]| {
            let shown: Vec<&str> = names.iter().take(5).map(String::as_str).collect();
            if names.len() > 5 {
                format!("{} (+{} more)", shown.join(", "), names.len() - 5)
            } else {
                shown.join(", ")
            }
        };
        write!(
            f,
            "{} missing feature(s) [{}], {} unexpected feature(s) [{}]",
            self.missing.len(),
            preview(&self.missing),
            self.unexpected.len(),
            preview(&self.unexpected)
        )
    }
}

/// One feature row produced for a group of video frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameGroup {
    /// Synthetic `{file}_f{n}` identifier, 1-based
    pub row_id: String,
    pub features: FeatureMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum SampleFeatures {
    #[default]
    Pending,
    Image(FeatureMap),
    Video(Vec<FrameGroup>),
}

/// One file under analysis or training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub extension: String,
    pub size: u64,
    pub features: SampleFeatures,
    pub classification: HashMap<ClassifierKind, Label>,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind, extension: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            kind,
            extension: extension.into(),
            size,
            features: SampleFeatures::Pending,
            classification: HashMap::new(),
        }
    }

    /// Name used as the row identifier in tables
    pub fn file_name(&self) -> String {
        self.path.display().to_string()
    }

    pub fn set_classification(&mut self, classifier: ClassifierKind, label: Label) {
        self.classification.insert(classifier, label);
    }

    pub fn label_for(&self, classifier: ClassifierKind) -> Option<Label> {
        self.classification.get(&classifier).copied()
    }
}

/// Per-file diagnostic for a sample that was skipped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleFailure {
    pub path: PathBuf,
    pub stage: String,
    pub reason: String,
}

impl SampleFailure {
    pub fn new(path: &Path, stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// Emitted before each accepted sample is processed
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// 1-based position within the batch
    pub index: usize,
    pub total: usize,
    pub file_name: String,
    pub kind: MediaKind,
}

pub type ProgressCallback = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

/// One line of the results table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRow {
    pub file_name: String,
    pub svm: Label,
    pub lr: Label,
}

impl ClassificationRow {
    /// Row for a sample both classifiers have labelled
    pub fn from_sample(sample: &Sample) -> Option<Self> {
        Some(Self {
            file_name: sample.file_name(),
            svm: sample.label_for(ClassifierKind::Svm)?,
            lr: sample.label_for(ClassifierKind::LogisticRegression)?,
        })
    }
}
