//! Persisted classifiers bound to an explicit feature schema

use crate::core::errors::StegError;
use crate::core::models::{ClassifierKind, FeatureMap, Label, MediaKind};
use crate::model::scaler::MinMaxScaler;
use crate::Result;
use chrono::{DateTime, Utc};
use linfa::traits::Predict;
use linfa_logistic::FittedLogisticRegression;
use linfa_svm::Svm;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Fitted estimator, predicting `true` for stego
#[derive(Serialize, Deserialize)]
pub enum Estimator {
    Svm(Svm<f64, bool>),
    LogisticRegression(FittedLogisticRegression<f64, bool>),
}

impl Estimator {
    pub fn kind(&self) -> ClassifierKind {
        match self {
            Estimator::Svm(_) => ClassifierKind::Svm,
            Estimator::LogisticRegression(_) => ClassifierKind::LogisticRegression,
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<bool> {
        match self {
            Estimator::Svm(model) => model.predict(x),
            Estimator::LogisticRegression(model) => model.predict(x),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ModelArtifact {
    pub media: MediaKind,
    pub classifier: ClassifierKind,
    /// Ordered feature names the estimator was trained on
    pub schema: Vec<String>,
    /// Scaling applied before prediction (logistic regression only)
    pub scaler: Option<MinMaxScaler>,
    pub holdout_accuracy: Option<f64>,
    pub trained_at: DateTime<Utc>,
    estimator: Estimator,
}

impl fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("media", &self.media)
            .field("classifier", &self.classifier)
            .field("features", &self.schema.len())
            .field("scaled", &self.scaler.is_some())
            .field("holdout_accuracy", &self.holdout_accuracy)
            .field("trained_at", &self.trained_at)
            .finish()
    }
}

impl ModelArtifact {
    pub fn new(media: MediaKind, schema: Vec<String>, scaler: Option<MinMaxScaler>, estimator: Estimator) -> Self {
        Self {
            media,
            classifier: estimator.kind(),
            schema,
            scaler,
            holdout_accuracy: None,
            trained_at: Utc::now(),
            estimator,
        }
    }

    pub fn with_holdout_accuracy(mut self, accuracy: f64) -> Self {
        self.holdout_accuracy = Some(accuracy);
        self
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        info!("Saved {} {} classifier to {}", self.media, self.classifier, path.display());
        Ok(())
    }

    /// Load and validate an artifact expected to hold `classifier` for `media`
    pub fn load(path: &Path, media: MediaKind, classifier: ClassifierKind) -> Result<Self> {
        let invalid = |message: String| StegError::InvalidArtifact {
            path: path.to_path_buf(),
            message,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StegError::MissingArtifacts {
                missing: vec![path.display().to_string()],
            },
            _ => StegError::FileError(e),
        })?;
        let artifact: ModelArtifact = serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;

        if artifact.media != media {
            return Err(invalid(format!("holds a {} model, expected {}", artifact.media, media)));
        }
        if artifact.classifier != classifier || artifact.estimator.kind() != classifier {
            return Err(invalid(format!(
                "holds a {} model, expected {}",
                artifact.estimator.kind(),
                classifier
            )));
        }
        if artifact.schema.is_empty() {
            return Err(invalid("empty feature schema".to_string()));
        }
        if let Some(scaler) = &artifact.scaler {
            if scaler.width() != artifact.schema.len() {
                return Err(invalid(format!(
                    "scaler covers {} features but the schema has {}",
                    scaler.width(),
                    artifact.schema.len()
                )));
            }
        }

        debug!("Loaded {:?} from {}", artifact, path.display());
        Ok(artifact)
    }

    /// Predict on a raw (unscaled) matrix whose columns follow `schema`
    pub fn predict_matrix(&self, x: &Array2<f64>) -> Result<Vec<Label>> {
        if x.ncols() != self.schema.len() {
            return Err(StegError::SchemaMismatch {
                message: format!("{} features given, model expects {}", x.ncols(), self.schema.len()),
            });
        }

        let predictions = match &self.scaler {
            Some(scaler) => self.estimator.predict(&scaler.transform(x)?),
            None => self.estimator.predict(x),
        };
        Ok(predictions.iter().map(|&stego| Label::from_prediction(stego)).collect())
    }

    /// Predict one label per feature map; every map must match the schema exactly
    pub fn predict_rows(&self, rows: &[FeatureMap]) -> Result<Vec<Label>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut data = Vec::with_capacity(rows.len() * self.schema.len());
        for features in rows {
            let row = features.to_row(&self.schema).map_err(|diff| StegError::SchemaMismatch {
                message: format!("{} {} model: {}", self.media, self.classifier, diff),
            })?;
            data.extend(row);
        }

        let x = Array2::from_shape_vec((rows.len(), self.schema.len()), data).map_err(|e| {
            StegError::SchemaMismatch {
                message: e.to_string(),
            }
        })?;
        self.predict_matrix(&x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linfa::traits::Fit;
    use linfa::Dataset;
    use ndarray::array;

    fn schema() -> Vec<String> {
        vec!["f1".to_string(), "f2".to_string()]
    }

    fn fitted_svm() -> Svm<f64, bool> {
        let x = array![[0.0, 0.1], [0.2, 0.0], [0.1, 0.3], [1.0, 0.9], [0.9, 1.1], [1.2, 1.0]];
        let y = array![false, false, false, true, true, true];
        Svm::<f64, bool>::params()
            .linear_kernel()
            .fit(&Dataset::new(x, y))
            .unwrap()
    }

    fn features(f1: f64, f2: f64) -> FeatureMap {
        vec![("f2".to_string(), f2), ("f1".to_string(), f1)].into_iter().collect()
    }

    #[test]
    fn test_predict_rows_uses_schema_order() {
        let artifact = ModelArtifact::new(MediaKind::Image, schema(), None, Estimator::Svm(fitted_svm()));
        let labels = artifact
            .predict_rows(&[features(0.05, 0.1), features(1.1, 1.0)])
            .unwrap();
        assert_eq!(labels, vec![Label::Clean, Label::Stego]);
    }

    #[test]
    fn test_predict_rows_rejects_schema_mismatch() {
        let artifact = ModelArtifact::new(MediaKind::Image, schema(), None, Estimator::Svm(fitted_svm()));
        let wrong: FeatureMap = vec![("f1".to_string(), 1.0), ("f3".to_string(), 1.0)].into_iter().collect();

        let err = artifact.predict_rows(&[wrong]).unwrap_err();
        assert!(matches!(err, StegError::SchemaMismatch { .. }));
        assert!(err.is_sample_level());
    }

    #[test]
    fn test_save_load_round_trip_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img-svm.json");
        ModelArtifact::new(MediaKind::Image, schema(), None, Estimator::Svm(fitted_svm()))
            .with_holdout_accuracy(1.0)
            .save(&path)
            .unwrap();

        let loaded = ModelArtifact::load(&path, MediaKind::Image, ClassifierKind::Svm).unwrap();
        assert_eq!(loaded.schema, schema());
        assert_eq!(loaded.holdout_accuracy, Some(1.0));
        assert_eq!(loaded.predict_rows(&[features(1.0, 1.0)]).unwrap(), vec![Label::Stego]);

        assert!(matches!(
            ModelArtifact::load(&path, MediaKind::Video, ClassifierKind::Svm),
            Err(StegError::InvalidArtifact { .. })
        ));
        assert!(matches!(
            ModelArtifact::load(&path, MediaKind::Image, ClassifierKind::LogisticRegression),
            Err(StegError::InvalidArtifact { .. })
        ));
    }

    #[test]
    fn test_load_garbage_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vid-lr.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            ModelArtifact::load(&path, MediaKind::Video, ClassifierKind::LogisticRegression),
            Err(StegError::InvalidArtifact { .. })
        ));
        assert!(matches!(
            ModelArtifact::load(&dir.path().join("absent.json"), MediaKind::Video, ClassifierKind::Svm),
            Err(StegError::MissingArtifacts { .. })
        ));
    }
}
