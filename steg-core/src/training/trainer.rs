//! Fits, evaluates and persists the SVM and logistic-regression classifiers

use crate::core::config::PipelineConfig;
use crate::core::errors::StegError;
use crate::core::models::{ClassifierKind, Label, MediaKind};
use crate::model::artifact::{Estimator, ModelArtifact};
use crate::model::scaler::MinMaxScaler;
use crate::table::feature_table::FeatureTable;
use crate::Result;
use linfa::traits::Fit;
use linfa::Dataset;
use linfa_logistic::LogisticRegression;
use linfa_svm::Svm;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub media: MediaKind,
    pub classifier: ClassifierKind,
    pub train_rows: usize,
    pub test_rows: usize,
    pub holdout_accuracy: f64,
    pub artifact_path: PathBuf,
}

/// Rows held out for testing: `ceil(n * test_ratio)`
pub fn test_size(n: usize, test_ratio: f64) -> usize {
    (n as f64 * test_ratio).ceil() as usize
}

/// Shuffle `0..n` and cut it into `(train, test)` index sets
pub fn split_indices(n: usize, test_ratio: f64, seed: Option<u64>) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_test = test_size(n, test_ratio);
    if n_test == 0 || n_test >= n {
        return Err(StegError::TrainingError(format!(
            "{} rows cannot be split with test ratio {}",
            n, test_ratio
        )));
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok((train, indices))
}

pub struct ClassifierTrainer {
    config: PipelineConfig,
}

impl ClassifierTrainer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self { config: config.clone() }
    }

    /// Train both classifiers for both media kinds from the feature CSVs and save them
    pub fn train_all(&self) -> Result<Vec<TrainingOutcome>> {
        let mut outcomes = Vec::with_capacity(4);
        for media in [MediaKind::Image, MediaKind::Video] {
            let csv_path = self.config.features_csv(media);
            info!("[*] Reading {} ...", csv_path.display());
            let table = FeatureTable::read_csv(csv_path)?;

            for classifier in ClassifierKind::ALL {
                let artifact = self.train(&table, media, classifier)?;
                let path = self.config.artifact_path(media, classifier);
                artifact.save(&path)?;
                let test_rows = test_size(table.len(), self.config.test_ratio);
                outcomes.push(TrainingOutcome {
                    media,
                    classifier,
                    train_rows: table.len() - test_rows,
                    test_rows,
                    holdout_accuracy: artifact.holdout_accuracy.unwrap_or_default(),
                    artifact_path: path,
                });
            }
        }
        Ok(outcomes)
    }

    /// Fit one classifier on `table`, scoring it on a random holdout split
    pub fn train(&self, table: &FeatureTable, media: MediaKind, classifier: ClassifierKind) -> Result<ModelArtifact> {
        let (x, y) = table.design_matrix()?;
        for label in [Label::Stego, Label::Clean] {
            if table.count_label(label) == 0 {
                return Err(StegError::TrainingError(format!("{} feature table has no {} rows", media, label)));
            }
        }

        let (train_idx, test_idx) = split_indices(x.nrows(), self.config.test_ratio, self.config.split_seed)?;
        let x_train = x.select(Axis(0), &train_idx);
        let y_train = y.select(Axis(0), &train_idx);
        let x_test = x.select(Axis(0), &test_idx);
        let y_test = y.select(Axis(0), &test_idx);

        info!(
            "[*] Training {} {} on {} rows ({} held out)",
            media,
            classifier,
            train_idx.len(),
            test_idx.len()
        );

        let schema = table.columns().to_vec();
        let artifact = match classifier {
            ClassifierKind::Svm => {
                let model = Svm::<f64, bool>::params()
                    .linear_kernel()
                    .fit(&Dataset::new(x_train, y_train))
                    .map_err(|e| StegError::TrainingError(format!("SVM: {}", e)))?;
                ModelArtifact::new(media, schema, None, Estimator::Svm(model))
            }
            ClassifierKind::LogisticRegression => {
                // Scaling range comes from the whole table, holdout rows included.
                let scaler = MinMaxScaler::fit(&x)?;
                let model = LogisticRegression::<f64>::default()
                    .max_iterations(self.config.lr_max_iterations)
                    .fit(&Dataset::new(scaler.transform(&x_train)?, y_train))
                    .map_err(|e| StegError::TrainingError(format!("logistic regression: {}", e)))?;
                ModelArtifact::new(media, schema, Some(scaler), Estimator::LogisticRegression(model))
            }
        };

        let accuracy = holdout_accuracy(&artifact, &x_test, &y_test)?;
        info!("Accuracy: {}", accuracy);
        Ok(artifact.with_holdout_accuracy(accuracy))
    }
}

fn holdout_accuracy(artifact: &ModelArtifact, x_test: &Array2<f64>, y_test: &Array1<bool>) -> Result<f64> {
    let predicted = artifact.predict_matrix(x_test)?;
    let correct = predicted
        .iter()
        .zip(y_test.iter())
        .filter(|(label, truth)| label.is_stego() == **truth)
        .count();
    debug!("{} of {} holdout rows classified correctly", correct, y_test.len());
    Ok(correct as f64 / y_test.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PipelineConfigBuilder;
    use crate::core::models::FeatureMap;
    use std::collections::HashSet;

    fn separable_table(rows_per_class: usize) -> FeatureTable {
        let mut table = FeatureTable::new();
        for i in 0..rows_per_class {
            let jitter = i as f64 * 0.01;
            let stego: FeatureMap = vec![("f1".to_string(), 5.0 + jitter), ("f2".to_string(), 4.0 - jitter)]
                .into_iter()
                .collect();
            let clean: FeatureMap = vec![("f1".to_string(), 1.0 - jitter), ("f2".to_string(), 0.5 + jitter)]
                .into_iter()
                .collect();
            table.push_row(format!("stego_{}.png", i), &stego, Label::Stego);
            table.push_row(format!("clean_{}.png", i), &clean, Label::Clean);
        }
        table
    }

    fn seeded_config() -> PipelineConfig {
        PipelineConfigBuilder::new().split_seed(Some(42)).build().unwrap()
    }

    #[test]
    fn test_split_indices_sizes_and_coverage() {
        let (train, test) = split_indices(10, 0.2, Some(1)).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let all: HashSet<usize> = train.iter().chain(test.iter()).copied().collect();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_split_indices_rounds_test_size_up() {
        let (train, test) = split_indices(11, 0.2, Some(1)).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);
    }

    #[test]
    fn test_split_indices_seed_is_reproducible() {
        assert_eq!(split_indices(50, 0.2, Some(9)).unwrap(), split_indices(50, 0.2, Some(9)).unwrap());
    }

    #[test]
    fn test_split_indices_too_small() {
        assert!(split_indices(1, 0.2, None).is_err());
        assert!(split_indices(0, 0.2, None).is_err());
    }

    #[test]
    fn test_train_svm_on_separable_data() {
        let trainer = ClassifierTrainer::new(&seeded_config());
        let artifact = trainer
            .train(&separable_table(10), MediaKind::Image, ClassifierKind::Svm)
            .unwrap();

        assert_eq!(artifact.classifier, ClassifierKind::Svm);
        assert!(artifact.scaler.is_none());
        assert_eq!(artifact.schema, vec!["f1", "f2"]);
        assert_eq!(artifact.holdout_accuracy, Some(1.0));
    }

    #[test]
    fn test_train_lr_keeps_scaler() {
        let trainer = ClassifierTrainer::new(&seeded_config());
        let artifact = trainer
            .train(&separable_table(10), MediaKind::Video, ClassifierKind::LogisticRegression)
            .unwrap();

        assert!(artifact.scaler.is_some());
        assert_eq!(artifact.media, MediaKind::Video);
        assert_eq!(artifact.holdout_accuracy, Some(1.0));
    }

    #[test]
    fn test_train_rejects_single_class() {
        let mut table = FeatureTable::new();
        for i in 0..5 {
            let features: FeatureMap = vec![("f1".to_string(), i as f64)].into_iter().collect();
            table.push_row(format!("{}.png", i), &features, Label::Clean);
        }

        let trainer = ClassifierTrainer::new(&seeded_config());
        assert!(matches!(
            trainer.train(&table, MediaKind::Image, ClassifierKind::Svm),
            Err(StegError::TrainingError(_))
        ));
    }

    #[test]
    fn test_train_all_fails_on_missing_csv() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfigBuilder::new()
            .features_csvs(dir.path().join("img.csv"), dir.path().join("vid.csv"))
            .model_dir(dir.path())
            .build()
            .unwrap();

        assert!(matches!(
            ClassifierTrainer::new(&config).train_all(),
            Err(StegError::MalformedTrainingData { .. })
        ));
    }
}
