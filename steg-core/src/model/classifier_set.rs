//! The four classifiers used at inference time

use crate::core::config::PipelineConfig;
use crate::core::errors::StegError;
use crate::core::models::{ClassifierKind, MediaKind};
use crate::model::artifact::ModelArtifact;
use crate::Result;
use std::collections::HashMap;
use tracing::info;

const MEDIA: [MediaKind; 2] = [MediaKind::Image, MediaKind::Video];

/// SVM and LR classifiers for one media kind
#[derive(Debug, Clone, Copy)]
pub struct MediaClassifiers<'a> {
    pub svm: &'a ModelArtifact,
    pub lr: &'a ModelArtifact,
}

/// Loaded once before a run and passed to whatever needs predictions
#[derive(Debug)]
pub struct ClassifierSet {
    artifacts: HashMap<(MediaKind, ClassifierKind), ModelArtifact>,
}

impl ClassifierSet {
    /// Fail with every missing artifact name when any of the four is absent
    pub fn ensure_present(config: &PipelineConfig) -> Result<()> {
        let missing: Vec<String> = MEDIA
            .iter()
            .flat_map(|&media| ClassifierKind::ALL.iter().map(move |&classifier| (media, classifier)))
            .filter(|&(media, classifier)| !config.artifact_path(media, classifier).is_file())
            .map(|(media, classifier)| PipelineConfig::artifact_name(media, classifier))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StegError::MissingArtifacts { missing })
        }
    }

    pub fn load(config: &PipelineConfig) -> Result<Self> {
        Self::ensure_present(config)?;

        let mut artifacts = HashMap::new();
        for media in MEDIA {
            for classifier in ClassifierKind::ALL {
                let path = config.artifact_path(media, classifier);
                artifacts.insert((media, classifier), ModelArtifact::load(&path, media, classifier)?);
            }
        }

        info!("Loaded {} classifiers from {}", artifacts.len(), config.model_dir.display());
        Ok(Self { artifacts })
    }

    /// Build a set from artifacts already in memory; all four must be given
    pub fn from_artifacts(list: Vec<ModelArtifact>) -> Result<Self> {
        let mut artifacts = HashMap::new();
        for artifact in list {
            artifacts.insert((artifact.media, artifact.classifier), artifact);
        }

        let set = Self { artifacts };
        let missing: Vec<String> = MEDIA
            .iter()
            .flat_map(|&media| ClassifierKind::ALL.iter().map(move |&classifier| (media, classifier)))
            .filter(|key| !set.artifacts.contains_key(key))
            .map(|(media, classifier)| PipelineConfig::artifact_name(media, classifier))
            .collect();
        if !missing.is_empty() {
            return Err(StegError::MissingArtifacts { missing });
        }
        Ok(set)
    }

    pub fn get(&self, media: MediaKind, classifier: ClassifierKind) -> Option<&ModelArtifact> {
        self.artifacts.get(&(media, classifier))
    }

    pub fn for_media(&self, media: MediaKind) -> Result<MediaClassifiers<'_>> {
        let lookup = |classifier| {
            self.get(media, classifier).ok_or_else(|| StegError::MissingArtifacts {
                missing: vec![PipelineConfig::artifact_name(media, classifier)],
            })
        };

        Ok(MediaClassifiers {
            svm: lookup(ClassifierKind::Svm)?,
            lr: lookup(ClassifierKind::LogisticRegression)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PipelineConfigBuilder;

    #[test]
    fn test_ensure_present_lists_all_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img-svm.json"), "{}").unwrap();
        let config = PipelineConfigBuilder::new().model_dir(dir.path()).build().unwrap();

        match ClassifierSet::ensure_present(&config) {
            Err(StegError::MissingArtifacts { missing }) => {
                assert_eq!(missing, vec!["img-lr.json", "vid-svm.json", "vid-lr.json"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_load_with_empty_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfigBuilder::new().model_dir(dir.path()).build().unwrap();

        let err = ClassifierSet::load(&config).unwrap_err();
        assert_eq!(err.to_user_friendly().message, "Classifiers not found!");
    }

    #[test]
    fn test_from_artifacts_requires_all_four() {
        assert!(matches!(
            ClassifierSet::from_artifacts(Vec::new()),
            Err(StegError::MissingArtifacts { missing }) if missing.len() == 4
        ));
    }
}
