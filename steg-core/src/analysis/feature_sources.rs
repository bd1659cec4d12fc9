//! Dispatch of samples to the image or video feature extractor

use crate::analysis::image_features::{FaridExtractor, ImageFeatureSource};
use crate::analysis::video_features::{NpeloExtractor, VideoFeatureSource};
use crate::core::config::PipelineConfig;
use crate::core::errors::StegError;
use crate::core::models::{MediaKind, Sample, SampleFeatures};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// The pair of extractors a pipeline run works with
#[derive(Clone)]
pub struct FeatureSources {
    images: Arc<dyn ImageFeatureSource>,
    videos: Arc<dyn VideoFeatureSource>,
}

impl FeatureSources {
    pub fn new(images: Arc<dyn ImageFeatureSource>, videos: Arc<dyn VideoFeatureSource>) -> Self {
        Self { images, videos }
    }

    /// External-tool extractors configured from `config`
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(Arc::new(FaridExtractor::new(config)), Arc::new(NpeloExtractor::new(config)))
    }

    /// Fill `sample.features` according to its media kind
    pub async fn extract(&self, sample: &mut Sample) -> Result<()> {
        sample.features = match sample.kind {
            MediaKind::Image => SampleFeatures::Image(self.images.extract(&sample.path).await?),
            MediaKind::Video => {
                let groups = self.videos.extract(&sample.path).await?;
                if groups.is_empty() {
                    return Err(StegError::data_format(format!(
                        "no frame groups extracted from {}",
                        sample.path.display()
                    )));
                }
                SampleFeatures::Video(groups)
            }
            MediaKind::Unsupported => {
                return Err(StegError::UnsupportedType {
                    path: sample.path.clone(),
                    extension: sample.extension.clone(),
                })
            }
        };

        debug!("{}: features extracted", sample.file_name());
        Ok(())
    }
}
