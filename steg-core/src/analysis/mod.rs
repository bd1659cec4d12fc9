//! Sniffing and feature extraction for images and videos

pub mod feature_sources;
pub mod file_sniffer;
pub mod image_features;
pub mod process_isolation;
pub mod video_features;
