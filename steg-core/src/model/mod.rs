//! Classifier artifacts and feature scaling

pub mod artifact;
pub mod classifier_set;
pub mod scaler;
