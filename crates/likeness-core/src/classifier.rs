//! Image classification capability, used by the label-indexing variant.

use crate::types::Prediction;
use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model not loaded: {0}")]
    ModelNotLoaded(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Scores an image against a fixed label set.
pub trait Classifier {
    fn classify(&mut self, image: &RgbaImage) -> Result<Vec<Prediction>, ClassifierError>;
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn classify(&mut self, image: &RgbaImage) -> Result<Vec<Prediction>, ClassifierError> {
        (**self).classify(image)
    }
}

/// Lower-cased labels scoring at least `threshold`, best first.
pub fn labels_above(predictions: &[Prediction], threshold: f32) -> Vec<String> {
    let mut kept: Vec<&Prediction> = predictions.iter().filter(|p| p.score >= threshold).collect();
    kept.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    kept.into_iter().map(|p| p.label.to_lowercase()).collect()
}
