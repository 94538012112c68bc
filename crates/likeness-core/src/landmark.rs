//! Facial landmark capability.

use crate::types::Landmarks;
use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model not loaded: {0}")]
    ModelNotLoaded(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("landmark model returned no points")]
    NoPoints,
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Locates facial keypoints, normalized to the bounds of the image it is given.
pub trait Landmark {
    fn detect(&mut self, image: &RgbaImage) -> Result<Landmarks, LandmarkError>;
}

impl<T: Landmark + ?Sized> Landmark for Box<T> {
    fn detect(&mut self, image: &RgbaImage) -> Result<Landmarks, LandmarkError> {
        (**self).detect(image)
    }
}
