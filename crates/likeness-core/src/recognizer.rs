//! Identity descriptor capability.

use crate::types::Descriptors;
use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("model not loaded: {0}")]
    ModelNotLoaded(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Computes a fixed-length descriptor for a normalized face crop.
///
/// Every call on one implementation must return descriptors of the same length.
pub trait Descriptor {
    fn compute(&mut self, image: &RgbaImage) -> Result<Descriptors, DescriptorError>;
}

impl<T: Descriptor + ?Sized> Descriptor for Box<T> {
    fn compute(&mut self, image: &RgbaImage) -> Result<Descriptors, DescriptorError> {
        (**self).compute(image)
    }
}
