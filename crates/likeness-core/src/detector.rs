//! Face detection capability.
//!
//! The detector itself is an external inference backend; this module only
//! defines its contract and the score filtering applied to its output.

use crate::types::Detection;
use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model not loaded: {0}")]
    ModelNotLoaded(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Finds candidate face regions in an image.
///
/// Implementations may hold non-reentrant inference state, hence `&mut self`.
pub trait Detector {
    fn detect(&mut self, image: &RgbaImage) -> Result<Vec<Detection>, DetectorError>;
}

impl<T: Detector + ?Sized> Detector for Box<T> {
    fn detect(&mut self, image: &RgbaImage) -> Result<Vec<Detection>, DetectorError> {
        (**self).detect(image)
    }
}

/// Detections scoring at least `threshold`, in detector order.
pub fn above(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections.into_iter().filter(|d| d.score >= threshold).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect;

    fn det(score: f32) -> Detection {
        Detection { bbox: Rect::new(0, 0, 10, 10), score, class: 0.0 }
    }

    #[test]
    fn test_above_keeps_order_and_boundary() {
        let dets = vec![det(0.3), det(0.9), det(0.6), det(0.59), det(0.7)];
        let scores: Vec<f32> = above(dets, 0.6).iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.9, 0.6, 0.7]);
    }

    #[test]
    fn test_above_empty() {
        assert!(above(vec![], 0.4).is_empty());
        assert!(above(vec![det(0.1)], 0.4).is_empty());
    }
}
