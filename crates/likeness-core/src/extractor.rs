//! Face extraction pipeline.
//!
//! Detector → score filter → size filter → Landmark → crop normalization →
//! Descriptor, over a single image. Any stage error aborts the whole image.

use crate::alignment;
use crate::cancel::{CancelToken, Cancelled};
use crate::detector::{self, Detector, DetectorError};
use crate::landmark::{Landmark, LandmarkError};
use crate::recognizer::{Descriptor, DescriptorError};
use crate::types::{Descriptors, Detection, Landmarks, Point, Rect};
use image::RgbaImage;
use thiserror::Error;

pub const DESCRIPTOR_SCORE_THRESHOLD: f32 = 0.6;
pub const LANDMARK_SCORE_THRESHOLD: f32 = 0.4;
/// Faces narrower or shorter than this (in pixels) are skipped.
pub const MIN_FACE_SIZE: i32 = 45;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("error detecting faces: {0}")]
    Detection(#[from] DetectorError),
    #[error("error detecting landmarks: {0}")]
    Landmark(#[from] LandmarkError),
    #[error("error computing descriptors: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractorConfig {
    /// Minimum detection score for full extraction.
    pub descriptor_threshold: f32,
    /// Minimum detection score for landmark-only extraction.
    pub landmark_threshold: f32,
    pub min_face_size: i32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            descriptor_threshold: DESCRIPTOR_SCORE_THRESHOLD,
            landmark_threshold: LANDMARK_SCORE_THRESHOLD,
            min_face_size: MIN_FACE_SIZE,
        }
    }
}

/// One face taken through the full pipeline.
#[derive(Debug, Clone)]
pub struct ExtractedFace {
    pub detection: Detection,
    /// Landmarks normalized against the detection crop.
    pub landmarks: Landmarks,
    /// Normalized square region, in full-image coordinates.
    pub region: Rect,
    pub crop: RgbaImage,
    pub descriptors: Descriptors,
}

/// One face taken through detection and landmarks only.
#[derive(Debug, Clone)]
pub struct LandmarkedFace {
    pub detection: Detection,
    /// Landmark points in full-image coordinates.
    pub points: Vec<Point>,
    pub crop: RgbaImage,
}

pub struct Extractor {
    detector: Box<dyn Detector + Send>,
    landmark: Box<dyn Landmark + Send>,
    descriptor: Box<dyn Descriptor + Send>,
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(
        detector: Box<dyn Detector + Send>,
        landmark: Box<dyn Landmark + Send>,
        descriptor: Box<dyn Descriptor + Send>,
        config: ExtractorConfig,
    ) -> Self {
        Self { detector, landmark, descriptor, config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract normalized crops and descriptors for every usable face.
    ///
    /// No face above the threshold is not an error: the result is empty.
    pub fn extract(
        &mut self,
        image: &RgbaImage,
        cancel: &CancelToken,
    ) -> Result<Vec<ExtractedFace>, ExtractError> {
        cancel.check()?;
        let detections = detector::above(self.detector.detect(image)?, self.config.descriptor_threshold);
        tracing::debug!(count = detections.len(), "detections above descriptor threshold");

        let mut faces = Vec::with_capacity(detections.len());
        for detection in detections {
            cancel.check()?;
            let Some((visible, cropped)) = self.crop_detection(image, &detection) else {
                continue;
            };

            let landmarks = self.landmark.detect(&cropped)?;
            let (region, crop) =
                alignment::normalize_face(&landmarks, visible, image).ok_or(LandmarkError::NoPoints)?;
            if region.width() < self.config.min_face_size {
                tracing::debug!(?region, "normalized face too small, skipping");
                continue;
            }

            cancel.check()?;
            let descriptors = self.descriptor.compute(&crop)?;

            faces.push(ExtractedFace {
                detection,
                landmarks,
                region,
                crop,
                descriptors,
            });
        }

        Ok(faces)
    }

    /// Detection and landmarks only, for visualization and diagnostics.
    ///
    /// Fails with [`ExtractError::NoFaceDetected`] when no detection passes the
    /// landmark threshold.
    pub fn extract_landmarks(
        &mut self,
        image: &RgbaImage,
        cancel: &CancelToken,
    ) -> Result<Vec<LandmarkedFace>, ExtractError> {
        cancel.check()?;
        let detections = detector::above(self.detector.detect(image)?, self.config.landmark_threshold);
        if detections.is_empty() {
            return Err(ExtractError::NoFaceDetected);
        }

        let mut faces = Vec::with_capacity(detections.len());
        for detection in detections {
            cancel.check()?;
            let Some((visible, crop)) = self.crop_detection(image, &detection) else {
                continue;
            };

            let landmarks = self.landmark.detect(&crop)?;
            faces.push(LandmarkedFace {
                detection,
                points: landmarks.points_relative_to_crop(visible),
                crop,
            });
        }

        Ok(faces)
    }

    /// Visible part of the detection box and its pixels, or `None` when too small.
    fn crop_detection(&self, image: &RgbaImage, detection: &Detection) -> Option<(Rect, RgbaImage)> {
        let full = Rect::from_size(image.width(), image.height());
        let visible = detection.bbox.intersect(&full);
        if visible.width() < self.config.min_face_size || visible.height() < self.config.min_face_size {
            tracing::debug!(bbox = ?detection.bbox, "face too small, skipping");
            return None;
        }
        Some((visible, alignment::crop(image, visible)))
    }
}
