//! Stub inference backends for tests.

use image::RgbaImage;
use likeness_core::{
    Classifier, ClassifierError, Descriptor, DescriptorError, Descriptors, Detection, Detector, DetectorError,
    Extractor, ExtractorConfig, Landmark, LandmarkError, Landmarks, Prediction, Rect,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One detection covering the whole image; confident only from 50px wide.
pub struct WholeImageDetector;

impl Detector for WholeImageDetector {
    fn detect(&mut self, image: &RgbaImage) -> Result<Vec<Detection>, DetectorError> {
        let score = if image.width() >= 50 { 0.9 } else { 0.3 };
        Ok(vec![Detection {
            bbox: Rect::from_size(image.width(), image.height()),
            score,
            class: 1.0,
        }])
    }
}

/// Two confident detections covering the whole image.
pub struct TwinDetector;

impl Detector for TwinDetector {
    fn detect(&mut self, image: &RgbaImage) -> Result<Vec<Detection>, DetectorError> {
        let det = Detection {
            bbox: Rect::from_size(image.width(), image.height()),
            score: 0.9,
            class: 1.0,
        };
        Ok(vec![det.clone(), det])
    }
}

/// Landmarks at the crop corners.
pub struct CornerLandmarks;

impl Landmark for CornerLandmarks {
    fn detect(&mut self, _image: &RgbaImage) -> Result<Landmarks, LandmarkError> {
        Ok(Landmarks::new(vec![(0.0, 0.0), (1.0, 1.0)]))
    }
}

/// Descriptor = mean of the red and green channels, scaled to [0, 1].
///
/// Images filled with one colour map to a known point.
pub struct ColourDescriptor;

impl Descriptor for ColourDescriptor {
    fn compute(&mut self, image: &RgbaImage) -> Result<Descriptors, DescriptorError> {
        let n = (image.width() * image.height()).max(1) as f32;
        let (mut r, mut g) = (0.0f32, 0.0f32);
        for px in image.pixels() {
            r += px.0[0] as f32;
            g += px.0[1] as f32;
        }
        Ok(Descriptors::new(vec![r / n / 255.0, g / n / 255.0]))
    }
}

/// "Cat" for images at least 100px wide, "Dog" otherwise; counts calls.
pub struct SizeClassifier {
    pub calls: Arc<AtomicUsize>,
}

impl Classifier for SizeClassifier {
    fn classify(&mut self, image: &RgbaImage) -> Result<Vec<Prediction>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let label = if image.width() >= 100 { "Cat" } else { "Dog" };
        Ok(vec![
            Prediction { network: "stub".into(), label: label.into(), score: 0.8 },
            Prediction { network: "stub".into(), label: "Noise".into(), score: 0.01 },
        ])
    }
}

pub fn stub_extractor() -> Extractor {
    Extractor::new(
        Box::new(WholeImageDetector),
        Box::new(CornerLandmarks),
        Box::new(ColourDescriptor),
        ExtractorConfig::default(),
    )
}

pub fn two_face_extractor() -> Extractor {
    Extractor::new(
        Box::new(TwinDetector),
        Box::new(CornerLandmarks),
        Box::new(ColourDescriptor),
        ExtractorConfig::default(),
    )
}

/// Write a solid-colour PNG.
pub fn write_png(path: &Path, width: u32, height: u32, rgb: [u8; 3]) {
    let image = RgbaImage::from_pixel(width, height, image::Rgba([rgb[0], rgb[1], rgb[2], 255]));
    image.save(path).unwrap();
}
