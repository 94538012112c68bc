use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Integer axis-aligned rectangle, `min` inclusive and `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Rect {
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Bounds of a `width × height` image anchored at the origin.
    ///
    /// Dimensions beyond `i32::MAX` saturate.
    pub fn from_size(width: u32, height: u32) -> Self {
        let clamp = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        Self::new(0, 0, clamp(width), clamp(height))
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.min_x >= self.min_x
            && other.min_y >= self.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    /// Largest rectangle covered by both `self` and `other`.
    ///
    /// Returns an empty rectangle (all zero) when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        );
        if r.is_empty() {
            Rect::default()
        } else {
            r
        }
    }
}

/// Absolute pixel position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// A candidate face region produced by a [`Detector`](crate::detector::Detector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: Rect,
    /// Detection confidence in [0, 1].
    pub score: f32,
    pub class: f32,
}

/// Facial keypoints normalized to [0, 1] against the image the landmark model ran on.
///
/// The same value resolves to different absolute points depending on which
/// bounds it is resolved against, so there is no single "points" accessor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmarks {
    pub points: Vec<(f32, f32)>,
}

impl Landmarks {
    pub fn new(points: Vec<(f32, f32)>) -> Self {
        Self { points }
    }

    /// Resolve against the bounds of the crop the landmark model saw.
    ///
    /// Crop bounds are expressed in full-image coordinates, so the returned
    /// points are positions in the full image.
    pub fn points_relative_to_crop(&self, crop: Rect) -> Vec<Point> {
        self.resolve(crop)
    }

    /// Resolve against the full image, for landmarks computed on the whole frame.
    pub fn points_relative_to_full(&self, full: Rect) -> Vec<Point> {
        self.resolve(full)
    }

    fn resolve(&self, bounds: Rect) -> Vec<Point> {
        let w = bounds.width() as f32;
        let h = bounds.height() as f32;
        self.points
            .iter()
            .map(|&(nx, ny)| Point {
                x: bounds.min_x + (w * nx) as i32,
                y: bounds.min_y + (h * ny) as i32,
            })
            .collect()
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot calculate distance between descriptors of dimensions {left} and {right}")]
pub struct DimensionMismatch {
    pub left: usize,
    pub right: usize,
}

/// Fixed-length identity descriptor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Descriptors {
    pub values: Vec<f32>,
}

impl Descriptors {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance. Descriptors of different lengths are not comparable.
    pub fn distance_to(&self, other: &Descriptors) -> Result<f32, DimensionMismatch> {
        if self.values.len() != other.values.len() {
            return Err(DimensionMismatch {
                left: self.values.len(),
                right: other.values.len(),
            });
        }

        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt())
    }
}

impl From<Vec<f32>> for Descriptors {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// One classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub network: String,
    pub label: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionItem {
    pub identifier: String,
    pub predictions: Vec<Prediction>,
}

/// A single detected face, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceItem {
    pub identifier: String,
    pub network: String,
    pub detection: Detection,
    pub landmarks: Landmarks,
    pub descriptors: Descriptors,
}

/// Result of matching a probe descriptor against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the closest gallery entry (`f32::INFINITY` for an empty gallery).
    pub distance: f32,
    /// Identifier of the closest entry, set only when it matched.
    pub identifier: Option<String>,
}

/// Strategy for comparing a probe descriptor against a gallery of known faces.
pub trait Matcher {
    fn is_match(&self, a: &Descriptors, b: &Descriptors) -> Result<bool, DimensionMismatch>;

    fn compare(&self, probe: &Descriptors, gallery: &[FaceItem]) -> Result<MatchResult, DimensionMismatch>;
}

/// Euclidean distance matcher: `distance < threshold` is a match.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

/// Threshold selected against a labeled-pairs benchmark.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.62;

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self { threshold: DEFAULT_MATCH_THRESHOLD }
    }
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Matcher for EuclideanMatcher {
    fn is_match(&self, a: &Descriptors, b: &Descriptors) -> Result<bool, DimensionMismatch> {
        Ok(a.distance_to(b)? < self.threshold)
    }

    fn compare(&self, probe: &Descriptors, gallery: &[FaceItem]) -> Result<MatchResult, DimensionMismatch> {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, face) in gallery.iter().enumerate() {
            let dist = probe.distance_to(&face.descriptors)?;
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        Ok(match best_idx {
            Some(idx) if best_dist < self.threshold => MatchResult {
                matched: true,
                distance: best_dist,
                identifier: Some(gallery[idx].identifier.clone()),
            },
            _ => MatchResult {
                matched: false,
                distance: best_dist,
                identifier: None,
            },
        })
    }
}
