//! likeness-core — Face extraction, crop normalization and descriptor matching.
//!
//! Detection, landmark, descriptor and classification models are external
//! collaborators behind capability traits; this crate owns the pipeline
//! around them.

pub mod alignment;
pub mod cancel;
pub mod classifier;
pub mod detector;
pub mod extractor;
pub mod landmark;
pub mod recognizer;
pub mod types;

pub use cancel::{CancelToken, Cancelled};
pub use classifier::{Classifier, ClassifierError};
pub use detector::{Detector, DetectorError};
pub use extractor::{ExtractError, ExtractedFace, Extractor, ExtractorConfig, LandmarkedFace};
pub use landmark::{Landmark, LandmarkError};
pub use recognizer::{Descriptor, DescriptorError};
pub use types::{
    Descriptors, Detection, DimensionMismatch, EuclideanMatcher, FaceItem, Landmarks, MatchResult,
    Matcher, Point, Prediction, PredictionItem, Rect,
};
