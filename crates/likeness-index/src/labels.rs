//! Folder classification into a searchable label index.
//!
//! Classification is memoized in the content-addressed cache, keyed by the
//! file path, so re-indexing a folder only runs the classifier on new files.

use crate::engine::EngineHandle;
use crate::{list_images, load_image, IndexError};
use image::RgbaImage;
use likeness_core::classifier::labels_above;
use likeness_core::{CancelToken, Prediction, PredictionItem};
use likeness_store::{ContentAddressedCache, PredictionStore};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Label → files carrying it.
#[derive(Debug, Default, Clone)]
pub struct LabelIndex {
    objects: HashMap<String, Vec<PathBuf>>,
}

impl LabelIndex {
    pub fn insert(&mut self, label: &str, file: &Path) {
        self.objects.entry(label.to_owned()).or_default().push(file.to_path_buf());
    }

    /// Files for `query`, matched after trimming and lower-casing it.
    pub fn find(&self, query: &str) -> &[PathBuf] {
        let query = query.trim().to_lowercase();
        self.objects.get(&query).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LabelReport {
    pub files: usize,
    pub failed: usize,
}

pub struct LabelIndexer<'a> {
    engine: &'a EngineHandle,
    cache: Option<&'a ContentAddressedCache>,
    threshold: f32,
}

impl<'a> LabelIndexer<'a> {
    pub fn new(engine: &'a EngineHandle, cache: Option<&'a ContentAddressedCache>, threshold: f32) -> Self {
        Self { engine, cache, threshold }
    }

    /// Classify every file in `folder` and index its labels.
    ///
    /// Files that fail to decode or classify are logged and skipped; only
    /// cancellation or an unreadable folder abort the run.
    pub async fn index_folder(
        &self,
        folder: &Path,
        cancel: &CancelToken,
    ) -> Result<(LabelIndex, LabelReport), IndexError> {
        let files = list_images(folder).await?;
        let total = files.len();
        let mut index = LabelIndex::default();
        let mut report = LabelReport::default();

        for (i, file) in files.iter().enumerate() {
            cancel.check()?;
            tracing::debug!(file = %file.display(), progress = i + 1, total, "classifying");

            match self.labels_for(file, cancel).await {
                Ok(labels) => {
                    for label in &labels {
                        index.insert(label, file);
                    }
                    report.files += 1;
                }
                Err(_) if cancel.is_cancelled() => return Err(likeness_core::Cancelled.into()),
                Err(err) => {
                    tracing::warn!(file = %file.display(), error = %err, "skipping file");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(files = report.files, failed = report.failed, "label indexing finished");
        Ok((index, report))
    }

    /// Labels for one file, from the cache when present.
    pub async fn labels_for(&self, file: &Path, cancel: &CancelToken) -> Result<Vec<String>, IndexError> {
        let compute = move || async move {
            let image = load_image(file).await?;
            self.classify_labels(image, cancel).await
        };

        match self.cache {
            Some(cache) => {
                let key = file.to_string_lossy();
                Ok(cache.get_or_compute(key.as_bytes(), compute).await?)
            }
            None => compute().await,
        }
    }

    async fn classify_labels(&self, image: RgbaImage, cancel: &CancelToken) -> Result<Vec<String>, IndexError> {
        let predictions = self.engine.classify(image, cancel).await?;
        Ok(labels_above(&predictions, self.threshold))
    }
}

/// Classify `image` and persist every prediction scoring at least `threshold`
/// under `id`.
pub async fn record_predictions<S: PredictionStore>(
    engine: &EngineHandle,
    store: &S,
    id: &str,
    image: RgbaImage,
    threshold: f32,
    cancel: &CancelToken,
) -> Result<PredictionItem, IndexError> {
    let predictions: Vec<Prediction> = engine
        .classify(image, cancel)
        .await?
        .into_iter()
        .filter(|p| p.score >= threshold)
        .collect();

    let item = PredictionItem {
        identifier: id.to_owned(),
        predictions,
    };
    cancel.run(store.store_prediction(id, &item)).await?;
    Ok(item)
}
