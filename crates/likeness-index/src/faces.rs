//! Face indexing: extract every image of a folder into a [`FaceStore`].

use crate::engine::EngineHandle;
use crate::{list_images, load_image, IndexError};
use likeness_core::{CancelToken, FaceItem};
use likeness_store::FaceStore;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FaceIndexReport {
    /// Images processed without error, with or without faces.
    pub images: usize,
    /// Faces stored.
    pub faces: usize,
    pub failed: usize,
}

/// Extract and store the faces of one image. Returns the stored items.
///
/// The image's faces replace whatever was stored for it before, in one
/// write, so re-indexing never duplicates faces.
pub async fn index_image<S: FaceStore>(
    engine: &EngineHandle,
    store: &S,
    path: &Path,
    network: &str,
    cancel: &CancelToken,
) -> Result<Vec<FaceItem>, IndexError> {
    let image = load_image(path).await?;
    let extracted = engine.extract(image, cancel).await?;
    let identifier = path.to_string_lossy().into_owned();

    let items: Vec<FaceItem> = extracted
        .into_iter()
        .map(|face| FaceItem {
            identifier: identifier.clone(),
            network: network.to_owned(),
            detection: face.detection,
            landmarks: face.landmarks,
            descriptors: face.descriptors,
        })
        .collect();
    cancel.run(store.store_faces(&identifier, &items)).await?;

    tracing::debug!(path = %path.display(), faces = items.len(), "indexed image");
    Ok(items)
}

/// Index every file of `folder`. Per-image failures are logged and counted.
pub async fn index_faces<S: FaceStore>(
    engine: &EngineHandle,
    store: &S,
    folder: &Path,
    network: &str,
    cancel: &CancelToken,
) -> Result<FaceIndexReport, IndexError> {
    let files = list_images(folder).await?;
    let mut report = FaceIndexReport::default();

    for (i, file) in files.iter().enumerate() {
        cancel.check()?;
        tracing::debug!(file = %file.display(), progress = i + 1, total = files.len(), "extracting faces");

        match index_image(engine, store, file, network, cancel).await {
            Ok(items) => {
                report.images += 1;
                report.faces += items.len();
            }
            Err(_) if cancel.is_cancelled() => return Err(likeness_core::Cancelled.into()),
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %err, "face extraction failed");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        images = report.images,
        faces = report.faces,
        failed = report.failed,
        "face indexing finished"
    );
    Ok(report)
}
