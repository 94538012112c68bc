//! likeness-index — Batch indexing on top of the extraction pipeline.
//!
//! Runs inference through a single engine thread, persists faces and
//! predictions, memoizes classification in the content-addressed cache, and
//! provides the offline passes (distance precomputation, threshold
//! evaluation). Batch loops log and skip failing items.

pub mod config;
pub mod distances;
pub mod engine;
pub mod evaluate;
pub mod faces;
pub mod labels;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use engine::{spawn_engine, EngineError, EngineHandle};

use image::RgbaImage;
use likeness_core::Cancelled;
use likeness_store::{CacheError, StoreError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("cannot read folder {path}: {source}")]
    Folder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Regular, non-hidden files directly inside `folder`, sorted by path.
pub async fn list_images(folder: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let folder_err = |source| IndexError::Folder {
        path: folder.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(folder).await.map_err(folder_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(folder_err)? {
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type().await.map_err(folder_err)?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Decode an image file off the async runtime.
pub async fn load_image(path: &Path) -> Result<RgbaImage, IndexError> {
    let owned = path.to_path_buf();
    let decoded = tokio::task::spawn_blocking(move || image::open(&owned).map(|img| img.to_rgba8())).await?;
    decoded.map_err(|source| IndexError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
