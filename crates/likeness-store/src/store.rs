use likeness_core::{Cancelled, FaceItem, PredictionItem};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("sqlite: {0}")]
    Sqlite(#[source] rusqlite::Error),
    #[error("database connection: {0}")]
    Connection(#[source] tokio_rusqlite::Error),
    #[error("corrupt record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation(msg.unwrap_or_else(|| code.to_string()))
            }
            other => StoreError::Sqlite(other),
        }
    }
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(e) => e.into(),
            other => StoreError::Connection(other),
        }
    }
}

// Store calls do not take a cancellation token themselves; wrap them with
// `CancelToken::run`, which surfaces `StoreError::Cancelled`.

/// Classification results keyed by an opaque identifier.
pub trait PredictionStore {
    /// All predictions for `id`, best score first. `None` when nothing is stored.
    fn get_prediction(&self, id: &str) -> impl Future<Output = Result<Option<PredictionItem>, StoreError>> + Send;

    /// Insert every prediction of `item` under `id`, all or nothing.
    ///
    /// A (id, network, label) triple that already exists is a
    /// [`StoreError::ConstraintViolation`]; nothing from the call is kept.
    fn store_prediction(&self, id: &str, item: &PredictionItem) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// One page of identifiers, ascending, strictly after `after`.
    ///
    /// A non-empty `query` keeps identifiers with at least one label containing
    /// it (case-sensitive). Each item carries its full prediction set, best
    /// score first. Pass the last identifier of a page as the next `after`.
    fn search_prediction(
        &self,
        query: &str,
        after: Option<&str>,
        n: usize,
    ) -> impl Future<Output = Result<Vec<PredictionItem>, StoreError>> + Send;
}

/// Detected faces; an identifier may own several.
pub trait FaceStore {
    fn store_face(&self, item: &FaceItem) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replace every face stored under `id` with `items`, all or nothing.
    ///
    /// Items are stored under `id` whatever their own identifier. An empty
    /// slice clears the identifier. On failure the previous faces remain.
    fn store_faces(&self, id: &str, items: &[FaceItem]) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every face stored under `id`, in insertion order. Empty when none.
    fn get_faces(&self, id: &str) -> impl Future<Output = Result<Vec<FaceItem>, StoreError>> + Send;

    /// Full scan, for offline passes such as distance precomputation.
    fn get_all_faces(&self) -> impl Future<Output = Result<Vec<FaceItem>, StoreError>> + Send;
}

/// Pairwise descriptor distances keyed by the unordered identifier pair.
pub trait FaceDistanceStore {
    /// Store (or replace) the distance between `a` and `b`; argument order is irrelevant.
    fn store_face_distance(
        &self,
        a: &FaceItem,
        b: &FaceItem,
        distance: f32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_face_distance(
        &self,
        a: &FaceItem,
        b: &FaceItem,
    ) -> impl Future<Output = Result<Option<f32>, StoreError>> + Send;
}

/// Order-independent key for a pair of identifiers.
pub fn pair_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
