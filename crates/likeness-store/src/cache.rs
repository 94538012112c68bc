//! Content-addressed memoization of expensive inference results.
//!
//! Entries live in one directory, one `<sha256-hex>.json` file per key. Only
//! successful computations are stored. Concurrent callers with the same key
//! share a single computation.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("computation failed: {0}")]
    Compute(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Cancelled(#[from] likeness_core::Cancelled),
}

pub struct ContentAddressedCache {
    dir: PathBuf,
    in_flight: InFlight,
}

impl ContentAddressedCache {
    /// Use `dir` as the cache directory, creating it if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::Directory {
            path: dir.clone(),
            source,
        })?;
        tracing::info!(dir = %dir.display(), "opened inference cache");
        Ok(Self {
            dir,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Hex-encoded SHA-256 of the key material.
    pub fn key_for(key_material: &[u8]) -> String {
        Sha256::digest(key_material)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Stored value for `key_material`, or the result of `compute`.
    ///
    /// A failed computation is returned as [`CacheError::Compute`] and not
    /// stored, so the next call tries again. While one caller computes a key,
    /// other callers for the same key wait and then read its stored result.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key_material: &[u8], compute: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = Self::key_for(key_material);
        let path = self.entry_path(&key);

        // Declared before the lock so it drops last, including when this
        // future is dropped mid-await.
        let _release = KeyRelease {
            in_flight: &self.in_flight,
            key: &key,
        };
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;
        let result = self.lookup_or_compute(&key, &path, compute).await;
        result
    }

    async fn lookup_or_compute<T, E, F, Fut>(&self, key: &str, path: &Path, compute: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = read_entry(path).await {
            tracing::debug!(key, "cache hit");
            return Ok(value);
        }

        let value = compute().await.map_err(|e| CacheError::Compute(e.into()))?;

        if let Err(err) = write_entry(path, &value).await {
            tracing::warn!(key, error = %err, "failed to persist cache entry");
        }

        Ok(value)
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.entry(key.to_owned()).or_default().clone()
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

type InFlight = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Removes a key's in-flight entry on drop once no caller holds its lock.
///
/// Each caller drops its own `Arc` before this runs, so whichever caller
/// finishes last sees a count of one and removes the entry.
struct KeyRelease<'a> {
    in_flight: &'a InFlight,
    key: &'a str,
}

impl Drop for KeyRelease<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight.get(self.key).is_some_and(|l| Arc::strong_count(l) == 1) {
            in_flight.remove(self.key);
        }
    }
}

/// Unreadable or undecodable entries count as misses.
async fn read_entry<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring corrupt cache entry");
            None
        }
    }
}

/// Write through a temporary file so a crash never leaves a partial entry.
async fn write_entry<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let bytes = serde_json::to_vec(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use likeness_core::CancelToken;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("classifier unavailable")]
    struct Unavailable;

    fn labels() -> Vec<String> {
        vec!["tabby".to_string(), "egyptian cat".to_string()]
    }

    #[test]
    fn test_key_is_sha256_hex() {
        assert_eq!(
            ContentAddressedCache::key_for(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(
            ContentAddressedCache::key_for(b"photos/a.jpg"),
            ContentAddressedCache::key_for(b"photos/b.jpg")
        );
    }

    #[test]
    fn test_open_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested").join(".inference");
        let cache = ContentAddressedCache::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(cache.dir(), dir.as_path());
    }

    #[tokio::test]
    async fn test_computes_once_and_persists() {
        let root = tempfile::tempdir().unwrap();
        let cache = ContentAddressedCache::open(root.path()).unwrap();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let got: Vec<String> = cache
                .get_or_compute(b"photos/cat.jpg", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Unavailable>(labels())
                })
                .await
                .unwrap();
            assert_eq!(got, labels());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let key = ContentAddressedCache::key_for(b"photos/cat.jpg");
        let raw = std::fs::read_to_string(cache.entry_path(&key)).unwrap();
        assert_eq!(raw, r#"["tabby","egyptian cat"]"#);
    }

    #[tokio::test]
    async fn test_reopened_cache_hits() {
        let root = tempfile::tempdir().unwrap();
        {
            let cache = ContentAddressedCache::open(root.path()).unwrap();
            let _: Vec<String> = cache
                .get_or_compute(b"k", || async { Ok::<_, Unavailable>(labels()) })
                .await
                .unwrap();
        }

        let cache = ContentAddressedCache::open(root.path()).unwrap();
        let got: Vec<String> = cache
            .get_or_compute(b"k", || async { Err::<Vec<String>, _>(Unavailable) })
            .await
            .unwrap();
        assert_eq!(got, labels());
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let root = tempfile::tempdir().unwrap();
        let cache = ContentAddressedCache::open(root.path()).unwrap();

        let err = cache
            .get_or_compute(b"k", || async { Err::<Vec<String>, _>(Unavailable) })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Compute(_)));
        assert!(!cache.entry_path(&ContentAddressedCache::key_for(b"k")).exists());

        let got: Vec<String> = cache
            .get_or_compute(b"k", || async { Ok::<_, Unavailable>(labels()) })
            .await
            .unwrap();
        assert_eq!(got, labels());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_recomputed() {
        let root = tempfile::tempdir().unwrap();
        let cache = ContentAddressedCache::open(root.path()).unwrap();
        let path = cache.entry_path(&ContentAddressedCache::key_for(b"k"));
        std::fs::write(&path, b"{not json").unwrap();

        let got: Vec<String> = cache
            .get_or_compute(b"k", || async { Ok::<_, Unavailable>(labels()) })
            .await
            .unwrap();
        assert_eq!(got, labels());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"["tabby","egyptian cat"]"#);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_computation() {
        let root = tempfile::tempdir().unwrap();
        let cache = Arc::new(ContentAddressedCache::open(root.path()).unwrap());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_compute(b"same", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, Unavailable>(labels())
                    })
                    .await
                    .unwrap()
            }));
        }

        for task in tasks {
            let got: Vec<String> = task.await.unwrap();
            assert_eq!(got, labels());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_computations_release_their_keys() {
        let root = tempfile::tempdir().unwrap();
        let cache = ContentAddressedCache::open(root.path()).unwrap();

        for i in 0..20 {
            let cancel = CancelToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                trigger.cancel();
            });

            let key = format!("k{i}");
            let res: Result<Vec<String>, CacheError> = cancel
                .run(cache.get_or_compute(key.as_bytes(), || async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok::<_, Unavailable>(labels())
                }))
                .await;
            assert!(matches!(res, Err(CacheError::Cancelled(_))));
        }

        assert_eq!(cache.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_entry_to_computer() {
        let root = tempfile::tempdir().unwrap();
        let cache = ContentAddressedCache::open(root.path()).unwrap();
        let cancel = CancelToken::new();

        let computer = cache.get_or_compute(b"same", || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, Unavailable>(labels())
        });
        let waiter = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                trigger.cancel();
            });
            cancel
                .run(cache.get_or_compute(b"same", || async {
                    Ok::<_, Unavailable>(Vec::<String>::new())
                }))
                .await
        };

        let (computed, waited) = tokio::join!(computer, waiter);
        assert_eq!(computed.unwrap(), labels());
        assert!(matches!(waited, Err(CacheError::Cancelled(_))));
        assert_eq!(cache.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_wait_on_each_other() {
        let root = tempfile::tempdir().unwrap();
        let cache = ContentAddressedCache::open(root.path()).unwrap();

        let slow = cache.get_or_compute(b"a", || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, Unavailable>(vec!["a".to_string()])
        });
        let fast = async {
            let started = std::time::Instant::now();
            let v: Vec<String> = cache
                .get_or_compute(b"b", || async { Ok::<_, Unavailable>(vec!["b".to_string()]) })
                .await
                .unwrap();
            (v, started.elapsed())
        };

        let (slow, (fast, elapsed)) = tokio::join!(slow, fast);
        assert_eq!(slow.unwrap(), vec!["a".to_string()]);
        assert_eq!(fast, vec!["b".to_string()]);
        assert!(elapsed < Duration::from_millis(150));
    }
}
