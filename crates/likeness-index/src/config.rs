use likeness_core::extractor::{DESCRIPTOR_SCORE_THRESHOLD, LANDMARK_SCORE_THRESHOLD, MIN_FACE_SIZE};
use likeness_core::types::DEFAULT_MATCH_THRESHOLD;
use likeness_core::{EuclideanMatcher, ExtractorConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Indexing configuration.
///
/// Built from defaults, an optional TOML file, then `LIKENESS_*` environment
/// variables, each layer overriding the previous one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory holding the content-addressed inference cache.
    pub cache_dir: PathBuf,
    pub cache_enabled: bool,
    /// Network name recorded on stored faces and predictions.
    pub network: String,
    /// Euclidean distance below which two descriptors are the same identity.
    pub match_threshold: f32,
    pub descriptor_threshold: f32,
    pub landmark_threshold: f32,
    /// Minimum face width/height in pixels.
    pub min_face_size: i32,
    /// Minimum classifier score for a label to be indexed.
    pub label_threshold: f32,
    /// Pending requests the engine queue holds before senders wait.
    pub queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            db_path: data_dir.join("likeness.db"),
            cache_dir: data_dir.join("cache"),
            cache_enabled: true,
            network: "default".to_string(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            descriptor_threshold: DESCRIPTOR_SCORE_THRESHOLD,
            landmark_threshold: LANDMARK_SCORE_THRESHOLD,
            min_face_size: MIN_FACE_SIZE,
            label_threshold: 0.1,
            queue_depth: 4,
        }
    }
}

impl Config {
    /// Defaults overridden by `LIKENESS_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// TOML file at `path`, overridden by `LIKENESS_*` environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("LIKENESS_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("LIKENESS_CACHE_DIR") {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LIKENESS_CACHE_ENABLED") {
            self.cache_enabled = v != "0";
        }
        if let Some(v) = lookup("LIKENESS_NETWORK") {
            self.network = v;
        }
        override_parsed(&lookup, "LIKENESS_MATCH_THRESHOLD", &mut self.match_threshold);
        override_parsed(&lookup, "LIKENESS_DESCRIPTOR_THRESHOLD", &mut self.descriptor_threshold);
        override_parsed(&lookup, "LIKENESS_LANDMARK_THRESHOLD", &mut self.landmark_threshold);
        override_parsed(&lookup, "LIKENESS_MIN_FACE_SIZE", &mut self.min_face_size);
        override_parsed(&lookup, "LIKENESS_LABEL_THRESHOLD", &mut self.label_threshold);
        override_parsed(&lookup, "LIKENESS_QUEUE_DEPTH", &mut self.queue_depth);
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            descriptor_threshold: self.descriptor_threshold,
            landmark_threshold: self.landmark_threshold,
            min_face_size: self.min_face_size,
        }
    }

    pub fn matcher(&self) -> EuclideanMatcher {
        EuclideanMatcher::new(self.match_threshold)
    }
}

fn override_parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable config override"),
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("likeness")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.match_threshold, 0.62);
        assert_eq!(config.descriptor_threshold, 0.6);
        assert_eq!(config.landmark_threshold, 0.4);
        assert_eq!(config.min_face_size, 45);
        assert!(config.cache_enabled);
        assert!(config.db_path.ends_with("likeness/likeness.db"));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("LIKENESS_MATCH_THRESHOLD", "0.55"),
            ("LIKENESS_CACHE_ENABLED", "0"),
            ("LIKENESS_DB_PATH", "/var/lib/likeness/x.db"),
            ("LIKENESS_NETWORK", "facenet"),
            ("LIKENESS_MIN_FACE_SIZE", "64"),
        ]));
        assert_eq!(config.match_threshold, 0.55);
        assert!(!config.cache_enabled);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/likeness/x.db"));
        assert_eq!(config.network, "facenet");
        assert_eq!(config.extractor_config().min_face_size, 64);
        assert_eq!(config.matcher().threshold, 0.55);
    }

    #[test]
    fn test_bad_override_keeps_previous_value() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[("LIKENESS_QUEUE_DEPTH", "many")]));
        assert_eq!(config.queue_depth, 4);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            cache_dir = "/srv/photos/.inference"
            label_threshold = 0.25
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/srv/photos/.inference"));
        assert_eq!(config.label_threshold, 0.25);
        assert_eq!(config.match_threshold, 0.62);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("likeness.toml");
        std::fs::write(&path, "network = \"resnet\"\nqueue_depth = 8\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.network, "resnet");
        assert_eq!(config.queue_depth, 8);
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "match_threshold = \"high\"").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse(_))));
    }
}
