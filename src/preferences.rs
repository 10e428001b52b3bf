//! Local user preferences.
//!
//! A small JSON key/value file next to the record database. Unknown keys are
//! preserved on write so other tools can share the file.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::constants::{DEFAULT_DOWNLOAD_THREADS, MAX_DOWNLOAD_THREADS};

const KEY_DOWNLOAD_PATH: &str = "downloadPath";
const KEY_DOWNLOAD_THREADS: &str = "downloadThreads";

/// Errors from reading or writing preferences.
#[derive(Debug, Error)]
pub enum PreferencesError {
    /// The preferences file could not be read or written.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The preferences file is not a JSON object.
    #[error("invalid preferences file {path}: {source}")]
    Parse {
        /// File involved.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The chosen download directory does not exist or is not a directory.
    #[error("download directory {0} does not exist")]
    NotADirectory(PathBuf),

    /// Thread count outside `1..=64`.
    #[error("download threads must be between 1 and 64, got {0}")]
    InvalidThreads(usize),

    /// No home directory to derive the default download directory from.
    #[error("cannot determine home directory")]
    NoHomeDir,
}

/// File-backed preferences store.
#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
}

impl Preferences {
    /// Opens (lazily) the preferences file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Chosen download directory, defaulting to `~/Downloads`.
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesError`] if the file is unreadable, or
    /// [`PreferencesError::NoHomeDir`] when no value is stored and there is
    /// no home directory.
    pub async fn download_dir(&self) -> Result<PathBuf, PreferencesError> {
        let values = self.load().await?;
        if let Some(path) = values.get(KEY_DOWNLOAD_PATH).and_then(Value::as_str) {
            return Ok(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join("Downloads"))
            .ok_or(PreferencesError::NoHomeDir)
    }

    /// Stores the download directory; it must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesError::NotADirectory`] for a missing or non-directory
    /// path, or an IO/parse error from the file.
    pub async fn set_download_dir(&self, dir: &Path) -> Result<(), PreferencesError> {
        let is_dir = tokio::fs::metadata(dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(PreferencesError::NotADirectory(dir.to_path_buf()));
        }
        let mut values = self.load().await?;
        values.insert(
            KEY_DOWNLOAD_PATH.to_string(),
            Value::String(dir.to_string_lossy().into_owned()),
        );
        self.save(&values).await
    }

    /// Download worker count, defaulting to 1.
    ///
    /// A stored value outside `1..=64` is clamped into range.
    ///
    /// # Errors
    ///
    /// Returns an IO/parse error from the file.
    pub async fn download_threads(&self) -> Result<usize, PreferencesError> {
        let values = self.load().await?;
        let threads = values
            .get(KEY_DOWNLOAD_THREADS)
            .and_then(Value::as_f64)
            .map_or(DEFAULT_DOWNLOAD_THREADS, |n| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let n = n.max(0.0) as usize;
                n.clamp(1, MAX_DOWNLOAD_THREADS)
            });
        Ok(threads)
    }

    /// Stores the download worker count.
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesError::InvalidThreads`] outside `1..=64`, or an
    /// IO/parse error from the file.
    pub async fn set_download_threads(&self, threads: usize) -> Result<(), PreferencesError> {
        if !(1..=MAX_DOWNLOAD_THREADS).contains(&threads) {
            return Err(PreferencesError::InvalidThreads(threads));
        }
        let mut values = self.load().await?;
        values.insert(KEY_DOWNLOAD_THREADS.to_string(), Value::from(threads));
        self.save(&values).await
    }

    async fn load(&self) -> Result<Map<String, Value>, PreferencesError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(PreferencesError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&raw).map_err(|source| PreferencesError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, values: &Map<String, Value>) -> Result<(), PreferencesError> {
        let io_err = |source| PreferencesError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let body = serde_json::to_vec_pretty(values).map_err(|source| PreferencesError::Parse {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        debug!(path = %self.path.display(), "preferences saved");
        Ok(())
    }
}
