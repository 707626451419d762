//! Model archives: a fitted chain written to, and read back from, one file.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::pipeline::{FittedChain, PipelineError, StepState};
use crate::runtime::RuntimeConfig;

const ARCHIVE_FORMAT: &str = "labelflow-chain";
const ARCHIVE_VERSION: u32 = 1;
const ARCHIVE_EXTENSION: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unsupported archive: {0}")]
    Format(String),
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Serialize, Deserialize)]
struct Archive {
    format: String,
    version: u32,
    sha256: String,
    /// Serialized step list; the digest covers exactly these bytes
    payload: String,
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl FittedChain {
    /// Writes every fitted step to a single archive file at `path`.
    ///
    /// # Errors
    /// - `Pipeline(NotPersistable)` if a step holds a model without a
    ///   serializable form
    /// - `Io` if the file cannot be written
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let states = self
            .steps()
            .map(|step| step.state())
            .collect::<Result<Vec<StepState>, PipelineError>>()?;
        let payload = serde_json::to_string(&states)?;
        let archive = Archive {
            format: ARCHIVE_FORMAT.to_string(),
            version: ARCHIVE_VERSION,
            sha256: digest(payload.as_bytes()),
            payload,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec(&archive)?)?;
        info!("Saved {} steps to {:?}", states.len(), path);
        Ok(())
    }

    /// Reads an archive written by [`FittedChain::save`] and rebuilds the
    /// chain. Networks referenced by ONNX steps are reopened with `runtime`.
    ///
    /// # Errors
    /// - `Format` if the file is not a chain archive of a known version
    /// - `HashMismatch` if the payload was altered
    pub fn load(path: impl AsRef<Path>, runtime: &RuntimeConfig) -> Result<FittedChain, ModelError> {
        let path = path.as_ref();
        debug!("Loading model archive {:?}", path);
        let archive: Archive = serde_json::from_slice(&fs::read(path)?)?;

        if archive.format != ARCHIVE_FORMAT {
            return Err(ModelError::Format(format!("unknown format '{}'", archive.format)));
        }
        if archive.version != ARCHIVE_VERSION {
            return Err(ModelError::Format(format!(
                "version {} is not supported",
                archive.version
            )));
        }
        let actual = digest(archive.payload.as_bytes());
        if actual != archive.sha256 {
            return Err(ModelError::HashMismatch {
                expected: archive.sha256,
                actual,
            });
        }

        let states: Vec<StepState> = serde_json::from_str(&archive.payload)?;
        let steps = states
            .into_iter()
            .map(|state| state.restore(runtime))
            .collect::<Result<Vec<_>, PipelineError>>()?;
        info!("Loaded {} steps from {:?}", steps.len(), path);
        Ok(FittedChain::from_steps(steps))
    }
}

/// A directory of named model archives.
#[derive(Debug, Clone)]
pub struct ModelStore {
    models_dir: PathBuf,
}

impl ModelStore {
    /// Creates a new ModelStore with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        Self::models_dir_under(env::var_os("LABELFLOW_HOME"))
    }

    fn models_dir_under(home: Option<OsString>) -> PathBuf {
        // 1. Explicit LABELFLOW_HOME
        if let Some(path) = home.filter(|p| !p.is_empty()) {
            return PathBuf::from(path).join("models");
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("labelflow").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".labelflow").join("models");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("labelflow").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self { models_dir })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn model_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(format!("{}.{}", name, ARCHIVE_EXTENSION))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.model_path(name).exists()
    }

    pub fn save(&self, name: &str, chain: &FittedChain) -> Result<PathBuf, ModelError> {
        let path = self.model_path(name);
        chain.save(&path)?;
        Ok(path)
    }

    pub fn load(&self, name: &str, runtime: &RuntimeConfig) -> Result<FittedChain, ModelError> {
        FittedChain::load(self.model_path(name), runtime)
    }

    pub fn remove(&self, name: &str) -> Result<(), ModelError> {
        let path = self.model_path(name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{columns, Dataset, Record, TextFileSource};
    use crate::trainers::{LogisticRegression, TrainerStep};
    use crate::transforms::FeaturizeText;
    use crate::TransformChain;

    fn fitted() -> FittedChain {
        let rows = vec![
            Record::new().with("text", "good").with("label", true),
            Record::new().with("text", "bad").with("label", false),
        ];
        let data = Dataset::new(TextFileSource::schema(), rows).unwrap();
        TransformChain::builder(TextFileSource::schema())
            .append(FeaturizeText::new(columns::FEATURES, columns::TEXT))
            .unwrap()
            .append(TrainerStep::new(
                LogisticRegression::default(),
                columns::LABEL,
                columns::FEATURES,
            ))
            .unwrap()
            .build()
            .unwrap()
            .fit(&data)
            .unwrap()
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fitted().save(&path).unwrap();

        let mut archive: Archive = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        archive.payload = archive.payload.replace("good", "gold");
        fs::write(&path, serde_json::to_vec(&archive).unwrap()).unwrap();

        let err = FittedChain::load(&path, &RuntimeConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::HashMismatch { .. }));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.json");
        let archive = Archive {
            format: "something-else".into(),
            version: 1,
            sha256: digest(b"[]"),
            payload: "[]".into(),
        };
        fs::write(&path, serde_json::to_vec(&archive).unwrap()).unwrap();
        let err = FittedChain::load(&path, &RuntimeConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Format(_)));
    }

    #[test]
    fn test_store_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models")).unwrap();
        assert!(store.models_dir().exists());
        assert!(!store.contains("sentiment"));

        let path = store.save("sentiment", &fitted()).unwrap();
        assert_eq!(path, store.model_path("sentiment"));
        assert!(store.contains("sentiment"));
        assert_eq!(store.load("sentiment", &RuntimeConfig::default()).unwrap().step_names().len(), 2);

        store.remove("sentiment").unwrap();
        assert!(!store.contains("sentiment"));
    }

    #[test]
    fn test_default_models_dir() {
        let path = ModelStore::models_dir_under(Some("/tmp/labelflow-test".into()));
        assert_eq!(path, PathBuf::from("/tmp/labelflow-test/models"));

        for home in [None, Some(OsString::new())] {
            let path = ModelStore::models_dir_under(home);
            assert!(path.ends_with("models"));
            assert!(!path.starts_with("/tmp/labelflow-test"));
        }
    }
}
