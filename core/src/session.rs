//! Session: one runtime, one parameter store, one configuration.
//!
//! A session is opened once, builds the network any number of times against the same
//! parameters, and is closed once. Closing reports checkpoint entries that no layer claimed.

use crate::backend::{Backend, CpuBackend, MetaBackend};
use crate::checkpoint::{load_checkpoint, save_checkpoint};
use crate::error::Result;
use crate::graph::{GraphBuilder, Mode};
use crate::models::{Classifier, InceptionConfig, InceptionV3};
use crate::params::{ParamStore, RestoreReport};
use crate::shape::Layout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seed of the runtime's random generator (initializers, dropout).
    pub seed: u64,
    pub mode: Mode,
    /// Log every registered parameter after a build.
    pub debug: bool,
    pub model: InceptionConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            mode: Mode::Inference,
            debug: false,
            model: InceptionConfig::v3(),
        }
    }
}

impl SessionConfig {
    /// Reads a JSON config; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()
    }
}

pub struct Session<B: Backend> {
    backend: B,
    store: ParamStore<B>,
    config: SessionConfig,
}

impl Session<CpuBackend> {
    /// CPU session seeded from the config.
    pub fn cpu(config: SessionConfig) -> Result<Self> {
        Self::new(CpuBackend::new(config.seed), config)
    }
}

impl Session<MetaBackend> {
    /// Shape-only session.
    pub fn meta(config: SessionConfig) -> Result<Self> {
        Self::new(MetaBackend::new(), config)
    }
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        info!(
            backend = backend.name(),
            mode = ?config.mode,
            seed = config.seed,
            "session opened"
        );
        Ok(Self {
            backend,
            store: ParamStore::new(),
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &ParamStore<B> {
        &self.store
    }

    /// A builder over this session's parameters, in the configured mode.
    pub fn graph(&mut self) -> GraphBuilder<'_, B> {
        GraphBuilder::new(&self.backend, &mut self.store, self.config.mode)
    }

    /// Builds the configured Inception-v3 on `images` and returns its logits.
    pub fn classify(&mut self, images: &B::Tensor<4>, layout: Layout) -> Result<B::Tensor<2>> {
        let model = InceptionV3::new(self.config.model.clone());
        let logits = model.build(&mut self.graph(), images, layout)?;
        if self.config.debug {
            for p in self.store.iter() {
                info!(name = p.name(), shape = ?p.shape(), trainable = p.spec().trainable, "parameter");
            }
        }
        Ok(logits)
    }

    /// Writes every parameter to `dir/model.safetensors`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        save_checkpoint(dir, &self.backend, &self.store)
    }

    /// Loads `dir/model.safetensors` into the store. Values for parameters that do not exist
    /// yet are used when the network is next built.
    pub fn restore<P: AsRef<Path>>(&mut self, dir: P) -> Result<RestoreReport> {
        let tensors = load_checkpoint(dir)?;
        let report = self.store.restore(&self.backend, tensors)?;
        info!(applied = report.applied, staged = report.staged, "checkpoint restored");
        Ok(report)
    }

    /// Ends the session and hands back its parameters.
    pub fn close(mut self) -> ParamStore<B> {
        let unused = self.store.clear_pending();
        info!(
            parameters = self.store.len(),
            elements = self.store.num_elements(),
            unused,
            "session closed"
        );
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MetaTensor;
    use crate::error::InceptionError;
    use std::io::Write;

    #[test]
    fn test_config_defaults_from_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"seed": 42, "mode": "training", "model": {{"num_classes": 10}}}}"#).unwrap();

        let config = SessionConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.mode, Mode::Training);
        assert!(!config.debug);
        assert_eq!(config.model.num_classes, 10);
        assert!(!config.model.batch_norm);
    }

    #[test]
    fn test_config_rejects_invalid_model() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"model": {{"num_classes": 0}}}}"#).unwrap();
        assert!(matches!(
            SessionConfig::from_json_file(file.path()),
            Err(InceptionError::Config(_))
        ));
    }

    #[test]
    fn test_config_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"mode": "sideways"}}"#).unwrap();
        assert!(matches!(
            SessionConfig::from_json_file(file.path()),
            Err(InceptionError::Json(_))
        ));
    }

    #[test]
    fn test_meta_session_classify() {
        let mut session = Session::meta(SessionConfig::default()).unwrap();
        let logits = session
            .classify(&MetaTensor::new([2, 299, 299, 3]), Layout::ChannelLast)
            .unwrap();
        assert_eq!(logits.shape(), &[2, 1000]);

        let count = session.store().len();
        session
            .classify(&MetaTensor::new([2, 3, 299, 299]), Layout::ChannelFirst)
            .unwrap();
        assert_eq!(session.store().len(), count);

        let store = session.close();
        assert_eq!(store.len(), count);
    }
}
