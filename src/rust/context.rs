use crate::data::{train_test_split, Dataset, Split};
use crate::pipeline::PipelineError;
use crate::runtime::RuntimeConfig;

/// Seed used when a run does not choose one.
pub const DEFAULT_SEED: u64 = 1;

/// Per-run settings threaded through the workflows: the random seed for
/// every sampling decision and the ONNX runtime configuration.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    seed: u64,
    runtime: RuntimeConfig,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl PipelineContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            runtime: RuntimeConfig::default(),
        }
    }

    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Splits `dataset` with this context's seed.
    pub fn train_test_split(&self, dataset: &Dataset, test_fraction: f64) -> Result<Split, PipelineError> {
        train_test_split(dataset, test_fraction, self.seed)
    }
}
