use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use std::sync::OnceLock;

use crate::pipeline::PipelineError;

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Execution settings for ONNX networks used as feature extractors.
#[derive(Debug)]
pub struct RuntimeConfig {
    pub inter_threads: usize,
    pub intra_threads: usize,
    pub optimization_level: GraphOptimizationLevel,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            inter_threads: 0, // Let ONNX Runtime decide
            intra_threads: 0, // Let ONNX Runtime decide
            optimization_level: GraphOptimizationLevel::Level3,
        }
    }
}

impl Clone for RuntimeConfig {
    fn clone(&self) -> Self {
        Self {
            inter_threads: self.inter_threads,
            intra_threads: self.intra_threads,
            optimization_level: copy_level(&self.optimization_level),
        }
    }
}

fn copy_level(level: &GraphOptimizationLevel) -> GraphOptimizationLevel {
    match level {
        GraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
        GraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
        GraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
        GraphOptimizationLevel::Disable => GraphOptimizationLevel::Disable,
    }
}

/// Commits the ONNX Runtime environment once per process. A failed commit is
/// remembered and reported to every caller.
pub fn ensure_initialized() -> Result<(), PipelineError> {
    INIT.get_or_init(|| {
        ort::init()
            .with_name("labelflow")
            .commit()
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
    .clone()
    .map_err(PipelineError::Model)
}

pub fn create_session_builder(config: &RuntimeConfig) -> Result<SessionBuilder, PipelineError> {
    ensure_initialized()?;
    let mut builder = Session::builder()?;

    if config.inter_threads > 0 {
        builder = builder.with_inter_threads(config.inter_threads)?;
    }
    if config.intra_threads > 0 {
        builder = builder.with_intra_threads(config.intra_threads)?;
    }
    builder = builder.with_optimization_level(copy_level(&config.optimization_level))?;

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_initialization() {
        assert!(ensure_initialized().is_ok());
        assert!(ensure_initialized().is_ok()); // Second call should be fine
    }

    #[test]
    fn test_session_builder_config() {
        let config = RuntimeConfig {
            inter_threads: 1,
            intra_threads: 1,
            optimization_level: GraphOptimizationLevel::Level1,
        };
        assert!(create_session_builder(&config).is_ok());
    }

    #[test]
    fn test_clone_keeps_level() {
        let config = RuntimeConfig {
            optimization_level: GraphOptimizationLevel::Disable,
            ..Default::default()
        };
        let cloned = config.clone();
        assert!(matches!(cloned.optimization_level, GraphOptimizationLevel::Disable));
    }
}
