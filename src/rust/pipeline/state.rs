use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::transform::FittedTransform;
use crate::runtime::RuntimeConfig;
use crate::trainers::{FittedTrainer, TrainerState};
use crate::transforms::{
    ExtractPixels, FittedKeyToValue, FittedTextFeaturizer, FittedValueToKey, LoadImages,
    NormalizeLpNorm, OnnxScorerConfig, ResizeImages, ScoreOnnxModel,
};

/// Persisted form of one fitted step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepState {
    ValueToKey(FittedValueToKey),
    KeyToValue(FittedKeyToValue),
    FeaturizeText(FittedTextFeaturizer),
    LoadImages(LoadImages),
    ResizeImages(ResizeImages),
    ExtractPixels(ExtractPixels),
    NormalizeLpNorm(NormalizeLpNorm),
    ScoreOnnxModel(OnnxScorerConfig),
    Trainer(TrainerState),
}

impl StepState {
    /// Rebuilds the fitted step. The ONNX scorer reopens its network from the
    /// recorded path using `runtime`.
    pub fn restore(self, runtime: &RuntimeConfig) -> Result<Box<dyn FittedTransform>, PipelineError> {
        Ok(match self {
            StepState::ValueToKey(step) => Box::new(step),
            StepState::KeyToValue(step) => Box::new(step),
            StepState::FeaturizeText(step) => Box::new(step),
            StepState::LoadImages(step) => Box::new(step),
            StepState::ResizeImages(step) => Box::new(step),
            StepState::ExtractPixels(step) => Box::new(step),
            StepState::NormalizeLpNorm(step) => Box::new(step),
            StepState::ScoreOnnxModel(config) => Box::new(ScoreOnnxModel::new(config, runtime)?),
            StepState::Trainer(state) => Box::new(FittedTrainer::from_state(state)),
        })
    }
}
