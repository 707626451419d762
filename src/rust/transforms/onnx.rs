use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};
use ndarray::{Array1, ArrayD, IxDyn};
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};

use crate::data::{Column, ColumnKind, Dataset, Record, Value};
use crate::pipeline::{
    field, wrong_kind, FittedTransform, Input, PipelineError, StepState, Transform,
};
use crate::runtime::{create_session_builder, RuntimeConfig};

const SCORE_ONNX_MODEL: &str = "ScoreOnnxModel";

/// Where the network lives and how a vector column is fed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnnxScorerConfig {
    pub model_path: PathBuf,
    pub input_column: String,
    pub output_column: String,
    /// Name of the network input the column is bound to
    pub input_tensor: String,
    /// Name of the network output emitted as the new column
    pub output_tensor: String,
    /// Shape of one example, without the batch dimension
    pub input_shape: Vec<usize>,
}

/// Runs a pretrained ONNX network as a fixed feature extractor.
///
/// The network has no trainable state of its own here; fitting returns the
/// step unchanged and persisting it records only the configuration, so the
/// network file must still exist when a saved chain is loaded.
#[derive(Clone)]
pub struct ScoreOnnxModel {
    config: OnnxScorerConfig,
    session: Arc<Session>,
}

impl fmt::Debug for ScoreOnnxModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoreOnnxModel")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScoreOnnxModel {
    /// Opens the network and checks that the configured tensor names exist.
    ///
    /// # Errors
    /// - `InvalidArgument` if the input shape is empty or has a zero dimension
    /// - `Io` if the network file does not exist
    /// - `Model` if ONNX Runtime rejects the file or a tensor name is unknown
    pub fn new(config: OnnxScorerConfig, runtime: &RuntimeConfig) -> Result<Self, PipelineError> {
        if config.input_shape.is_empty() || config.input_shape.contains(&0) {
            return Err(PipelineError::InvalidArgument(format!(
                "Invalid input shape {:?} for {}",
                config.input_shape, SCORE_ONNX_MODEL
            )));
        }
        if !config.model_path.exists() {
            return Err(PipelineError::io(
                &config.model_path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "network file not found"),
            ));
        }

        info!("Loading ONNX network from {:?}", config.model_path);
        let session = create_session_builder(runtime)?.commit_from_file(&config.model_path)?;
        Self::validate_model(&session, &config)?;

        Ok(Self {
            config,
            session: Arc::new(session),
        })
    }

    pub fn config(&self) -> &OnnxScorerConfig {
        &self.config
    }

    fn validate_model(session: &Session, config: &OnnxScorerConfig) -> Result<(), PipelineError> {
        if !session.inputs.iter().any(|i| i.name == config.input_tensor) {
            return Err(PipelineError::Model(format!(
                "Network has no input named '{}'",
                config.input_tensor
            )));
        }
        if !session.outputs.iter().any(|o| o.name == config.output_tensor) {
            return Err(PipelineError::Model(format!(
                "Network has no output named '{}'",
                config.output_tensor
            )));
        }
        Ok(())
    }

    fn score(&self, features: &Array1<f32>) -> Result<Array1<f32>, PipelineError> {
        let expected: usize = self.config.input_shape.iter().product();
        if features.len() != expected {
            return Err(PipelineError::FeatureMismatch {
                expected,
                got: features.len(),
            });
        }

        let mut shape = Vec::with_capacity(self.config.input_shape.len() + 1);
        shape.push(1);
        shape.extend_from_slice(&self.config.input_shape);
        let input = ArrayD::from_shape_vec(IxDyn(&shape), features.to_vec())
            .map_err(|e| PipelineError::Model(format!("Failed to create input array: {}", e)))?;
        let input = input.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert(self.config.input_tensor.as_str(), Tensor::from_array(&input)?);

        let outputs = self.session.run(input_tensors)?;
        let output = outputs[self.config.output_tensor.as_str()].try_extract_tensor::<f32>()?;
        debug!("Network output shape {:?}", output.shape());

        Ok(output.iter().copied().collect())
    }
}

impl Transform for ScoreOnnxModel {
    fn name(&self) -> &str {
        SCORE_ONNX_MODEL
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::feature(&self.config.input_column, ColumnKind::Vector)]
    }

    fn outputs(&self) -> Vec<Column> {
        vec![Column::new(&self.config.output_column, ColumnKind::Vector)]
    }

    fn fit(&self, _data: &Dataset) -> Result<Box<dyn FittedTransform>, PipelineError> {
        Ok(Box::new(self.clone()))
    }

    fn learns_from_data(&self) -> bool {
        false
    }
}

impl FittedTransform for ScoreOnnxModel {
    fn name(&self) -> &str {
        SCORE_ONNX_MODEL
    }

    fn inputs(&self) -> Vec<Column> {
        vec![Column::new(&self.config.input_column, ColumnKind::Vector)]
    }

    fn output_columns(&self) -> Vec<Column> {
        vec![Column::new(&self.config.output_column, ColumnKind::Vector)]
    }

    fn apply(&self, record: &Record) -> Result<Vec<(String, Value)>, PipelineError> {
        let scored = match field(SCORE_ONNX_MODEL, record, &self.config.input_column)? {
            Value::Vector(v) => self.score(v)?,
            other => {
                return Err(wrong_kind(
                    SCORE_ONNX_MODEL,
                    &self.config.input_column,
                    ColumnKind::Vector,
                    other,
                ))
            }
        };
        Ok(vec![(self.config.output_column.clone(), Value::Vector(scored))])
    }

    fn state(&self) -> Result<StepState, PipelineError> {
        Ok(StepState::ScoreOnnxModel(self.config.clone()))
    }
}
