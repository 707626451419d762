use serde::{Deserialize, Serialize};

use crate::data::{Column, ColumnKind, Dataset, Record, Value};
use crate::pipeline::{
    field, wrong_kind, FittedTransform, Input, PipelineError, StepState, Transform,
};
use crate::utils::normalize_vector;

const NORMALIZE_LP_NORM: &str = "NormalizeLpNorm";

/// Scales every vector of a column to unit L2 norm. Zero vectors stay zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeLpNorm {
    output: String,
    input: String,
}

impl NormalizeLpNorm {
    pub fn new(output: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            input: input.into(),
        }
    }
}

impl Transform for NormalizeLpNorm {
    fn name(&self) -> &str {
        NORMALIZE_LP_NORM
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::feature(&self.input, ColumnKind::Vector)]
    }

    fn outputs(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Vector)]
    }

    fn fit(&self, _data: &Dataset) -> Result<Box<dyn FittedTransform>, PipelineError> {
        Ok(Box::new(self.clone()))
    }

    fn learns_from_data(&self) -> bool {
        false
    }
}

impl FittedTransform for NormalizeLpNorm {
    fn name(&self) -> &str {
        NORMALIZE_LP_NORM
    }

    fn inputs(&self) -> Vec<Column> {
        vec![Column::new(&self.input, ColumnKind::Vector)]
    }

    fn output_columns(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Vector)]
    }

    fn apply(&self, record: &Record) -> Result<Vec<(String, Value)>, PipelineError> {
        let normalized = match field(NORMALIZE_LP_NORM, record, &self.input)? {
            Value::Vector(v) => normalize_vector(v),
            other => {
                return Err(wrong_kind(NORMALIZE_LP_NORM, &self.input, ColumnKind::Vector, other))
            }
        };
        Ok(vec![(self.output.clone(), Value::Vector(normalized))])
    }

    fn state(&self) -> Result<StepState, PipelineError> {
        Ok(StepState::NormalizeLpNorm(self.clone()))
    }
}
