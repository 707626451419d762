use log::{debug, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::estimator::{Estimator, ModelState, Scores, Targets, Task, TrainedModel};
use crate::data::{columns, Column, ColumnKind, Dataset, Record, Value};
use crate::pipeline::{
    field, wrong_kind, FittedTransform, Input, PipelineError, StepState, Transform,
};
use crate::utils::argmax;

/// Terminal pipeline step that trains an [`Estimator`] on a feature vector
/// column and a label column.
///
/// Binary estimators read a `Bool` label and write `predicted_label` (bool),
/// `score` (raw margin) and `probability`. Multiclass estimators read a `Key`
/// label and write `predicted_label` (key into the label vocabulary) and
/// `score` (one probability per class).
#[derive(Debug)]
pub struct TrainerStep {
    estimator: Box<dyn Estimator>,
    label: String,
    features: String,
}

impl TrainerStep {
    pub fn new(
        estimator: impl Estimator + 'static,
        label: impl Into<String>,
        features: impl Into<String>,
    ) -> Self {
        Self {
            estimator: Box::new(estimator),
            label: label.into(),
            features: features.into(),
        }
    }

    fn collect_training_set(
        &self,
        data: &Dataset,
        task: Task,
    ) -> Result<(Array2<f32>, Vec<Value>), PipelineError> {
        let mut width: Option<usize> = None;
        let mut flat: Vec<f32> = Vec::new();
        let mut labels = Vec::new();
        let mut skipped = 0usize;

        for record in data {
            let label = field(self.estimator.name(), record, &self.label)?;
            if label.is_missing() {
                skipped += 1;
                continue;
            }
            if label.kind() != Some(task.label_kind()) {
                return Err(wrong_kind(self.estimator.name(), &self.label, task.label_kind(), label));
            }
            let features = match field(self.estimator.name(), record, &self.features)? {
                Value::Vector(v) => v,
                other => {
                    return Err(wrong_kind(
                        self.estimator.name(),
                        &self.features,
                        ColumnKind::Vector,
                        other,
                    ))
                }
            };
            match width {
                None => width = Some(features.len()),
                Some(w) if w != features.len() => {
                    return Err(PipelineError::FeatureMismatch {
                        expected: w,
                        got: features.len(),
                    })
                }
                Some(_) => {}
            }
            flat.extend(features.iter().copied());
            labels.push(label.clone());
        }

        if skipped > 0 {
            warn!(
                "Skipped {} rows whose '{}' value is missing",
                skipped, self.label
            );
        }
        let width = width.ok_or_else(|| {
            PipelineError::InsufficientData(format!(
                "No labeled rows to train {} on",
                self.estimator.name()
            ))
        })?;
        let features = Array2::from_shape_vec((labels.len(), width), flat)
            .map_err(|e| PipelineError::InvalidArgument(e.to_string()))?;
        Ok((features, labels))
    }
}

impl Transform for TrainerStep {
    fn name(&self) -> &str {
        self.estimator.name()
    }

    fn inputs(&self) -> Vec<Input> {
        vec![
            Input::feature(&self.features, ColumnKind::Vector),
            Input::label(&self.label, self.estimator.task().label_kind()),
        ]
    }

    fn outputs(&self) -> Vec<Column> {
        output_columns(self.estimator.task(), None)
    }

    fn fit(&self, data: &Dataset) -> Result<Box<dyn FittedTransform>, PipelineError> {
        let task = self.estimator.task();
        let label_values = match task {
            Task::Binary => None,
            Task::Multiclass => Some(
                data.schema()
                    .column(&self.label)
                    .and_then(|c| c.key_values.clone())
                    .ok_or_else(|| {
                        PipelineError::mismatch(self.name(), &self.label, "carries no key vocabulary")
                    })?,
            ),
        };

        let (features, labels) = self.collect_training_set(data, task)?;
        let targets = match &label_values {
            None => Targets::Binary(labels.iter().filter_map(Value::as_bool).collect()),
            Some(values) => Targets::Multiclass {
                classes: labels.iter().filter_map(Value::as_key).collect(),
                n_classes: values.len(),
            },
        };
        debug!(
            "Training set for '{}': {} rows, {} features",
            self.name(),
            features.nrows(),
            features.ncols()
        );

        let model = self.estimator.fit(features.view(), &targets)?;
        Ok(Box::new(FittedTrainer {
            estimator: self.estimator.name().to_string(),
            task,
            label: self.label.clone(),
            features: self.features.clone(),
            label_values,
            model,
        }))
    }
}

fn output_columns(task: Task, label_values: Option<&[String]>) -> Vec<Column> {
    match task {
        Task::Binary => vec![
            Column::new(columns::PREDICTED_LABEL, ColumnKind::Bool),
            Column::new(columns::SCORE, ColumnKind::Float),
            Column::new(columns::PROBABILITY, ColumnKind::Float),
        ],
        Task::Multiclass => {
            let mut predicted = Column::new(columns::PREDICTED_LABEL, ColumnKind::Key);
            if let Some(values) = label_values {
                predicted = predicted.with_key_values(values.to_vec());
            }
            vec![predicted, Column::new(columns::SCORE, ColumnKind::Vector)]
        }
    }
}

/// A trained model wired to its input and output columns.
#[derive(Debug)]
pub struct FittedTrainer {
    estimator: String,
    task: Task,
    label: String,
    features: String,
    label_values: Option<Vec<String>>,
    model: Box<dyn TrainedModel>,
}

/// Persisted form of a [`FittedTrainer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerState {
    pub estimator: String,
    pub task: Task,
    pub label: String,
    pub features: String,
    pub label_values: Option<Vec<String>>,
    pub model: ModelState,
}

impl FittedTrainer {
    pub fn from_state(state: TrainerState) -> Self {
        Self {
            estimator: state.estimator,
            task: state.task,
            label: state.label,
            features: state.features,
            label_values: state.label_values,
            model: state.model.restore(),
        }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Vocabulary of the multiclass label, in key order.
    pub fn label_values(&self) -> Option<&[String]> {
        self.label_values.as_deref()
    }

    pub fn model(&self) -> &dyn TrainedModel {
        self.model.as_ref()
    }
}

impl FittedTransform for FittedTrainer {
    fn name(&self) -> &str {
        &self.estimator
    }

    fn inputs(&self) -> Vec<Column> {
        vec![Column::new(&self.features, ColumnKind::Vector)]
    }

    fn output_columns(&self) -> Vec<Column> {
        output_columns(self.task, self.label_values.as_deref())
    }

    fn apply(&self, record: &Record) -> Result<Vec<(String, Value)>, PipelineError> {
        let features = match field(&self.estimator, record, &self.features)? {
            Value::Vector(v) => v,
            other => return Err(wrong_kind(&self.estimator, &self.features, ColumnKind::Vector, other)),
        };

        Ok(match self.model.score(features.view())? {
            Scores::Binary { margin, probability } => vec![
                (columns::PREDICTED_LABEL.to_string(), Value::Bool(margin > 0.0)),
                (columns::SCORE.to_string(), Value::Float(margin)),
                (columns::PROBABILITY.to_string(), Value::Float(probability)),
            ],
            Scores::Multiclass(probabilities) => {
                let predicted = probabilities
                    .as_slice()
                    .and_then(argmax)
                    .map(|k| Value::Key(k as u32))
                    .unwrap_or(Value::Missing);
                vec![
                    (columns::PREDICTED_LABEL.to_string(), predicted),
                    (columns::SCORE.to_string(), Value::Vector(probabilities)),
                ]
            }
        })
    }

    fn state(&self) -> Result<StepState, PipelineError> {
        let model = self
            .model
            .state()
            .ok_or_else(|| PipelineError::NotPersistable(self.estimator.clone()))?;
        Ok(StepState::Trainer(TrainerState {
            estimator: self.estimator.clone(),
            task: self.task,
            label: self.label.clone(),
            features: self.features.clone(),
            label_values: self.label_values.clone(),
            model,
        }))
    }
}
