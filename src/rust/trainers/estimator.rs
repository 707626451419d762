use std::fmt;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::logistic::LogisticModel;
use super::maxent::SoftmaxModel;
use crate::data::ColumnKind;
use crate::pipeline::PipelineError;

/// The kind of prediction an estimator makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Binary,
    Multiclass,
}

impl Task {
    /// Kind of the label column this task trains on.
    pub fn label_kind(self) -> ColumnKind {
        match self {
            Task::Binary => ColumnKind::Bool,
            Task::Multiclass => ColumnKind::Key,
        }
    }
}

/// Training targets, one per feature row.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    Binary(Vec<bool>),
    Multiclass { classes: Vec<u32>, n_classes: usize },
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Binary(labels) => labels.len(),
            Targets::Multiclass { classes, .. } => classes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn task(&self) -> Task {
        match self {
            Targets::Binary(_) => Task::Binary,
            Targets::Multiclass { .. } => Task::Multiclass,
        }
    }
}

/// Output of a trained model for one feature vector.
#[derive(Debug, Clone, PartialEq)]
pub enum Scores {
    /// Raw margin and calibrated probability of the positive class
    Binary { margin: f32, probability: f32 },
    /// Class probabilities aligned to the label vocabulary
    Multiclass(Array1<f32>),
}

/// A trainable classifier.
///
/// Implement this to plug a custom learner into a [`TrainerStep`](super::TrainerStep).
pub trait Estimator: fmt::Debug {
    fn name(&self) -> &str;

    fn task(&self) -> Task;

    /// Learns from `features` (one row per example) and `targets`.
    ///
    /// # Errors
    /// - `InvalidArgument` if the targets do not match the task or the row count
    /// - `InsufficientData` if there are no rows
    fn fit(
        &self,
        features: ArrayView2<f32>,
        targets: &Targets,
    ) -> Result<Box<dyn TrainedModel>, PipelineError>;
}

/// A model produced by an [`Estimator`].
pub trait TrainedModel: fmt::Debug + Send + Sync {
    fn n_features(&self) -> usize;

    fn score(&self, features: ArrayView1<f32>) -> Result<Scores, PipelineError>;

    /// Persisted parameters; `None` when the model cannot be written to an
    /// archive.
    fn state(&self) -> Option<ModelState> {
        None
    }
}

/// Parameters of the built-in models.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelState {
    Logistic(LogisticModel),
    Softmax(SoftmaxModel),
}

impl ModelState {
    pub fn restore(self) -> Box<dyn TrainedModel> {
        match self {
            ModelState::Logistic(model) => Box::new(model),
            ModelState::Softmax(model) => Box::new(model),
        }
    }
}

/// Shared argument checks for the built-in estimators.
pub(crate) fn check_training_set(
    estimator: &str,
    task: Task,
    features: &ArrayView2<f32>,
    targets: &Targets,
) -> Result<(), PipelineError> {
    if targets.task() != task {
        return Err(PipelineError::InvalidArgument(format!(
            "{} expects {:?} targets, got {:?}",
            estimator,
            task,
            targets.task()
        )));
    }
    if features.nrows() == 0 {
        return Err(PipelineError::InsufficientData(format!(
            "{} needs at least one labeled row",
            estimator
        )));
    }
    if features.nrows() != targets.len() {
        return Err(PipelineError::InvalidArgument(format!(
            "{} got {} feature rows but {} targets",
            estimator,
            features.nrows(),
            targets.len()
        )));
    }
    Ok(())
}

pub(crate) fn check_width(expected: usize, features: &ArrayView1<f32>) -> Result<(), PipelineError> {
    if features.len() != expected {
        return Err(PipelineError::FeatureMismatch {
            expected,
            got: features.len(),
        });
    }
    Ok(())
}
