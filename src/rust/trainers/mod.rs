//! Trainable estimators and the pipeline step that hosts them.
//!
//! [`Estimator`] is the seam for plugging in a learner. The two built-in
//! estimators are small gradient descent references:
//! - [`LogisticRegression`] for boolean labels
//! - [`MaximumEntropy`] for key labels with any number of classes

mod estimator;
mod logistic;
mod maxent;
mod step;

pub use estimator::{Estimator, ModelState, Scores, Targets, Task, TrainedModel};
pub use logistic::{LogisticModel, LogisticRegression};
pub use maxent::{MaximumEntropy, SoftmaxModel};
pub use step::{FittedTrainer, TrainerState, TrainerStep};
