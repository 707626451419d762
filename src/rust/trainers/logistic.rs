use log::{debug, info};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::estimator::{check_training_set, check_width, Estimator, ModelState, Scores, Targets, Task, TrainedModel};
use crate::config::TrainerOptions;
use crate::pipeline::PipelineError;
use crate::utils::{clamped_log_loss, sigmoid};

/// Binary logistic regression fitted with full-batch gradient descent.
#[derive(Debug, Clone, Default)]
pub struct LogisticRegression {
    options: TrainerOptions,
}

impl LogisticRegression {
    pub fn new(options: TrainerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }
}

impl Estimator for LogisticRegression {
    fn name(&self) -> &str {
        "LogisticRegression"
    }

    fn task(&self) -> Task {
        Task::Binary
    }

    fn fit(
        &self,
        features: ArrayView2<f32>,
        targets: &Targets,
    ) -> Result<Box<dyn TrainedModel>, PipelineError> {
        self.options.validate()?;
        check_training_set(self.name(), Task::Binary, &features, targets)?;
        let Targets::Binary(labels) = targets else {
            return Err(PipelineError::InvalidArgument(
                "LogisticRegression needs boolean labels".into(),
            ));
        };

        let n = features.nrows() as f32;
        let y: Array1<f32> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        let positives = labels.iter().filter(|&&l| l).count();
        info!(
            "Training {} on {} rows x {} features ({} positive)",
            self.name(),
            features.nrows(),
            features.ncols(),
            positives
        );

        let TrainerOptions { learning_rate, epochs, l2 } = self.options;
        let mut weights = Array1::<f32>::zeros(features.ncols());
        let mut bias = 0.0f32;

        for epoch in 0..epochs {
            let probabilities = (features.dot(&weights) + bias).mapv(sigmoid);
            let errors = &probabilities - &y;

            let grad_w = features.t().dot(&errors) / n + &weights * l2;
            let grad_b = errors.sum() / n;
            weights.scaled_add(-learning_rate, &grad_w);
            bias -= learning_rate * grad_b;

            if epoch % 50 == 0 || epoch + 1 == epochs {
                let loss = probabilities
                    .iter()
                    .zip(labels)
                    .map(|(&p, &l)| clamped_log_loss(if l { p as f64 } else { 1.0 - p as f64 }))
                    .sum::<f64>()
                    / n as f64;
                debug!("epoch {}: log-loss {:.5}", epoch, loss);
            }
        }

        Ok(Box::new(LogisticModel { weights, bias }))
    }
}

/// Weights and bias of a trained [`LogisticRegression`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Array1<f32>,
    pub bias: f32,
}

impl TrainedModel for LogisticModel {
    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn score(&self, features: ArrayView1<f32>) -> Result<Scores, PipelineError> {
        check_width(self.weights.len(), &features)?;
        let margin = features.dot(&self.weights) + self.bias;
        Ok(Scores::Binary {
            margin,
            probability: sigmoid(margin),
        })
    }

    fn state(&self) -> Option<ModelState> {
        Some(ModelState::Logistic(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn separable() -> (Array2<f32>, Targets) {
        let x = array![[1.0, 0.0], [0.9, 0.1], [0.0, 1.0], [0.1, 0.9]];
        (x, Targets::Binary(vec![true, true, false, false]))
    }

    #[test]
    fn test_learns_separable_data() {
        let (x, y) = separable();
        let model = LogisticRegression::default().fit(x.view(), &y).unwrap();
        match model.score(array![1.0, 0.0].view()).unwrap() {
            Scores::Binary { margin, probability } => {
                assert!(margin > 0.0);
                assert!(probability > 0.5);
            }
            other => panic!("unexpected scores {:?}", other),
        }
        match model.score(array![0.0, 1.0].view()).unwrap() {
            Scores::Binary { probability, .. } => assert!(probability < 0.5),
            other => panic!("unexpected scores {:?}", other),
        }
    }

    #[test]
    fn test_training_is_deterministic() {
        let (x, y) = separable();
        let a = LogisticRegression::default().fit(x.view(), &y).unwrap();
        let b = LogisticRegression::default().fit(x.view(), &y).unwrap();
        assert_eq!(
            a.score(array![0.5, 0.5].view()).unwrap(),
            b.score(array![0.5, 0.5].view()).unwrap()
        );
    }

    #[test]
    fn test_rejects_multiclass_targets() {
        let (x, _) = separable();
        let targets = Targets::Multiclass {
            classes: vec![0, 1, 0, 1],
            n_classes: 2,
        };
        assert!(LogisticRegression::default().fit(x.view(), &targets).is_err());
    }

    #[test]
    fn test_score_checks_width() {
        let (x, y) = separable();
        let model = LogisticRegression::default().fit(x.view(), &y).unwrap();
        let err = model.score(array![1.0].view()).unwrap_err();
        assert!(matches!(err, PipelineError::FeatureMismatch { expected: 2, got: 1 }));
    }
}
