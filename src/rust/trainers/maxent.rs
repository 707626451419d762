use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::estimator::{check_training_set, check_width, Estimator, ModelState, Scores, Targets, Task, TrainedModel};
use crate::config::TrainerOptions;
use crate::pipeline::PipelineError;
use crate::utils::{clamped_log_loss, softmax_inplace};

/// Multinomial logistic regression (maximum entropy) over key labels.
#[derive(Debug, Clone, Default)]
pub struct MaximumEntropy {
    options: TrainerOptions,
}

impl MaximumEntropy {
    pub fn new(options: TrainerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }
}

impl Estimator for MaximumEntropy {
    fn name(&self) -> &str {
        "MaximumEntropy"
    }

    fn task(&self) -> Task {
        Task::Multiclass
    }

    fn fit(
        &self,
        features: ArrayView2<f32>,
        targets: &Targets,
    ) -> Result<Box<dyn TrainedModel>, PipelineError> {
        self.options.validate()?;
        check_training_set(self.name(), Task::Multiclass, &features, targets)?;
        let Targets::Multiclass { classes, n_classes } = targets else {
            return Err(PipelineError::InvalidArgument(
                "MaximumEntropy needs key labels".into(),
            ));
        };
        let n_classes = *n_classes;
        if n_classes == 0 {
            return Err(PipelineError::InsufficientData(
                "MaximumEntropy needs at least one class".into(),
            ));
        }

        let mut one_hot = Array2::<f32>::zeros((classes.len(), n_classes));
        for (row, &class) in classes.iter().enumerate() {
            if class as usize >= n_classes {
                return Err(PipelineError::InvalidArgument(format!(
                    "Class {} is outside of the {} known classes",
                    class, n_classes
                )));
            }
            one_hot[[row, class as usize]] = 1.0;
        }

        info!(
            "Training {} on {} rows x {} features, {} classes",
            self.name(),
            features.nrows(),
            features.ncols(),
            n_classes
        );

        let n = features.nrows() as f32;
        let TrainerOptions { learning_rate, epochs, l2 } = self.options;
        let mut weights = Array2::<f32>::zeros((n_classes, features.ncols()));
        let mut bias = Array1::<f32>::zeros(n_classes);

        for epoch in 0..epochs {
            let mut probabilities = features.dot(&weights.t()) + &bias;
            for row in probabilities.rows_mut() {
                softmax_inplace(row);
            }
            let errors = &probabilities - &one_hot;

            let grad_w = errors.t().dot(&features) / n + &weights * l2;
            let grad_b = errors.sum_axis(Axis(0)) / n;
            weights.scaled_add(-learning_rate, &grad_w);
            bias.scaled_add(-learning_rate, &grad_b);

            if epoch % 50 == 0 || epoch + 1 == epochs {
                let loss = classes
                    .iter()
                    .enumerate()
                    .map(|(row, &class)| clamped_log_loss(probabilities[[row, class as usize]] as f64))
                    .sum::<f64>()
                    / n as f64;
                debug!("epoch {}: log-loss {:.5}", epoch, loss);
            }
        }

        Ok(Box::new(SoftmaxModel { weights, bias }))
    }
}

/// Per-class weights (one row per class) and biases of a trained
/// [`MaximumEntropy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxModel {
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl TrainedModel for SoftmaxModel {
    fn n_features(&self) -> usize {
        self.weights.ncols()
    }

    fn score(&self, features: ArrayView1<f32>) -> Result<Scores, PipelineError> {
        check_width(self.weights.ncols(), &features)?;
        let mut probabilities = self.weights.dot(&features) + &self.bias;
        softmax_inplace(probabilities.view_mut());
        Ok(Scores::Multiclass(probabilities))
    }

    fn state(&self) -> Option<ModelState> {
        Some(ModelState::Softmax(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::argmax;
    use ndarray::array;

    #[test]
    fn test_learns_three_classes() {
        let x = array![
            [1.0, 0.0, 0.0],
            [0.9, 0.1, 0.0],
            [0.0, 1.0, 0.0],
            [0.1, 0.9, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.1, 0.9]
        ];
        let y = Targets::Multiclass {
            classes: vec![0, 0, 1, 1, 2, 2],
            n_classes: 3,
        };
        let model = MaximumEntropy::default().fit(x.view(), &y).unwrap();
        for (input, expected) in [
            ([1.0f32, 0.0, 0.0], 0usize),
            ([0.0, 1.0, 0.0], 1),
            ([0.0, 0.0, 1.0], 2),
        ] {
            match model.score(ArrayView1::from(&input)).unwrap() {
                Scores::Multiclass(p) => {
                    assert!((p.sum() - 1.0).abs() < 1e-5);
                    assert_eq!(argmax(p.as_slice().unwrap()), Some(expected));
                }
                other => panic!("unexpected scores {:?}", other),
            }
        }
    }

    #[test]
    fn test_rejects_out_of_range_class() {
        let x = array![[1.0], [0.0]];
        let y = Targets::Multiclass {
            classes: vec![0, 5],
            n_classes: 2,
        };
        let err = MaximumEntropy::default().fit(x.view(), &y).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
    }

    #[test]
    fn test_empty_training_set() {
        let x = Array2::<f32>::zeros((0, 3));
        let y = Targets::Multiclass {
            classes: vec![],
            n_classes: 2,
        };
        let err = MaximumEntropy::default().fit(x.view(), &y).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(_)));
    }
}
