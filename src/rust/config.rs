//! Settings shared by the workflows.

use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineError;

/// How images are prepared before they reach a feature-extraction network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    pub width: u32,
    pub height: u32,
    /// Subtracted from every channel value
    pub offset: f32,
    pub scale: f32,
    pub channels_last: bool,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            offset: 117.0,
            scale: 1.0,
            channels_last: true,
        }
    }
}

impl ImageSettings {
    /// Per-example input shape of the network, matching the pixel order.
    pub fn input_shape(&self) -> Vec<usize> {
        let (w, h) = (self.width as usize, self.height as usize);
        if self.channels_last {
            vec![h, w, 3]
        } else {
            vec![3, h, w]
        }
    }
}

/// Gradient descent settings for the reference estimators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainerOptions {
    pub learning_rate: f32,
    pub epochs: usize,
    /// L2 penalty applied to the weights, not the bias
    pub l2: f32,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            learning_rate: 1.0,
            epochs: 300,
            l2: 1e-4,
        }
    }
}

impl TrainerOptions {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "Learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.epochs == 0 {
            return Err(PipelineError::InvalidArgument(
                "At least one epoch is required".into(),
            ));
        }
        if !(self.l2.is_finite() && self.l2 >= 0.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "L2 penalty must be non-negative, got {}",
                self.l2
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_image_settings() {
        let settings = ImageSettings::default();
        assert_eq!((settings.width, settings.height), (224, 224));
        assert_eq!(settings.input_shape(), vec![224, 224, 3]);
    }

    #[test]
    fn test_trainer_options_validation() {
        assert!(TrainerOptions::default().validate().is_ok());
        let bad = TrainerOptions {
            epochs: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = TrainerOptions {
            learning_rate: f32::NAN,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
