//! Built-in pipeline steps.

mod image;
mod key;
mod normalize;
mod onnx;
mod text;

pub use image::{ExtractPixels, LoadImages, ResizeImages};
pub use key::{FittedKeyToValue, FittedValueToKey, MapKeyToValue, MapValueToKey};
pub use normalize::NormalizeLpNorm;
pub use onnx::{OnnxScorerConfig, ScoreOnnxModel};
pub use text::{FeaturizeText, FittedTextFeaturizer, TextFeaturizerOptions};
