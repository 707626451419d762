//! Composable supervised-classification pipelines.
//!
//! A data source produces labeled records, a splitter partitions them, a
//! [`TransformChain`] is fitted on the training partition and ends in a
//! trainer, [`evaluate`](evaluate::evaluate) reports quality metrics on the
//! held-out rows and a [`Predictor`] scores new records.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use labelflow::data::{columns, Dataset, Record, TextFileSource};
//! use labelflow::trainers::{LogisticRegression, TrainerStep};
//! use labelflow::transforms::FeaturizeText;
//! use labelflow::{PipelineContext, Predictor, TransformChain};
//!
//! let rows = vec![
//!     Record::new().with("text", "I love this phone").with("label", true),
//!     Record::new().with("text", "Great battery").with("label", true),
//!     Record::new().with("text", "Terrible screen").with("label", false),
//!     Record::new().with("text", "I hate the case").with("label", false),
//!     Record::new().with("text", "Great sound, love it").with("label", true),
//! ];
//! let data = Dataset::new(TextFileSource::schema(), rows)?;
//!
//! let ctx = PipelineContext::new(7);
//! let split = ctx.train_test_split(&data, 0.2)?;
//!
//! let chain = TransformChain::builder(TextFileSource::schema())
//!     .append(FeaturizeText::new(columns::FEATURES, columns::TEXT))?
//!     .append(TrainerStep::new(
//!         LogisticRegression::default(),
//!         columns::LABEL,
//!         columns::FEATURES,
//!     ))?
//!     .build()?;
//! let model = chain.fit(&split.train)?;
//!
//! let sentences = Dataset::from_records(vec![Record::new().with("text", "love it")])?;
//! for prediction in Predictor::new(&model).predict(&sentences)? {
//!     let prediction = prediction?;
//!     println!("{:?} {}", prediction.predicted_label, prediction.top_score());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod data;
pub mod evaluate;
pub mod pipeline;
pub mod predict;
mod runtime;
pub mod store;
pub mod trainers;
pub mod transforms;
mod utils;

pub use config::{ImageSettings, TrainerOptions};
pub use context::PipelineContext;
pub use data::{Dataset, Record, Schema, Value};
pub use evaluate::{evaluate, BinaryMetrics, Metrics, MulticlassMetrics};
pub use pipeline::{FittedChain, FittedTransform, PipelineError, Transform, TransformChain};
pub use predict::{PredictionResult, Predictor, Score};
pub use runtime::{create_session_builder, RuntimeConfig};
pub use store::{ModelError, ModelStore};

pub fn init_logger() {
    env_logger::init();
}
