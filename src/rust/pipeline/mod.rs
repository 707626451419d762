//! Transform chains: construction-time schema checks, sequential fitting and
//! record-wise application.

mod chain;
mod error;
mod state;
mod transform;

pub use chain::{FittedChain, Plan, TransformChain, TransformChainBuilder};
pub use error::PipelineError;
pub use state::StepState;
pub use transform::{FittedTransform, Input, Role, Transform};

pub(crate) use transform::{field, wrong_kind};
