//! Core traits for pipeline steps.
//!
//! This module defines the two central traits:
//! - [`Transform`]: the configured, unfitted step; declares its columns and
//!   learns from a training dataset.
//! - [`FittedTransform`]: the frozen step produced by fitting; maps records
//!   and can be written to a model archive.
//!
//! Stateless steps implement both traits on the same type and return a
//! clone of themselves from [`Transform::fit`].

use std::fmt;

use super::error::PipelineError;
use super::state::StepState;
use crate::data::{Column, ColumnKind, Dataset, Record, Value};

/// How a step uses one of its input columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Required whenever the step runs
    Feature,
    /// Required only while fitting; absent on unlabeled data
    Label,
}

/// An input column requirement declared by an unfitted step.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub name: String,
    pub kind: ColumnKind,
    pub role: Role,
}

impl Input {
    pub fn feature(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            role: Role::Feature,
        }
    }

    pub fn label(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            role: Role::Label,
        }
    }
}

/// A configured pipeline step that has not seen data yet.
pub trait Transform: fmt::Debug {
    /// Step name used in logs and error messages.
    fn name(&self) -> &str;

    /// Columns the step reads, with the kind it expects for each.
    fn inputs(&self) -> Vec<Input>;

    /// Columns the step writes. Key vocabularies are only known after fitting.
    fn outputs(&self) -> Vec<Column>;

    /// Learns the step's parameters from `data`.
    ///
    /// # Errors
    /// Returns [`PipelineError`] if:
    /// - an input column is missing or has the wrong kind
    /// - the data cannot support fitting (for example no usable rows)
    fn fit(&self, data: &Dataset) -> Result<Box<dyn FittedTransform>, PipelineError>;

    /// Whether [`Transform::fit`] reads rows. Steps that return `false` are
    /// fitted against an empty dataset carrying only the current schema, so
    /// the chain never materializes their input.
    fn learns_from_data(&self) -> bool {
        true
    }
}

/// A pipeline step with frozen parameters, ready to map records.
pub trait FittedTransform: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Columns that must be present whenever the step is applied.
    fn inputs(&self) -> Vec<Column>;

    /// Columns written by [`FittedTransform::apply`], including key vocabularies.
    fn output_columns(&self) -> Vec<Column>;

    /// Whether the step only rewrites the label and can be skipped on
    /// unlabeled data.
    fn label_only(&self) -> bool {
        false
    }

    /// Computes the step's output fields for one record. The returned fields
    /// are merged into the record, replacing same-name fields.
    fn apply(&self, record: &Record) -> Result<Vec<(String, Value)>, PipelineError>;

    /// Returns the persisted form of the step.
    fn state(&self) -> Result<StepState, PipelineError>;
}

/// Fetches an input field from a record, failing with a schema mismatch when
/// it is absent.
pub(crate) fn field<'a>(
    step: &str,
    record: &'a Record,
    name: &str,
) -> Result<&'a Value, PipelineError> {
    record
        .get(name)
        .ok_or_else(|| PipelineError::mismatch(step, name, "is missing from the record"))
}

/// Error for a field whose value is of an unexpected kind.
pub(crate) fn wrong_kind(step: &str, name: &str, expected: ColumnKind, found: &Value) -> PipelineError {
    let found = found
        .kind()
        .map(|k| k.to_string())
        .unwrap_or_else(|| "missing".to_string());
    PipelineError::mismatch(step, name, format!("expected {}, found {}", expected, found))
}
