use std::slice;
use std::sync::Arc;

use log::debug;

use crate::data::{columns, ColumnKind, Dataset, Record, Schema, Value};
use crate::pipeline::{wrong_kind, FittedChain, PipelineError, Plan};

const PREDICT: &str = "Predict";

/// Scores attached to one prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum Score {
    /// Raw margin and probability of the positive class
    Binary { score: f32, probability: f32 },
    /// One probability per class, in key order
    Multiclass(Vec<f32>),
}

impl Score {
    /// The probability of the predicted outcome: the positive-class
    /// probability for binary scores, the largest class probability otherwise.
    pub fn top_score(&self) -> f32 {
        match self {
            Score::Binary { probability, .. } => *probability,
            Score::Multiclass(scores) => scores.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        }
    }
}

/// One scored record.
#[derive(Debug, Clone)]
pub struct PredictionResult {
    /// The input record with every column the chain produced
    pub record: Record,
    pub predicted_label: Value,
    pub score: Score,
    vocabulary: Option<Arc<[String]>>,
}

impl PredictionResult {
    pub fn top_score(&self) -> f32 {
        self.score.top_score()
    }

    /// The predicted label as text, resolving keys through the label
    /// vocabulary.
    pub fn predicted_text(&self) -> Option<String> {
        match &self.predicted_label {
            Value::Bool(b) => Some(b.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Key(k) => self
                .vocabulary
                .as_ref()
                .and_then(|v| v.get(*k as usize))
                .cloned(),
            _ => None,
        }
    }
}

/// Runs a fitted chain over new records.
#[derive(Debug, Clone, Copy)]
pub struct Predictor<'a> {
    chain: &'a FittedChain,
}

impl<'a> Predictor<'a> {
    pub fn new(chain: &'a FittedChain) -> Self {
        Self { chain }
    }

    /// Returns a lazy iterator of predictions in input order. The plan is
    /// checked up front; per-record failures surface as `Err` items.
    ///
    /// # Errors
    /// - `SchemaMismatch` if `data` lacks a column the chain reads, or the
    ///   chain does not produce a predicted label and score
    pub fn predict(&self, data: &'a Dataset) -> Result<Predictions<'a>, PipelineError> {
        let plan = self.chain.plan(data.schema())?;
        let schema = plan.output_schema();
        for name in [columns::PREDICTED_LABEL, columns::SCORE] {
            if !schema.contains(name) {
                return Err(PipelineError::mismatch(
                    PREDICT,
                    name,
                    "is not produced by the chain",
                ));
            }
        }
        let vocabulary = schema
            .column(columns::PREDICTED_LABEL)
            .and_then(|c| c.key_values.clone())
            .map(Arc::from);
        debug!("Predicting {} rows", data.len());

        Ok(Predictions {
            chain: self.chain,
            plan,
            rows: data.iter(),
            vocabulary,
        })
    }
}

/// Iterator returned by [`Predictor::predict`].
#[derive(Debug)]
pub struct Predictions<'a> {
    chain: &'a FittedChain,
    plan: Plan,
    rows: slice::Iter<'a, Record>,
    vocabulary: Option<Arc<[String]>>,
}

impl Predictions<'_> {
    /// Schema of the records carried by the results.
    pub fn output_schema(&self) -> &Schema {
        self.plan.output_schema()
    }

    fn score(&self, record: &Record) -> Result<PredictionResult, PipelineError> {
        let out = self.chain.apply_record(&self.plan, record)?;
        let predicted_label = out
            .get(columns::PREDICTED_LABEL)
            .cloned()
            .unwrap_or(Value::Missing);

        let score = match (out.get(columns::SCORE), out.get(columns::PROBABILITY)) {
            (Some(Value::Float(score)), Some(Value::Float(probability))) => Score::Binary {
                score: *score,
                probability: *probability,
            },
            (Some(Value::Vector(scores)), _) => Score::Multiclass(scores.to_vec()),
            (Some(other), _) => {
                return Err(wrong_kind(PREDICT, columns::SCORE, ColumnKind::Vector, other))
            }
            (None, _) => {
                return Err(PipelineError::mismatch(
                    PREDICT,
                    columns::SCORE,
                    "is missing from the scored record",
                ))
            }
        };

        Ok(PredictionResult {
            record: out,
            predicted_label,
            score,
            vocabulary: self.vocabulary.clone(),
        })
    }
}

impl Iterator for Predictions<'_> {
    type Item = Result<PredictionResult, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.rows.next()?;
        Some(self.score(record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Predictions<'_> {}
