//! Quality metrics for a fitted chain on held-out data.
//!
//! Probabilities are clamped to `[1e-15, 1 - 1e-15]` before any logarithm,
//! so no metric is NaN or infinite. Classes without rows report 0.0.

use std::fmt;

use log::{debug, info, warn};

use crate::data::{columns, ColumnKind, Dataset, Value};
use crate::pipeline::{wrong_kind, FittedChain, PipelineError};
use crate::utils::{clamped_log_loss, PROBABILITY_EPSILON};

const EVALUATE: &str = "Evaluate";

/// Metrics for a boolean label.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMetrics {
    pub accuracy: f64,
    /// Area under the ROC curve; `None` when the test set holds a single class
    pub auc: Option<f64>,
    pub f1_score: f64,
    pub precision: f64,
    pub recall: f64,
    pub log_loss: f64,
    pub log_loss_reduction: f64,
    /// Mean log-loss of the `false` rows, then of the `true` rows
    pub per_class_log_loss: [f64; 2],
}

/// Metrics for a key label.
#[derive(Debug, Clone, PartialEq)]
pub struct MulticlassMetrics {
    pub micro_accuracy: f64,
    /// Mean per-class accuracy over the classes present in the test set
    pub macro_accuracy: f64,
    pub log_loss: f64,
    pub log_loss_reduction: f64,
    /// One entry per vocabulary value, in key order
    pub per_class_log_loss: Vec<f64>,
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Metrics {
    Binary(BinaryMetrics),
    Multiclass(MulticlassMetrics),
}

impl Metrics {
    pub fn accuracy(&self) -> f64 {
        match self {
            Metrics::Binary(m) => m.accuracy,
            Metrics::Multiclass(m) => m.micro_accuracy,
        }
    }

    pub fn log_loss(&self) -> f64 {
        match self {
            Metrics::Binary(m) => m.log_loss,
            Metrics::Multiclass(m) => m.log_loss,
        }
    }

    pub fn as_binary(&self) -> Option<&BinaryMetrics> {
        match self {
            Metrics::Binary(m) => Some(m),
            Metrics::Multiclass(_) => None,
        }
    }

    pub fn as_multiclass(&self) -> Option<&MulticlassMetrics> {
        match self {
            Metrics::Binary(_) => None,
            Metrics::Multiclass(m) => Some(m),
        }
    }
}

/// Applies `chain` to `test` and compares the `predicted` column with the
/// `label` column. The label kind decides which metrics are computed.
///
/// # Errors
/// - `InsufficientData` if no row of `test` carries a label
/// - `SchemaMismatch` if the label is neither boolean nor key
/// - any error raised while applying the chain
pub fn evaluate(
    chain: &FittedChain,
    test: &Dataset,
    label: &str,
    predicted: &str,
) -> Result<Metrics, PipelineError> {
    info!("Evaluating on {} rows", test.len());
    let scored = chain.apply(test)?;
    evaluate_scored(&scored, label, predicted)
}

/// Computes metrics on a dataset the chain has already been applied to.
pub fn evaluate_scored(scored: &Dataset, label: &str, predicted: &str) -> Result<Metrics, PipelineError> {
    let kind = scored
        .schema()
        .column(label)
        .map(|c| c.kind)
        .ok_or_else(|| PipelineError::mismatch(EVALUATE, label, "is missing from the scored data"))?;
    match kind {
        ColumnKind::Bool => binary_metrics(scored, label, predicted).map(Metrics::Binary),
        ColumnKind::Key => multiclass_metrics(scored, label, predicted).map(Metrics::Multiclass),
        other => Err(PipelineError::mismatch(
            EVALUATE,
            label,
            format!("expected bool or key, found {}", other),
        )),
    }
}

fn mean(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    mean(numerator as f64, denominator)
}

/// Entropy of the empirical class distribution, the log-loss of a model that
/// always predicts the prior.
fn prior_log_loss(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.ln()
        })
        .sum()
}

fn warn_skipped(skipped: usize, label: &str) {
    if skipped > 0 {
        warn!("Skipped {} rows whose '{}' value is missing", skipped, label);
    }
}

fn reduction(log_loss: f64, prior: f64) -> f64 {
    // a single-class test set has no prior uncertainty to reduce
    if prior >= PROBABILITY_EPSILON {
        (prior - log_loss) / prior
    } else {
        0.0
    }
}

/// Binary metrics over the `label`, `predicted` and probability columns.
pub fn binary_metrics(scored: &Dataset, label: &str, predicted: &str) -> Result<BinaryMetrics, PipelineError> {
    let labels = scored.column(label)?;
    let predictions = scored.column(predicted)?;
    let probabilities = scored.column(columns::PROBABILITY)?;

    let mut rows: Vec<(bool, f64)> = Vec::with_capacity(labels.len());
    let (mut tp, mut fp, mut fn_, mut correct) = (0usize, 0usize, 0usize, 0usize);
    let mut skipped = 0usize;
    for ((l, p), prob) in labels.into_iter().zip(predictions).zip(probabilities) {
        let truth = match l {
            Value::Bool(b) => *b,
            Value::Missing => {
                skipped += 1;
                continue;
            }
            other => return Err(wrong_kind(EVALUATE, label, ColumnKind::Bool, other)),
        };
        let guess = match p {
            Value::Bool(b) => *b,
            other => return Err(wrong_kind(EVALUATE, predicted, ColumnKind::Bool, other)),
        };
        let probability = match prob {
            Value::Float(f) => *f as f64,
            other => return Err(wrong_kind(EVALUATE, columns::PROBABILITY, ColumnKind::Float, other)),
        };

        match (truth, guess) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
        if truth == guess {
            correct += 1;
        }
        rows.push((truth, probability));
    }
    warn_skipped(skipped, label);

    if rows.is_empty() {
        return Err(PipelineError::InsufficientData(
            "No labeled rows to evaluate".into(),
        ));
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    let mut class_loss = [0.0f64; 2];
    let mut class_count = [0usize; 2];
    for &(truth, p) in &rows {
        let loss = clamped_log_loss(if truth { p } else { 1.0 - p });
        class_loss[truth as usize] += loss;
        class_count[truth as usize] += 1;
    }
    let log_loss = mean(class_loss[0] + class_loss[1], rows.len());

    let metrics = BinaryMetrics {
        accuracy: ratio(correct, rows.len()),
        auc: area_under_roc(&rows),
        f1_score,
        precision,
        recall,
        log_loss,
        log_loss_reduction: reduction(log_loss, prior_log_loss(&class_count)),
        per_class_log_loss: [
            mean(class_loss[0], class_count[0]),
            mean(class_loss[1], class_count[1]),
        ],
    };
    debug!("{:?}", metrics);
    Ok(metrics)
}

/// Mann-Whitney estimate of the AUC, with tied scores sharing their average
/// rank.
fn area_under_roc(rows: &[(bool, f64)]) -> Option<f64> {
    let positives = rows.iter().filter(|(t, _)| *t).count();
    let negatives = rows.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| rows[a].1.total_cmp(&rows[b].1));

    let mut positive_rank_sum = 0.0f64;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && rows[order[end]].1 == rows[order[start]].1 {
            end += 1;
        }
        // ranks are 1-based; the tie group spans ranks start+1..=end
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end].iter().filter(|&&i| rows[i].0).count();
        positive_rank_sum += average_rank * tied_positives as f64;
        start = end;
    }

    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

/// Multiclass metrics over the `label`, `predicted` and score columns.
pub fn multiclass_metrics(
    scored: &Dataset,
    label: &str,
    predicted: &str,
) -> Result<MulticlassMetrics, PipelineError> {
    let class_names = scored
        .schema()
        .column(label)
        .and_then(|c| c.key_values.clone())
        .or_else(|| scored.schema().column(predicted).and_then(|c| c.key_values.clone()))
        .ok_or_else(|| PipelineError::mismatch(EVALUATE, label, "carries no key vocabulary"))?;
    let n_classes = class_names.len();

    let labels = scored.column(label)?;
    let predictions = scored.column(predicted)?;
    let scores = scored.column(columns::SCORE)?;

    let mut class_loss = vec![0.0f64; n_classes];
    let mut class_count = vec![0usize; n_classes];
    let mut class_correct = vec![0usize; n_classes];
    let (mut rows, mut correct, mut total_loss) = (0usize, 0usize, 0.0f64);
    let mut skipped = 0usize;

    for ((l, p), s) in labels.into_iter().zip(predictions).zip(scores) {
        let truth = match l {
            Value::Key(k) => *k as usize,
            Value::Missing => {
                skipped += 1;
                continue;
            }
            other => return Err(wrong_kind(EVALUATE, label, ColumnKind::Key, other)),
        };
        if truth >= n_classes {
            return Err(PipelineError::mismatch(
                EVALUATE,
                label,
                format!("key {} is outside of the {} classes", truth, n_classes),
            ));
        }
        let guess = match p {
            Value::Key(k) => Some(*k as usize),
            Value::Missing => None,
            other => return Err(wrong_kind(EVALUATE, predicted, ColumnKind::Key, other)),
        };
        let probability = match s {
            Value::Vector(v) => v.get(truth).copied().unwrap_or(0.0) as f64,
            other => return Err(wrong_kind(EVALUATE, columns::SCORE, ColumnKind::Vector, other)),
        };

        let loss = clamped_log_loss(probability);
        total_loss += loss;
        class_loss[truth] += loss;
        class_count[truth] += 1;
        if guess == Some(truth) {
            correct += 1;
            class_correct[truth] += 1;
        }
        rows += 1;
    }
    warn_skipped(skipped, label);

    if rows == 0 {
        return Err(PipelineError::InsufficientData(
            "No labeled rows to evaluate".into(),
        ));
    }

    let present: Vec<usize> = (0..n_classes).filter(|&c| class_count[c] > 0).collect();
    let macro_accuracy = mean(
        present.iter().map(|&c| ratio(class_correct[c], class_count[c])).sum(),
        present.len(),
    );
    let log_loss = mean(total_loss, rows);

    let metrics = MulticlassMetrics {
        micro_accuracy: ratio(correct, rows),
        macro_accuracy,
        log_loss,
        log_loss_reduction: reduction(log_loss, prior_log_loss(&class_count)),
        per_class_log_loss: (0..n_classes)
            .map(|c| mean(class_loss[c], class_count[c]))
            .collect(),
        class_names,
    };
    debug!("{:?}", metrics);
    Ok(metrics)
}

fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

impl fmt::Display for BinaryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model quality metrics evaluation")?;
        writeln!(f, "--------------------------------")?;
        writeln!(f, "Accuracy: {}", percent(self.accuracy))?;
        match self.auc {
            Some(auc) => writeln!(f, "Auc: {}", percent(auc))?,
            None => writeln!(f, "Auc: n/a (single class)")?,
        }
        writeln!(f, "F1Score: {}", percent(self.f1_score))?;
        write!(f, "LogLoss: {:.5}", self.log_loss)
    }
}

impl fmt::Display for MulticlassMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MicroAccuracy is: {}", percent(self.micro_accuracy))?;
        writeln!(f, "MacroAccuracy is: {}", percent(self.macro_accuracy))?;
        writeln!(f, "LogLoss is: {}", self.log_loss)?;
        let per_class = self
            .per_class_log_loss
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(" , ");
        write!(f, "PerClassLogLoss is: {}", per_class)
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metrics::Binary(m) => fmt::Display::fmt(m, f),
            Metrics::Multiclass(m) => fmt::Display::fmt(m, f),
        }
    }
}
