use log::{debug, info};

use super::error::PipelineError;
use super::transform::{FittedTransform, Input, Role, Transform};
use crate::data::{Dataset, Record, Schema};

/// An ordered, schema-checked sequence of transforms ending (usually) in a
/// trainer.
///
/// ```
/// use labelflow::data::{columns, TextFileSource};
/// use labelflow::trainers::{LogisticRegression, TrainerStep};
/// use labelflow::transforms::FeaturizeText;
/// use labelflow::TransformChain;
///
/// # fn main() -> Result<(), labelflow::PipelineError> {
/// let chain = TransformChain::builder(TextFileSource::schema())
///     .append(FeaturizeText::new(columns::FEATURES, columns::TEXT))?
///     .append(TrainerStep::new(
///         LogisticRegression::default(),
///         columns::LABEL,
///         columns::FEATURES,
///     ))?
///     .build()?;
/// assert_eq!(chain.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TransformChain {
    source: Schema,
    steps: Vec<Box<dyn Transform>>,
}

/// Builder that validates every appended step against the cumulative schema.
#[derive(Debug)]
pub struct TransformChainBuilder {
    source: Schema,
    schema: Schema,
    steps: Vec<Box<dyn Transform>>,
}

impl TransformChain {
    /// Starts a chain over data shaped like `source`.
    pub fn builder(source: Schema) -> TransformChainBuilder {
        TransformChainBuilder {
            schema: source.clone(),
            source,
            steps: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn source_schema(&self) -> &Schema {
        &self.source
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Fits every step in order. Step *i* is fitted on the training data as
    /// transformed by the already-fitted steps before it.
    ///
    /// Intermediate data is only built for steps that learn from rows, and
    /// then each record runs through the whole pending prefix before the next
    /// one starts. Large intermediate values (decoded images) are dropped as
    /// soon as a later step replaces them.
    ///
    /// # Errors
    /// - `InsufficientData` if `train` has no rows
    /// - any error raised by a step while fitting or applying
    pub fn fit(&self, train: &Dataset) -> Result<FittedChain, PipelineError> {
        if train.is_empty() {
            return Err(PipelineError::InsufficientData(
                "Cannot fit a pipeline on an empty training set".into(),
            ));
        }

        info!("Fitting {} steps on {} rows", self.steps.len(), train.len());
        let mut current = train.clone();
        // fitted steps already applied to `current`
        let mut applied = 0;
        let mut schema = current.schema().clone();
        let mut fitted: Vec<Box<dyn FittedTransform>> = Vec::with_capacity(self.steps.len());

        for (i, step) in self.steps.iter().enumerate() {
            for input in step.inputs() {
                check_input(step.name(), &schema, &input)?;
            }
            debug!("Fitting step {} ({})", i + 1, step.name());
            let fitted_step = if step.learns_from_data() {
                if applied < fitted.len() {
                    let pending = fitted[applied..].iter().map(|s| s.as_ref()).collect::<Vec<_>>();
                    current = apply_steps(&pending, &current)?;
                    applied = fitted.len();
                }
                step.fit(&current)?
            } else {
                step.fit(&Dataset::from_parts(schema.clone(), Vec::new()))?
            };
            for column in fitted_step.output_columns() {
                schema.upsert(column);
            }
            fitted.push(fitted_step);
        }

        Ok(FittedChain { steps: fitted })
    }
}

impl TransformChainBuilder {
    /// Appends a step after checking that every column it reads is produced by
    /// the source or an earlier step, with the expected kind.
    ///
    /// # Errors
    /// - `SchemaMismatch` naming the step and the offending column
    pub fn append(mut self, transform: impl Transform + 'static) -> Result<Self, PipelineError> {
        for input in transform.inputs() {
            check_input(transform.name(), &self.schema, &input)?;
        }
        for column in transform.outputs() {
            self.schema.upsert(column);
        }
        self.steps.push(Box::new(transform));
        Ok(self)
    }

    /// The schema produced by the steps appended so far.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn build(self) -> Result<TransformChain, PipelineError> {
        if self.steps.is_empty() {
            return Err(PipelineError::InvalidArgument(
                "A chain needs at least one step".into(),
            ));
        }
        Ok(TransformChain {
            source: self.source,
            steps: self.steps,
        })
    }
}

fn check_input(step: &str, schema: &Schema, input: &Input) -> Result<(), PipelineError> {
    let column = schema.column(&input.name).ok_or_else(|| {
        let reason = match input.role {
            Role::Feature => "is not produced by the source or any earlier step",
            Role::Label => "(label) is not produced by the source or any earlier step",
        };
        PipelineError::mismatch(step, &input.name, reason)
    })?;
    if column.kind != input.kind {
        return Err(PipelineError::mismatch(
            step,
            &input.name,
            format!("expected {}, found {}", input.kind, column.kind),
        ));
    }
    Ok(())
}

/// A fitted chain. Immutable; applies its frozen steps to any dataset whose
/// schema provides the columns the steps read.
#[derive(Debug)]
pub struct FittedChain {
    steps: Vec<Box<dyn FittedTransform>>,
}

/// The steps that will run for a given input schema, and the schema they
/// produce.
#[derive(Debug, Clone)]
pub struct Plan {
    active: Vec<usize>,
    schema: Schema,
}

impl Plan {
    pub fn output_schema(&self) -> &Schema {
        &self.schema
    }
}

impl FittedChain {
    pub(crate) fn from_steps(steps: Vec<Box<dyn FittedTransform>>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> impl Iterator<Item = &dyn FittedTransform> {
        self.steps.iter().map(|s| s.as_ref())
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Decides which steps run on data shaped like `input`. Label-only steps
    /// whose inputs are absent are skipped; any other missing column fails.
    pub fn plan(&self, input: &Schema) -> Result<Plan, PipelineError> {
        let steps = self.steps.iter().map(|s| s.as_ref()).collect::<Vec<_>>();
        plan_steps(&steps, input)
    }

    /// Applies the chain to every row of `data`, returning a new dataset.
    pub fn apply(&self, data: &Dataset) -> Result<Dataset, PipelineError> {
        let steps = self.steps.iter().map(|s| s.as_ref()).collect::<Vec<_>>();
        apply_steps(&steps, data)
    }

    /// Applies the steps selected by `plan` to a single record.
    pub fn apply_record(&self, plan: &Plan, record: &Record) -> Result<Record, PipelineError> {
        let mut out = record.clone();
        for &i in &plan.active {
            for (name, value) in self.steps[i].apply(&out)? {
                out.insert(name, value);
            }
        }
        Ok(out)
    }
}

fn plan_steps(steps: &[&dyn FittedTransform], input: &Schema) -> Result<Plan, PipelineError> {
    let mut schema = input.clone();
    let mut active = Vec::with_capacity(steps.len());

    for (i, step) in steps.iter().enumerate() {
        let inputs = step.inputs();
        let missing = inputs.iter().find(|c| !schema.contains(&c.name));
        if let Some(column) = missing {
            if step.label_only() {
                debug!("Skipping label step '{}': '{}' is absent", step.name(), column.name);
                continue;
            }
            return Err(PipelineError::mismatch(
                step.name(),
                &column.name,
                "is missing from the input",
            ));
        }
        for column in &inputs {
            if let Some(found) = schema.column(&column.name) {
                if found.kind != column.kind {
                    return Err(PipelineError::mismatch(
                        step.name(),
                        &column.name,
                        format!("expected {}, found {}", column.kind, found.kind),
                    ));
                }
            }
        }
        for column in step.output_columns() {
            schema.upsert(column);
        }
        active.push(i);
    }

    Ok(Plan { active, schema })
}

fn apply_steps(steps: &[&dyn FittedTransform], data: &Dataset) -> Result<Dataset, PipelineError> {
    let plan = plan_steps(steps, data.schema())?;
    let mut rows = Vec::with_capacity(data.len());
    for record in data {
        let mut out = record.clone();
        for &i in &plan.active {
            for (name, value) in steps[i].apply(&out)? {
                out.insert(name, value);
            }
        }
        rows.push(out);
    }
    Ok(Dataset::from_parts(plan.schema, rows))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::data::{Column, ColumnKind, Value};
    use crate::pipeline::StepState;

    /// Copies a text column and logs every fit and apply call.
    #[derive(Debug, Clone)]
    struct Trace {
        name: &'static str,
        input: &'static str,
        output: &'static str,
        learns: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Trace {
        fn new(
            name: &'static str,
            input: &'static str,
            output: &'static str,
            learns: bool,
            log: &Arc<Mutex<Vec<String>>>,
        ) -> Self {
            Self {
                name,
                input,
                output,
                learns,
                log: Arc::clone(log),
            }
        }
    }

    impl Transform for Trace {
        fn name(&self) -> &str {
            self.name
        }

        fn inputs(&self) -> Vec<Input> {
            vec![Input::feature(self.input, ColumnKind::Text)]
        }

        fn outputs(&self) -> Vec<Column> {
            vec![Column::new(self.output, ColumnKind::Text)]
        }

        fn fit(&self, data: &Dataset) -> Result<Box<dyn FittedTransform>, PipelineError> {
            self.log.lock().unwrap().push(format!("fit {} {}", self.name, data.len()));
            Ok(Box::new(self.clone()))
        }

        fn learns_from_data(&self) -> bool {
            self.learns
        }
    }

    impl FittedTransform for Trace {
        fn name(&self) -> &str {
            self.name
        }

        fn inputs(&self) -> Vec<Column> {
            vec![Column::new(self.input, ColumnKind::Text)]
        }

        fn output_columns(&self) -> Vec<Column> {
            vec![Column::new(self.output, ColumnKind::Text)]
        }

        fn apply(&self, record: &Record) -> Result<Vec<(String, Value)>, PipelineError> {
            let value = record.get(self.input).cloned().unwrap_or(Value::Missing);
            let text = value.as_text().unwrap_or_default().to_string();
            self.log.lock().unwrap().push(format!("{} {}", self.name, text));
            Ok(vec![(self.output.to_string(), value)])
        }

        fn state(&self) -> Result<StepState, PipelineError> {
            Err(PipelineError::NotPersistable(self.name.to_string()))
        }
    }

    #[test]
    fn test_fit_streams_records_through_stateless_prefix() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let data = Dataset::new(
            Schema::new(vec![Column::new("text", ColumnKind::Text)]),
            vec![
                Record::new().with("text", "x"),
                Record::new().with("text", "y"),
            ],
        )
        .unwrap();

        let chain = TransformChain::builder(data.schema().clone())
            .append(Trace::new("Load", "text", "a", false, &log))
            .unwrap()
            .append(Trace::new("Resize", "a", "b", false, &log))
            .unwrap()
            .append(Trace::new("Train", "b", "c", true, &log))
            .unwrap()
            .build()
            .unwrap();
        let fitted = chain.fit(&data).unwrap();
        assert_eq!(fitted.step_names(), vec!["Load", "Resize", "Train"]);

        // stateless steps never see rows, and each record finishes the
        // prefix before the next one starts
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "fit Load 0",
                "fit Resize 0",
                "Load x",
                "Resize x",
                "Load y",
                "Resize y",
                "fit Train 2",
            ]
        );
    }

    #[test]
    fn test_fit_does_not_apply_after_last_learning_step() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let data = Dataset::from_records(vec![Record::new().with("text", "x")]).unwrap();

        let chain = TransformChain::builder(data.schema().clone())
            .append(Trace::new("Train", "text", "a", true, &log))
            .unwrap()
            .append(Trace::new("Decode", "a", "b", false, &log))
            .unwrap()
            .build()
            .unwrap();
        chain.fit(&data).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["fit Train 1", "fit Decode 0"]);
    }
}
