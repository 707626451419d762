//! Conversion between text values and key indices.
//!
//! [`MapValueToKey`] learns a sorted vocabulary from the training data and
//! replaces each value with its index; [`MapKeyToValue`] maps indices back
//! using the vocabulary carried by the key column.

use std::collections::BTreeSet;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::{Column, ColumnKind, Dataset, Record, Value};
use crate::pipeline::{
    field, wrong_kind, FittedTransform, Input, PipelineError, StepState, Transform,
};

/// Maps a text column onto key indices.
#[derive(Debug, Clone)]
pub struct MapValueToKey {
    output: String,
    input: String,
    label_only: bool,
}

impl MapValueToKey {
    pub fn new(output: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            input: input.into(),
            label_only: false,
        }
    }

    /// Marks the input as a label: required for fitting, skipped when absent
    /// at prediction time.
    pub fn as_label(mut self) -> Self {
        self.label_only = true;
        self
    }
}

impl Transform for MapValueToKey {
    fn name(&self) -> &str {
        "MapValueToKey"
    }

    fn inputs(&self) -> Vec<Input> {
        if self.label_only {
            vec![Input::label(&self.input, ColumnKind::Text)]
        } else {
            vec![Input::feature(&self.input, ColumnKind::Text)]
        }
    }

    fn outputs(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Key)]
    }

    fn fit(&self, data: &Dataset) -> Result<Box<dyn FittedTransform>, PipelineError> {
        let mut values = BTreeSet::new();
        for value in data.column(&self.input)? {
            match value {
                Value::Text(s) => {
                    values.insert(s.clone());
                }
                Value::Missing => {}
                other => return Err(wrong_kind(self.name(), &self.input, ColumnKind::Text, other)),
            }
        }
        if values.is_empty() {
            return Err(PipelineError::InsufficientData(format!(
                "Column '{}' has no values to build a key vocabulary from",
                self.input
            )));
        }
        debug!("Key vocabulary for '{}': {:?}", self.input, values);

        Ok(Box::new(FittedValueToKey {
            output: self.output.clone(),
            input: self.input.clone(),
            values: values.into_iter().collect(),
            label_only: self.label_only,
        }))
    }
}

/// Fitted [`MapValueToKey`]. The vocabulary is sorted, so lookups are binary
/// searches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedValueToKey {
    output: String,
    input: String,
    values: Vec<String>,
    label_only: bool,
}

impl FittedValueToKey {
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn key_of(&self, value: &str) -> Option<u32> {
        self.values
            .binary_search_by(|v| v.as_str().cmp(value))
            .ok()
            .map(|i| i as u32)
    }
}

impl FittedTransform for FittedValueToKey {
    fn name(&self) -> &str {
        "MapValueToKey"
    }

    fn inputs(&self) -> Vec<Column> {
        vec![Column::new(&self.input, ColumnKind::Text)]
    }

    fn output_columns(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Key).with_key_values(self.values.clone())]
    }

    fn label_only(&self) -> bool {
        self.label_only
    }

    fn apply(&self, record: &Record) -> Result<Vec<(String, Value)>, PipelineError> {
        let key = match field(self.name(), record, &self.input)? {
            Value::Text(s) => self.key_of(s).map(Value::Key).unwrap_or(Value::Missing),
            Value::Missing => Value::Missing,
            other => return Err(wrong_kind(self.name(), &self.input, ColumnKind::Text, other)),
        };
        Ok(vec![(self.output.clone(), key)])
    }

    fn state(&self) -> Result<StepState, PipelineError> {
        Ok(StepState::ValueToKey(self.clone()))
    }
}

/// Maps a key column back to its text values.
#[derive(Debug, Clone)]
pub struct MapKeyToValue {
    output: String,
    input: String,
}

impl MapKeyToValue {
    pub fn new(output: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            input: input.into(),
        }
    }
}

impl Transform for MapKeyToValue {
    fn name(&self) -> &str {
        "MapKeyToValue"
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::feature(&self.input, ColumnKind::Key)]
    }

    fn outputs(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Text)]
    }

    fn fit(&self, data: &Dataset) -> Result<Box<dyn FittedTransform>, PipelineError> {
        let values = data
            .schema()
            .column(&self.input)
            .and_then(|c| c.key_values.clone())
            .ok_or_else(|| {
                PipelineError::mismatch(self.name(), &self.input, "carries no key vocabulary")
            })?;

        Ok(Box::new(FittedKeyToValue {
            output: self.output.clone(),
            input: self.input.clone(),
            values,
        }))
    }

    fn learns_from_data(&self) -> bool {
        false
    }
}

/// Fitted [`MapKeyToValue`] holding the vocabulary found at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedKeyToValue {
    output: String,
    input: String,
    values: Vec<String>,
}

impl FittedTransform for FittedKeyToValue {
    fn name(&self) -> &str {
        "MapKeyToValue"
    }

    fn inputs(&self) -> Vec<Column> {
        vec![Column::new(&self.input, ColumnKind::Key)]
    }

    fn output_columns(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Text)]
    }

    fn apply(&self, record: &Record) -> Result<Vec<(String, Value)>, PipelineError> {
        let value = match field(self.name(), record, &self.input)? {
            Value::Key(k) => self
                .values
                .get(*k as usize)
                .map(|v| Value::Text(v.clone()))
                .unwrap_or(Value::Missing),
            Value::Missing => Value::Missing,
            other => return Err(wrong_kind(self.name(), &self.input, ColumnKind::Key, other)),
        };
        Ok(vec![(self.output.clone(), value)])
    }

    fn state(&self) -> Result<StepState, PipelineError> {
        Ok(StepState::KeyToValue(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Schema, TextFileSource};

    fn labels(values: &[&str]) -> Dataset {
        Dataset::from_records(values.iter().map(|v| Record::new().with("label", *v)).collect())
            .unwrap()
    }

    #[test]
    fn test_vocabulary_is_sorted() {
        let fitted = MapValueToKey::new("label", "label")
            .fit(&labels(&["dog", "cat", "dog", "bird"]))
            .unwrap();
        let columns = fitted.output_columns();
        assert_eq!(
            columns[0].key_values.as_deref(),
            Some(&["bird".to_string(), "cat".to_string(), "dog".to_string()][..])
        );
    }

    #[test]
    fn test_unseen_value_maps_to_missing() {
        let fitted = MapValueToKey::new("key", "label")
            .fit(&labels(&["cat", "dog"]))
            .unwrap();
        let out = fitted.apply(&Record::new().with("label", "fish")).unwrap();
        assert_eq!(out, vec![("key".to_string(), Value::Missing)]);
        let out = fitted.apply(&Record::new().with("label", "dog")).unwrap();
        assert_eq!(out, vec![("key".to_string(), Value::Key(1))]);
    }

    #[test]
    fn test_rejects_non_text_input() {
        let data = TextFileSource::schema();
        let rows = vec![Record::new().with("text", "x").with("label", true)];
        let data = Dataset::new(data, rows).unwrap();
        assert!(MapValueToKey::new("key", "label").fit(&data).is_err());
    }

    #[test]
    fn test_key_to_value_needs_vocabulary() {
        let schema = Schema::new(vec![Column::new("key", ColumnKind::Key)]);
        let data = Dataset::new(schema, vec![Record::new().with("key", Value::Key(0))]).unwrap();
        let err = MapKeyToValue::new("value", "key").fit(&data).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_key_round_trip_through_schema() {
        let data = labels(&["b", "a"]);
        let to_key = MapValueToKey::new("key", "label").fit(&data).unwrap();
        let schema = Schema::new(to_key.output_columns());
        let rows = data
            .iter()
            .map(|r| {
                let mut out = Record::new();
                for (k, v) in to_key.apply(r).unwrap() {
                    out.insert(k, v);
                }
                out
            })
            .collect();
        let keyed = Dataset::new(schema, rows).unwrap();

        let back = MapKeyToValue::new("value", "key").fit(&keyed).unwrap();
        let out = back.apply(&keyed.rows()[0]).unwrap();
        assert_eq!(out, vec![("value".to_string(), Value::from("b"))]);
    }
}
