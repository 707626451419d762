use std::sync::Arc;

use super::value::{Column, Record, Schema, Value};
use crate::pipeline::PipelineError;

/// An ordered, immutable sequence of records sharing a schema.
///
/// Rows are reference counted so that splitting or re-planning a dataset
/// never copies the underlying records.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    schema: Schema,
    rows: Arc<[Record]>,
}

impl Dataset {
    /// Builds a dataset, checking that every row provides every schema column
    /// with a value of the declared kind.
    pub fn new(schema: Schema, rows: Vec<Record>) -> Result<Self, PipelineError> {
        for (i, row) in rows.iter().enumerate() {
            Self::validate_row(&schema, row, i)?;
        }
        Ok(Self {
            schema,
            rows: rows.into(),
        })
    }

    /// Builds a dataset from in-memory records, inferring the schema from the
    /// first record.
    pub fn from_records(rows: Vec<Record>) -> Result<Self, PipelineError> {
        let first = rows.first().ok_or_else(|| {
            PipelineError::InvalidArgument("Cannot infer a schema from zero records".into())
        })?;
        let mut columns = Vec::with_capacity(first.len());
        for (name, value) in first.fields() {
            let kind = value.kind().ok_or_else(|| {
                PipelineError::InvalidArgument(format!(
                    "Cannot infer the kind of column '{}' from a missing value",
                    name
                ))
            })?;
            columns.push(Column::new(name, kind));
        }
        Self::new(Schema::new(columns), rows)
    }

    pub(crate) fn from_parts(schema: Schema, rows: Vec<Record>) -> Self {
        Self {
            schema,
            rows: rows.into(),
        }
    }

    fn validate_row(schema: &Schema, row: &Record, index: usize) -> Result<(), PipelineError> {
        for column in schema.columns() {
            match row.get(&column.name) {
                None => {
                    return Err(PipelineError::InvalidArgument(format!(
                        "Row {} has no value for column '{}'",
                        index, column.name
                    )))
                }
                Some(Value::Missing) => {}
                Some(value) if value.kind() != Some(column.kind) => {
                    return Err(PipelineError::InvalidArgument(format!(
                        "Row {} column '{}' expected {}, found {:?}",
                        index,
                        column.name,
                        column.kind,
                        value.kind()
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the values of one column in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>, PipelineError> {
        if !self.schema.contains(name) {
            return Err(PipelineError::InvalidArgument(format!(
                "Dataset has no column '{}'",
                name
            )));
        }
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(name).unwrap_or(&Value::Missing))
            .collect())
    }

    /// Returns a new dataset holding the rows at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        let rows = indices
            .iter()
            .filter_map(|&i| self.rows.get(i).cloned())
            .collect::<Vec<_>>();
        Self::from_parts(self.schema.clone(), rows)
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
