use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use image::RgbImage;
use ndarray::Array1;

/// A single field value flowing through a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Bool(bool),
    Float(f32),
    /// Index into the key vocabulary carried by the column
    Key(u32),
    Vector(Array1<f32>),
    Image(Arc<RgbImage>),
    /// A key whose value was not part of the fitted vocabulary
    Missing,
}

impl Value {
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Value::Text(_) => Some(ColumnKind::Text),
            Value::Bool(_) => Some(ColumnKind::Bool),
            Value::Float(_) => Some(ColumnKind::Float),
            Value::Key(_) => Some(ColumnKind::Key),
            Value::Vector(_) => Some(ColumnKind::Vector),
            Value::Image(_) => Some(ColumnKind::Image),
            Value::Missing => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<u32> {
        match self {
            Value::Key(k) => Some(*k),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&Array1<f32>> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&RgbImage> {
        match self {
            Value::Image(img) => Some(img),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<Array1<f32>> for Value {
    fn from(v: Array1<f32>) -> Self {
        Value::Vector(v)
    }
}

/// The kind of values a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Text,
    Bool,
    Float,
    Key,
    Vector,
    Image,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Text => "text",
            ColumnKind::Bool => "bool",
            ColumnKind::Float => "float",
            ColumnKind::Key => "key",
            ColumnKind::Vector => "vector",
            ColumnKind::Image => "image",
        };
        f.write_str(name)
    }
}

/// A named, typed column. Key columns inside a dataset schema carry the
/// vocabulary their indices point into.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub key_values: Option<Vec<String>>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            key_values: None,
        }
    }

    pub fn with_key_values(mut self, values: Vec<String>) -> Self {
        self.key_values = Some(values);
        self
    }
}

/// Ordered set of columns with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        let mut schema = Schema::default();
        for column in columns {
            schema.upsert(column);
        }
        schema
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Adds a column, replacing any existing column with the same name in place.
    pub fn upsert(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }
}

/// One data item: a set of named fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut schema = Schema::new(vec![
            Column::new("label", ColumnKind::Text),
            Column::new("text", ColumnKind::Text),
        ]);
        schema.upsert(Column::new("label", ColumnKind::Key).with_key_values(vec!["a".into()]));

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.columns()[0].kind, ColumnKind::Key);
        assert_eq!(schema.columns()[1].name, "text");
    }

    #[test]
    fn test_record_builder() {
        let record = Record::new().with("text", "hello").with("label", true);
        assert_eq!(record.get("text").and_then(Value::as_text), Some("hello"));
        assert_eq!(record.get("label").and_then(Value::as_bool), Some(true));
        assert!(record.get("nope").is_none());
    }

    #[test]
    fn test_missing_has_no_kind() {
        assert_eq!(Value::Missing.kind(), None);
        assert_eq!(Value::Key(3).kind(), Some(ColumnKind::Key));
    }
}
