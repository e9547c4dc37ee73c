//! Values, field records and argument sets passed to the driver.
use crate::core::{DbError, Result};
use chrono::NaiveDateTime;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde_json::Value as JsonValue;

/// A scalar (or JSON) value bound as a statement parameter or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// 64-bit integer
    Integer(i64),
    /// 64-bit float
    Real(f64),
    /// UTF-8 text
    Text(String),
    /// Boolean, stored as 0/1
    Bool(bool),
    /// Timestamp, stored as `YYYY-MM-DD HH:MM:SS[.fff]` text
    Timestamp(NaiveDateTime),
    /// JSON document, stored as its text form
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for JSON arrays and objects, which cannot stand in for one column.
    #[must_use]
    pub fn is_multi_dimensional(&self) -> bool {
        matches!(self, Value::Json(JsonValue::Array(_) | JsonValue::Object(_)))
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(s) = self {
            Some(s)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Text rendering used when interpolating a value into SQL for display.
    ///
    /// Text is substituted raw (unquoted). The result is never executed.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bool(b) => i64::from(*b).to_string(),
            Value::Timestamp(dt) => dt.format("%F %T%.f").to_string(),
            Value::Json(json) => json.to_string(),
            Value::Blob(b) => format!("<BLOB: {} bytes>", b.len()),
        }
    }

    /// Converts a value borrowed from a result row.
    pub fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }

    /// Converts a JSON scalar; arrays and objects are kept as `Value::Json`.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::Text(s),
            nested => Value::Json(nested),
        }
    }

    /// JSON form used when rows are serialized.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Integer(i) => JsonValue::from(*i),
            Value::Real(f) => JsonValue::from(*f),
            Value::Text(s) => JsonValue::from(s.as_str()),
            Value::Bool(b) => JsonValue::from(*b),
            Value::Timestamp(_) | Value::Blob(_) => JsonValue::from(self.to_sql_literal()),
            Value::Json(json) => json.clone(),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
            Value::Timestamp(dt) => ToSqlOutput::Owned(rusqlite::types::Value::Text(
                dt.format("%F %T%.f").to_string(),
            )),
            Value::Json(json) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Text(json.to_string()))
            }
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Integer(i64::from(v))
            }
        })*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Value::from_json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An insertion-ordered mapping from field name to value.
///
/// Setting an existing field replaces its value in place, so iteration order
/// is the order in which fields were first set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// True if any field holds a nested (array or object) value.
    pub fn is_multi_dimensional(&self) -> bool {
        self.values().any(Value::is_multi_dimensional)
    }

    /// Builds a record from a JSON object, keeping its key order.
    pub fn from_json(json: JsonValue) -> Result<Self> {
        match json {
            JsonValue::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, Value::from_json(v)))
                .collect()),
            other => Err(DbError::argument(format!(
                "expected a JSON object of fields, got {other}"
            ))),
        }
    }

    /// Named argument set keyed by field name.
    pub fn to_named_args(&self) -> Args {
        Args::Named(self.fields.clone())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Record {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> From<Vec<(K, V)>> for Record {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

/// Arguments bound to one statement: either all positional (`?`) or all
/// named (`:name`).
#[derive(Debug, Clone, PartialEq)]
pub enum Args {
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Args {
    /// An empty positional argument set.
    pub fn none() -> Self {
        Args::Positional(Vec::new())
    }

    /// Builds a positional argument set.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Args::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Builds a named argument set. Keys may carry the leading `:` or not.
    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Args::Named(
            pairs
                .into_iter()
                .map(|(k, v)| {
                    let key: String = k.into();
                    let key = key.strip_prefix(':').map(str::to_string).unwrap_or(key);
                    (key, v.into())
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Args::Positional(values) => values.len(),
            Args::Named(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(name, value)` entries in binding order; positional entries have no name.
    pub fn entries(&self) -> Vec<(Option<&str>, &Value)> {
        match self {
            Args::Positional(values) => values.iter().map(|v| (None, v)).collect(),
            Args::Named(pairs) => pairs.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
        }
    }
}

impl Default for Args {
    fn default() -> Self {
        Args::none()
    }
}

/// Rows handed to an insert: one record, or a batch inserted one statement
/// per record.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertRows {
    One(Record),
    Many(Vec<Record>),
}

impl InsertRows {
    /// A JSON object is one row; a JSON array of objects is a batch.
    pub fn from_json(json: JsonValue) -> Result<Self> {
        match json {
            JsonValue::Array(items) => Ok(InsertRows::Many(
                items
                    .into_iter()
                    .map(Record::from_json)
                    .collect::<Result<Vec<_>>>()?,
            )),
            object => Ok(InsertRows::One(Record::from_json(object)?)),
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            InsertRows::One(record) => vec![record],
            InsertRows::Many(records) => records,
        }
    }
}

impl From<Record> for InsertRows {
    fn from(record: Record) -> Self {
        InsertRows::One(record)
    }
}

impl From<Vec<Record>> for InsertRows {
    fn from(records: Vec<Record>) -> Self {
        InsertRows::Many(records)
    }
}
