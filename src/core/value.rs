use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use indexmap::IndexMap;
use std::fmt;

use crate::core::error::{ImportError, ImportResult};

/// A single column value read from a source or written to a destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Boolean(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Boolean(v) => Some(i64::from(*v)),
            Value::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// SQLite has no boolean type and hands back 0/1.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            Value::Integer(v) => Some(*v != 0),
            Value::Text(v) => match v.as_str() {
                "t" | "true" | "1" => Some(true),
                "f" | "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Integers are read as Unix seconds, text as RFC 3339 or `YYYY-MM-DD HH:MM:SS`.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(v) => Some(*v),
            Value::Integer(v) => Utc.timestamp_opt(*v, 0).single(),
            Value::Text(v) => parse_timestamp(v),
            _ => None,
        }
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.6f+00")),
            Value::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
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

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// An ordered record of column name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn set<V: Into<Value>>(&mut self, column: &str, value: V) {
        self.columns.insert(column.to_string(), value.into());
    }

    pub fn with<V: Into<Value>>(mut self, column: &str, value: V) -> Self {
        self.set(column, value);
        self
    }

    pub fn take(&mut self, column: &str) -> Value {
        self.columns.shift_remove(column).unwrap_or(Value::Null)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.columns.values()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.columns.into_values().collect()
    }

    /// Value of `column`; missing columns are an error, NULL is allowed.
    pub fn value(&self, column: &str) -> ImportResult<&Value> {
        self.columns
            .get(column)
            .ok_or_else(|| ImportError::invalid_value(column, "a column that exists"))
    }

    pub fn i64(&self, column: &str) -> ImportResult<i64> {
        self.value(column)?
            .as_i64()
            .ok_or_else(|| ImportError::invalid_value(column, "an integer"))
    }

    pub fn opt_i64(&self, column: &str) -> ImportResult<Option<i64>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            value => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| ImportError::invalid_value(column, "an integer or NULL")),
        }
    }

    pub fn text(&self, column: &str) -> ImportResult<String> {
        match self.value(column)? {
            Value::Text(v) => Ok(v.clone()),
            Value::Integer(v) => Ok(v.to_string()),
            _ => Err(ImportError::invalid_value(column, "text")),
        }
    }

    pub fn opt_text(&self, column: &str) -> ImportResult<Option<String>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            _ => self.text(column).map(Some),
        }
    }

    pub fn bool(&self, column: &str) -> ImportResult<bool> {
        match self.value(column)? {
            Value::Null => Ok(false),
            value => value
                .as_bool()
                .ok_or_else(|| ImportError::invalid_value(column, "a boolean")),
        }
    }

    pub fn timestamp(&self, column: &str) -> ImportResult<DateTime<Utc>> {
        self.value(column)?
            .as_timestamp()
            .ok_or_else(|| ImportError::invalid_value(column, "a timestamp"))
    }

    pub fn opt_timestamp(&self, column: &str) -> ImportResult<Option<DateTime<Utc>>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            value => value
                .as_timestamp()
                .map(Some)
                .ok_or_else(|| ImportError::invalid_value(column, "a timestamp or NULL")),
        }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
