//! Nested record model and the flattener.

use std::collections::BTreeSet;

use indexmap::IndexMap;

/// A nested record: string keys mapping to scalar values, sets of strings,
/// or further records. Key insertion order is preserved all the way into the
/// output column order.
pub type Record = IndexMap<String, Value>;

/// A value inside a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Set(BTreeSet<String>),
    Record(Record),
}

impl Value {
    /// Text value, or `Null` when the element carried no text.
    pub fn from_opt_text(text: Option<&str>) -> Value {
        match text {
            Some(t) => Value::Text(t.to_string()),
            None => Value::Null,
        }
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

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

const KEY_SEPARATOR: char = '_';

/// Flatten a nested record into a single-level record with `_`-joined
/// compound keys. Applying it to an already-flat record is a no-op.
pub fn flatten(record: Record) -> Record {
    let mut flat = Record::new();
    flatten_into(record, None, &mut flat);
    flat
}

fn flatten_into(record: Record, parent: Option<&str>, out: &mut Record) {
    for (key, value) in record {
        let key = match parent {
            Some(parent) => format!("{parent}{KEY_SEPARATOR}{key}"),
            None => key,
        };
        match value {
            Value::Record(inner) => flatten_into(inner, Some(&key), out),
            leaf => {
                out.insert(key, leaf);
            }
        }
    }
}
