//! Core data types shared by the extraction pipeline and the request layer.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// A single "plain object" record inside a collection.
pub type Record = Map<String, Value>;

/// Outcome of searching a raw response for its record collection.
///
/// `RecordCollection` holds only objects by construction. An empty
/// collection is a real answer (the endpoint returned no rows) and is
/// distinct from `NotFound` (nothing in the payload looked like rows).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum ExtractionResult {
    RecordCollection(Vec<Record>),
    NotFound,
}

impl ExtractionResult {
    pub fn is_found(&self) -> bool {
        matches!(self, ExtractionResult::RecordCollection(_))
    }

    /// Number of records, `0` for `NotFound`.
    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the records; `NotFound` yields an empty slice.
    pub fn records(&self) -> &[Record] {
        match self {
            ExtractionResult::RecordCollection(records) => records,
            ExtractionResult::NotFound => &[],
        }
    }

    /// Collapse the result for callers that treat "nothing found" as "no rows".
    pub fn into_records(self) -> Vec<Record> {
        match self {
            ExtractionResult::RecordCollection(records) => records,
            ExtractionResult::NotFound => Vec::new(),
        }
    }
}

/// Identity of a logical request: endpoint plus canonically serialized
/// parameters.
///
/// Parameter objects are serialized with keys sorted at every level, so
/// `{"page":1,"q":"x"}` and `{"q":"x","page":1}` name the same request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(endpoint: &str, params: &Value) -> Self {
        let endpoint = endpoint.trim();
        let endpoint = if endpoint.len() > 1 {
            endpoint.trim_end_matches('/')
        } else {
            endpoint
        };

        let has_params = match params {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        };

        if has_params {
            QueryKey(format!("{}?{}", endpoint, canonicalize(params)))
        } else {
            QueryKey(endpoint.to_string())
        }
    }

    /// Wrap an already-built key string verbatim.
    pub fn from_raw(key: impl Into<String>) -> Self {
        QueryKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryKey {
    fn from(key: &str) -> Self {
        QueryKey::from_raw(key)
    }
}

impl From<String> for QueryKey {
    fn from(key: String) -> Self {
        QueryKey(key)
    }
}

/// Rebuild a value with object keys in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
