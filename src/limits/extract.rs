//! Extraction Engine
//!
//! A small typed interpreter over descriptor paths. A descriptor's dotted
//! `absolute_path` is parsed into ordered segments, walked through the payload,
//! and the resolved substructure is read according to its declared shape.

use super::registry::{AbsoluteType, LimitDescriptor};
use serde_json::Value;
use thiserror::Error;

/// Why a descriptor produced nothing for a payload. All variants are
/// per-descriptor misses, not job failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("path segment '{segment}' not found")]
    PathNotFound { segment: String },

    #[error("expected {expected} at path, found {found}")]
    WrongShape { expected: &'static str, found: &'static str },

    #[error("key '{0}' not found")]
    KeyNotFound(String),

    #[error("value of '{0}' is not an integer")]
    NotNumeric(String),
}

/// Parsed `a.b.c` path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitPath {
    segments: Vec<String>,
}

impl LimitPath {
    /// Parse a dotted path. Empty paths and empty segments are rejected.
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk the path through a payload
    pub fn resolve<'a>(&self, payload: &'a Value) -> Result<&'a Value, ExtractError> {
        self.segments.iter().try_fold(payload, |current, segment| {
            current
                .as_object()
                .and_then(|map| map.get(segment))
                .ok_or_else(|| ExtractError::PathNotFound {
                    segment: segment.clone(),
                })
        })
    }
}

/// One descriptor's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub limit: i64,
    pub used: Option<i64>,
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Read a JSON number as an integer. Whole floats (`200.0`) are accepted.
pub fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| f as i64)
    })
}

fn read_number(map: &serde_json::Map<String, Value>, key: &str) -> Result<i64, ExtractError> {
    let value = map
        .get(key)
        .ok_or_else(|| ExtractError::KeyNotFound(key.to_string()))?;
    as_integer(value).ok_or_else(|| ExtractError::NotNumeric(key.to_string()))
}

fn extract_dict(target: &Value, descriptor: &LimitDescriptor) -> Result<Extracted, ExtractError> {
    let map = target.as_object().ok_or(ExtractError::WrongShape {
        expected: "dict",
        found: kind(target),
    })?;

    let limit = read_number(map, &descriptor.limit_key)?;
    let used = match descriptor.value_key() {
        Some(key) => match read_number(map, key) {
            Ok(used) => Some(used),
            Err(e) => {
                tracing::debug!("'{}': used value skipped: {}", descriptor.title, e);
                None
            }
        },
        None => None,
    };

    Ok(Extracted {
        title: descriptor.title.clone(),
        limit,
        used,
    })
}

fn extract_list(target: &Value, descriptor: &LimitDescriptor) -> Result<Extracted, ExtractError> {
    let records = target.as_array().ok_or(ExtractError::WrongShape {
        expected: "list",
        found: kind(target),
    })?;

    // First match wins
    let record = records
        .iter()
        .find(|r| r.get("name").and_then(Value::as_str) == Some(descriptor.limit_key.as_str()))
        .ok_or_else(|| ExtractError::KeyNotFound(descriptor.limit_key.clone()))?;

    let limit = record
        .get("value")
        .and_then(as_integer)
        .ok_or_else(|| ExtractError::NotNumeric(descriptor.limit_key.clone()))?;

    Ok(Extracted {
        title: descriptor.title.clone(),
        limit,
        used: None,
    })
}

/// Apply one descriptor to a payload
pub fn extract(payload: &Value, descriptor: &LimitDescriptor) -> Result<Extracted, ExtractError> {
    let path = LimitPath::parse(&descriptor.absolute_path)
        .ok_or_else(|| ExtractError::InvalidPath(descriptor.absolute_path.clone()))?;
    let target = path.resolve(payload)?;

    match descriptor.absolute_type {
        AbsoluteType::Dict => extract_dict(target, descriptor),
        AbsoluteType::List => extract_list(target, descriptor),
    }
}
