//! Argument validation against a [`ToolSpec`].
//!
//! Policy:
//! - unknown argument keys are rejected;
//! - JSON `null` counts as "not supplied";
//! - numeric parameters clamp to their bounds, every other constraint rejects;
//! - numeric strings (`"5"`) and `"true"`/`"false"` are coerced;
//! - enum values match exactly, then case-insensitively (normalized to the
//!   declared spelling);
//! - blank strings are "not supplied" for optional parameters and rejected for
//!   required ones;
//! - a string list takes a lone string as a one-item list.

use serde_json::{Map, Number, Value};

use crate::error::ToolError;
use crate::schema::{ParamKind, ParamSpec, ToolSpec};

/// Normalized arguments, ordered as the tool declares its parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedArguments {
    values: Vec<(String, Value)>,
}

impl ValidatedArguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.values.iter().cloned().collect()
    }
}

impl FromIterator<(String, Value)> for ValidatedArguments {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Check `raw` against `spec` and produce the normalized argument set.
pub fn validate(spec: &ToolSpec, raw: &Value) -> Result<ValidatedArguments, ToolError> {
    let empty = Map::new();
    let supplied = match raw {
        Value::Null => &empty,
        Value::Object(map) => map,
        other => {
            return Err(ToolError::invalid_argument(format!(
                "arguments for '{}' must be a JSON object, got {}",
                spec.name,
                json_type_name(other)
            )));
        }
    };

    // Rule 1: no undeclared keys. Report them sorted so the message is stable.
    let mut unknown: Vec<&str> = supplied
        .keys()
        .filter(|k| spec.find_param(k).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        let accepted: Vec<&str> = spec.params.iter().map(|p| p.name.as_str()).collect();
        return Err(ToolError::invalid_argument(format!(
            "unknown parameter(s) for '{}': {} (accepted: {})",
            spec.name,
            unknown.join(", "),
            if accepted.is_empty() {
                "none".to_string()
            } else {
                accepted.join(", ")
            }
        )));
    }

    let mut out = Vec::with_capacity(spec.params.len());
    for param in &spec.params {
        let value = supplied.get(&param.name).filter(|v| !is_blank(v));
        match value {
            Some(v) => {
                let coerced = coerce(param, v).map_err(|reason| {
                    ToolError::invalid_argument(format!("parameter '{}': {reason}", param.name))
                })?;
                out.push((param.name.clone(), coerced));
            }
            None if param.required => {
                return Err(ToolError::invalid_argument(format!(
                    "missing required parameter '{}'",
                    param.name
                )));
            }
            None => {
                if let Some(default) = &param.default {
                    out.push((param.name.clone(), default.clone()));
                }
            }
        }
    }

    Ok(ValidatedArguments { values: out })
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Type-check and normalize one value. The error is a bare reason; callers
/// add the parameter name.
pub(crate) fn coerce(param: &ParamSpec, value: &Value) -> Result<Value, String> {
    match &param.kind {
        ParamKind::String => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(format!("expected a string, got {}", json_type_name(other))),
        },
        ParamKind::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => Err(format!("expected a boolean, got {}", json_type_name(other))),
        },
        ParamKind::Enum(allowed) => {
            let Value::String(s) = value else {
                return Err(format!(
                    "expected one of [{}], got {}",
                    allowed.join(", "),
                    json_type_name(value)
                ));
            };
            allowed
                .iter()
                .find(|a| *a == s)
                .or_else(|| allowed.iter().find(|a| a.eq_ignore_ascii_case(s)))
                .map(|a| Value::String(a.clone()))
                .ok_or_else(|| format!("'{s}' is not one of [{}]", allowed.join(", ")))
        }
        ParamKind::StringList => match value {
            Value::String(s) => Ok(Value::Array(vec![Value::String(s.clone())])),
            Value::Array(items) if items.is_empty() => {
                Err("expected at least one string".to_string())
            }
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) if !s.trim().is_empty() => Ok(item.clone()),
                    Value::String(_) => Err("list items must not be blank".to_string()),
                    other => Err(format!(
                        "expected a list of strings, found {}",
                        json_type_name(other)
                    )),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(format!("expected a list of strings, got {}", json_type_name(other))),
        },
        ParamKind::Integer => {
            let n = integer_of(value)?;
            let lo = param.bounds.min.map(|m| m.ceil() as i64);
            let hi = param.bounds.max.map(|m| m.floor() as i64);
            let n = lo.map_or(n, |lo| n.max(lo));
            let n = hi.map_or(n, |hi| n.min(hi));
            Ok(Value::from(n))
        }
        ParamKind::Number => {
            let n = number_of(value)?;
            let clamped = param.bounds.clamp(n);
            // Keep the caller's representation when nothing changed, so an
            // integer literal stays an integer.
            if clamped == n && value.is_number() {
                return Ok(value.clone());
            }
            Number::from_f64(clamped)
                .map(Value::Number)
                .ok_or_else(|| format!("{clamped} is not a finite number"))
        }
    }
}

fn integer_of(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.is_u64() {
                // Larger than i64::MAX; saturate so clamping still applies.
                Ok(i64::MAX)
            } else {
                float_to_integer(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Ok(i)
            } else if let Ok(f) = s.parse::<f64>() {
                float_to_integer(f)
            } else {
                Err(format!("expected an integer, got \"{s}\""))
            }
        }
        other => Err(format!("expected an integer, got {}", json_type_name(other))),
    }
}

fn float_to_integer(f: f64) -> Result<i64, String> {
    if !f.is_finite() {
        return Err(format!("expected an integer, got {f}"));
    }
    if f.fract() != 0.0 {
        return Err(format!("expected an integer, got {f}"));
    }
    // `as` saturates at the i64 range, which the bounds clamp handles next.
    Ok(f as i64)
}

fn number_of(value: &Value) -> Result<f64, String> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => return Err(format!("expected a number, got {}", json_type_name(other))),
    };
    match n {
        Some(f) if f.is_finite() => Ok(f),
        _ => Err(format!("expected a finite number, got {value}")),
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
