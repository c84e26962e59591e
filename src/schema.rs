//! Tool schemas and the process-wide tool registry.
//!
//! A [`ToolSpec`] is pure data: a name, a description and an ordered list of
//! [`ParamSpec`]s. The [`ToolRegistry`] is built once at startup from a
//! backend's catalog, checks the catalog invariants, and is immutable after
//! that.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::RegistryError;

// ── Parameter description ───────────────────────────────────────────────────

/// Semantic type of a tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ParamKind {
    String,
    /// Whole number. Out-of-range values are clamped.
    Integer,
    /// Floating point number. Out-of-range values are clamped.
    Number,
    Boolean,
    /// One of a fixed set of strings. Values outside the set are rejected.
    Enum(Vec<String>),
    /// Non-empty list of strings; a lone string is accepted as a one-item list.
    StringList,
}

impl ParamKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }

    fn json_type(&self) -> &'static str {
        match self {
            Self::String | Self::Enum(_) => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::StringList => "array",
        }
    }
}

/// Inclusive numeric range. Either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Bounds {
    pub fn clamp(&self, v: f64) -> f64 {
        let v = self.min.map_or(v, |min| v.max(min));
        self.max.map_or(v, |max| v.min(max))
    }

    pub fn contains(&self, v: f64) -> bool {
        self.min.is_none_or(|min| v >= min) && self.max.is_none_or(|max| v <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
    pub bounds: Bounds,
    pub default: Option<Value>,
}

impl ParamSpec {
    fn new(name: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            description: String::new(),
            bounds: Bounds::default(),
            default: None,
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, ParamKind::String)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, ParamKind::Integer)
    }

    pub fn number(name: &str) -> Self {
        Self::new(name, ParamKind::Number)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, ParamKind::Boolean)
    }

    pub fn string_list(name: &str) -> Self {
        Self::new(name, ParamKind::StringList)
    }

    pub fn one_of(name: &str, values: &[&str]) -> Self {
        Self::new(
            name,
            ParamKind::Enum(values.iter().map(|v| v.to_string()).collect()),
        )
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    #[must_use]
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.bounds = Bounds {
            min: Some(min),
            max: Some(max),
        };
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// JSON-Schema fragment for this parameter, used by tool discovery.
    pub fn json_schema(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), json!(self.kind.json_type()));
        if !self.description.is_empty() {
            obj.insert("description".into(), json!(self.description));
        }
        match &self.kind {
            ParamKind::Enum(values) => {
                obj.insert("enum".into(), json!(values));
            }
            ParamKind::StringList => {
                obj.insert("items".into(), json!({ "type": "string" }));
                obj.insert("minItems".into(), json!(1));
            }
            _ => {}
        }
        if self.kind.is_numeric() {
            if let Some(min) = self.bounds.min {
                obj.insert("minimum".into(), numeric_json(&self.kind, min));
            }
            if let Some(max) = self.bounds.max {
                obj.insert("maximum".into(), numeric_json(&self.kind, max));
            }
        }
        if let Some(default) = &self.default {
            obj.insert("default".into(), default.clone());
        }
        Value::Object(obj)
    }
}

fn numeric_json(kind: &ParamKind, v: f64) -> Value {
    match kind {
        ParamKind::Integer => json!(v as i64),
        _ => json!(v),
    }
}

// ── ToolSpec ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn find_param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The `inputSchema` object advertised through `tools/list`.
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Catalog entry shape shared by `tools/list` and `GET /api/tools`.
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }

    fn check(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for p in &self.params {
            if !seen.insert(p.name.as_str()) {
                return Err(RegistryError::DuplicateParam {
                    tool: self.name.clone(),
                    param: p.name.clone(),
                });
            }
            if let (Some(min), Some(max)) = (p.bounds.min, p.bounds.max) {
                if min > max {
                    return Err(RegistryError::InvalidBounds {
                        tool: self.name.clone(),
                        param: p.name.clone(),
                        min,
                        max,
                    });
                }
            }
            if let ParamKind::Enum(values) = &p.kind {
                if values.is_empty() {
                    return Err(RegistryError::EmptyEnum {
                        tool: self.name.clone(),
                        param: p.name.clone(),
                    });
                }
            }
            if let Some(default) = &p.default {
                // A default must survive validation unchanged.
                match crate::validate::coerce(p, default) {
                    Ok(v) if &v == default => {}
                    Ok(v) => {
                        return Err(RegistryError::InvalidDefault {
                            tool: self.name.clone(),
                            param: p.name.clone(),
                            reason: format!("normalizes to {v}"),
                        });
                    }
                    Err(reason) => {
                        return Err(RegistryError::InvalidDefault {
                            tool: self.name.clone(),
                            param: p.name.clone(),
                            reason,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Immutable catalog of every tool the running backend exposes.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolSpec>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(tools.len());
        for (i, tool) in tools.iter().enumerate() {
            tool.check()?;
            if index.insert(tool.name.clone(), i).is_some() {
                return Err(RegistryError::DuplicateTool(tool.name.clone()));
            }
        }
        Ok(Self { tools, index })
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// All tools in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn descriptors(&self) -> Vec<Value> {
        self.tools.iter().map(ToolSpec::descriptor).collect()
    }
}
