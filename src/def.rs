//! Declarative unit generator definitions
//!
//! A synth is described as plain nested JSON data. This module normalizes the
//! two surface forms of a def into one internal record:
//!
//! ```text
//! { "ugen": "sin", "inputs": { "freq": 440 } }   // nested
//! { "ugen": "sin", "freq": 440 }                 // flattened
//! ```

use crate::error::{Error, Result};
use crate::rate::Rate;
use serde_json::{Map, Value};

/// Keys that are never treated as inputs in the flattened form
pub const RESERVED_KEYS: [&str; 5] = ["id", "ugen", "rate", "inputs", "options"];

/// Inputs passed through to the unit generator untouched instead of being
/// compiled as nested signal graphs
pub const SPECIAL_INPUTS: [&str; 5] = ["value", "buffer", "list", "table", "envelope"];

/// Type name of the constant source that bare numbers expand into
pub const VALUE_UGEN: &str = "value";

/// Returns true for input names whose values are literal data
pub fn is_special_input(name: &str) -> bool {
    SPECIAL_INPUTS.contains(&name)
}

/// A normalized unit generator definition
#[derive(Debug, Clone, PartialEq)]
pub struct UnitGenDef {
    /// Name used for path lookups
    pub id: Option<String>,
    /// Registered type name
    pub ugen: String,
    /// Explicit rate, if the def gives one
    pub rate: Option<Rate>,
    /// Input name -> raw input value, in declaration order
    pub inputs: Map<String, Value>,
    /// Per-instance options
    pub options: Map<String, Value>,
}

impl UnitGenDef {
    /// Normalize a JSON object into a def.
    ///
    /// Fails if the object has no `ugen` type name or if a reserved key has
    /// the wrong shape.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::InvalidDef(format!("expected an object, got {}", value)))?;

        let ugen = match obj.get("ugen") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(Error::InvalidDef(format!(
                    "type name must be a string, got {}",
                    other
                )))
            }
            None => return Err(Error::MissingUGenType(value.to_string())),
        };

        let id = match obj.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(Error::InvalidDef(format!("id must be a string, got {}", other)))
            }
        };

        let rate = match obj.get("rate") {
            Some(Value::String(token)) => Some(Rate::parse(token)?),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(Error::InvalidDef(format!("rate must be a string, got {}", other)))
            }
        };

        let inputs = match obj.get("inputs") {
            Some(Value::Object(inputs)) => inputs.clone(),
            Some(other) => {
                return Err(Error::InvalidDef(format!(
                    "inputs must be an object, got {}",
                    other
                )))
            }
            // Flattened form: every non-reserved key is an input
            None => obj
                .iter()
                .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        };

        let options = match obj.get("options") {
            Some(Value::Object(options)) => options.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                return Err(Error::InvalidDef(format!(
                    "options must be an object, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            id,
            ugen,
            rate,
            inputs,
            options,
        })
    }

    /// Constant-rate value source wrapping a bare number
    pub fn constant(value: f64) -> Self {
        let mut inputs = Map::new();
        inputs.insert("value".to_string(), Value::from(value));
        Self {
            id: None,
            ugen: VALUE_UGEN.to_string(),
            rate: Some(Rate::Constant),
            inputs,
            options: Map::new(),
        }
    }
}

/// Recursively merge `source` into `target`. Objects merge key by key;
/// any other value in `source` replaces the one in `target`.
pub fn deep_merge(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
