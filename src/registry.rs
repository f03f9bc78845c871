//! Unit generator type registry
//!
//! Maps type names to a constructor plus a flat set of defaults resolved
//! once at registration. The compiler merges a def over these defaults and
//! never walks any other chain of defaults.

use crate::buffer::BufferTable;
use crate::config::AudioSettings;
use crate::error::Result;
use crate::rate::{Rate, RateSpec};
use crate::ugen::{Capability, UnitGen};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a model for a new instance
pub type UGenConstructor = Arc<dyn Fn(&UGenBuild<'_>) -> Result<Box<dyn UnitGen>> + Send + Sync>;

/// Everything a constructor gets to look at
pub struct UGenBuild<'a> {
    pub type_name: &'a str,
    pub rate: Rate,
    pub rate_spec: RateSpec,
    pub num_outputs: usize,
    /// Merged raw inputs, before compilation
    pub inputs: &'a Map<String, Value>,
    /// Merged options including `rate`, `sampleRate` and `blockSize`
    pub options: &'a Map<String, Value>,
    pub settings: &'a AudioSettings,
    pub buffers: &'a BufferTable,
}

impl<'a> UGenBuild<'a> {
    pub fn option(&self, key: &str) -> Option<&'a Value> {
        self.options.get(key)
    }

    pub fn option_f64(&self, key: &str) -> Option<f64> {
        self.options.get(key).and_then(Value::as_f64)
    }

    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }

    pub fn option_str(&self, key: &str) -> Option<&'a str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// Raw value of a special (literal) input
    pub fn special(&self, name: &str) -> Option<&'a Value> {
        self.inputs.get(name)
    }

    /// Samples per second at the instance's own rate. Unclocked rates
    /// (demand, scheduled) count one sample per pull.
    pub fn sample_rate(&self) -> f32 {
        if self.rate_spec.sample_rate > 0.0 {
            self.rate_spec.sample_rate as f32
        } else {
            1.0
        }
    }
}

/// Per-type defaults, flattened
#[derive(Debug, Clone)]
pub struct UGenDefaults {
    pub rate: Rate,
    pub inputs: Map<String, Value>,
    pub options: Map<String, Value>,
    pub capability: Capability,
    /// Output channels for multi-channel types
    pub num_outputs: usize,
}

impl UGenDefaults {
    pub fn new(rate: Rate) -> Self {
        Self {
            rate,
            inputs: Map::new(),
            options: Map::new(),
            capability: Capability::Generic,
            num_outputs: 1,
        }
    }

    pub fn input(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.to_string(), value.into());
        self
    }

    pub fn option(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.options.insert(name.to_string(), value.into());
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self
    }

    pub fn outputs(mut self, num_outputs: usize) -> Self {
        self.capability = Capability::MultiChannelOutput;
        self.num_outputs = num_outputs.max(1);
        self
    }
}

#[derive(Clone)]
pub struct UGenType {
    pub name: String,
    pub defaults: UGenDefaults,
    pub constructor: UGenConstructor,
}

/// Closed type-name -> constructor table
#[derive(Clone, Default)]
pub struct Registry {
    types: HashMap<String, UGenType>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in type
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::nodes::register_builtins(&mut registry);
        registry
    }

    /// Register a type. A later registration under the same name wins.
    ///
    /// # Example
    /// ```ignore
    /// registry.register("dc", UGenDefaults::new(Rate::Control), |build| {
    ///     Ok(Box::new(Dc::new(build.option_f64("level").unwrap_or(0.0))))
    /// });
    /// ```
    pub fn register<F>(&mut self, name: impl Into<String>, defaults: UGenDefaults, constructor: F)
    where
        F: Fn(&UGenBuild<'_>) -> Result<Box<dyn UnitGen>> + Send + Sync + 'static,
    {
        let name = name.into();
        self.types.insert(
            name.clone(),
            UGenType {
                name,
                defaults,
                constructor: Arc::new(constructor),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&UGenType> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names, sorted
    pub fn list_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.list_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = Registry::with_builtins();
        for name in [
            "value", "out", "valueOut", "in", "sin", "sinOsc", "lfSaw", "line", "xLine",
            "whiteNoise", "pinkNoise", "math", "sum", "pan2", "lpf", "playBuffer",
            "granulator", "sequence",
        ] {
            assert!(registry.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_defaults_builder() {
        let defaults = UGenDefaults::new(Rate::Audio)
            .input("freq", 440.0)
            .option("interpolation", "linear")
            .outputs(2);
        assert_eq!(defaults.inputs["freq"], Value::from(440.0));
        assert_eq!(defaults.capability, Capability::MultiChannelOutput);
        assert_eq!(defaults.num_outputs, 2);
    }

    #[test]
    fn test_out_is_output_capable() {
        let registry = Registry::with_builtins();
        let out = registry.get("out").unwrap();
        assert_eq!(out.defaults.capability, Capability::Output);
        assert_eq!(out.defaults.rate, Rate::Audio);
    }
}
