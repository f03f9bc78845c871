//! Graph compiler
//!
//! Turns declarative defs into live unit generator instances in an arena.
//! Compilation is all or nothing: when any part of a def fails, every
//! instance already built for it is freed again and the error is returned.
//!
//! For each def:
//! 1. bare numbers become constant `value` sources, arrays compile element-wise
//! 2. the flattened surface form is normalized (see [`UnitGenDef`])
//! 3. the rate is resolved, with an optional override for non-constant nodes
//! 4. inputs and options are merged over the type's registered defaults
//! 5. output buffers are sized by the rate's block size and the capability
//! 6. inputs are compiled recursively, except the special literal inputs
//! 7. the registered constructor builds the model, which is then notified
//!    once with `on_input_changed(None)`

use crate::buffer::BufferTable;
use crate::config::AudioSettings;
use crate::def::{deep_merge, is_special_input, UnitGenDef};
use crate::error::{Error, Result};
use crate::graph::notify;
use crate::node_list::NodeList;
use crate::rate::Rate;
use crate::registry::{Registry, UGenBuild};
use crate::ugen::{Arena, Capability, Input, Inputs, NodeId, UGenOutput, UGenSlot};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Shared state every compile and mutation needs
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub settings: AudioSettings,
    pub registry: Arc<Registry>,
    pub buffers: BufferTable,
}

impl EngineContext {
    pub fn new(settings: AudioSettings) -> Self {
        Self {
            settings: settings.clamped(),
            registry: Arc::new(Registry::with_builtins()),
            buffers: BufferTable::new(),
        }
    }
}

/// Result of compiling one def
#[derive(Debug, Clone, PartialEq)]
pub enum Compiled {
    One(NodeId),
    Many(Vec<NodeId>),
}

impl Compiled {
    pub fn ids(&self) -> &[NodeId] {
        match self {
            Compiled::One(id) => std::slice::from_ref(id),
            Compiled::Many(ids) => ids,
        }
    }

    pub fn into_input(self) -> Input {
        match self {
            Compiled::One(id) => Input::Node(id),
            Compiled::Many(ids) => Input::Nodes(ids),
        }
    }
}

pub struct Compiler<'a> {
    ctx: &'a EngineContext,
    rate_override: Option<Rate>,
}

impl<'a> Compiler<'a> {
    pub fn new(ctx: &'a EngineContext) -> Self {
        Self {
            ctx,
            rate_override: None,
        }
    }

    pub fn context(&self) -> &'a EngineContext {
        self.ctx
    }

    /// Force every non-constant node to `rate`
    pub fn with_rate_override(mut self, rate: Option<Rate>) -> Self {
        self.rate_override = rate;
        self
    }

    /// Compile a def (object, number or array of them) into `arena`
    pub fn compile(&self, def: &Value, arena: &mut Arena) -> Result<Compiled> {
        match def {
            Value::Number(n) => {
                let value = n.as_f64().unwrap_or(0.0);
                self.compile_def(&UnitGenDef::constant(value), arena)
                    .map(Compiled::One)
            }
            Value::Array(items) => {
                let mut ids = Vec::with_capacity(items.len());
                for item in items {
                    match self.compile(item, arena) {
                        Ok(compiled) => ids.extend_from_slice(compiled.ids()),
                        Err(e) => {
                            for id in ids {
                                free_subtree(arena, id);
                            }
                            return Err(e);
                        }
                    }
                }
                Ok(Compiled::Many(ids))
            }
            Value::Object(_) => {
                let def = UnitGenDef::from_value(def)?;
                self.compile_def(&def, arena).map(Compiled::One)
            }
            other => Err(Error::InvalidDef(format!(
                "expected a def, number or array, got {}",
                other
            ))),
        }
    }

    /// Compile the top-level def of a synth, wrapping it in an output node
    /// unless it already ends in one.
    ///
    /// Audio-rate roots go to bus 0 through `out`, expanded over every
    /// hardware channel. Anything else is exposed through `valueOut`.
    pub fn compile_synth_def(&self, def: &Value, arena: &mut Arena) -> Result<NodeId> {
        let wrapped = match self.root_kind(def)? {
            RootKind::Output => None,
            RootKind::Signal(rate) if rate.is_audio() => Some(json!({
                "ugen": "out",
                "bus": 0,
                "expand": self.ctx.settings.chans,
                "sources": def,
            })),
            RootKind::Signal(_) => Some(json!({ "ugen": "valueOut", "sources": def })),
        };

        match self.compile(wrapped.as_ref().unwrap_or(def), arena)? {
            Compiled::One(id) => Ok(id),
            Compiled::Many(ids) => {
                for id in ids {
                    free_subtree(arena, id);
                }
                Err(Error::InvalidDef("a synth must have a single root".to_string()))
            }
        }
    }

    fn root_kind(&self, def: &Value) -> Result<RootKind> {
        match def {
            Value::Number(_) => Ok(RootKind::Signal(Rate::Constant)),
            Value::Array(items) => {
                let mut rate = Rate::Control;
                for item in items {
                    if let RootKind::Signal(r) = self.root_kind(item)? {
                        if r.is_audio() {
                            rate = r;
                        }
                    }
                }
                Ok(RootKind::Signal(rate))
            }
            _ => {
                let parsed = UnitGenDef::from_value(def)?;
                let ty = self
                    .ctx
                    .registry
                    .get(&parsed.ugen)
                    .ok_or_else(|| Error::UnknownUGen(parsed.ugen.clone()))?;
                if ty.defaults.capability == Capability::Output {
                    return Ok(RootKind::Output);
                }
                Ok(RootKind::Signal(
                    self.resolve_rate(parsed.rate.unwrap_or(ty.defaults.rate)),
                ))
            }
        }
    }

    fn resolve_rate(&self, rate: Rate) -> Rate {
        match self.rate_override {
            Some(forced) if rate != Rate::Constant => forced,
            _ => rate,
        }
    }

    fn compile_def(&self, def: &UnitGenDef, arena: &mut Arena) -> Result<NodeId> {
        let ty = self
            .ctx
            .registry
            .get(&def.ugen)
            .ok_or_else(|| Error::UnknownUGen(def.ugen.clone()))?;
        let settings = &self.ctx.settings;
        let rate = self.resolve_rate(def.rate.unwrap_or(ty.defaults.rate));
        let rate_spec = rate.spec(settings);

        // Def inputs first in declaration order, then defaults; null removes
        let mut raw_inputs = Map::new();
        for (name, value) in &def.inputs {
            if !value.is_null() {
                raw_inputs.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in &ty.defaults.inputs {
            if !def.inputs.contains_key(name) {
                raw_inputs.insert(name.clone(), value.clone());
            }
        }

        let mut options = ty.defaults.options.clone();
        let context = json!({
            "rate": rate.as_str(),
            "sampleRate": rate_spec.sample_rate,
            "blockSize": rate_spec.block_size,
        });
        if let Value::Object(context) = &context {
            deep_merge(&mut options, context);
        }
        deep_merge(&mut options, &def.options);

        let num_outputs = match ty.defaults.capability {
            Capability::MultiChannelOutput => options
                .get("numOutputs")
                .and_then(Value::as_u64)
                .map_or(ty.defaults.num_outputs, |n| n as usize),
            _ => 1,
        };

        let mut inputs = Inputs::new();
        for (name, raw) in &raw_inputs {
            if is_special_input(name) {
                inputs.insert(name.as_str(), Input::Special(raw.clone()));
                continue;
            }
            match self.compile(raw, arena) {
                Ok(compiled) => {
                    inputs.insert(name.as_str(), compiled.into_input());
                }
                Err(e) => {
                    free_inputs(arena, &inputs);
                    return Err(e);
                }
            }
        }

        let build = UGenBuild {
            type_name: &ty.name,
            rate,
            rate_spec,
            num_outputs,
            inputs: &raw_inputs,
            options: &options,
            settings,
            buffers: &self.ctx.buffers,
        };
        let mut model = match (ty.constructor)(&build) {
            Ok(model) => model,
            Err(e) => {
                free_inputs(arena, &inputs);
                return Err(e);
            }
        };

        let mut output = UGenOutput::new(num_outputs, rate_spec.block_size);
        model.init_output(&mut output);

        let id = arena.insert(UGenSlot {
            type_name: ty.name.clone(),
            name: def.id.clone(),
            rate,
            capability: ty.defaults.capability,
            inputs,
            options,
            output,
            model: Some(model),
        });
        notify(arena, id, None, &self.ctx.buffers, settings);

        debug!(ugen = %def.ugen, name = ?def.id, rate = %rate, "compiled unit generator");
        Ok(id)
    }
}

enum RootKind {
    Output,
    Signal(Rate),
}

/// Free an instance and everything feeding it
pub(crate) fn free_subtree(arena: &mut Arena, id: NodeId) {
    for node in NodeList::subtree(id, &*arena) {
        arena.remove(node);
    }
}

fn free_inputs(arena: &mut Arena, inputs: &Inputs) {
    for id in inputs.node_ids() {
        free_subtree(arena, id);
    }
}
