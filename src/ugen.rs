//! Unit generator contract
//!
//! Every signal-processing node implements [`UnitGen`]. Live instances are
//! stored in an [`Arena`] as [`UGenSlot`]s and address their inputs by
//! [`NodeId`], so the node list and the name index only ever hold keys.
//!
//! Nodes process a whole block at a time. Inputs are read through a stride:
//! 1 for audio-rate inputs, 0 for everything else (the single value repeats).

use crate::buffer::BufferTable;
use crate::config::AudioSettings;
use crate::rate::Rate;
use serde_json::{Map, Value};
use slotmap::{new_key_type, SlotMap};
use std::fmt;

new_key_type! {
    /// Stable key of a live unit generator instance
    pub struct NodeId;
}

/// Storage for every live instance of a graph
pub type Arena = SlotMap<NodeId, UGenSlot>;

/// Read in place of an absent optional input
pub(crate) static ZERO_BLOCK: [f32; 1] = [0.0];
/// Read in place of an absent `mul` input
pub(crate) static ONE_BLOCK: [f32; 1] = [1.0];

/// What the engine may assume about an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Ordinary signal processor
    Generic,
    /// Constant value source, can be updated in place
    Value,
    /// Terminal node of a synth (bus writer or value exposer)
    Output,
    /// Produces more than one output channel
    MultiChannelOutput,
}

/// A resolved input
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A single upstream instance
    Node(NodeId),
    /// Several upstream instances (multi-channel inputs such as `sources`)
    Nodes(Vec<NodeId>),
    /// Literal data passed through untouched (tables, lists, buffer refs)
    Special(Value),
}

impl Input {
    /// Upstream instances referenced by this input
    pub fn node_ids(&self) -> &[NodeId] {
        match self {
            Input::Node(id) => std::slice::from_ref(id),
            Input::Nodes(ids) => ids,
            Input::Special(_) => &[],
        }
    }
}

/// Named inputs of an instance, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    entries: Vec<(String, Input)>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Input> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, input)| input)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Input> {
        self.entries
            .iter_mut()
            .find(|(key, _)| key == name)
            .map(|(_, input)| input)
    }

    /// Insert or replace an input. A replaced input keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, input: Input) -> Option<Input> {
        let name = name.into();
        match self.get_mut(&name) {
            Some(existing) => Some(std::mem::replace(existing, input)),
            None => {
                self.entries.push((name, input));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Input> {
        let pos = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Input)> {
        self.entries.iter().map(|(key, input)| (key.as_str(), input))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Every upstream instance, inputs left to right
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.entries
            .iter()
            .flat_map(|(_, input)| input.node_ids().iter().copied())
            .collect()
    }

    /// Replace every reference to `old` with `new`. Returns the names touched.
    pub fn retarget(&mut self, old: NodeId, new: NodeId) -> Vec<String> {
        let mut touched = Vec::new();
        for (name, input) in self.entries.iter_mut() {
            let hit = match input {
                Input::Node(id) if *id == old => {
                    *id = new;
                    true
                }
                Input::Nodes(ids) => {
                    let mut hit = false;
                    for id in ids.iter_mut().filter(|id| **id == old) {
                        *id = new;
                        hit = true;
                    }
                    hit
                }
                _ => false,
            };
            if hit {
                touched.push(name.clone());
            }
        }
        touched
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output buffers of an instance plus its scalar snapshot
#[derive(Debug, Clone, Default)]
pub struct UGenOutput {
    /// One buffer per output channel, each `block_size` long
    pub channels: Vec<Vec<f32>>,
    /// Last sample written to the first channel in the most recent block
    pub value: f32,
}

impl UGenOutput {
    pub fn new(num_channels: usize, block_size: usize) -> Self {
        Self {
            channels: vec![vec![0.0; block_size]; num_channels.max(1)],
            value: 0.0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn first(&self) -> &[f32] {
        self.channels.first().map_or(&[], |c| c.as_slice())
    }

    pub fn first_mut(&mut self) -> &mut [f32] {
        match self.channels.first_mut() {
            Some(channel) => channel.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Record the last sample of the first channel as `value`
    pub fn capture_value(&mut self, num_samps: usize) {
        if let Some(&last) = num_samps
            .checked_sub(1)
            .and_then(|i| self.channels.first().and_then(|c| c.get(i)))
        {
            self.value = last;
        }
    }
}

/// A live unit generator instance
pub struct UGenSlot {
    pub type_name: String,
    /// Name for path lookups (the def's `id`)
    pub name: Option<String>,
    pub rate: Rate,
    pub capability: Capability,
    pub inputs: Inputs,
    pub options: Map<String, Value>,
    pub output: UGenOutput,
    pub(crate) model: Option<Box<dyn UnitGen>>,
}

impl UGenSlot {
    /// Read a field of the instance's private model
    pub fn model_field(&self, field: &str) -> Option<f64> {
        if field == "value" {
            return Some(self.output.value as f64);
        }
        self.model.as_ref().and_then(|m| m.model_field(field))
    }
}

impl fmt::Debug for UGenSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UGenSlot")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("rate", &self.rate)
            .field("capability", &self.capability)
            .field("inputs", &self.inputs)
            .field("value", &self.output.value)
            .finish()
    }
}

/// Read-only view over an instance's inputs
///
/// Borrowed from the arena while the owning instance's model and output are
/// taken out for generation, so it never aliases the buffer being written.
pub struct InputView<'a> {
    arena: &'a Arena,
    inputs: &'a Inputs,
    consumer_rate: Rate,
    buffers: &'a BufferTable,
    settings: &'a AudioSettings,
}

impl<'a> InputView<'a> {
    pub fn new(
        arena: &'a Arena,
        inputs: &'a Inputs,
        consumer_rate: Rate,
        buffers: &'a BufferTable,
        settings: &'a AudioSettings,
    ) -> Self {
        Self {
            arena,
            inputs,
            consumer_rate,
            buffers,
            settings,
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.inputs.contains(name)
    }

    fn first_node(&self, name: &str) -> Option<&'a UGenSlot> {
        match self.inputs.get(name)? {
            Input::Node(id) => self.arena.get(*id),
            Input::Nodes(ids) => ids.first().and_then(|id| self.arena.get(*id)),
            Input::Special(_) => None,
        }
    }

    /// Rate of the input's (first) upstream instance
    pub fn rate(&self, name: &str) -> Option<Rate> {
        self.first_node(name).map(|slot| slot.rate)
    }

    /// Per-sample index increment for reading this input
    pub fn stride(&self, name: &str) -> usize {
        match self.rate(name) {
            Some(rate) if rate.is_audio() && self.consumer_rate.is_audio() => 1,
            _ => 0,
        }
    }

    /// Block of the input, read with [`InputView::stride`].
    ///
    /// Non-audio consumers see the upstream scalar snapshot. Absent inputs
    /// read as a single zero.
    pub fn buffer(&self, name: &str) -> &'a [f32] {
        self.buffer_or(name, &ZERO_BLOCK)
    }

    /// Like [`InputView::buffer`] with a caller-provided fallback
    pub fn buffer_or(&self, name: &str, fallback: &'a [f32]) -> &'a [f32] {
        match self.first_node(name) {
            Some(slot) => self.node_block(slot),
            None => fallback,
        }
    }

    fn node_block(&self, slot: &'a UGenSlot) -> &'a [f32] {
        if self.consumer_rate.is_audio() && slot.rate.is_audio() {
            slot.output.first()
        } else {
            std::slice::from_ref(&slot.output.value)
        }
    }

    /// Current scalar value of the input (0 when absent)
    pub fn scalar(&self, name: &str) -> f32 {
        self.first_node(name).map_or(0.0, |slot| slot.output.value)
    }

    /// Literal data of a special input
    pub fn special(&self, name: &str) -> Option<&'a Value> {
        match self.inputs.get(name)? {
            Input::Special(value) => Some(value),
            _ => None,
        }
    }

    /// Upstream instances of a (possibly multi-valued) input
    pub fn nodes(&self, name: &str) -> &'a [NodeId] {
        self.inputs.get(name).map_or(&[], |input| input.node_ids())
    }

    /// Output channels of an upstream instance
    pub fn channels_of(&self, id: NodeId) -> &'a [Vec<f32>] {
        self.arena
            .get(id)
            .map_or(&[], |slot| slot.output.channels.as_slice())
    }

    /// Stride for reading an upstream instance directly
    pub fn stride_of(&self, id: NodeId) -> usize {
        match self.arena.get(id) {
            Some(slot) if slot.rate.is_audio() && self.consumer_rate.is_audio() => 1,
            _ => 0,
        }
    }

    pub fn value_of(&self, id: NodeId) -> f32 {
        self.arena.get(id).map_or(0.0, |slot| slot.output.value)
    }

    pub fn buffers(&self) -> &'a BufferTable {
        self.buffers
    }

    pub fn settings(&self) -> &'a AudioSettings {
        self.settings
    }

    pub fn consumer_rate(&self) -> Rate {
        self.consumer_rate
    }
}

/// Everything a node can touch while generating a block
pub struct GenContext<'a> {
    pub inputs: InputView<'a>,
    pub buses: &'a mut [Vec<f32>],
}

impl<'a> std::ops::Deref for GenContext<'a> {
    type Target = InputView<'a>;

    fn deref(&self) -> &Self::Target {
        &self.inputs
    }
}

/// Core trait for block-based unit generators
///
/// `gen` is called once per block in node list order, so every input has
/// already produced its block. It must not allocate.
pub trait UnitGen: Send {
    /// Compute the next `num_samps` samples into `out`
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize);

    /// Called after construction (`name == None`) and whenever an input is
    /// replaced. Recompute strides and pick the generation variant here.
    fn on_input_changed(&mut self, _inputs: &InputView<'_>, _name: Option<&str>) {}

    /// Fill the output before the first block (constant sources)
    fn init_output(&mut self, _out: &mut UGenOutput) {}

    /// Read a field of the private model
    fn model_field(&self, _field: &str) -> Option<f64> {
        None
    }

    /// Write a field of the private model. Returns false for unknown fields.
    fn set_model_field(&mut self, _field: &str, _value: f64, _out: &mut UGenOutput) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_keep_declaration_order() {
        let mut arena: Arena = SlotMap::with_key();
        let a = arena.insert(test_slot("value"));
        let b = arena.insert(test_slot("value"));

        let mut inputs = Inputs::new();
        inputs.insert("freq", Input::Node(a));
        inputs.insert("phase", Input::Node(b));
        inputs.insert("freq", Input::Node(b));

        let names: Vec<&str> = inputs.names().collect();
        assert_eq!(names, vec!["freq", "phase"]);
        assert_eq!(inputs.node_ids(), vec![b, b]);
    }

    #[test]
    fn test_retarget_multi_input() {
        let mut arena: Arena = SlotMap::with_key();
        let a = arena.insert(test_slot("value"));
        let b = arena.insert(test_slot("value"));
        let c = arena.insert(test_slot("value"));

        let mut inputs = Inputs::new();
        inputs.insert("sources", Input::Nodes(vec![a, b]));
        let touched = inputs.retarget(b, c);

        assert_eq!(touched, vec!["sources".to_string()]);
        assert_eq!(inputs.node_ids(), vec![a, c]);
    }

    #[test]
    fn test_capture_value() {
        let mut out = UGenOutput::new(1, 4);
        out.first_mut().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        out.capture_value(4);
        assert_eq!(out.value, 4.0);
        out.capture_value(2);
        assert_eq!(out.value, 2.0);
    }

    fn test_slot(type_name: &str) -> UGenSlot {
        UGenSlot {
            type_name: type_name.to_string(),
            name: None,
            rate: Rate::Constant,
            capability: Capability::Value,
            inputs: Inputs::new(),
            options: Map::new(),
            output: UGenOutput::new(1, 1),
            model: None,
        }
    }
}
