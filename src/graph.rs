//! Live unit generator graph
//!
//! An arena of instances plus the node list that orders them. All list
//! mutation goes through the four subtree operations; this type adds the
//! arena bookkeeping around them (freeing what leaves the list, pointing
//! parents at replacements, notifying nodes whose inputs changed).

use crate::buffer::BufferTable;
use crate::compiler::{free_subtree, Compiled, Compiler};
use crate::config::AudioSettings;
use crate::def::is_special_input;
use crate::error::{Error, Result};
use crate::node_list::{NodeList, SwapResult};
use crate::path::{Path, Segment};
use crate::ugen::{Arena, Capability, GenContext, Input, InputView, NodeId, UGenSlot};
use serde_json::{Map, Value};
use slotmap::SlotMap;
use tracing::debug;

/// What a path resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum PathValue {
    Node(NodeId),
    Nodes(Vec<NodeId>),
    Number(f64),
    Json(Value),
}

/// Re-run a node's input-change hook against the current arena
pub(crate) fn notify(
    arena: &mut Arena,
    id: NodeId,
    name: Option<&str>,
    buffers: &BufferTable,
    settings: &AudioSettings,
) {
    let Some(mut model) = arena.get_mut(id).and_then(|slot| slot.model.take()) else {
        return;
    };
    if let Some(slot) = arena.get(id) {
        let view = InputView::new(&*arena, &slot.inputs, slot.rate, buffers, settings);
        model.on_input_changed(&view, name);
    }
    if let Some(slot) = arena.get_mut(id) {
        slot.model = Some(model);
    }
}

#[derive(Debug, Default)]
pub struct UGenGraph {
    arena: Arena,
    list: NodeList<NodeId>,
}

impl UGenGraph {
    pub fn new() -> Self {
        Self {
            arena: SlotMap::with_key(),
            list: NodeList::new(),
        }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    pub fn list(&self) -> &NodeList<NodeId> {
        &self.list
    }

    pub fn slot(&self, id: NodeId) -> Option<&UGenSlot> {
        self.arena.get(id)
    }

    /// Node registered under `name`
    pub fn named(&self, name: &str) -> Option<NodeId> {
        self.list.named(name)
    }

    /// Instances in evaluation order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &UGenSlot)> {
        self.list
            .nodes()
            .iter()
            .filter_map(|&id| self.arena.get(id).map(|slot| (id, slot)))
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn insert_tree(&mut self, idx: usize, id: NodeId) -> usize {
        let idx = self.list.insert_tree(idx, id, &self.arena);
        debug!(idx, "inserted subtree");
        idx
    }

    /// Remove a subtree from the list and free its instances
    pub fn remove_tree(&mut self, id: NodeId) -> Option<usize> {
        let idx = self.list.remove_tree(id, &self.arena)?;
        free_subtree(&mut self.arena, id);
        debug!(idx, "removed subtree");
        Some(idx)
    }

    /// Put `new`'s subtree where `old`'s was and free `old`'s
    pub fn replace_tree(&mut self, new: NodeId, old: Option<NodeId>) -> usize {
        let idx = self.list.replace_tree(new, old, &self.arena);
        if let Some(old) = old {
            free_subtree(&mut self.arena, old);
        }
        debug!(idx, "replaced subtree");
        idx
    }

    /// Substitute `new` for `old` in place, see [`NodeList::swap_tree`].
    ///
    /// Parents of `old` are pointed at `new` and notified.
    pub fn swap_tree(
        &mut self,
        new: NodeId,
        old: NodeId,
        reattach: Option<&[&str]>,
        buffers: &BufferTable,
        settings: &AudioSettings,
    ) -> Option<SwapResult> {
        let result = self.list.swap_tree(new, old, reattach, &mut self.arena)?;
        for &id in &result.discarded {
            self.arena.remove(id);
        }
        notify(&mut self.arena, new, None, buffers, settings);
        self.retarget(old, new, buffers, settings);
        Some(result)
    }

    /// Point every input referencing `old` at `new`
    fn retarget(&mut self, old: NodeId, new: NodeId, buffers: &BufferTable, settings: &AudioSettings) {
        let mut touched = Vec::new();
        for (id, slot) in self.arena.iter_mut() {
            for name in slot.inputs.retarget(old, new) {
                touched.push((id, name));
            }
        }
        for (id, name) in touched {
            notify(&mut self.arena, id, Some(&name), buffers, settings);
        }
    }

    /// Drop every node
    pub fn clear(&mut self) {
        self.list.clear();
        self.arena.clear();
    }

    /// Generate one block for every node, in list order.
    ///
    /// With `clocked_only`, demand and scheduled nodes are skipped and hold
    /// their last output.
    pub fn gen(
        &mut self,
        buses: &mut [Vec<f32>],
        buffers: &BufferTable,
        settings: &AudioSettings,
        clocked_only: bool,
    ) {
        let arena = &mut self.arena;
        for &id in self.list.nodes() {
            let Some(slot) = arena.get_mut(id) else {
                continue;
            };
            if clocked_only && !slot.rate.is_clocked() {
                continue;
            }
            let Some(mut model) = slot.model.take() else {
                continue;
            };
            let mut output = std::mem::take(&mut slot.output);
            let num_samps = output.block_size();

            if let Some(slot) = arena.get(id) {
                let mut ctx = GenContext {
                    inputs: InputView::new(&*arena, &slot.inputs, slot.rate, buffers, settings),
                    buses: &mut *buses,
                };
                model.gen(&mut ctx, &mut output, num_samps);
            }

            if let Some(slot) = arena.get_mut(id) {
                slot.output = output;
                slot.model = Some(model);
            }
        }
    }

    fn root(&self, path: &Path, raw: &str) -> Result<NodeId> {
        self.named(&path.root)
            .ok_or_else(|| Error::PathNotFound(raw.to_string()))
    }

    /// Resolve a dotted path
    pub fn get(&self, path: &str) -> Result<PathValue> {
        let parsed = Path::parse(path)?;
        let mut current = PathValue::Node(self.root(&parsed, path)?);
        for segment in &parsed.segments {
            current = self.step(current, segment, path)?;
        }
        Ok(current)
    }

    /// Scalar at a path: a node's current value, a model field or a number
    pub fn get_value(&self, path: &str) -> Result<Option<f64>> {
        Ok(match self.get(path)? {
            PathValue::Node(id) => self.arena.get(id).map(|slot| slot.output.value as f64),
            PathValue::Number(n) => Some(n),
            PathValue::Json(value) => value.as_f64(),
            PathValue::Nodes(_) => None,
        })
    }

    fn step(&self, current: PathValue, segment: &Segment, raw: &str) -> Result<PathValue> {
        let not_found = || Error::PathNotFound(raw.to_string());
        let through = || Error::PathThroughNonContainer(raw.to_string());

        match (current, segment) {
            (PathValue::Node(id), Segment::Input(name)) => {
                let slot = self.arena.get(id).ok_or_else(not_found)?;
                match slot.inputs.get(name).ok_or_else(not_found)? {
                    Input::Node(child) => Ok(PathValue::Node(*child)),
                    Input::Nodes(ids) => Ok(PathValue::Nodes(ids.clone())),
                    Input::Special(value) => Ok(PathValue::Json(value.clone())),
                }
            }
            (PathValue::Node(id), Segment::Model(field)) => {
                let slot = self.arena.get(id).ok_or_else(not_found)?;
                slot.model_field(field)
                    .map(PathValue::Number)
                    .ok_or_else(not_found)
            }
            (PathValue::Node(id), Segment::Options(keys)) => {
                let slot = self.arena.get(id).ok_or_else(not_found)?;
                let mut value = Value::Object(slot.options.clone());
                for key in keys {
                    value = json_step(value, key).ok_or_else(not_found)?;
                }
                Ok(PathValue::Json(value))
            }
            (PathValue::Nodes(ids), Segment::Index(i)) => {
                ids.get(*i).copied().map(PathValue::Node).ok_or_else(not_found)
            }
            (PathValue::Json(value), Segment::Input(key)) => {
                if !value.is_object() {
                    return Err(through());
                }
                json_step(value, key).map(PathValue::Json).ok_or_else(not_found)
            }
            (PathValue::Json(Value::Array(items)), Segment::Index(i)) => items
                .get(*i)
                .cloned()
                .map(PathValue::Json)
                .ok_or_else(not_found),
            _ => Err(through()),
        }
    }

    /// Assign a value at a path.
    ///
    /// - `node.input` with a number, where the input is a value node: updated in place
    /// - `node.input` otherwise: the value compiles to a new subtree that replaces the old one
    /// - special inputs (`list`, `buffer`, ...): stored as literal data
    /// - `node.model.field`: written through the node's model
    /// - `node.options.key`: stored in the node's options
    /// - `node` alone: the whole node is replaced by the compiled value
    pub fn set(&mut self, path: &str, value: &Value, compiler: &Compiler<'_>) -> Result<()> {
        let parsed = Path::parse(path)?;
        let root = self.root(&parsed, path)?;
        let ctx = compiler.context();

        let Some((last, init)) = parsed.segments.split_last() else {
            return self.replace_node(root, value, compiler);
        };

        // Walk to the owner of the last segment
        let mut current = PathValue::Node(root);
        let mut owner: Option<(NodeId, String)> = None;
        for segment in init {
            if let (PathValue::Node(id), Segment::Input(name)) = (&current, segment) {
                owner = Some((*id, name.clone()));
            }
            current = self.step(current, segment, path)?;
        }

        match (current, last) {
            (PathValue::Node(id), Segment::Input(name)) => {
                self.set_input(id, name, value, compiler)
            }
            (PathValue::Node(id), Segment::Model(field)) => {
                let number = value
                    .as_f64()
                    .ok_or_else(|| Error::InvalidDef(format!("{} expects a number", path)))?;
                let slot = self
                    .arena
                    .get_mut(id)
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                let handled = match slot.model.as_mut() {
                    Some(model) => model.set_model_field(field, number, &mut slot.output),
                    None => false,
                };
                if handled {
                    Ok(())
                } else if field == "value" {
                    slot.output.value = number as f32;
                    Ok(())
                } else {
                    Err(Error::PathNotFound(path.to_string()))
                }
            }
            (PathValue::Node(id), Segment::Options(keys)) => {
                let slot = self
                    .arena
                    .get_mut(id)
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                // Stored only; models read their options at construction
                set_option(&mut slot.options, keys, value.clone())
                    .ok_or_else(|| Error::PathThroughNonContainer(path.to_string()))
            }
            (PathValue::Nodes(ids), Segment::Index(i)) => {
                let old = *ids
                    .get(*i)
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                let Some((parent, name)) = owner else {
                    return Err(Error::PathNotFound(path.to_string()));
                };
                let new = self.compile_single(value, compiler)?;
                self.replace_tree(new, Some(old));
                if let Some(Input::Nodes(ids)) =
                    self.arena.get_mut(parent).and_then(|s| s.inputs.get_mut(&name))
                {
                    ids[*i] = new;
                }
                notify(&mut self.arena, parent, Some(&name), &ctx.buffers, &ctx.settings);
                Ok(())
            }
            _ => Err(Error::PathThroughNonContainer(path.to_string())),
        }
    }

    fn set_input(
        &mut self,
        parent: NodeId,
        name: &str,
        value: &Value,
        compiler: &Compiler<'_>,
    ) -> Result<()> {
        let ctx = compiler.context();
        let current = self
            .arena
            .get(parent)
            .and_then(|slot| slot.inputs.get(name))
            .cloned();

        if is_special_input(name) {
            if let Some(slot) = self.arena.get_mut(parent) {
                slot.inputs.insert(name, Input::Special(value.clone()));
            }
            notify(&mut self.arena, parent, Some(name), &ctx.buffers, &ctx.settings);
            return Ok(());
        }

        // In-place update of a constant source
        if let (Some(number), Some(Input::Node(child))) = (value.as_f64(), &current) {
            if let Some(slot) = self.arena.get_mut(*child) {
                if slot.capability == Capability::Value {
                    if let Some(model) = slot.model.as_mut() {
                        model.set_model_field("value", number, &mut slot.output);
                    }
                    notify(&mut self.arena, parent, Some(name), &ctx.buffers, &ctx.settings);
                    debug!(input = name, value = number, "updated value in place");
                    return Ok(());
                }
            }
        }

        let compiled = compiler.compile(value, &mut self.arena)?;
        match (&current, &compiled) {
            (Some(Input::Node(old)), Compiled::One(new)) => {
                self.replace_tree(*new, Some(*old));
            }
            _ => {
                let mut idx = None;
                if let Some(input) = &current {
                    for &old in input.node_ids() {
                        if let Some(removed) = self.remove_tree(old) {
                            idx = Some(idx.map_or(removed, |i: usize| i.min(removed)));
                        }
                    }
                }
                let mut idx = idx
                    .or_else(|| self.list.index_of(parent))
                    .unwrap_or(self.list.len());
                for &new in compiled.ids() {
                    idx = self.insert_tree(idx, new) + 1;
                }
            }
        }

        if let Some(slot) = self.arena.get_mut(parent) {
            slot.inputs.insert(name, compiled.into_input());
        }
        notify(&mut self.arena, parent, Some(name), &ctx.buffers, &ctx.settings);
        Ok(())
    }

    fn compile_single(&mut self, value: &Value, compiler: &Compiler<'_>) -> Result<NodeId> {
        match compiler.compile(value, &mut self.arena)? {
            Compiled::One(id) => Ok(id),
            Compiled::Many(ids) => {
                for id in ids {
                    free_subtree(&mut self.arena, id);
                }
                Err(Error::InvalidDef("expected a single def".to_string()))
            }
        }
    }

    /// Replace a named node with a freshly compiled one. Parents follow.
    fn replace_node(&mut self, old: NodeId, value: &Value, compiler: &Compiler<'_>) -> Result<()> {
        let ctx = compiler.context();
        let new = self.compile_single(value, compiler)?;
        self.replace_tree(new, Some(old));
        self.retarget(old, new, &ctx.buffers, &ctx.settings);
        Ok(())
    }

    /// Swap the node at `path` for a freshly compiled one, adopting the
    /// inputs named in `reattach` (or all of them when `None`)
    pub fn swap(
        &mut self,
        path: &str,
        def: &Value,
        reattach: Option<&[&str]>,
        compiler: &Compiler<'_>,
    ) -> Result<NodeId> {
        let old = match self.get(path)? {
            PathValue::Node(id) => id,
            _ => return Err(Error::PathThroughNonContainer(path.to_string())),
        };
        let ctx = compiler.context();
        let new = self.compile_single(def, compiler)?;
        if self
            .swap_tree(new, old, reattach, &ctx.buffers, &ctx.settings)
            .is_none()
        {
            free_subtree(&mut self.arena, new);
            return Err(Error::PathNotFound(path.to_string()));
        }
        Ok(new)
    }
}

fn json_step(value: Value, key: &str) -> Option<Value> {
    match value {
        Value::Object(mut obj) => obj.remove(key),
        Value::Array(mut items) => {
            let i = key.parse::<usize>().ok()?;
            (i < items.len()).then(|| items.swap_remove(i))
        }
        _ => None,
    }
}

/// Write `value` at `keys` inside `options`, creating objects on the way
fn set_option(options: &mut Map<String, Value>, keys: &[String], value: Value) -> Option<()> {
    let (last, init) = keys.split_last()?;
    let mut target = options;
    for key in init {
        let entry = target
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        target = entry.as_object_mut()?;
    }
    target.insert(last.clone(), value);
    Some(())
}
