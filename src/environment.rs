//! Evaluation engine
//!
//! The environment owns the shared buses and an ordered list of synths. Each
//! call to [`Environment::gen`] zeroes every bus, then runs every clocked
//! synth once in list order. Output nodes sum into their buses, so synths
//! sharing a bus mix.
//!
//! Bus layout:
//! - `0..chans` hardware outputs
//! - `chans..chans + num_input_buses` hardware inputs
//! - the rest interconnect buses, handed out by [`Environment::acquire_next_bus`]

use crate::buffer::BufferTable;
use crate::compiler::EngineContext;
use crate::config::AudioSettings;
use crate::error::{Error, Result};
use crate::node_list::{NodeList, NodeTree};
use crate::rate::Rate;
use crate::registry::Registry;
use crate::synth::Synth;
use serde_json::Value;
use slotmap::{new_key_type, SlotMap};
use std::sync::Arc;
use tracing::debug;

new_key_type! {
    /// Stable key of a synth in an environment
    pub struct SynthId;
}

/// Where a new synth goes in the evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddTo {
    Head,
    #[default]
    Tail,
    Index(usize),
    Before(SynthId),
    After(SynthId),
}

#[derive(Debug, Clone, Default)]
pub struct SynthOptions {
    /// Name for [`Environment::synth_named`]
    pub name: Option<String>,
    /// Unclocked rates (demand, scheduled) turn the whole synth into one
    /// driven by pulls instead of the block clock
    pub rate: Option<Rate>,
    pub add_to: AddTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Interconnect,
    Input,
}

impl BusKind {
    fn as_str(&self) -> &'static str {
        match self {
            BusKind::Interconnect => "interconnect",
            BusKind::Input => "input",
        }
    }
}

type Synths = SlotMap<SynthId, Synth>;

impl NodeTree<SynthId> for Synths {
    fn name_of(&self, id: SynthId) -> Option<&str> {
        self.get(id).and_then(Synth::name)
    }

    fn inputs_of(&self, _id: SynthId) -> Vec<SynthId> {
        Vec::new()
    }
}

pub struct Environment {
    ctx: EngineContext,
    buses: Vec<Vec<f32>>,
    next_input_bus: usize,
    next_interconnect_bus: usize,
    synths: Synths,
    order: NodeList<SynthId>,
}

impl Environment {
    pub fn new(settings: AudioSettings) -> Self {
        Self::with_registry(settings, Registry::with_builtins())
    }

    /// Environment using a custom set of unit generator types
    pub fn with_registry(settings: AudioSettings, registry: Registry) -> Self {
        let settings = settings.clamped();
        let buses = vec![vec![0.0; settings.block_size]; settings.num_buses];
        debug!(
            sample_rate = settings.sample_rate,
            block_size = settings.block_size,
            chans = settings.chans,
            num_buses = settings.num_buses,
            "environment created"
        );
        Self {
            next_input_bus: settings.first_input_bus(),
            next_interconnect_bus: settings.first_interconnect_bus(),
            ctx: EngineContext {
                settings,
                registry: Arc::new(registry),
                buffers: BufferTable::new(),
            },
            buses,
            synths: SlotMap::with_key(),
            order: NodeList::new(),
        }
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.ctx.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.ctx.registry
    }

    pub fn buffers(&self) -> &BufferTable {
        &self.ctx.buffers
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Compile a synth that is not added to the evaluation order
    pub fn compile_synth(&self, def: &Value, options: &SynthOptions) -> Result<Synth> {
        Synth::new(def, self.ctx.clone(), options.name.clone(), options.rate)
    }

    pub fn add_synth(&mut self, def: &Value, options: SynthOptions) -> Result<SynthId> {
        let idx = match options.add_to {
            AddTo::Head => 0,
            AddTo::Tail => self.order.len(),
            AddTo::Index(idx) => idx.min(self.order.len()),
            AddTo::Before(other) => self
                .order
                .index_of(other)
                .ok_or_else(|| Error::UnknownSynth(format!("{:?}", other)))?,
            AddTo::After(other) => self
                .order
                .index_of(other)
                .ok_or_else(|| Error::UnknownSynth(format!("{:?}", other)))?
                + 1,
        };

        let synth = self.compile_synth(def, &options)?;
        let id = self.synths.insert(synth);
        self.order.insert(idx, id, &self.synths);
        debug!(name = ?options.name, idx, "synth added");
        Ok(id)
    }

    pub fn remove_synth(&mut self, id: SynthId) -> Option<Synth> {
        self.order.remove(id, &self.synths)?;
        let synth = self.synths.remove(id);
        debug!(name = ?synth.as_ref().and_then(Synth::name), "synth removed");
        synth
    }

    pub fn synth(&self, id: SynthId) -> Option<&Synth> {
        self.synths.get(id)
    }

    pub fn synth_mut(&mut self, id: SynthId) -> Option<&mut Synth> {
        self.synths.get_mut(id)
    }

    /// Latest synth added under `name`
    pub fn synth_named(&self, name: &str) -> Option<SynthId> {
        self.order.named(name)
    }

    /// Synths in evaluation order
    pub fn synth_ids(&self) -> &[SynthId] {
        self.order.nodes()
    }

    /// Evaluate one block
    pub fn gen(&mut self) {
        for bus in self.buses.iter_mut() {
            bus.fill(0.0);
        }
        for &id in self.order.nodes() {
            if let Some(synth) = self.synths.get_mut(id) {
                if synth.is_clocked() {
                    synth.gen(&mut self.buses);
                }
            }
        }
    }

    /// Hardware output buses of the last block
    pub fn output(&self) -> &[Vec<f32>] {
        &self.buses[..self.ctx.settings.chans.min(self.buses.len())]
    }

    pub fn bus(&self, idx: usize) -> Option<&[f32]> {
        self.buses.get(idx).map(Vec::as_slice)
    }

    /// Evaluate one block into an interleaved frame buffer.
    ///
    /// Returns the number of frames written, at most one block.
    pub fn render_interleaved(&mut self, out: &mut [f32]) -> usize {
        self.gen();
        let chans = self.ctx.settings.chans;
        let frames = (out.len() / chans).min(self.ctx.settings.block_size);
        for (i, frame) in out.chunks_exact_mut(chans).take(frames).enumerate() {
            for (c, s) in frame.iter_mut().enumerate() {
                *s = self.buses[c][i];
            }
        }
        frames
    }

    /// Render `num_frames` frames offline, one buffer per output channel
    pub fn render(&mut self, num_frames: usize) -> Vec<Vec<f32>> {
        let chans = self.ctx.settings.chans;
        let block_size = self.ctx.settings.block_size;
        let mut channels = vec![Vec::with_capacity(num_frames); chans];
        let mut remaining = num_frames;
        while remaining > 0 {
            self.gen();
            let n = remaining.min(block_size);
            for (channel, bus) in channels.iter_mut().zip(self.buses.iter()) {
                channel.extend_from_slice(&bus[..n]);
            }
            remaining -= n;
        }
        channels
    }

    /// Drop every synth, silence the buses and release acquired buses
    pub fn reset(&mut self) {
        self.order.clear();
        self.synths.clear();
        for bus in self.buses.iter_mut() {
            bus.fill(0.0);
        }
        self.next_input_bus = self.ctx.settings.first_input_bus();
        self.next_interconnect_bus = self.ctx.settings.first_interconnect_bus();
        debug!("environment reset");
    }

    /// Hand out the next unused bus of a kind
    pub fn acquire_next_bus(&mut self, kind: BusKind) -> Result<usize> {
        let settings = &self.ctx.settings;
        let (next, end) = match kind {
            BusKind::Input => (
                &mut self.next_input_bus,
                settings.first_input_bus() + settings.num_input_buses,
            ),
            BusKind::Interconnect => (&mut self.next_interconnect_bus, settings.num_buses),
        };
        if *next >= end {
            return Err(Error::BusPoolExhausted(kind.as_str().to_string()));
        }
        let bus = *next;
        *next += 1;
        debug!(bus, kind = kind.as_str(), "bus acquired");
        Ok(bus)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("settings", &self.ctx.settings)
            .field("synths", &self.order.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env() -> Environment {
        Environment::new(AudioSettings {
            block_size: 4,
            chans: 2,
            num_buses: 6,
            num_input_buses: 2,
            ..AudioSettings::default()
        })
    }

    #[test]
    fn test_bus_allocation() {
        let mut env = env();
        assert_eq!(env.acquire_next_bus(BusKind::Input).unwrap(), 2);
        assert_eq!(env.acquire_next_bus(BusKind::Input).unwrap(), 3);
        assert!(matches!(
            env.acquire_next_bus(BusKind::Input),
            Err(Error::BusPoolExhausted(_))
        ));

        assert_eq!(env.acquire_next_bus(BusKind::Interconnect).unwrap(), 4);
        assert_eq!(env.acquire_next_bus(BusKind::Interconnect).unwrap(), 5);
        assert!(env.acquire_next_bus(BusKind::Interconnect).is_err());

        env.reset();
        assert_eq!(env.acquire_next_bus(BusKind::Interconnect).unwrap(), 4);
    }

    #[test]
    fn test_add_positions() {
        let mut env = env();
        let named = |name: &str| SynthOptions {
            name: Some(name.to_string()),
            ..Default::default()
        };
        let a = env.add_synth(&json!(0), named("a")).unwrap();
        let c = env.add_synth(&json!(0), named("c")).unwrap();
        let b = env
            .add_synth(&json!(0), SynthOptions { add_to: AddTo::Before(c), ..named("b") })
            .unwrap();
        let head = env
            .add_synth(&json!(0), SynthOptions { add_to: AddTo::Head, ..named("head") })
            .unwrap();
        let after = env
            .add_synth(&json!(0), SynthOptions { add_to: AddTo::After(head), ..named("after") })
            .unwrap();

        assert_eq!(env.synth_ids(), &[head, after, a, b, c]);
        assert_eq!(env.synth_named("b"), Some(b));

        env.remove_synth(b);
        assert_eq!(env.synth_named("b"), None);
        assert_eq!(env.synth_ids(), &[head, after, a, c]);
    }

    #[test]
    fn test_before_unknown_synth_fails() {
        let mut env = env();
        let gone = env.add_synth(&json!(0), SynthOptions::default()).unwrap();
        env.remove_synth(gone);
        let result = env.add_synth(
            &json!(0),
            SynthOptions {
                add_to: AddTo::Before(gone),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::UnknownSynth(_))));
    }

    #[test]
    fn test_render_interleaved() {
        let mut env = env();
        env.add_synth(
            &json!({ "ugen": "out", "sources": [0.25, 0.5] }),
            SynthOptions::default(),
        )
        .unwrap();

        let mut frames = vec![0.0; 8];
        assert_eq!(env.render_interleaved(&mut frames), 4);
        assert_eq!(frames, vec![0.25, 0.5, 0.25, 0.5, 0.25, 0.5, 0.25, 0.5]);
    }

    #[test]
    fn test_render_partial_block() {
        let mut env = env();
        env.add_synth(&json!({ "ugen": "lfSaw", "freq": 0 }), SynthOptions::default())
            .unwrap();
        let channels = env.render(10);
        assert_eq!(channels.len(), 2);
        assert!(channels.iter().all(|c| c.len() == 10));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut env = env();
        env.add_synth(&json!({ "ugen": "sin" }), SynthOptions::default())
            .unwrap();
        env.gen();
        env.reset();
        env.reset();
        assert!(env.synth_ids().is_empty());
        env.gen();
        assert!(env.output().iter().all(|c| c.iter().all(|&s| s == 0.0)));
    }
}
