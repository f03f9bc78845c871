//! Timed mutations against an environment
//!
//! The scheduler keeps its own clock in milliseconds and only moves when it is
//! advanced, so the caller decides which thread and which moment listeners run
//! on (normally between two `Environment::gen` calls). Delays are given in the
//! units of a [`TimeConverter`].
//!
//! One-shot listeners fire once and disappear. Repeating listeners fire on
//! every multiple of their interval until cleared.

use crate::environment::{Environment, SynthOptions};
use crate::error::{Error, Result};
use crate::rate::Rate;
use crate::synth::Synth;
use serde_json::Value;
use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;
use tracing::trace;

new_key_type! {
    pub struct ListenerId;
}

/// Converts scheduling units to milliseconds
pub trait TimeConverter: Send {
    fn to_ms(&self, time: f64) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Milliseconds;

impl TimeConverter for Milliseconds {
    fn to_ms(&self, time: f64) -> f64 {
        time
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Seconds;

impl TimeConverter for Seconds {
    fn to_ms(&self, time: f64) -> f64 {
        time * 1000.0
    }
}

/// Beats at a fixed tempo
#[derive(Debug, Clone, Copy)]
pub struct Beats {
    pub bpm: f64,
}

impl TimeConverter for Beats {
    fn to_ms(&self, time: f64) -> f64 {
        if self.bpm <= 0.0 {
            return f64::INFINITY;
        }
        time * 60_000.0 / self.bpm
    }
}

/// Mutation run by a listener: gets the environment and the firing time (ms)
pub type Callback = Box<dyn FnMut(&mut Environment, f64) -> Result<()> + Send>;

/// Value of one assignment in a [`ChangeSpec`]
pub enum ChangeValue {
    Static(Value),
    /// Pulled from a demand-rate synth each time the change runs. The synth
    /// is compiled on first use and kept.
    Demand { def: Value, synth: Option<Synth> },
}

/// Declarative set of assignments against one synth
///
/// ```json
/// { "synth": "lead", "values": { "osc.freq": 220, "osc.mul": { "synthDef": { ... } } } }
/// ```
pub struct ChangeSpec {
    pub synth: String,
    pub values: Vec<(String, ChangeValue)>,
}

impl ChangeSpec {
    pub fn from_value(value: &Value) -> Result<Self> {
        let synth = value
            .get("synth")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidSchedule(format!("change needs a synth name: {}", value)))?
            .to_string();
        let values = value
            .get("values")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::InvalidSchedule(format!("change needs values: {}", value)))?
            .iter()
            .map(|(path, v)| {
                let change = match v.get("synthDef") {
                    Some(def) => ChangeValue::Demand {
                        def: def.clone(),
                        synth: None,
                    },
                    None => ChangeValue::Static(v.clone()),
                };
                (path.clone(), change)
            })
            .collect();
        Ok(Self { synth, values })
    }

    fn apply(&mut self, env: &mut Environment) -> Result<()> {
        let mut resolved = Vec::with_capacity(self.values.len());
        for (path, change) in self.values.iter_mut() {
            let value = match change {
                ChangeValue::Static(value) => value.clone(),
                ChangeValue::Demand { def, synth } => {
                    if synth.is_none() {
                        let options = SynthOptions {
                            rate: Some(Rate::Demand),
                            ..Default::default()
                        };
                        *synth = Some(env.compile_synth(def, &options)?);
                    }
                    Value::from(synth.as_mut().map_or(0.0, Synth::pull) as f64)
                }
            };
            resolved.push((path.as_str(), value));
        }

        let id = env
            .synth_named(&self.synth)
            .ok_or_else(|| Error::UnknownSynth(self.synth.clone()))?;
        let target = env
            .synth_mut(id)
            .ok_or_else(|| Error::UnknownSynth(self.synth.clone()))?;
        for (path, value) in resolved {
            target.set(path, value)?;
        }
        Ok(())
    }
}

pub enum Action {
    Call(Callback),
    Fire(String),
    Change(ChangeSpec),
}

impl Action {
    pub fn call<F>(f: F) -> Self
    where
        F: FnMut(&mut Environment, f64) -> Result<()> + Send + 'static,
    {
        Action::Call(Box::new(f))
    }

    pub fn fire(event: impl Into<String>) -> Self {
        Action::Fire(event.into())
    }

    pub fn change(spec: ChangeSpec) -> Self {
        Action::Change(spec)
    }
}

struct Listener {
    due: f64,
    interval: Option<f64>,
    /// Registration order, breaks ties between listeners due together
    seq: u64,
    action: Action,
}

pub struct Scheduler {
    now: f64,
    converter: Box<dyn TimeConverter>,
    listeners: SlotMap<ListenerId, Listener>,
    handlers: HashMap<String, Vec<Callback>>,
    next_seq: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Milliseconds)
    }
}

impl Scheduler {
    pub fn new(converter: impl TimeConverter + 'static) -> Self {
        Self {
            now: 0.0,
            converter: Box::new(converter),
            listeners: SlotMap::with_key(),
            handlers: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Current clock in milliseconds
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.contains_key(id)
    }

    fn schedule(&mut self, due: f64, interval: Option<f64>, action: Action) -> ListenerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.listeners.insert(Listener {
            due,
            interval,
            seq,
            action,
        })
    }

    /// Run `action` once, `delay` units from now
    pub fn once(&mut self, delay: f64, action: Action) -> Result<ListenerId> {
        let delay = self.converter.to_ms(delay);
        if !(delay >= 0.0) {
            return Err(Error::InvalidSchedule(format!("delay must not be negative, got {}", delay)));
        }
        Ok(self.schedule(self.now + delay, None, action))
    }

    /// Run `action` every `interval` units, first one interval from now
    pub fn repeat(&mut self, interval: f64, action: Action) -> Result<ListenerId> {
        let interval = self.converter.to_ms(interval);
        if !(interval > 0.0 && interval.is_finite()) {
            return Err(Error::InvalidSchedule(format!("interval must be positive, got {}", interval)));
        }
        Ok(self.schedule(self.now + interval, Some(interval), action))
    }

    /// Remove a listener. Returns false when it already fired or was cleared.
    pub fn clear(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id).is_some()
    }

    pub fn clear_all(&mut self) {
        self.listeners.clear();
    }

    /// Register a handler for a named event
    pub fn on<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: FnMut(&mut Environment, f64) -> Result<()> + Send + 'static,
    {
        self.handlers
            .entry(event.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Run every handler of `event` now
    pub fn fire(&mut self, event: &str, env: &mut Environment) -> Result<()> {
        fire_handlers(&mut self.handlers, event, env, self.now)
    }

    /// Move the clock forward by `delta_ms`
    pub fn advance(&mut self, delta_ms: f64, env: &mut Environment) -> Result<()> {
        self.advance_to(self.now + delta_ms, env)
    }

    /// Move the clock to `target_ms`, running every listener due on the way
    /// in time order
    pub fn advance_to(&mut self, target_ms: f64, env: &mut Environment) -> Result<()> {
        while let Some(id) = self.next_due(target_ms) {
            let due = self.listeners[id].due;
            self.now = due;
            trace!(at = due, "listener due");

            let result = match self.listeners[id].interval {
                Some(interval) => {
                    let listener = &mut self.listeners[id];
                    listener.due += interval;
                    run(&mut listener.action, &mut self.handlers, env, due)
                }
                None => match self.listeners.remove(id) {
                    Some(mut listener) => run(&mut listener.action, &mut self.handlers, env, due),
                    None => Ok(()),
                },
            };
            result?;
        }
        if target_ms > self.now {
            self.now = target_ms;
        }
        Ok(())
    }

    fn next_due(&self, target_ms: f64) -> Option<ListenerId> {
        self.listeners
            .iter()
            .filter(|(_, l)| l.due <= target_ms)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)))
            .map(|(id, _)| id)
    }
}

fn run(
    action: &mut Action,
    handlers: &mut HashMap<String, Vec<Callback>>,
    env: &mut Environment,
    now: f64,
) -> Result<()> {
    match action {
        Action::Call(f) => f(env, now),
        Action::Fire(event) => fire_handlers(handlers, event, env, now),
        Action::Change(spec) => spec.apply(env),
    }
}

fn fire_handlers(
    handlers: &mut HashMap<String, Vec<Callback>>,
    event: &str,
    env: &mut Environment,
    now: f64,
) -> Result<()> {
    trace!(event, "firing");
    if let Some(list) = handlers.get_mut(event) {
        for handler in list.iter_mut() {
            handler(env, now)?;
        }
    }
    Ok(())
}
