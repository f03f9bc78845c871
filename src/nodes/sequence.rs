//! Step sequencer over a literal `list` of numbers
//!
//! At demand rate each pull emits the next entry. At clocked rates the
//! sequence advances `freq` times per second. With `loop` > 0 it wraps to the
//! start, otherwise it holds the last entry.

use crate::error::Error;
use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};
use serde_json::Value;
use tracing::warn;

pub struct SequenceNode {
    /// Entries emitted in order
    list: Vec<f32>,
    /// Position of the entry currently emitted
    index: usize,
    /// Fraction of the current step elapsed (clocked rates)
    phase: f32,
    /// Clock the `freq` input is measured against
    sample_rate: f32,
    /// Advance once per generated sample instead of by `freq`
    per_pull: bool,
    mul_add: MulAdd,
}

fn parse_list(value: Option<&Value>) -> Result<Vec<f32>, Error> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_f64()
                    .map(|v| v as f32)
                    .ok_or_else(|| Error::InvalidDef(format!("list entry is not a number: {}", item)))
            })
            .collect(),
        Some(other) => Err(Error::InvalidDef(format!("list must be an array, got {}", other))),
    }
}

impl SequenceNode {
    pub fn new(list: Vec<f32>, rate: Rate, sample_rate: f32) -> Self {
        Self {
            list,
            index: 0,
            phase: 0.0,
            sample_rate,
            per_pull: !rate.is_clocked(),
            mul_add: MulAdd::new(),
        }
    }

    fn current(&self) -> f32 {
        self.list.get(self.index).copied().unwrap_or(0.0)
    }

    fn advance(&mut self, looping: bool) {
        if self.index + 1 < self.list.len() {
            self.index += 1;
        } else if looping {
            self.index = 0;
        }
    }

    /// Move `steps` entries at once, wrapping or holding at the last entry
    fn advance_by(&mut self, steps: f64, looping: bool) {
        let len = self.list.len();
        if len == 0 {
            return;
        }
        if looping {
            let offset = (steps % len as f64) as usize;
            self.index = (self.index + offset) % len;
        } else {
            self.index = self.index.saturating_add(steps as usize).min(len - 1);
        }
    }

    /// Accumulate one sample of clock and advance by every whole step elapsed
    fn tick(&mut self, step: f32, looping: bool) {
        self.phase += step;
        if !self.phase.is_finite() || self.phase < 0.0 {
            self.phase = 0.0;
        } else if self.phase >= 1.0 {
            let steps = self.phase.floor();
            self.phase -= steps;
            self.advance_by(steps as f64, looping);
        }
    }
}

impl UnitGen for SequenceNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let looping = ctx.scalar("loop") > 0.0;
        let own = &mut out.first_mut()[..num_samps];

        if self.per_pull {
            for s in own.iter_mut() {
                *s = self.current();
                self.advance(looping);
            }
        } else {
            let step = ctx.scalar("freq") / self.sample_rate;
            for s in own.iter_mut() {
                *s = self.current();
                self.tick(step, looping);
            }
        }
        self.mul_add.apply(&ctx.inputs, own);
        out.capture_value(num_samps);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, name: Option<&str>) {
        if name == Some("list") {
            match parse_list(inputs.special("list")) {
                Ok(list) => {
                    self.list = list;
                    self.index = 0;
                    self.phase = 0.0;
                }
                Err(e) => warn!(error = %e, "keeping previous list"),
            }
        }
        self.mul_add.on_input_changed(inputs);
    }

    fn model_field(&self, field: &str) -> Option<f64> {
        (field == "index").then_some(self.index as f64)
    }

    fn set_model_field(&mut self, field: &str, value: f64, _out: &mut UGenOutput) -> bool {
        if field != "index" {
            return false;
        }
        self.index = (value.max(0.0) as usize).min(self.list.len().saturating_sub(1));
        true
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "sequence",
        UGenDefaults::new(Rate::Control)
            .input("freq", 1.0)
            .input("loop", 1.0),
        |build| {
            let list = parse_list(build.special("list"))?;
            Ok(Box::new(SequenceNode::new(list, build.rate, build.sample_rate())))
        },
    );
}
