//! Value node - a constant source
//!
//! Bare numbers in a def compile into this node. Its value can be changed in
//! place through the `value` model field without rebuilding the graph.

use crate::error::Error;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{Capability, GenContext, InputView, UGenOutput, UnitGen};
use serde_json::Value;

pub struct ValueNode {
    /// Level written to every sample
    value: f32,
}

impl ValueNode {
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

impl UnitGen for ValueNode {
    fn gen(&mut self, _ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        for s in out.first_mut().iter_mut().take(num_samps) {
            *s = self.value;
        }
        out.value = self.value;
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, name: Option<&str>) {
        if matches!(name, None | Some("value")) {
            if let Some(v) = inputs.special("value").and_then(Value::as_f64) {
                self.value = v as f32;
            }
        }
    }

    fn init_output(&mut self, out: &mut UGenOutput) {
        for channel in out.channels.iter_mut() {
            channel.fill(self.value);
        }
        out.value = self.value;
    }

    fn model_field(&self, field: &str) -> Option<f64> {
        (field == "value").then_some(self.value as f64)
    }

    fn set_model_field(&mut self, field: &str, value: f64, out: &mut UGenOutput) -> bool {
        if field != "value" {
            return false;
        }
        self.value = value as f32;
        self.init_output(out);
        true
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "value",
        UGenDefaults::new(Rate::Constant)
            .input("value", 1.0)
            .capability(Capability::Value),
        |build| {
            let value = match build.special("value") {
                Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                None | Some(Value::Null) => 0.0,
                Some(other) => {
                    return Err(Error::InvalidDef(format!(
                        "value must be a number, got {}",
                        other
                    )))
                }
            };
            Ok(Box::new(ValueNode::new(value as f32)))
        },
    );
}
