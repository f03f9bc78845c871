//! Bus reader
//!
//! Reads whatever earlier synths in the same cycle summed into a bus. Used to
//! route one synth into another through interconnect buses.

use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};

/// Bus reader
#[derive(Default)]
pub struct InNode {
    /// Scales and offsets the bus contents
    mul_add: MulAdd,
}

impl UnitGen for InNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let bus = ctx.scalar("bus").max(0.0) as usize;
        let own = &mut out.first_mut()[..num_samps];
        match ctx.buses.get(bus) {
            Some(source) => {
                for (s, &v) in own.iter_mut().zip(source.iter()) {
                    *s = v;
                }
            }
            None => own.fill(0.0),
        }
        self.mul_add.apply(&ctx.inputs, own);
        out.capture_value(num_samps);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, _name: Option<&str>) {
        self.mul_add.on_input_changed(inputs);
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "in",
        UGenDefaults::new(Rate::Audio).input("bus", 0),
        |_| Ok(Box::new(InNode::default())),
    );
}

#[cfg(test)]
mod tests {
    use crate::environment::{AddTo, SynthOptions};
    use crate::nodes::test_support::{env_with, render_bus};
    use crate::BusKind;
    use serde_json::json;

    #[test]
    fn test_in_reads_interconnect_bus() {
        let mut env = env_with(8, 1);
        let bus = env.acquire_next_bus(BusKind::Interconnect).unwrap();

        env.add_synth(
            &json!({ "ugen": "out", "bus": bus, "sources": 0.5 }),
            SynthOptions::default(),
        )
        .unwrap();
        env.add_synth(
            &json!({ "ugen": "in", "bus": bus, "mul": 2 }),
            SynthOptions {
                add_to: AddTo::Tail,
                ..Default::default()
            },
        )
        .unwrap();
        env.gen();

        assert!(render_bus(&env, 0).iter().all(|&s| s == 1.0));
    }
}
