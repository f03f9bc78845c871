//! Output nodes - the terminal node of every synth
//!
//! `out` sums its sources into shared buses. Each source channel goes to the
//! next bus after `bus`, and the whole source set is repeated `expand` times,
//! so a mono source with `expand == 2` lands identically on two buses.
//!
//! `valueOut` writes no bus. It only exposes its source's value, which is how
//! control-rate and demand-rate synths are read.

use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{Capability, GenContext, UGenOutput, UnitGen};

/// Bus writer
pub struct OutNode;

impl UnitGen for OutNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let GenContext { inputs, buses } = ctx;
        let bus = inputs.scalar("bus").max(0.0) as usize;
        let expand = (inputs.scalar("expand") as usize).max(1);
        let sources = inputs.nodes("sources");

        let mut offset = 0;
        for _ in 0..expand {
            for &source in sources {
                let stride = inputs.stride_of(source);
                for channel in inputs.channels_of(source) {
                    // Buses past the end are silently dropped
                    if let Some(target) = buses.get_mut(bus + offset) {
                        let mut j = 0;
                        for s in target.iter_mut().take(num_samps) {
                            *s += channel[j];
                            j += stride;
                        }
                    }
                    offset += 1;
                }
            }
        }

        // Mirror the first source channel so `value` tracks what was written
        let own = out.first_mut();
        match sources.first() {
            Some(&first) => {
                let stride = inputs.stride_of(first);
                let channel = inputs
                    .channels_of(first)
                    .first()
                    .map_or(&[][..], |c| c.as_slice());
                let mut j = 0;
                for s in own.iter_mut().take(num_samps) {
                    *s = channel.get(j).copied().unwrap_or(0.0);
                    j += stride;
                }
            }
            None => own.fill(0.0),
        }
        out.capture_value(num_samps);
    }
}

/// Value exposer
pub struct ValueOutNode;

impl UnitGen for ValueOutNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let value = ctx
            .nodes("sources")
            .first()
            .map_or(0.0, |&source| ctx.value_of(source));
        for s in out.first_mut().iter_mut().take(num_samps) {
            *s = value;
        }
        out.value = value;
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "out",
        UGenDefaults::new(Rate::Audio)
            .input("bus", 0)
            .input("expand", 1)
            .capability(Capability::Output),
        |_| Ok(Box::new(OutNode)),
    );

    registry.register(
        "valueOut",
        UGenDefaults::new(Rate::Control).capability(Capability::Output),
        |_| Ok(Box::new(ValueOutNode)),
    );
}

#[cfg(test)]
mod tests {
    use crate::nodes::test_support::{env_with, render_bus};
    use serde_json::json;

    #[test]
    fn test_out_writes_expanded_channels() {
        let mut env = env_with(4, 2);
        env.add_synth(
            &json!({ "ugen": "out", "bus": 0, "expand": 2, "sources": 0.25 }),
            Default::default(),
        )
        .unwrap();
        env.gen();

        assert!(render_bus(&env, 0).iter().all(|&s| s == 0.25));
        assert!(render_bus(&env, 1).iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_out_accumulates() {
        let mut env = env_with(4, 1);
        for level in [0.25, 0.5] {
            env.add_synth(
                &json!({ "ugen": "out", "sources": level }),
                Default::default(),
            )
            .unwrap();
        }
        env.gen();
        assert!(render_bus(&env, 0).iter().all(|&s| s == 0.75));
    }

    #[test]
    fn test_multi_source_channels_go_to_consecutive_buses() {
        let mut env = env_with(4, 3);
        env.add_synth(
            &json!({ "ugen": "out", "bus": 1, "sources": [0.1, 0.2] }),
            Default::default(),
        )
        .unwrap();
        env.gen();

        assert!(render_bus(&env, 0).iter().all(|&s| s == 0.0));
        assert!(render_bus(&env, 1).iter().all(|&s| s == 0.1));
        assert!(render_bus(&env, 2).iter().all(|&s| s == 0.2));
    }
}
