//! Sums any number of `sources` into one signal

use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};

#[derive(Default)]
pub struct SumNode {
    /// Applied after the sources are summed
    mul_add: MulAdd,
}

impl UnitGen for SumNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let own = &mut out.first_mut()[..num_samps];
        own.fill(0.0);
        for &source in ctx.nodes("sources") {
            let stride = ctx.stride_of(source);
            let Some(channel) = ctx.channels_of(source).first() else {
                continue;
            };
            let mut j = 0;
            for s in own.iter_mut() {
                *s += channel[j];
                j += stride;
            }
        }
        self.mul_add.apply(&ctx.inputs, own);
        out.capture_value(num_samps);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, _name: Option<&str>) {
        self.mul_add.on_input_changed(inputs);
    }
}

pub fn register(registry: &mut Registry) {
    registry.register("sum", UGenDefaults::new(Rate::Audio), |_| {
        Ok(Box::new(SumNode::default()))
    });
}

#[cfg(test)]
mod tests {
    use crate::nodes::test_support::render_mono;
    use serde_json::json;

    #[test]
    fn test_sum_mixes_rates() {
        let def = json!({
            "ugen": "sum",
            "sources": [0.25, { "ugen": "lfSaw", "freq": 5512.5 }, 1],
            "mul": 2
        });
        let samples = render_mono(&def, 4, 1);
        let expected = [2.5, 3.0, 3.5, 4.0];
        for (s, e) in samples.iter().zip(expected) {
            assert!((s - e).abs() < 1e-5, "{} vs {}", s, e);
        }
    }
}
