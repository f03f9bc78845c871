//! Equal-power stereo panner
//!
//! Spreads a mono `source` over two output channels. `pan` runs from -1
//! (left) to 1 (right):
//! - angle = (pan + 1) * PI / 4
//! - left = source * cos(angle)
//! - right = source * sin(angle)

use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};
use std::f32::consts::FRAC_PI_4;

#[derive(Default)]
pub struct Pan2Node {
    /// 1 when `source` is audio rate, 0 otherwise
    source_stride: usize,
    /// 1 when `pan` is audio rate, 0 otherwise
    pan_stride: usize,
    /// Applied to both output channels
    mul_add: MulAdd,
}

impl UnitGen for Pan2Node {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let source = ctx.buffer("source");
        let pan = ctx.buffer("pan");

        if let [left, right, ..] = out.channels.as_mut_slice() {
            let (mut i, mut p) = (0, 0);
            for (l, r) in left.iter_mut().zip(right.iter_mut()).take(num_samps) {
                let angle = (pan[p].clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
                let x = source[i];
                *l = x * angle.cos();
                *r = x * angle.sin();
                i += self.source_stride;
                p += self.pan_stride;
            }
            if !self.mul_add.is_identity() {
                self.mul_add.apply(&ctx.inputs, &mut left[..num_samps]);
                self.mul_add.apply(&ctx.inputs, &mut right[..num_samps]);
            }
        }
        out.capture_value(num_samps);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, _name: Option<&str>) {
        self.source_stride = inputs.stride("source");
        self.pan_stride = inputs.stride("pan");
        self.mul_add.on_input_changed(inputs);
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "pan2",
        UGenDefaults::new(Rate::Audio)
            .input("source", 0.0)
            .input("pan", 0.0)
            .outputs(2),
        |_| Ok(Box::new(Pan2Node::default())),
    );
}

#[cfg(test)]
mod tests {
    use crate::nodes::test_support::{env_with, render_bus};
    use serde_json::json;

    fn pan(position: f64) -> (f32, f32) {
        let mut env = env_with(4, 2);
        env.add_synth(
            &json!({ "ugen": "out", "sources": { "ugen": "pan2", "source": 1, "pan": position } }),
            Default::default(),
        )
        .unwrap();
        env.gen();
        (render_bus(&env, 0)[0], render_bus(&env, 1)[0])
    }

    #[test]
    fn test_center_is_equal_power() {
        let (l, r) = pan(0.0);
        assert!((l - r).abs() < 1e-6);
        assert!((l * l + r * r - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hard_left_and_right() {
        let (l, r) = pan(-1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
        let (l, r) = pan(1.0);
        assert!(l.abs() < 1e-6 && (r - 1.0).abs() < 1e-6);
    }
}
