//! Sine oscillator computed with `f32::sin`
//!
//! Inputs:
//! - `freq` - frequency in Hz
//! - `phase` - phase offset in radians
//! - `mul`, `add` - optional post-processing
//!
//! One of four loops is picked whenever an input changes, depending on which
//! of `freq` and `phase` run at audio rate.

use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};
use std::f32::consts::TAU;

type GenFn = fn(&mut SinNode, &InputView<'_>, &mut [f32]);

pub struct SinNode {
    /// Running phase in radians, kept in [0, TAU)
    phase: f32,
    /// Phase increment per Hz per sample
    radians_per_sample: f32,
    /// Loop picked for the current `freq` rate
    gen_fn: GenFn,
    mul_add: MulAdd,
}

impl SinNode {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            radians_per_sample: TAU / sample_rate,
            gen_fn: SinNode::run::<false, false>,
            mul_add: MulAdd::new(),
        }
    }

    fn run<const FREQ_AR: bool, const PHASE_AR: bool>(
        &mut self,
        inputs: &InputView<'_>,
        out: &mut [f32],
    ) {
        let freq = inputs.buffer("freq");
        let phase = inputs.buffer("phase");
        let (mut f, mut p) = (0, 0);

        for s in out.iter_mut() {
            *s = (self.phase + phase[p]).sin();
            self.phase += freq[f] * self.radians_per_sample;
            if FREQ_AR {
                f += 1;
            }
            if PHASE_AR {
                p += 1;
            }
        }
        self.phase = self.phase.rem_euclid(TAU);
    }
}

impl UnitGen for SinNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let own = &mut out.first_mut()[..num_samps];
        (self.gen_fn)(self, &ctx.inputs, own);
        self.mul_add.apply(&ctx.inputs, own);
        out.capture_value(num_samps);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, _name: Option<&str>) {
        self.gen_fn = match (inputs.stride("freq") == 1, inputs.stride("phase") == 1) {
            (false, false) => SinNode::run::<false, false>,
            (true, false) => SinNode::run::<true, false>,
            (false, true) => SinNode::run::<false, true>,
            (true, true) => SinNode::run::<true, true>,
        };
        self.mul_add.on_input_changed(inputs);
    }

    fn model_field(&self, field: &str) -> Option<f64> {
        (field == "phase").then_some(self.phase as f64)
    }

    fn set_model_field(&mut self, field: &str, value: f64, _out: &mut UGenOutput) -> bool {
        if field != "phase" {
            return false;
        }
        self.phase = (value as f32).rem_euclid(TAU);
        true
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "sin",
        UGenDefaults::new(Rate::Audio)
            .input("freq", 440.0)
            .input("phase", 0.0),
        |build| Ok(Box::new(SinNode::new(build.sample_rate()))),
    );
}

#[cfg(test)]
mod tests {
    use crate::nodes::test_support::render_mono;
    use serde_json::json;

    #[test]
    fn test_sin_starts_at_zero_and_stays_bounded() {
        let samples = render_mono(&json!({ "ugen": "sin", "freq": 440 }), 64, 4);
        assert_eq!(samples[0], 0.0);
        assert!(samples.iter().all(|s| s.abs() <= 1.0));
        assert!(samples.iter().any(|&s| s > 0.9));
    }

    #[test]
    fn test_sin_quarter_period() {
        // 44100 / 4 Hz -> a quarter turn per sample
        let samples = render_mono(&json!({ "ugen": "sin", "freq": 11025 }), 4, 1);
        assert!((samples[1] - 1.0).abs() < 1e-4);
        assert!(samples[2].abs() < 1e-4);
        assert!((samples[3] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_sin_with_audio_rate_freq_and_mul() {
        let def = json!({
            "ugen": "sin",
            "freq": { "ugen": "sin", "freq": 2, "mul": 100, "add": 440 },
            "mul": 0.5
        });
        let samples = render_mono(&def, 64, 2);
        assert!(samples.iter().all(|s| s.abs() <= 0.5 + 1e-6));
    }
}
