//! Non-band-limited sawtooth ramp from -1 to 1
//!
//! Inputs: `freq` (Hz), `phase` (start position in [-1, 1), applied when set),
//! `mul`, `add`.
//!
//! `value` is taken from the raw ramp before `mul`/`add` are applied, so a
//! scaled saw reports its unscaled position to control-rate readers.

use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};

pub struct LfSawNode {
    /// Current ramp position in [-1, 1)
    phase: f32,
    /// Ramp increment per Hz per sample
    scale: f32,
    /// 1 when `freq` is audio rate, 0 otherwise
    freq_stride: usize,
    mul_add: MulAdd,
}

impl LfSawNode {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            scale: 2.0 / sample_rate,
            freq_stride: 0,
            mul_add: MulAdd::new(),
        }
    }
}

impl UnitGen for LfSawNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let freq = ctx.buffer("freq");
        let own = &mut out.first_mut()[..num_samps];
        let mut f = 0;
        for s in own.iter_mut() {
            *s = self.phase;
            self.phase += freq[f] * self.scale;
            if self.phase >= 1.0 {
                self.phase -= 2.0;
            } else if self.phase < -1.0 {
                self.phase += 2.0;
            }
            f += self.freq_stride;
        }
        out.capture_value(num_samps);

        let own = &mut out.first_mut()[..num_samps];
        self.mul_add.apply(&ctx.inputs, own);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, name: Option<&str>) {
        self.freq_stride = inputs.stride("freq");
        if matches!(name, None | Some("phase")) {
            self.phase = inputs.scalar("phase").clamp(-1.0, 1.0);
        }
        self.mul_add.on_input_changed(inputs);
    }

    fn model_field(&self, field: &str) -> Option<f64> {
        (field == "phase").then_some(self.phase as f64)
    }

    fn set_model_field(&mut self, field: &str, value: f64, _out: &mut UGenOutput) -> bool {
        if field != "phase" {
            return false;
        }
        self.phase = (value as f32).clamp(-1.0, 1.0);
        true
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "lfSaw",
        UGenDefaults::new(Rate::Audio)
            .input("freq", 440.0)
            .input("phase", 0.0),
        |build| Ok(Box::new(LfSawNode::new(build.sample_rate()))),
    );
}
