//! Exponential ramp from `start` to `end` over `duration` seconds, then hold
//!
//! Both endpoints must share a sign and be nonzero; a zero `start` is nudged
//! to a tiny value with the sign of `end`.

use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};

const MIN_MAGNITUDE: f32 = 1e-4;

pub struct XLineNode {
    /// Level emitted by the next sample
    level: f32,
    /// Multiplier per sample
    factor: f32,
    /// Target held once the ramp finishes
    end: f32,
    /// Samples remaining in the ramp
    steps_left: u64,
    /// Converts `duration` seconds into samples
    sample_rate: f32,
    mul_add: MulAdd,
}

impl XLineNode {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            level: 1.0,
            factor: 1.0,
            end: 1.0,
            steps_left: 0,
            sample_rate,
            mul_add: MulAdd::new(),
        }
    }

    fn restart(&mut self, start: f32, end: f32, duration: f32) {
        let end = if end.abs() < MIN_MAGNITUDE {
            MIN_MAGNITUDE.copysign(end)
        } else {
            end
        };
        let mut start = start;
        if start.abs() < MIN_MAGNITUDE || start.signum() != end.signum() {
            start = MIN_MAGNITUDE.copysign(end);
        }

        let steps = (duration.max(0.0) * self.sample_rate).round() as u64;
        self.end = end;
        self.steps_left = steps;
        if steps == 0 {
            self.level = end;
            self.factor = 1.0;
        } else {
            self.level = start;
            self.factor = (end / start).powf(1.0 / steps as f32);
        }
    }
}

impl UnitGen for XLineNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let own = &mut out.first_mut()[..num_samps];
        for s in own.iter_mut() {
            *s = self.level;
            if self.steps_left > 0 {
                self.steps_left -= 1;
                self.level = if self.steps_left == 0 {
                    self.end
                } else {
                    self.level * self.factor
                };
            }
        }
        out.capture_value(num_samps);

        let own = &mut out.first_mut()[..num_samps];
        self.mul_add.apply(&ctx.inputs, own);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, name: Option<&str>) {
        if matches!(name, None | Some("start") | Some("end") | Some("duration")) {
            self.restart(
                inputs.scalar("start"),
                inputs.scalar("end"),
                inputs.scalar("duration"),
            );
        }
        self.mul_add.on_input_changed(inputs);
    }

    fn model_field(&self, field: &str) -> Option<f64> {
        (field == "level").then_some(self.level as f64)
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "xLine",
        UGenDefaults::new(Rate::Control)
            .input("start", 1.0)
            .input("end", 2.0)
            .input("duration", 1.0),
        |build| Ok(Box::new(XLineNode::new(build.sample_rate()))),
    );
}

#[cfg(test)]
mod tests {
    use crate::nodes::test_support::render_mono;
    use serde_json::json;

    #[test]
    fn test_xline_doubles_evenly() {
        let duration = 4.0 / 44100.0;
        let def = json!({
            "ugen": "xLine", "rate": "audio",
            "start": 100, "end": 1600, "duration": duration
        });
        let samples = render_mono(&def, 8, 1);

        let expected = [100.0, 200.0, 400.0, 800.0, 1600.0];
        for (s, e) in samples.iter().zip(expected) {
            assert!((s - e).abs() / e < 1e-4, "{} vs {}", s, e);
        }
        assert_eq!(samples[7], 1600.0);
    }

    #[test]
    fn test_xline_zero_start_is_nudged() {
        let def = json!({ "ugen": "xLine", "rate": "audio", "start": 0, "end": 1, "duration": 0.001 });
        let samples = render_mono(&def, 4, 1);
        assert!(samples.iter().all(|s| s.is_finite() && *s > 0.0));
    }
}
