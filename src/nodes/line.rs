//! Linear ramp from `start` to `end` over `duration` seconds, then hold
//!
//! The ramp restarts whenever `start`, `end` or `duration` is replaced.
//! `value` is the raw ramp level before `mul`/`add`.

use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};

pub struct LineNode {
    /// Level emitted by the next sample
    level: f32,
    /// Increment per sample
    step: f32,
    /// Target held once the ramp finishes
    end: f32,
    /// Samples remaining in the ramp
    steps_left: u64,
    /// Converts `duration` seconds into samples
    sample_rate: f32,
    mul_add: MulAdd,
}

impl LineNode {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            level: 0.0,
            step: 0.0,
            end: 0.0,
            steps_left: 0,
            sample_rate,
            mul_add: MulAdd::new(),
        }
    }

    fn restart(&mut self, start: f32, end: f32, duration: f32) {
        let steps = (duration.max(0.0) * self.sample_rate).round() as u64;
        self.end = end;
        self.steps_left = steps;
        if steps == 0 {
            self.level = end;
            self.step = 0.0;
        } else {
            self.level = start;
            self.step = (end - start) / steps as f32;
        }
    }
}

impl UnitGen for LineNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let own = &mut out.first_mut()[..num_samps];
        for s in own.iter_mut() {
            *s = self.level;
            if self.steps_left > 0 {
                self.steps_left -= 1;
                self.level = if self.steps_left == 0 {
                    self.end
                } else {
                    self.level + self.step
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
        match field {
            "level" => Some(self.level as f64),
            "stepsLeft" => Some(self.steps_left as f64),
            _ => None,
        }
    }

    fn set_model_field(&mut self, field: &str, value: f64, _out: &mut UGenOutput) -> bool {
        if field != "level" {
            return false;
        }
        self.level = value as f32;
        true
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "line",
        UGenDefaults::new(Rate::Control)
            .input("start", 0.0)
            .input("end", 1.0)
            .input("duration", 1.0),
        |build| Ok(Box::new(LineNode::new(build.sample_rate()))),
    );
}

#[cfg(test)]
mod tests {
    use crate::nodes::test_support::render_mono;
    use serde_json::json;

    #[test]
    fn test_audio_rate_line_reaches_end_and_holds() {
        // 8 samples of ramp at 44100 Hz
        let duration = 8.0 / 44100.0;
        let def = json!({
            "ugen": "line", "rate": "audio",
            "start": 0, "end": 1, "duration": duration
        });
        let samples = render_mono(&def, 16, 1);

        assert_eq!(samples[0], 0.0);
        assert!((samples[4] - 0.5).abs() < 1e-6);
        assert_eq!(samples[8], 1.0);
        assert_eq!(samples[15], 1.0);
    }

    #[test]
    fn test_zero_duration_jumps_to_end() {
        let def = json!({ "ugen": "line", "rate": "audio", "start": 3, "end": -1, "duration": 0 });
        let samples = render_mono(&def, 4, 1);
        assert!(samples.iter().all(|&s| s == -1.0));
    }
}
