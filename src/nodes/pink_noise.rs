//! Pink noise generator (1/f spectrum)
//!
//! Voss-McCartney with seven octave bins. Bin `k` is refreshed whenever bit
//! `k` of a running counter is clear, so lower bins change less often and
//! the sum falls off at 3 dB per octave.
//!
//! `value` is taken from the normalized sum before `mul`/`add`.

use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const OCTAVES: usize = 7;

pub struct PinkNoiseNode {
    rng: StdRng,
    /// Held random value per octave bin
    octaves: [f32; OCTAVES],
    /// Running sample counter; bin `k` refreshes while bit `k` is clear
    counter: u32,
    mul_add: MulAdd,
}

impl PinkNoiseNode {
    pub fn new(seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut octaves = [0.0; OCTAVES];
        for bin in octaves.iter_mut() {
            *bin = rng.gen::<f32>() * 2.0 - 1.0;
        }
        Self {
            rng,
            octaves,
            counter: 0,
            mul_add: MulAdd::new(),
        }
    }
}

impl UnitGen for PinkNoiseNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let own = &mut out.first_mut()[..num_samps];
        for s in own.iter_mut() {
            let mut pink = 0.0;
            for (octave, bin) in self.octaves.iter_mut().enumerate() {
                if self.counter & (1 << octave) == 0 {
                    *bin = self.rng.gen::<f32>() * 2.0 - 1.0;
                }
                pink += *bin;
            }
            self.counter = self.counter.wrapping_add(1);
            *s = pink / OCTAVES as f32;
        }
        out.capture_value(num_samps);

        let own = &mut out.first_mut()[..num_samps];
        self.mul_add.apply(&ctx.inputs, own);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, _name: Option<&str>) {
        self.mul_add.on_input_changed(inputs);
    }
}

pub fn register(registry: &mut Registry) {
    registry.register("pinkNoise", UGenDefaults::new(Rate::Audio), |build| {
        Ok(Box::new(PinkNoiseNode::new(build.option_u64("seed"))))
    });
}

#[cfg(test)]
mod tests {
    use crate::nodes::test_support::render_mono;
    use serde_json::json;

    #[test]
    fn test_pink_noise_is_bounded() {
        let samples = render_mono(&json!({ "ugen": "pinkNoise", "mul": 0.5 }), 512, 2);
        assert!(samples.iter().all(|s| s.abs() <= 0.5 + 1e-6));
        assert!(samples.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_pink_noise_has_more_low_end_than_white() {
        // Lag-1 autocorrelation is near zero for white noise and clearly
        // positive for pink noise.
        let pink = render_mono(&json!({ "ugen": "pinkNoise", "options": { "seed": 3 } }), 4096, 1);
        let white = render_mono(&json!({ "ugen": "whiteNoise", "options": { "seed": 3 } }), 4096, 1);

        assert!(lag1(&pink) > 0.3);
        assert!(lag1(&white).abs() < 0.1);
    }

    fn lag1(x: &[f32]) -> f32 {
        let mean = x.iter().sum::<f32>() / x.len() as f32;
        let var: f32 = x.iter().map(|v| (v - mean) * (v - mean)).sum();
        let cov: f32 = x.windows(2).map(|w| (w[0] - mean) * (w[1] - mean)).sum();
        cov / var
    }
}
