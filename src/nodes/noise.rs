//! White noise generator
//!
//! Uniform samples in [-1, 1). Pass a `seed` option for repeatable output.

use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct WhiteNoiseNode {
    /// Per-node generator, so voices are uncorrelated
    rng: StdRng,
    mul_add: MulAdd,
}

impl WhiteNoiseNode {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            mul_add: MulAdd::new(),
        }
    }
}

impl UnitGen for WhiteNoiseNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let own = &mut out.first_mut()[..num_samps];
        for s in own.iter_mut() {
            *s = self.rng.gen::<f32>() * 2.0 - 1.0;
        }
        self.mul_add.apply(&ctx.inputs, own);
        out.capture_value(num_samps);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, _name: Option<&str>) {
        self.mul_add.on_input_changed(inputs);
    }
}

pub fn register(registry: &mut Registry) {
    registry.register("whiteNoise", UGenDefaults::new(Rate::Audio), |build| {
        Ok(Box::new(WhiteNoiseNode::new(build.option_u64("seed"))))
    });
}
