//! Wavetable sine oscillator
//!
//! Reads a shared 8192-point sine table with the interpolation picked by the
//! `interpolation` option (`none`, `linear` or `cubic`).
//!
//! Inputs: `freq` (Hz), `phase` (offset in cycles), `mul`, `add`.

use crate::interpolate::Interpolation;
use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};
use std::f32::consts::TAU;
use std::sync::{Arc, OnceLock};

pub const TABLE_SIZE: usize = 8192;

/// One period of a sine, shared by every instance
pub fn sine_table() -> Arc<[f32]> {
    static TABLE: OnceLock<Arc<[f32]>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            (0..TABLE_SIZE)
                .map(|i| (i as f32 / TABLE_SIZE as f32 * TAU).sin())
                .collect()
        })
        .clone()
}

type GenFn = fn(&mut SinOscNode, &InputView<'_>, &mut [f32]);

pub struct SinOscNode {
    /// One cycle of sine shared by every instance
    table: Arc<[f32]>,
    /// Table reader between entries
    interpolation: Interpolation,
    /// Phase in cycles, kept in [0, 1)
    phase: f32,
    sample_rate: f32,
    /// Loop picked for the current `freq` rate
    gen_fn: GenFn,
    mul_add: MulAdd,
}

impl SinOscNode {
    pub fn new(sample_rate: f32, interpolation: Interpolation) -> Self {
        Self {
            table: sine_table(),
            interpolation,
            phase: 0.0,
            sample_rate,
            gen_fn: SinOscNode::run::<false, false>,
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
        let len = self.table.len() as f32;
        let inc = 1.0 / self.sample_rate;
        let (mut f, mut p) = (0, 0);

        for s in out.iter_mut() {
            let idx = (self.phase + phase[p]) * len;
            *s = self.interpolation.read(&self.table, idx);
            self.phase += freq[f] * inc;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            } else if self.phase < 0.0 {
                self.phase += 1.0;
            }
            if FREQ_AR {
                f += 1;
            }
            if PHASE_AR {
                p += 1;
            }
        }
    }
}

impl UnitGen for SinOscNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let own = &mut out.first_mut()[..num_samps];
        (self.gen_fn)(self, &ctx.inputs, own);
        self.mul_add.apply(&ctx.inputs, own);
        out.capture_value(num_samps);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, _name: Option<&str>) {
        self.gen_fn = match (inputs.stride("freq") == 1, inputs.stride("phase") == 1) {
            (false, false) => SinOscNode::run::<false, false>,
            (true, false) => SinOscNode::run::<true, false>,
            (false, true) => SinOscNode::run::<false, true>,
            (true, true) => SinOscNode::run::<true, true>,
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
        self.phase = (value as f32).rem_euclid(1.0);
        true
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "sinOsc",
        UGenDefaults::new(Rate::Audio)
            .input("freq", 440.0)
            .input("phase", 0.0)
            .option("interpolation", "linear"),
        |build| {
            let interpolation = Interpolation::from_option(build.option("interpolation"));
            Ok(Box::new(SinOscNode::new(build.sample_rate(), interpolation)))
        },
    );
}
