//! Granular playback of a buffer
//!
//! Keeps `numGrains` Hann-windowed grains running over a buffer. Each grain
//! starts at a random offset around `centerPos`, lasts `grainDur` seconds and
//! is replaced by a fresh one as soon as it ends.
//!
//! When `numGrains` drops, the excess grains are cut off on the spot rather
//! than allowed to finish.
//!
//! Inputs: `buffer`, `numGrains`, `grainDur` (s), `centerPos` (s),
//! `spread` (s, random offset range), `speed`, `mul`, `add`.
//! Options: `maxGrains` (default 512), `channel`, `seed`.

use crate::buffer::BufferRef;
use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;
use tracing::warn;

pub const DEFAULT_MAX_GRAINS: usize = 512;

#[derive(Debug, Clone, Copy)]
struct Grain {
    /// Read position in buffer frames
    position: f32,
    /// Length in output samples
    duration: f32,
    age: f32,
    speed: f32,
}

impl Grain {
    fn process(&mut self, source: &[f32]) -> f32 {
        let window = hann_window(self.age, self.duration);
        let len = source.len() as f32;
        let pos = self.position.rem_euclid(len);
        let index = (pos as usize).min(source.len() - 1);
        let frac = pos - index as f32;
        let next = if index + 1 < source.len() {
            source[index + 1]
        } else {
            source[index]
        };
        let sample = source[index] + frac * (next - source[index]);

        self.position += self.speed;
        self.age += 1.0;
        sample * window
    }

    fn is_finished(&self) -> bool {
        self.age >= self.duration
    }
}

/// 0.5 * (1 - cos(2 PI * age / duration))
fn hann_window(age: f32, duration: f32) -> f32 {
    if duration <= 0.0 {
        return 0.0;
    }
    0.5 * (1.0 - (TAU * age / duration).cos())
}

/// Granular player scattering short windowed grains over a buffer
pub struct GranulatorNode {
    /// Shared source buffer, loaded asynchronously
    buffer: BufferRef,
    /// Buffer channel grains read from
    channel: usize,
    /// Grains currently sounding
    grains: Vec<Grain>,
    /// Upper bound on the `numGrains` input
    max_grains: usize,
    /// Drives position jitter
    rng: StdRng,
    sample_rate: f32,
    mul_add: MulAdd,
}

impl GranulatorNode {
    /// # Parameters
    /// - `buffer`: Source buffer, possibly still loading
    /// - `channel`: Buffer channel grains read from
    /// - `max_grains`: Upper bound on simultaneous grains
    /// - `seed`: Fixed jitter seed, or entropy when `None`
    /// - `sample_rate`: Output rate used to size grains
    pub fn new(
        buffer: BufferRef,
        channel: usize,
        max_grains: usize,
        seed: Option<u64>,
        sample_rate: f32,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            buffer,
            channel,
            grains: Vec::with_capacity(max_grains),
            max_grains,
            rng,
            sample_rate,
            mul_add: MulAdd::new(),
        }
    }
}

impl UnitGen for GranulatorNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let target = (ctx.scalar("numGrains").max(0.0) as usize).min(self.max_grains);
        if self.grains.len() > target {
            self.grains.truncate(target);
        }

        let own = &mut out.first_mut()[..num_samps];
        let guard = self.buffer.load();
        let Some(desc) = &*guard else {
            own.fill(0.0);
            out.value = 0.0;
            return;
        };
        let source = desc.channel(self.channel).unwrap_or(&[]);
        if source.is_empty() {
            own.fill(0.0);
            out.value = 0.0;
            return;
        }

        let buffer_rate = desc.sample_rate() as f32;
        let ratio = buffer_rate / self.sample_rate;
        let duration = (ctx.scalar("grainDur") * self.sample_rate).max(1.0);
        let center = ctx.scalar("centerPos") * buffer_rate;
        let spread = ctx.scalar("spread").abs() * buffer_rate;
        let speed = ctx.scalar("speed") * ratio;

        for s in own.iter_mut() {
            while self.grains.len() < target {
                let offset = if spread > 0.0 {
                    self.rng.gen_range(-spread..spread)
                } else {
                    0.0
                };
                self.grains.push(Grain {
                    position: center + offset,
                    duration,
                    age: 0.0,
                    speed,
                });
            }

            let mut sum = 0.0;
            for grain in self.grains.iter_mut() {
                sum += grain.process(source);
            }
            self.grains.retain(|grain| !grain.is_finished());
            *s = sum;
        }
        self.mul_add.apply(&ctx.inputs, own);
        out.capture_value(num_samps);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, name: Option<&str>) {
        if name == Some("buffer") {
            if let Some(value) = inputs.special("buffer") {
                match inputs.buffers().resolve(value) {
                    Ok(buffer) => {
                        self.buffer = buffer;
                        self.grains.clear();
                    }
                    Err(e) => warn!(error = %e, "keeping previous buffer"),
                }
            }
        }
        self.mul_add.on_input_changed(inputs);
    }

    fn model_field(&self, field: &str) -> Option<f64> {
        (field == "activeGrains").then_some(self.grains.len() as f64)
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "granulator",
        UGenDefaults::new(Rate::Audio)
            .input("numGrains", 5.0)
            .input("grainDur", 0.1)
            .input("centerPos", 0.0)
            .input("spread", 0.0)
            .input("speed", 1.0)
            .option("maxGrains", DEFAULT_MAX_GRAINS as u64)
            .option("channel", 0),
        |build| {
            let buffer = match build.special("buffer") {
                Some(value) => build.buffers.resolve(value)?,
                None => BufferRef::pending(),
            };
            let max_grains = build
                .option_u64("maxGrains")
                .map_or(DEFAULT_MAX_GRAINS, |n| n as usize);
            Ok(Box::new(GranulatorNode::new(
                buffer,
                build.option_u64("channel").unwrap_or(0) as usize,
                max_grains,
                build.option_u64("seed"),
                build.sample_rate(),
            )))
        },
    );
}
