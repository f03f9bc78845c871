//! Buffer player
//!
//! Plays one channel of a registered buffer. The buffer may still be loading
//! when the node is built; it plays silence until the data arrives.
//!
//! Inputs:
//! - `buffer` - buffer name, `{"id": name}` or an inline buffer desc
//! - `speed` - playback rate, 1 = original pitch (negative plays backwards)
//! - `loop` - wrap at the ends when > 0, otherwise stop
//! - `start` - start position in frames, applied on (re)start
//!
//! Options: `channel` (default 0), `interpolation`.

use crate::buffer::BufferRef;
use crate::interpolate::Interpolation;
use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};
use tracing::warn;

pub struct PlayBufferNode {
    /// Shared source buffer, loaded asynchronously
    buffer: BufferRef,
    /// Buffer channel to play
    channel: usize,
    /// Reader used between frames
    interpolation: Interpolation,
    /// Read position in buffer frames
    position: f64,
    /// Output rate, compared against the buffer's own rate
    sample_rate: f64,
    /// 1 when `speed` is audio rate, 0 otherwise
    speed_stride: usize,
    mul_add: MulAdd,
}

impl PlayBufferNode {
    pub fn new(
        buffer: BufferRef,
        channel: usize,
        interpolation: Interpolation,
        sample_rate: f32,
    ) -> Self {
        Self {
            buffer,
            channel,
            interpolation,
            position: 0.0,
            sample_rate: sample_rate as f64,
            speed_stride: 0,
            mul_add: MulAdd::new(),
        }
    }
}

impl UnitGen for PlayBufferNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let own = &mut out.first_mut()[..num_samps];
        let guard = self.buffer.load();
        let Some(desc) = &*guard else {
            own.fill(0.0);
            out.value = 0.0;
            return;
        };
        let table = desc.channel(self.channel).unwrap_or(&[]);
        if table.is_empty() {
            own.fill(0.0);
            out.value = 0.0;
            return;
        }

        let len = table.len() as f64;
        let ratio = desc.sample_rate() / self.sample_rate;
        let speed = ctx.buffer("speed");
        let looping = ctx.scalar("loop") > 0.0;

        let mut k = 0;
        for s in own.iter_mut() {
            if !(0.0..len).contains(&self.position) {
                if looping {
                    self.position = self.position.rem_euclid(len);
                } else {
                    *s = 0.0;
                    continue;
                }
            }
            *s = self.interpolation.read(table, self.position as f32);
            self.position += speed[k] as f64 * ratio;
            k += self.speed_stride;
        }
        self.mul_add.apply(&ctx.inputs, own);
        out.capture_value(num_samps);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, name: Option<&str>) {
        if name == Some("buffer") {
            if let Some(value) = inputs.special("buffer") {
                match inputs.buffers().resolve(value) {
                    Ok(buffer) => self.buffer = buffer,
                    Err(e) => warn!(error = %e, "keeping previous buffer"),
                }
            }
        }
        if matches!(name, None | Some("buffer") | Some("start")) {
            self.position = inputs.scalar("start").max(0.0) as f64;
        }
        self.speed_stride = inputs.stride("speed");
        self.mul_add.on_input_changed(inputs);
    }

    fn model_field(&self, field: &str) -> Option<f64> {
        (field == "position").then_some(self.position)
    }

    fn set_model_field(&mut self, field: &str, value: f64, _out: &mut UGenOutput) -> bool {
        if field != "position" {
            return false;
        }
        self.position = value;
        true
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "playBuffer",
        UGenDefaults::new(Rate::Audio)
            .input("speed", 1.0)
            .input("loop", 0.0)
            .input("start", 0.0)
            .option("channel", 0)
            .option("interpolation", "linear"),
        |build| {
            let buffer = match build.special("buffer") {
                Some(value) => build.buffers.resolve(value)?,
                None => BufferRef::pending(),
            };
            Ok(Box::new(PlayBufferNode::new(
                buffer,
                build.option_u64("channel").unwrap_or(0) as usize,
                Interpolation::from_option(build.option("interpolation")),
                build.sample_rate(),
            )))
        },
    );
}
