//! Built-in unit generators
//!
//! # Node Categories
//!
//! ## Sources
//! - [`value::ValueNode`] - Constant value (bare numbers compile to this)
//! - [`in_bus::InNode`] - Read a shared bus
//! - [`sin::SinNode`] - Direct sine oscillator
//! - [`sin_osc::SinOscNode`] - Wavetable sine oscillator
//! - [`lf_saw::LfSawNode`] - Non-bandlimited sawtooth
//! - [`noise::WhiteNoiseNode`] - Uniform white noise
//! - [`pink_noise::PinkNoiseNode`] - Voss-McCartney pink noise
//! - [`play_buffer::PlayBufferNode`] - Buffer playback
//! - [`granulator::GranulatorNode`] - Granular buffer playback
//!
//! ## Envelopes and control
//! - [`line::LineNode`] - Linear ramp
//! - [`xline::XLineNode`] - Exponential ramp
//! - [`sequence::SequenceNode`] - Step sequencer over a literal list
//!
//! ## Processors
//! - [`math::MathNode`] - Binary arithmetic
//! - [`sum::SumNode`] - Mix any number of sources
//! - [`lpf::LpfNode`] - Biquad low-pass filter
//! - [`pan::Pan2Node`] - Equal-power stereo panner (two output channels)
//!
//! ## Outputs
//! - [`out::OutNode`] - Sum sources into buses
//! - [`out::ValueOutNode`] - Expose a source's value

pub mod granulator;
pub mod in_bus;
pub mod lf_saw;
pub mod line;
pub mod lpf;
pub mod math;
pub mod noise;
pub mod out;
pub mod pan;
pub mod pink_noise;
pub mod play_buffer;
pub mod sequence;
pub mod sin;
pub mod sin_osc;
pub mod sum;
pub mod value;
pub mod xline;

use crate::registry::Registry;

/// Register every built-in type
pub fn register_builtins(registry: &mut Registry) {
    value::register(registry);
    out::register(registry);
    in_bus::register(registry);
    sin::register(registry);
    sin_osc::register(registry);
    lf_saw::register(registry);
    line::register(registry);
    xline::register(registry);
    noise::register(registry);
    pink_noise::register(registry);
    math::register(registry);
    sum::register(registry);
    pan::register(registry);
    lpf::register(registry);
    play_buffer::register(registry);
    granulator::register(registry);
    sequence::register(registry);
}
