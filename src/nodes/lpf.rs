//! Resonant low-pass filter (biquad, transposed direct form II)
//!
//! Inputs: `source`, `freq` (cutoff Hz), `q`, `mul`, `add`.
//! Coefficients are recomputed only when cutoff or Q actually move.

use crate::error::Error;
use crate::mul_add::MulAdd;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Q_BUTTERWORTH_F32};

/// Resonant low-pass filter with per-block coefficient tracking
pub struct LpfNode {
    /// Biquad state carried between blocks
    filter: DirectForm2Transposed<f32>,
    sample_rate: f32,
    /// Cutoff the coefficients were last computed for (Hz)
    last_cutoff: f32,
    /// Q the coefficients were last computed for
    last_q: f32,
    /// Strides of the `source`, `freq` and `q` inputs
    source_stride: usize,
    freq_stride: usize,
    q_stride: usize,
    mul_add: MulAdd,
}

impl LpfNode {
    /// Filter starting at a 1 kHz Butterworth response
    ///
    /// # Parameters
    /// - `sample_rate`: Rate the coefficients are computed for
    ///
    /// Fails when the biquad rejects the initial coefficients.
    pub fn new(sample_rate: f32) -> Result<Self, Error> {
        let cutoff = 1000.0_f32.min(sample_rate * 0.49);
        let coeffs = Coefficients::<f32>::from_params(
            biquad::Type::LowPass,
            sample_rate.hz(),
            cutoff.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| Error::InvalidDef(format!("lpf coefficients: {:?}", e)))?;

        Ok(Self {
            filter: DirectForm2Transposed::<f32>::new(coeffs),
            sample_rate,
            last_cutoff: cutoff,
            last_q: Q_BUTTERWORTH_F32,
            source_stride: 0,
            freq_stride: 0,
            q_stride: 0,
            mul_add: MulAdd::new(),
        })
    }

    fn retune(&mut self, cutoff: f32, q: f32) {
        let cutoff = cutoff.clamp(10.0, self.sample_rate * 0.49);
        let q = q.clamp(0.01, 20.0);
        if (cutoff - self.last_cutoff).abs() <= 0.1 && (q - self.last_q).abs() <= 0.01 {
            return;
        }
        // Out-of-range parameters keep the previous response
        if let Ok(coeffs) = Coefficients::<f32>::from_params(
            biquad::Type::LowPass,
            self.sample_rate.hz(),
            cutoff.hz(),
            q,
        ) {
            self.filter.update_coefficients(coeffs);
            self.last_cutoff = cutoff;
            self.last_q = q;
        }
    }
}

impl UnitGen for LpfNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        let source = ctx.buffer("source");
        let freq = ctx.buffer("freq");
        let q = ctx.buffer("q");
        let own = &mut out.first_mut()[..num_samps];

        let (mut i, mut f, mut k) = (0, 0, 0);
        for s in own.iter_mut() {
            self.retune(freq[f], q[k]);
            *s = self.filter.run(source[i]);
            i += self.source_stride;
            f += self.freq_stride;
            k += self.q_stride;
        }
        self.mul_add.apply(&ctx.inputs, own);
        out.capture_value(num_samps);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, _name: Option<&str>) {
        self.source_stride = inputs.stride("source");
        self.freq_stride = inputs.stride("freq");
        self.q_stride = inputs.stride("q");
        self.mul_add.on_input_changed(inputs);
    }

    fn model_field(&self, field: &str) -> Option<f64> {
        match field {
            "cutoff" => Some(self.last_cutoff as f64),
            "q" => Some(self.last_q as f64),
            _ => None,
        }
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "lpf",
        UGenDefaults::new(Rate::Audio)
            .input("source", 0.0)
            .input("freq", 1000.0)
            .input("q", Q_BUTTERWORTH_F32 as f64),
        |build| Ok(Box::new(LpfNode::new(build.sample_rate())?)),
    );
}

#[cfg(test)]
mod tests {
    use crate::nodes::test_support::render_mono;
    use serde_json::json;

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|s| s * s).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn test_passes_low_frequencies() {
        let def = json!({
            "ugen": "lpf",
            "source": { "ugen": "sin", "freq": 100 },
            "freq": 2000
        });
        let samples = render_mono(&def, 512, 8);
        let tail = &samples[2048..];
        assert!(rms(tail) > 0.6, "rms {}", rms(tail));
    }

    #[test]
    fn test_attenuates_high_frequencies() {
        let def = json!({
            "ugen": "lpf",
            "source": { "ugen": "sin", "freq": 10000 },
            "freq": 200
        });
        let samples = render_mono(&def, 512, 8);
        let tail = &samples[2048..];
        assert!(rms(tail) < 0.05, "rms {}", rms(tail));
    }
}
