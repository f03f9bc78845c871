//! Mul/add post-processing
//!
//! Nodes with optional `mul` and `add` inputs scale and offset their output
//! after generating it. The combination routine is picked once per input
//! change from the rates of the two operands, so the inner loop never checks
//! a rate.

use crate::ugen::{InputView, ONE_BLOCK, ZERO_BLOCK};

type MulAddFn = fn(out: &mut [f32], mul: &[f32], add: &[f32]);

/// Selected mul/add routine for one node
#[derive(Debug, Clone, Copy, Default)]
pub struct MulAdd {
    func: Option<MulAddFn>,
}

impl MulAdd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-select the routine. Absent operands count as control rate.
    pub fn on_input_changed(&mut self, inputs: &InputView<'_>) {
        if !inputs.has("mul") && !inputs.has("add") {
            self.func = None;
            return;
        }

        let mul_ar = inputs.stride("mul") == 1;
        let add_ar = inputs.stride("add") == 1;
        self.func = Some(match (mul_ar, add_ar) {
            (false, false) => kr_kr,
            (true, false) => ar_kr,
            (false, true) => kr_ar,
            (true, true) => ar_ar,
        });
    }

    /// True when neither `mul` nor `add` is connected
    pub fn is_identity(&self) -> bool {
        self.func.is_none()
    }

    /// Apply `out[i] = out[i] * mul + add` in place
    pub fn apply(&self, inputs: &InputView<'_>, out: &mut [f32]) {
        if let Some(func) = self.func {
            let mul = inputs.buffer_or("mul", &ONE_BLOCK);
            let add = inputs.buffer_or("add", &ZERO_BLOCK);
            func(out, mul, add);
        }
    }
}

fn kr_kr(out: &mut [f32], mul: &[f32], add: &[f32]) {
    let m = mul[0];
    let a = add[0];
    for s in out.iter_mut() {
        *s = *s * m + a;
    }
}

fn ar_kr(out: &mut [f32], mul: &[f32], add: &[f32]) {
    let a = add[0];
    for (s, m) in out.iter_mut().zip(mul) {
        *s = *s * m + a;
    }
}

fn kr_ar(out: &mut [f32], mul: &[f32], add: &[f32]) {
    let m = mul[0];
    for (s, a) in out.iter_mut().zip(add) {
        *s = *s * m + a;
    }
}

fn ar_ar(out: &mut [f32], mul: &[f32], add: &[f32]) {
    for ((s, m), a) in out.iter_mut().zip(mul).zip(add) {
        *s = *s * m + a;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kr_kr_repeats_scalars() {
        let mut out = [1.0, 2.0, 3.0];
        kr_kr(&mut out, &[2.0], &[0.5]);
        assert_eq!(out, [2.5, 4.5, 6.5]);
    }

    #[test]
    fn test_ar_ar_reads_per_sample() {
        let mut out = [1.0, 1.0, 1.0];
        ar_ar(&mut out, &[1.0, 2.0, 3.0], &[0.0, 10.0, 20.0]);
        assert_eq!(out, [1.0, 12.0, 23.0]);
    }

    #[test]
    fn test_mixed_variants() {
        let mut out = [1.0, 2.0];
        ar_kr(&mut out, &[3.0, 4.0], &[1.0]);
        assert_eq!(out, [4.0, 9.0]);

        let mut out = [1.0, 2.0];
        kr_ar(&mut out, &[3.0], &[1.0, -1.0]);
        assert_eq!(out, [4.0, 5.0]);
    }
}
