//! Fractional table lookup
//!
//! All three modes wrap the index modulo the table length, so tables are
//! always read circularly.

use serde_json::Value;

/// Interpolation mode for table-reading nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Truncate the index
    None,
    #[default]
    Linear,
    /// 4-point, 3rd-order Hermite
    Cubic,
}

impl Interpolation {
    /// Read the `interpolation` option. Unknown or missing values fall back
    /// to linear.
    pub fn from_option(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("none") => Interpolation::None,
            Some("cubic") => Interpolation::Cubic,
            _ => Interpolation::Linear,
        }
    }

    #[inline]
    pub fn read(self, table: &[f32], idx: f32) -> f32 {
        match self {
            Interpolation::None => none(table, idx),
            Interpolation::Linear => linear(table, idx),
            Interpolation::Cubic => cubic(table, idx),
        }
    }
}

#[inline]
fn split(len: usize, idx: f32) -> (usize, f32) {
    let wrapped = idx.rem_euclid(len as f32);
    let i = wrapped.floor();
    // rem_euclid can round up to exactly len for tiny negative inputs
    ((i as usize) % len, wrapped - i)
}

#[inline]
pub fn none(table: &[f32], idx: f32) -> f32 {
    if table.is_empty() {
        return 0.0;
    }
    let (i, _) = split(table.len(), idx);
    table[i]
}

#[inline]
pub fn linear(table: &[f32], idx: f32) -> f32 {
    let len = table.len();
    if len == 0 {
        return 0.0;
    }
    let (i0, frac) = split(len, idx);
    let i1 = (i0 + 1) % len;
    let a = table[i0];
    a + (table[i1] - a) * frac
}

#[inline]
pub fn cubic(table: &[f32], idx: f32) -> f32 {
    let len = table.len();
    if len == 0 {
        return 0.0;
    }
    let (i0, frac) = split(len, idx);
    let xm1 = table[(i0 + len - 1) % len];
    let x0 = table[i0];
    let x1 = table[(i0 + 1) % len];
    let x2 = table[(i0 + 2) % len];

    let c0 = x0;
    let c1 = 0.5 * (x1 - xm1);
    let c2 = xm1 - 2.5 * x0 + 2.0 * x1 - 0.5 * x2;
    let c3 = 0.5 * (x2 - xm1) + 1.5 * (x0 - x1);
    ((c3 * frac + c2) * frac + c1) * frac + c0
}
