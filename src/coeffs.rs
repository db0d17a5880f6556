//! Filter coefficient formulas (spec.md §4.3).
//!
//! Pure functions from (sample rate, corner frequency, ...) to taps or
//! biquad coefficients; no state. Grounded on the "Audio EQ Cookbook"
//! bilinear-transform derivations this crate's teacher uses for its own
//! Butterworth lowpass (`BiquadCoefs::butter_lowpass`).

use std::f32::consts::PI;

use crate::math::{hamming, sinc};

/// Windowed-sinc low-pass FIR kernel with corner frequency `f` at sample
/// rate `r`, length `n` (should be odd so the group delay is exactly
/// `n/2`), normalized to unit DC gain, then scaled by `gain`.
pub fn low_pass_kernel(r: f32, f: f32, n: usize, gain: f32) -> Vec<f32> {
    assert!(n >= 3, "kernel too short");
    let fc = f / r;
    let half = (n - 1) as f32 / 2.0;
    let mut taps: Vec<f32> = (0..n)
        .map(|i| {
            let x = i as f32 - half;
            2.0 * fc * sinc(2.0 * fc * x) * hamming(i, n)
        })
        .collect();
    let dc: f32 = taps.iter().sum();
    if dc.abs() > 1e-12 {
        let scale = gain / dc;
        for t in taps.iter_mut() {
            *t *= scale;
        }
    }
    taps
}

/// Hilbert transform FIR kernel of odd length `n`. Even-indexed taps
/// (relative to the center) are zero; odd-indexed taps are
/// `2/(pi k) * hamming(i)`. Applies a -pi/2 phase shift to positive
/// frequencies and +pi/2 to negative frequencies.
pub fn hilbert_kernel(n: usize) -> Vec<f32> {
    assert!(n % 2 == 1, "hilbert kernel length must be odd");
    let center = (n / 2) as i64;
    (0..n)
        .map(|i| {
            let k = i as i64 - center;
            if k % 2 == 0 {
                0.0
            } else {
                (2.0 / (PI * k as f32)) * hamming(i, n)
            }
        })
        .collect()
}

/// Coefficients for a direct-form-I biquad: `y = b0 x0 + b1 x1 + b2 x2
/// - a1 y1 - a2 y2`.
#[derive(Copy, Clone, Debug, Default)]
pub struct BiquadCoefs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoefs {
    /// Standard "Audio EQ Cookbook" second-order low-pass with corner `f`
    /// (Hz) and quality `q`, at sample rate `r`.
    pub fn lowpass(r: f32, f: f32, q: f32) -> Self {
        let w0 = 2.0 * PI * f / r;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Frequency response at `f` Hz, sample rate `r`, as a complex gain.
    pub fn response(&self, r: f32, f: f32) -> num_complex::Complex32 {
        use num_complex::Complex32;
        let omega = 2.0 * PI * f / r;
        let z1 = Complex32::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        (Complex32::new(self.b0, 0.0) + Complex32::new(self.b1, 0.0) * z1 + Complex32::new(self.b2, 0.0) * z2)
            / (Complex32::new(1.0, 0.0) + Complex32::new(self.a1, 0.0) * z1 + Complex32::new(self.a2, 0.0) * z2)
    }
}

/// One-pole low-pass coefficient, bilinear-transform derived: `y = a*x +
/// (1-a)*y_prev`, with the pole placed so the -3 dB corner sits at `f` Hz.
pub fn one_pole_lowpass_coeff(r: f32, f: f32) -> f32 {
    let w = 2.0 * PI * f / r;
    let x = (-w).exp();
    1.0 - x
}

/// One-pole coefficient for a time-constant expressed directly in seconds
/// (used by the DC blocker and envelope followers rather than a -3 dB
/// corner frequency).
pub fn one_pole_time_constant_coeff(r: f32, tau_seconds: f32) -> f32 {
    1.0 - (-1.0 / (tau_seconds * r)).exp()
}

/// First-order direct-form-I coefficients: `y = b0*x0 + b1*x1 + a1*y1`.
#[derive(Copy, Clone, Debug, Default)]
pub struct FirstOrderCoefs {
    pub b0: f32,
    pub b1: f32,
    pub a1: f32,
}

/// FM broadcast pre/de-emphasis shelving filter (spec.md §4.3): a zero
/// bilinear-transformed from the broadcast time constant `tau` (50 us, or
/// 75 us for US/Korea), paired with a pole fixed at the digital angular
/// frequency `0.9*pi` radians/sample (independent of sample rate, since it
/// is specified directly in the digital domain) that shelves the response
/// flat near Nyquist instead of boosting without bound. De-emphasis is the
/// same zero/pole pair with their roles swapped, which makes
/// `deemphasis(preemphasis(x)) == x` exactly for an ideal channel.
pub fn preemphasis_coeffs(r: f32, tau_seconds: f32) -> FirstOrderCoefs {
    let wz = 1.0 / tau_seconds;
    let t = 1.0 / r;
    // Bilinear transform of a single analog zero at s = -wz.
    let zero = (1.0 - wz * t / 2.0) / (1.0 + wz * t / 2.0);
    let pole = (-0.9 * PI).exp();
    let gain = (1.0 - pole) / (1.0 - zero);
    FirstOrderCoefs {
        b0: gain,
        b1: -gain * zero,
        a1: pole,
    }
}

/// De-emphasis coefficients complementary to [`preemphasis_coeffs`]: the
/// same zero/pole pair with zero and pole swapped, normalized to unit DC
/// gain.
pub fn deemphasis_coeffs(r: f32, tau_seconds: f32) -> FirstOrderCoefs {
    let wz = 1.0 / tau_seconds;
    let t = 1.0 / r;
    let zero = (1.0 - wz * t / 2.0) / (1.0 + wz * t / 2.0);
    let pole = (-0.9 * PI).exp();
    let gain = (1.0 - zero) / (1.0 - pole);
    FirstOrderCoefs {
        b0: gain,
        b1: -gain * pole,
        a1: zero,
    }
}
