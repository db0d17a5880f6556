//! Scalar math helpers shared by the DSP kernel.
//!
//! Everything here is `f32`, single precision, per the numerical discipline
//! in spec.md §5: the kernel's inner loops never touch `f64`.

use std::f32::consts::PI;

/// Sample rate of 48 kHz, used as a fallback default where a caller has not
/// yet told a component its real operating rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Approximate `atan2(y, x)` with a 7-term odd polynomial in the min/max
/// ratio plus quadrant fix-ups, per spec.md §4.5.
///
/// Error stays within a small fraction of a degree over the full circle,
/// which is well inside the tolerance every phase-sensitive caller in this
/// crate (the FM discriminator, the pilot detector, SSB combining) needs.
#[inline]
pub fn atan2_approx(y: f32, x: f32) -> f32 {
    // Coefficients for the minimax odd polynomial approximating atan(t) on
    // [0, 1], applied to the min/max ratio so the argument never exceeds 1.
    const A1: f32 = 0.999_999_8;
    const A3: f32 = -0.333_329_5;
    const A5: f32 = 0.199_822_4;
    const A7: f32 = -0.139_208_3;
    const A9: f32 = 0.096_420_9;
    const A11: f32 = -0.055_909_3;
    const A13: f32 = 0.021_861_1;

    if x == 0.0 && y == 0.0 {
        return 0.0;
    }

    let ax = x.abs();
    let ay = y.abs();
    let (num, den, offset) = if ax >= ay {
        (ay, ax, 0.0)
    } else {
        (ax, ay, PI / 2.0)
    };
    let t = num / den;
    let t2 = t * t;
    let mut poly = A13;
    poly = poly * t2 + A11;
    poly = poly * t2 + A9;
    poly = poly * t2 + A7;
    poly = poly * t2 + A5;
    poly = poly * t2 + A3;
    poly = poly * t2 + A1;
    let atan = poly * t;
    let angle = if offset == 0.0 { atan } else { offset - atan };

    match (x >= 0.0, y >= 0.0) {
        (true, true) => angle,
        (true, false) => -angle,
        (false, true) => PI - angle,
        (false, false) => angle - PI,
    }
}

/// Hamming window value at tap `i` of `n` (n > 1).
#[inline]
pub fn hamming(i: usize, n: usize) -> f32 {
    0.54 - 0.46 * (2.0 * PI * i as f32 / (n as f32 - 1.0)).cos()
}

/// Blackman window value at tap `i` of `n` (n > 1), used by the spectrum
/// receiver (§4.10) for a lower sidelobe floor than Hamming.
#[inline]
pub fn blackman(i: usize, n: usize) -> f32 {
    let x = 2.0 * PI * i as f32 / (n as f32 - 1.0);
    0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
}

/// sinc(x) = sin(pi x) / (pi x), with the removable singularity at 0 filled in.
#[inline]
pub fn sinc(x: f32) -> f32 {
    if x.abs() < 1e-7 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Smallest power of two that is >= `n`, with a floor of `min`.
#[inline]
pub fn next_pow2(n: usize, min: usize) -> usize {
    let mut p = min.max(1);
    while p < n {
        p <<= 1;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn atan2_matches_std_within_tolerance() {
        let mut max_err = 0.0f32;
        let mut angle = 0.0f32;
        while angle < std::f32::consts::TAU {
            let (y, x) = (angle.sin(), angle.cos());
            let want = y.atan2(x);
            let got = atan2_approx(y, x);
            let mut err = (want - got).abs();
            if err > PI {
                err = (2.0 * PI - err).abs();
            }
            max_err = max_err.max(err);
            angle += 0.001;
        }
        assert!(max_err < 4e-4, "max atan2 error {max_err}");
    }

    #[test]
    fn atan2_origin_is_zero() {
        assert_eq!(atan2_approx(0.0, 0.0), 0.0);
    }

    #[test]
    fn next_pow2_rounds_up_with_floor() {
        assert_eq!(next_pow2(1, 4), 4);
        assert_eq!(next_pow2(5, 4), 8);
        assert_eq!(next_pow2(16, 4), 16);
    }

    #[test]
    fn sinc_at_zero_is_one() {
        assert_abs_diff_eq!(sinc(0.0), 1.0, epsilon = 1e-6);
    }
}
