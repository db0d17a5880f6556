//! In-place radix-2 decimation-in-time FFT (spec.md §4.2).
//!
//! `Fft::of_length(n)` rounds `n` up to the next power of two (minimum 4)
//! and precomputes twiddle factors per stage and the bit-reversal
//! permutation once at construction time, so repeated transforms of the
//! same length pay no setup cost.
//!
//! The forward transform divides by `N` (so the sum of bin magnitudes
//! equals the DC input); the inverse transform is unscaled, matching
//! spec.md §4.2's contract that `reverse(transform(x))` is the identity.

use num_complex::Complex32;
use std::f32::consts::PI;

use crate::math::next_pow2;

/// A reusable FFT plan for a fixed power-of-two length.
pub struct Fft {
    n: usize,
    log2n: u32,
    /// Bit-reversal permutation: `bit_rev[i]` is the index `i` maps to.
    bit_rev: Vec<usize>,
    /// Twiddle factors for the forward transform, one full table of length
    /// `n/2` (e^{-2*pi*i*k/n} for k in 0..n/2); the inverse transform uses
    /// their conjugates.
    twiddles: Vec<Complex32>,
    /// Optional per-sample window applied before transforming.
    window: Option<Vec<f32>>,
}

impl Fft {
    /// Build a plan for a length rounded up to the next power of two
    /// (minimum 4).
    pub fn of_length(n: usize) -> Self {
        let n = next_pow2(n, 4);
        let log2n = n.trailing_zeros();
        let bit_rev = (0..n).map(|i| reverse_bits(i, log2n)).collect();
        let twiddles = (0..n / 2)
            .map(|k| {
                let angle = -2.0 * PI * k as f32 / n as f32;
                Complex32::new(angle.cos(), angle.sin())
            })
            .collect();
        Self {
            n,
            log2n,
            bit_rev,
            twiddles,
            window: None,
        }
    }

    /// The transform length (a power of two, >= 4).
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Install a window applied pointwise before every forward transform.
    /// Must have the plan's length.
    pub fn set_window(&mut self, window: Vec<f32>) {
        assert_eq!(window.len(), self.n, "window length must match FFT length");
        self.window = Some(window);
    }

    pub fn clear_window(&mut self) {
        self.window = None;
    }

    /// Forward transform of a real input of the plan's length, normalized by
    /// `1/N`. `buf` is overwritten in place with the spectrum.
    pub fn transform_real(&self, input: &[f32], buf: &mut [Complex32]) {
        assert_eq!(input.len(), self.n);
        assert_eq!(buf.len(), self.n);
        if let Some(window) = &self.window {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = Complex32::new(input[i] * window[i], 0.0);
            }
        } else {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = Complex32::new(input[i], 0.0);
            }
        }
        self.transform_in_place(buf);
    }

    /// Forward in-place complex FFT, normalized by `1/N`.
    pub fn transform_in_place(&self, buf: &mut [Complex32]) {
        self.run(buf, false);
        let scale = 1.0 / self.n as f32;
        for x in buf.iter_mut() {
            *x *= scale;
        }
    }

    /// Inverse in-place complex FFT, unscaled (so that
    /// `reverse(transform(x)) == x`).
    pub fn reverse_in_place(&self, buf: &mut [Complex32]) {
        self.run(buf, true);
    }

    fn run(&self, buf: &mut [Complex32], inverse: bool) {
        assert_eq!(buf.len(), self.n);

        // Bit-reversal permutation.
        for i in 0..self.n {
            let j = self.bit_rev[i];
            if j > i {
                buf.swap(i, j);
            }
        }

        // Iterative Cooley-Tukey butterflies, stage by stage.
        let mut stage_len = 2usize;
        for _ in 0..self.log2n {
            let half = stage_len / 2;
            let stride = self.n / stage_len;
            let mut start = 0;
            while start < self.n {
                for k in 0..half {
                    let w = self.twiddles[k * stride];
                    let w = if inverse { w.conj() } else { w };
                    let i = start + k;
                    let j = i + half;
                    let t = buf[j] * w;
                    buf[j] = buf[i] - t;
                    buf[i] = buf[i] + t;
                }
                start += stage_len;
            }
            stage_len <<= 1;
        }
    }
}

fn reverse_bits(mut v: usize, bits: u32) -> usize {
    let mut r = 0usize;
    for _ in 0..bits {
        r = (r << 1) | (v & 1);
        v >>= 1;
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rms_error(a: &[Complex32], b: &[f32]) -> f32 {
        let n = a.len() as f32;
        let sum: f32 = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x.re - y).powi(2))
            .sum();
        (sum / n).sqrt()
    }

    #[test]
    fn of_length_rounds_up_with_floor_four() {
        assert_eq!(Fft::of_length(1).len(), 4);
        assert_eq!(Fft::of_length(5).len(), 8);
        assert_eq!(Fft::of_length(1024).len(), 1024);
    }

    #[test]
    fn round_trip_identity_within_tolerance() {
        for &n in &[16usize, 64, 256, 1024] {
            let fft = Fft::of_length(n);
            let input: Vec<f32> = (0..n)
                .map(|i| ((i as f32) * 0.37).sin() + 0.3 * ((i as f32) * 1.9).cos())
                .collect();
            let mut spectrum = vec![Complex32::new(0.0, 0.0); n];
            fft.transform_real(&input, &mut spectrum);
            fft.reverse_in_place(&mut spectrum);
            let err = rms_error(&spectrum, &input);
            assert!(err < 1e-4, "n={n} rms error {err}");
        }
    }

    #[test]
    fn dc_input_concentrates_energy_in_bin_zero() {
        let fft = Fft::of_length(64);
        let input = vec![1.0f32; 64];
        let mut spectrum = vec![Complex32::new(0.0, 0.0); 64];
        fft.transform_real(&input, &mut spectrum);
        assert_abs_diff_eq!(spectrum[0].re, 1.0, epsilon = 1e-5);
        for bin in &spectrum[1..] {
            assert_abs_diff_eq!(bin.norm(), 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn single_tone_peaks_at_expected_bin() {
        let n = 256;
        let fft = Fft::of_length(n);
        let bin = 10;
        let input: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / n as f32).sin())
            .collect();
        let mut spectrum = vec![Complex32::new(0.0, 0.0); n];
        fft.transform_real(&input, &mut spectrum);
        let mags: Vec<f32> = spectrum.iter().map(|c| c.norm()).collect();
        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert!(peak == bin || peak == n - bin);
    }
}
