//! Filters (spec.md §4.4): FIR, FFT overlap-save FIR, integer delay,
//! one-pole and biquad IIR, DC blocker, AGC, frequency shifter,
//! pre/de-emphasis and the pilot-tone detector.
//!
//! Every filter in this module implements [`Filter`]: `in_place` runs a
//! block through the filter without changing its length, `reset` clears
//! state (coefficients survive), and `delay` reports the filter's group
//! delay in samples at DC. Per spec.md §9's design note, dynamic dispatch
//! over filter kinds costs at most once per block: [`FilterKind`] is a
//! closed enum rather than a `dyn Filter`, so the match happens once per
//! `in_place` call, not once per sample.

use num_complex::Complex32;
use std::f32::consts::PI;

use crate::coeffs::{self, BiquadCoefs, FirstOrderCoefs};
use crate::fft::Fft;
use crate::math::next_pow2;

/// Shared contract for every filter kind in this module.
pub trait Filter {
    /// Filter `buf` in place. Length is never changed.
    fn in_place(&mut self, buf: &mut [f32]);
    /// Clear internal state; coefficients are unaffected.
    fn reset(&mut self);
    /// Group delay in samples at DC.
    fn delay(&self) -> usize;
}

/// Time-domain FIR filter. Maintains `N-1` samples of history across calls
/// so that filtering consecutive blocks is equivalent to filtering their
/// concatenation. Group delay is `kernel.len() / 2`.
#[derive(Clone)]
pub struct Fir {
    kernel: Vec<f32>,
    history: Vec<f32>,
}

impl Fir {
    pub fn new(kernel: Vec<f32>) -> Self {
        assert!(!kernel.is_empty(), "FIR kernel must not be empty");
        let history = vec![0.0; kernel.len() - 1];
        Self { kernel, history }
    }

    pub fn kernel(&self) -> &[f32] {
        &self.kernel
    }
}

impl Filter for Fir {
    fn in_place(&mut self, buf: &mut [f32]) {
        let n = self.kernel.len();
        if n == 1 {
            let g = self.kernel[0];
            for x in buf.iter_mut() {
                *x *= g;
            }
            return;
        }
        let hist_len = self.history.len();
        // Extended[] = history ++ buf, convolved, then the new tail of
        // `buf.len()` samples of history is saved for next time.
        let mut extended = Vec::with_capacity(hist_len + buf.len());
        extended.extend_from_slice(&self.history);
        extended.extend_from_slice(buf);

        for (i, out) in buf.iter_mut().enumerate() {
            // Output i corresponds to extended[i..=i+n-1], convolved with a
            // time-reversed kernel. The inner loop is unrolled by four,
            // matching the performance-critical path called out in
            // spec.md §4.4.
            let window = &extended[i..i + n];
            let mut acc = 0.0f32;
            let mut k = 0;
            while k + 4 <= n {
                acc += window[k] * self.kernel[n - 1 - k]
                    + window[k + 1] * self.kernel[n - 2 - k]
                    + window[k + 2] * self.kernel[n - 3 - k]
                    + window[k + 3] * self.kernel[n - 4 - k];
                k += 4;
            }
            while k < n {
                acc += window[k] * self.kernel[n - 1 - k];
                k += 1;
            }
            *out = acc;
        }

        let tail_start = extended.len() - hist_len;
        self.history.copy_from_slice(&extended[tail_start..]);
    }

    fn reset(&mut self) {
        self.history.iter_mut().for_each(|x| *x = 0.0);
    }

    fn delay(&self) -> usize {
        self.kernel.len() / 2
    }
}

/// Frequency-domain overlap-save realization of the same transfer function
/// as [`Fir`]. Transform length `L` is the next power of two of `2*N`.
/// Group delay is `L - (N-1)/2`.
pub struct FftFilter {
    kernel_len: usize,
    fft: Fft,
    kernel_spectrum: Vec<Complex32>,
    /// Samples waiting to fill the next transform block.
    input_ring: Vec<f32>,
    input_filled: usize,
    /// Filtered samples ready to be handed to the caller.
    output: std::collections::VecDeque<f32>,
}

impl FftFilter {
    pub fn new(kernel: &[f32]) -> Self {
        let n = kernel.len();
        let l = next_pow2(2 * n, 4);
        let fft = Fft::of_length(l);
        // Time-reversed, left-padded copy of the kernel, zero-padded to L,
        // transformed once to its spectrum.
        let mut padded = vec![0.0f32; l];
        for (i, &k) in kernel.iter().enumerate() {
            padded[i] = k;
        }
        let mut kernel_spectrum = vec![Complex32::new(0.0, 0.0); l];
        fft.transform_real(&padded, &mut kernel_spectrum);
        // transform_real normalizes by 1/L; undo that so pointwise
        // multiplication below reproduces the FIR's unnormalized gain once
        // we also drop the 1/L from the input's own forward transform.
        for c in kernel_spectrum.iter_mut() {
            *c *= l as f32;
        }
        Self {
            kernel_len: n,
            fft,
            kernel_spectrum,
            input_ring: vec![0.0; l],
            input_filled: n - 1,
            output: std::collections::VecDeque::new(),
        }
    }
}

impl Filter for FftFilter {
    fn in_place(&mut self, buf: &mut [f32]) {
        let mut offset = 0;
        while offset < buf.len() {
            let take = (self.fft.len() - self.input_filled).min(buf.len() - offset);
            let start = self.input_filled;
            self.input_ring[start..start + take].copy_from_slice(&buf[offset..offset + take]);
            self.input_filled += take;
            offset += take;

            if self.input_filled == self.fft.len() {
                let mut spectrum = vec![Complex32::new(0.0, 0.0); self.fft.len()];
                self.fft.transform_real(&self.input_ring, &mut spectrum);
                for (s, k) in spectrum.iter_mut().zip(self.kernel_spectrum.iter()) {
                    *s *= *k;
                }
                self.fft.reverse_in_place(&mut spectrum);
                // Discard the first N-1 (aliased) samples; publish the rest.
                // The pointwise product above already carries the exact
                // convolution scale (kernel_spectrum absorbed the forward
                // transform's 1/L so that `reverse` directly yields the
                // linear convolution, with no further rescale needed).
                for c in spectrum[self.kernel_len - 1..].iter() {
                    self.output.push_back(c.re);
                }
                // Slide the last N-1 samples down to the front as history
                // for the next overlap-save block.
                let keep = self.kernel_len - 1;
                if keep > 0 {
                    let tail_start = self.fft.len() - keep;
                    self.input_ring.copy_within(tail_start.., 0);
                }
                self.input_filled = keep;
            }
        }

        for out in buf.iter_mut() {
            *out = self.output.pop_front().unwrap_or(0.0);
        }
    }

    fn reset(&mut self) {
        self.input_ring.iter_mut().for_each(|x| *x = 0.0);
        self.input_filled = self.kernel_len.saturating_sub(1);
        self.output.clear();
    }

    fn delay(&self) -> usize {
        self.fft.len() - (self.kernel_len - 1) / 2
    }
}

/// Integer-sample delay line of length `d`.
#[derive(Clone)]
pub struct DelayLine {
    ring: std::collections::VecDeque<f32>,
    d: usize,
}

impl DelayLine {
    pub fn new(d: usize) -> Self {
        let mut ring = std::collections::VecDeque::with_capacity(d + 1);
        ring.extend(std::iter::repeat(0.0).take(d));
        Self { ring, d }
    }
}

impl Filter for DelayLine {
    fn in_place(&mut self, buf: &mut [f32]) {
        for x in buf.iter_mut() {
            self.ring.push_back(*x);
            *x = self.ring.pop_front().unwrap_or(0.0);
        }
    }

    fn reset(&mut self) {
        self.ring.iter_mut().for_each(|x| *x = 0.0);
    }

    fn delay(&self) -> usize {
        self.d
    }
}

/// One-pole IIR low-pass, direct-form-I: `y = a*x + (1-a)*y_prev`.
#[derive(Copy, Clone, Default)]
pub struct OnePole {
    a: f32,
    y1: f32,
}

impl OnePole {
    pub fn new(a: f32) -> Self {
        Self { a, y1: 0.0 }
    }

    pub fn set_coeff(&mut self, a: f32) {
        self.a = a;
    }

    #[inline]
    pub fn tick(&mut self, x: f32) -> f32 {
        self.y1 = self.a * x + (1.0 - self.a) * self.y1;
        self.y1
    }

    pub fn value(&self) -> f32 {
        self.y1
    }

    /// Analytic phase response at frequency `f` (sample rate `r`).
    pub fn phase_shift(&self, r: f32, f: f32) -> f32 {
        let omega = 2.0 * PI * f / r;
        let z = Complex32::from_polar(1.0, -omega);
        let h = Complex32::new(self.a, 0.0) / (Complex32::new(1.0, 0.0) - Complex32::new(1.0 - self.a, 0.0) * z);
        h.arg()
    }
}

impl Filter for OnePole {
    fn in_place(&mut self, buf: &mut [f32]) {
        for x in buf.iter_mut() {
            *x = self.tick(*x);
        }
    }

    fn reset(&mut self) {
        self.y1 = 0.0;
    }

    fn delay(&self) -> usize {
        0
    }
}

/// Second-order IIR (direct form I) driven by [`BiquadCoefs`].
#[derive(Copy, Clone, Default)]
pub struct Biquad {
    coefs: BiquadCoefs,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    pub fn new(coefs: BiquadCoefs) -> Self {
        Self {
            coefs,
            ..Default::default()
        }
    }

    pub fn set_coefs(&mut self, coefs: BiquadCoefs) {
        self.coefs = coefs;
    }

    pub fn coefs(&self) -> BiquadCoefs {
        self.coefs
    }

    #[inline]
    pub fn tick(&mut self, x0: f32) -> f32 {
        let y0 = self.coefs.b0 * x0 + self.coefs.b1 * self.x1 + self.coefs.b2 * self.x2
            - self.coefs.a1 * self.y1
            - self.coefs.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x0;
        self.y2 = self.y1;
        self.y1 = y0;
        y0
    }

    /// Analytic phase response at frequency `f` (sample rate `r`).
    pub fn phase_shift(&self, r: f32, f: f32) -> f32 {
        self.coefs.response(r, f).arg()
    }
}

impl Filter for Biquad {
    fn in_place(&mut self, buf: &mut [f32]) {
        for x in buf.iter_mut() {
            *x = self.tick(*x);
        }
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    fn delay(&self) -> usize {
        0
    }
}

/// One-pole high-pass DC blocker with a -3 dB corner at roughly 0.5 Hz
/// equivalent time constant.
#[derive(Clone)]
pub struct DcBlocker {
    r: f32,
    x1: f32,
    y1: f32,
}

impl DcBlocker {
    pub fn new(r: f32) -> Self {
        Self { r, x1: 0.0, y1: 0.0 }
    }
}

impl Filter for DcBlocker {
    fn in_place(&mut self, buf: &mut [f32]) {
        // Pole placed for a 0.5 Hz time constant: a = exp(-2*pi*0.5/r).
        let a = (-2.0 * PI * 0.5 / self.r).exp();
        for x in buf.iter_mut() {
            let y = *x - self.x1 + a * self.y1;
            self.x1 = *x;
            self.y1 = y;
            *x = y;
        }
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }

    fn delay(&self) -> usize {
        0
    }
}

/// Automatic gain control: a slow peak-decay envelope with a hold window
/// equal to the sample rate (one second), divided into the signal and
/// bounded by `max_gain`. Attack is immediate (the hold resets whenever
/// `power > 0.9 * max_power_seen`); release is a one-pole decay.
pub struct Agc {
    r: f32,
    max_gain: f32,
    peak: f32,
    hold: usize,
    hold_window: usize,
    release: f32,
}

impl Agc {
    pub fn new(r: f32, max_gain: f32) -> Self {
        Self {
            r,
            max_gain,
            peak: 1e-6,
            hold: 0,
            hold_window: r as usize,
            release: (-1.0 / r).exp(),
        }
    }
}

impl Filter for Agc {
    fn in_place(&mut self, buf: &mut [f32]) {
        for x in buf.iter_mut() {
            let power = x.abs();
            if power > 0.9 * self.peak {
                self.peak = power.max(self.peak);
                self.hold = self.hold_window;
            } else if self.hold > 0 {
                self.hold -= 1;
            } else {
                self.peak *= self.release;
                self.peak = self.peak.max(1e-6);
            }
            let gain = (1.0 / self.peak).min(self.max_gain);
            *x *= gain;
        }
    }

    fn reset(&mut self) {
        self.peak = 1e-6;
        self.hold = 0;
    }

    fn delay(&self) -> usize {
        0
    }
}

impl Agc {
    pub fn sample_rate(&self) -> f32 {
        self.r
    }
}

/// Complex frequency shifter: multiplies the complex signal by
/// `e^{j*2*pi*f*t/r}` via phasor recursion (two multiplications per sample,
/// no trig calls in the hot loop). Per spec.md §4.4's open question, the
/// phasor is renormalized to unit magnitude every 4096 samples to bound the
/// amplitude drift recursion accumulates over long runs.
pub struct FreqShifter {
    r: f32,
    freq: f32,
    step: Complex32,
    phasor: Complex32,
    since_renorm: u32,
}

const RENORM_PERIOD: u32 = 4096;

impl FreqShifter {
    pub fn new(r: f32, freq: f32) -> Self {
        let mut s = Self {
            r,
            freq: 0.0,
            step: Complex32::new(1.0, 0.0),
            phasor: Complex32::new(1.0, 0.0),
            since_renorm: 0,
        };
        s.set_frequency(freq);
        s
    }

    pub fn set_frequency(&mut self, freq: f32) {
        self.freq = freq;
        let angle = 2.0 * PI * freq / self.r;
        self.step = Complex32::from_polar(1.0, angle);
    }

    pub fn frequency(&self) -> f32 {
        self.freq
    }

    /// Shift a complex I/Q block in place.
    pub fn shift(&mut self, i: &mut [f32], q: &mut [f32]) {
        assert_eq!(i.len(), q.len());
        for k in 0..i.len() {
            let x = Complex32::new(i[k], q[k]) * self.phasor;
            i[k] = x.re;
            q[k] = x.im;
            self.phasor *= self.step;
            self.since_renorm += 1;
            if self.since_renorm >= RENORM_PERIOD {
                self.phasor /= self.phasor.norm();
                self.since_renorm = 0;
            }
        }
    }

    pub fn reset(&mut self) {
        self.phasor = Complex32::new(1.0, 0.0);
        self.since_renorm = 0;
    }
}

/// FM broadcast pre/de-emphasis first-order shelving filter (spec.md
/// §4.3/§4.4).
#[derive(Clone, Default)]
pub struct Emphasis {
    coefs: FirstOrderCoefs,
    x1: f32,
    y1: f32,
}

impl Emphasis {
    pub fn preemphasis(r: f32, tau_seconds: f32) -> Self {
        Self {
            coefs: coeffs::preemphasis_coeffs(r, tau_seconds),
            ..Default::default()
        }
    }

    pub fn deemphasis(r: f32, tau_seconds: f32) -> Self {
        Self {
            coefs: coeffs::deemphasis_coeffs(r, tau_seconds),
            ..Default::default()
        }
    }

    #[inline]
    pub fn tick(&mut self, x0: f32) -> f32 {
        let y0 = self.coefs.b0 * x0 + self.coefs.b1 * self.x1 + self.coefs.a1 * self.y1;
        self.x1 = x0;
        self.y1 = y0;
        y0
    }
}

impl Filter for Emphasis {
    fn in_place(&mut self, buf: &mut [f32]) {
        for x in buf.iter_mut() {
            *x = self.tick(*x);
        }
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }

    fn delay(&self) -> usize {
        0
    }
}

/// A tagged variant over every filter kind, so a pipeline can hold a
/// homogeneous `Vec<FilterKind>` while paying dynamic dispatch only once
/// per block (spec.md §9).
pub enum FilterKind {
    Fir(Fir),
    Fft(FftFilter),
    Delay(DelayLine),
    OnePole(OnePole),
    Biquad(Biquad),
    DcBlocker(DcBlocker),
    Agc(Agc),
    Emphasis(Emphasis),
}

impl Filter for FilterKind {
    fn in_place(&mut self, buf: &mut [f32]) {
        match self {
            FilterKind::Fir(f) => f.in_place(buf),
            FilterKind::Fft(f) => f.in_place(buf),
            FilterKind::Delay(f) => f.in_place(buf),
            FilterKind::OnePole(f) => f.in_place(buf),
            FilterKind::Biquad(f) => f.in_place(buf),
            FilterKind::DcBlocker(f) => f.in_place(buf),
            FilterKind::Agc(f) => f.in_place(buf),
            FilterKind::Emphasis(f) => f.in_place(buf),
        }
    }

    fn reset(&mut self) {
        match self {
            FilterKind::Fir(f) => f.reset(),
            FilterKind::Fft(f) => f.reset(),
            FilterKind::Delay(f) => f.reset(),
            FilterKind::OnePole(f) => f.reset(),
            FilterKind::Biquad(f) => f.reset(),
            FilterKind::DcBlocker(f) => f.reset(),
            FilterKind::Agc(f) => f.reset(),
            FilterKind::Emphasis(f) => f.reset(),
        }
    }

    fn delay(&self) -> usize {
        match self {
            FilterKind::Fir(f) => f.delay(),
            FilterKind::Fft(f) => f.delay(),
            FilterKind::Delay(f) => f.delay(),
            FilterKind::OnePole(f) => f.delay(),
            FilterKind::Biquad(f) => f.delay(),
            FilterKind::DcBlocker(f) => f.delay(),
            FilterKind::Agc(f) => f.delay(),
            FilterKind::Emphasis(f) => f.delay(),
        }
    }
}

/// Minimum ratio of filtered-beat magnitude to raw input envelope the
/// detector requires before it will report `locked`, regardless of how
/// quiet the frequency estimate is. Guards against a silent (or carrier-
/// absent) input settling at `speed == 0` and reading as locked.
const RATIO_LOCK_FLOOR: f32 = 0.3;

/// Pilot-tone detector / coherent carrier reconstructor (spec.md §4.4).
///
/// Downshifts the input by `target` Hz, low-passes both I and Q through a
/// biquad with corner near `100 * tolerance`, normalizes to unit magnitude,
/// estimates instantaneous frequency from consecutive samples via
/// `atan2(Q*lI - I*lQ, I*lI + Q*lQ)`, smooths that estimate with a one-pole
/// filter, and upshifts the normalized I/Q back by `target`. Reports
/// `locked = |speed_estimate| <= tolerance * 2*pi / r` AND the smoothed
/// ratio of filtered-beat magnitude to raw input envelope clears
/// [`RATIO_LOCK_FLOOR`] — a silent or carrier-absent input never locks,
/// however quiet its (meaningless) frequency estimate happens to be.
/// Before upshifting, the normalized carrier is rotated by the low-pass's
/// own analytic phase response at the detected offset frequency
/// (`Biquad::phase_shift`), compensating the reconstructed carrier for the
/// lag the I/Q low-pass itself introduces.
pub struct PilotDetector {
    r: f32,
    target: f32,
    tolerance: f32,
    shifter: FreqShifter,
    upshift: FreqShifter,
    lp_i: Biquad,
    lp_q: Biquad,
    smoother: OnePole,
    ratio_smoother: OnePole,
    last_i: f32,
    last_q: f32,
    locked: bool,
}

impl PilotDetector {
    pub fn new(r: f32, target: f32, tolerance: f32) -> Self {
        let corner = 100.0 * tolerance;
        let lp_coefs = BiquadCoefs::lowpass(r, corner, std::f32::consts::FRAC_1_SQRT_2);
        Self {
            r,
            target,
            tolerance,
            shifter: FreqShifter::new(r, -target),
            upshift: FreqShifter::new(r, target),
            lp_i: Biquad::new(lp_coefs),
            lp_q: Biquad::new(lp_coefs),
            smoother: OnePole::new(coeffs::one_pole_time_constant_coeff(r, 0.01)),
            ratio_smoother: OnePole::new(coeffs::one_pole_time_constant_coeff(r, 0.01)),
            last_i: 1.0,
            last_q: 0.0,
            locked: false,
        }
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Target carrier frequency this detector tracks, in Hz.
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Process one block, returning reconstructed unit-magnitude cosine and
    /// sine arrays for the detected carrier.
    pub fn process(&mut self, i: &[f32], q: &[f32], cos_out: &mut [f32], sin_out: &mut [f32]) {
        assert_eq!(i.len(), q.len());
        assert_eq!(i.len(), cos_out.len());
        assert_eq!(i.len(), sin_out.len());

        let mut di: Vec<f32> = i.to_vec();
        let mut dq: Vec<f32> = q.to_vec();
        self.shifter.shift(&mut di, &mut dq);
        self.lp_i.in_place(&mut di);
        self.lp_q.in_place(&mut dq);

        for k in 0..di.len() {
            let filtered_mag = (di[k] * di[k] + dq[k] * dq[k]).sqrt();
            let mag = filtered_mag.max(1e-12);
            let ni = di[k] / mag;
            let nq = dq[k] / mag;

            let cross = nq * self.last_i - ni * self.last_q;
            let dot = ni * self.last_i + nq * self.last_q;
            let speed = crate::math::atan2_approx(cross, dot);
            let smoothed = self.smoother.tick(speed);

            let raw_env = (i[k] * i[k] + q[k] * q[k]).sqrt();
            let ratio = filtered_mag / raw_env.max(1e-9);
            let smoothed_ratio = self.ratio_smoother.tick(ratio);

            self.locked = smoothed.abs() <= self.tolerance * 2.0 * PI / self.r
                && smoothed_ratio >= RATIO_LOCK_FLOOR;

            self.last_i = ni;
            self.last_q = nq;

            // Rotate the reconstructed carrier by the low-pass's own phase
            // response at the detected offset so its lag doesn't leak into
            // the upshifted output.
            let offset_hz = smoothed * self.r / (2.0 * PI);
            let phase_correction = self.lp_i.phase_shift(self.r, offset_hz);
            let (comp_cos, comp_sin) = (phase_correction.cos(), phase_correction.sin());
            let ci = ni * comp_cos + nq * comp_sin;
            let cq = nq * comp_cos - ni * comp_sin;

            let mut out_i = [ci];
            let mut out_q = [cq];
            self.upshift.shift(&mut out_i, &mut out_q);
            cos_out[k] = out_i[0];
            sin_out[k] = out_q[0];
        }
    }

    pub fn reset(&mut self) {
        self.shifter.reset();
        self.upshift.reset();
        self.lp_i.reset();
        self.lp_q.reset();
        self.smoother = OnePole::new(coeffs::one_pole_time_constant_coeff(self.r, 0.01));
        self.ratio_smoother = OnePole::new(coeffs::one_pole_time_constant_coeff(self.r, 0.01));
        self.last_i = 1.0;
        self.last_q = 0.0;
        self.locked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coeffs::low_pass_kernel;

    fn rms(a: &[f32], b: &[f32]) -> f32 {
        let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
        (sum / a.len() as f32).sqrt()
    }

    #[test]
    fn fir_delay_is_half_kernel_length() {
        let kernel = low_pass_kernel(48_000.0, 4_000.0, 151, 1.0);
        let fir = Fir::new(kernel);
        assert_eq!(fir.delay(), 75);
    }

    #[test]
    fn fir_consecutive_blocks_equal_one_big_block() {
        let kernel = vec![0.25, 0.5, 0.25];
        let input: Vec<f32> = (0..40).map(|i| (i as f32 * 0.1).sin()).collect();

        let mut whole = Fir::new(kernel.clone());
        let mut whole_buf = input.clone();
        whole.in_place(&mut whole_buf);

        let mut split = Fir::new(kernel);
        let mut a = input[..17].to_vec();
        let mut b = input[17..].to_vec();
        split.in_place(&mut a);
        split.in_place(&mut b);
        let mut combined = a;
        combined.extend(b);

        assert!(rms(&whole_buf, &combined) < 1e-6);
    }

    #[test]
    fn fft_filter_matches_fir_modulo_delay() {
        let kernel = low_pass_kernel(48_000.0, 4_000.0, 63, 1.0);
        let mut fir = Fir::new(kernel.clone());
        let mut fftf = FftFilter::new(&kernel);

        let n = 4000;
        let input: Vec<f32> = (0..n)
            .map(|i| 0.5 + 0.3 * (i as f32 * 0.05).sin())
            .collect();

        let mut fir_out = input.clone();
        fir.in_place(&mut fir_out);

        let mut fft_out = input.clone();
        fftf.in_place(&mut fft_out);

        let fir_delay = fir.delay();
        let fft_delay = fftf.delay();
        let compare_len = n - fft_delay - 10;
        let a = &fir_out[fir_delay..fir_delay + compare_len];
        let b = &fft_out[fft_delay..fft_delay + compare_len];
        let err = rms(a, b);
        assert!(err < 1e-3, "fft/fir mismatch rms={err}");
    }

    #[test]
    fn delay_line_delays_by_exactly_d() {
        let mut d = DelayLine::new(3);
        let mut buf = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        d.in_place(&mut buf);
        assert_eq!(buf, vec![0.0, 0.0, 0.0, 1.0, 2.0]);
        assert_eq!(d.delay(), 3);
    }

    #[test]
    fn one_pole_converges_to_constant_input() {
        let mut p = OnePole::new(0.1);
        let mut buf = vec![1.0; 500];
        p.in_place(&mut buf);
        assert!((buf[499] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn biquad_lowpass_attenuates_high_frequency_tone() {
        let r = 48_000.0;
        let coefs = BiquadCoefs::lowpass(r, 1000.0, std::f32::consts::FRAC_1_SQRT_2);
        let mut bq = Biquad::new(coefs);
        let n = 2000;
        let mut buf: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 15_000.0 * i as f32 / r).sin())
            .collect();
        bq.in_place(&mut buf);
        let tail_rms: f32 =
            (buf[1000..].iter().map(|x| x * x).sum::<f32>() / 1000.0).sqrt();
        assert!(tail_rms < 0.1);
    }

    #[test]
    fn dc_blocker_removes_constant_offset() {
        let mut blocker = DcBlocker::new(48_000.0);
        let mut buf = vec![1.0; 20_000];
        blocker.in_place(&mut buf);
        assert!(buf[19_999].abs() < 0.01);
    }

    #[test]
    fn agc_normalizes_toward_unit_peak() {
        let mut agc = Agc::new(48_000.0, 100.0);
        let mut buf = vec![0.1f32; 48_000];
        agc.in_place(&mut buf);
        assert!((buf[47_999].abs() - 1.0).abs() < 0.2);
    }

    #[test]
    fn freq_shifter_preserves_amplitude() {
        let mut shifter = FreqShifter::new(48_000.0, 1000.0);
        let mut i = vec![1.0f32; 20_000];
        let mut q = vec![0.0f32; 20_000];
        shifter.shift(&mut i, &mut q);
        for k in (0..20_000).step_by(997) {
            let mag = (i[k] * i[k] + q[k] * q[k]).sqrt();
            assert!((mag - 1.0).abs() < 1e-3, "drift at {k}: mag={mag}");
        }
    }

    #[test]
    fn preemphasis_then_deemphasis_round_trips() {
        let r = 48_000.0;
        let mut pre = Emphasis::preemphasis(r, 50e-6);
        let mut de = Emphasis::deemphasis(r, 50e-6);
        let input: Vec<f32> = (0..2000).map(|i| (i as f32 * 0.01).sin()).collect();
        let mut buf = input.clone();
        pre.in_place(&mut buf);
        de.in_place(&mut buf);
        let err = rms(&buf[500..], &input[500..]);
        assert!(err < 1e-2, "round trip error {err}");
    }

    #[test]
    fn pilot_detector_locks_on_pure_tone_at_target() {
        let r = 240_000.0;
        let target = 19_000.0;
        let mut det = PilotDetector::new(r, target, 5.0);
        let n = 20_000;
        let i: Vec<f32> = (0..n)
            .map(|k| 0.1 * (2.0 * PI * target * k as f32 / r).cos())
            .collect();
        let q: Vec<f32> = (0..n)
            .map(|k| 0.1 * (2.0 * PI * target * k as f32 / r).sin())
            .collect();
        let mut cos_out = vec![0.0; n];
        let mut sin_out = vec![0.0; n];
        det.process(&i, &q, &mut cos_out, &mut sin_out);
        assert!(det.locked());
    }

    #[test]
    fn pilot_detector_unlocked_on_silence() {
        let r = 240_000.0;
        let mut det = PilotDetector::new(r, 19_000.0, 5.0);
        let n = 5000;
        let zeros = vec![0.0f32; n];
        let mut cos_out = vec![0.0; n];
        let mut sin_out = vec![0.0; n];
        det.process(&zeros, &zeros, &mut cos_out, &mut sin_out);
        assert!(!det.locked());
    }
}
