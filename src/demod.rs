//! Demodulator primitives (spec.md §4.6): AM envelope detector with carrier
//! tracking, FM discriminator, SSB Hilbert combiner, and the stereo
//! separator.

use crate::coeffs;
use crate::filter::{DelayLine, Fir, Filter, OnePole};
use crate::math::atan2_approx;

/// AM envelope detector. For each sample, computes `r = sqrt(I^2+Q^2)`,
/// tracks carrier amplitude with a one-pole smoother (0.5 s time constant),
/// and outputs `r/carrier - 1` (DC-free AM), or 0 if the carrier estimate
/// is zero.
pub struct AmDemod {
    carrier: OnePole,
}

impl AmDemod {
    pub fn new(r: f32) -> Self {
        Self {
            carrier: OnePole::new(coeffs::one_pole_time_constant_coeff(r, 0.5)),
        }
    }

    /// Demodulate a complex block into `out` (same length as `i`/`q`).
    pub fn demodulate(&mut self, i: &[f32], q: &[f32], out: &mut [f32]) {
        assert_eq!(i.len(), q.len());
        assert_eq!(i.len(), out.len());
        for k in 0..i.len() {
            let envelope = (i[k] * i[k] + q[k] * q[k]).sqrt();
            let carrier = self.carrier.tick(envelope);
            out[k] = if carrier > 1e-12 {
                envelope / carrier - 1.0
            } else {
                0.0
            };
        }
    }

    pub fn reset(&mut self) {
        self.carrier.reset();
    }
}

/// FM discriminator. Computes `s * conj(prev_s)` and outputs
/// `atan2(Q,I) / (2*pi*max_deviation)`, storing the last complex sample for
/// the next call. `max_deviation` is a fraction of the sample rate
/// (spec.md §4.6) — i.e. `max_deviation_hz / sample_rate`, not raw Hz —
/// since the per-sample phase angle from `atan2` is itself already in
/// radians per sample, not radians per second.
pub struct FmDemod {
    max_deviation: f32,
    last_i: f32,
    last_q: f32,
}

impl FmDemod {
    pub fn new(max_deviation: f32) -> Self {
        Self {
            max_deviation,
            last_i: 1.0,
            last_q: 0.0,
        }
    }

    pub fn demodulate(&mut self, i: &[f32], q: &[f32], out: &mut [f32]) {
        assert_eq!(i.len(), q.len());
        assert_eq!(i.len(), out.len());
        for k in 0..i.len() {
            let beat_i = self.last_i * i[k] + self.last_q * q[k];
            let beat_q = self.last_i * q[k] - i[k] * self.last_q;
            let angle = atan2_approx(beat_q, beat_i);
            out[k] = angle / (2.0 * std::f32::consts::PI * self.max_deviation);
            self.last_i = i[k];
            self.last_q = q[k];
        }
    }

    pub fn reset(&mut self) {
        self.last_i = 1.0;
        self.last_q = 0.0;
    }
}

/// SSB Hilbert combiner. Delays the I branch by the Hilbert filter's group
/// delay and applies the Hilbert filter to Q, outputting
/// `(I_delayed + sign*Q_hilbert) / 2`, `sign = -1` for USB, `+1` for LSB.
pub struct SsbDemod {
    i_delay: DelayLine,
    q_hilbert: Fir,
    sign: f32,
}

impl SsbDemod {
    pub fn new(hilbert_kernel_len: usize, upper: bool) -> Self {
        let kernel = coeffs::hilbert_kernel(hilbert_kernel_len);
        let delay = kernel.len() / 2;
        Self {
            i_delay: DelayLine::new(delay),
            q_hilbert: Fir::new(kernel),
            sign: if upper { -1.0 } else { 1.0 },
        }
    }

    pub fn demodulate(&mut self, i: &[f32], q: &[f32], out: &mut [f32]) {
        assert_eq!(i.len(), q.len());
        assert_eq!(i.len(), out.len());
        let mut i_delayed = i.to_vec();
        self.i_delay.in_place(&mut i_delayed);
        let mut q_hilbert = q.to_vec();
        self.q_hilbert.in_place(&mut q_hilbert);
        for k in 0..out.len() {
            out[k] = (i_delayed[k] + self.sign * q_hilbert[k]) / 2.0;
        }
    }

    pub fn reset(&mut self) {
        self.i_delay.reset();
        self.q_hilbert.reset();
    }
}

/// Stereo separator. Coherently down-converts the DSB-suppressed-carrier
/// 38 kHz L-R component to baseband using the pilot detector's
/// reconstructed 19 kHz carrier: multiplies the multiplex by
/// `I*Q*4` (= `sin(2*pilot)` at unit amplitude), and reports `found` as the
/// detector's lock state.
pub struct StereoSeparator;

impl StereoSeparator {
    /// `multiplex` is the demodulated WBFM baseband (mono + pilot + L-R);
    /// `pilot_cos`/`pilot_sin` are the pilot detector's unit-magnitude
    /// reconstructed 19 kHz carrier. Writes the down-converted difference
    /// signal into `out`.
    pub fn separate(multiplex: &[f32], pilot_cos: &[f32], pilot_sin: &[f32], out: &mut [f32]) {
        assert_eq!(multiplex.len(), pilot_cos.len());
        assert_eq!(multiplex.len(), pilot_sin.len());
        assert_eq!(multiplex.len(), out.len());
        for k in 0..out.len() {
            let sin_2pilot = pilot_cos[k] * pilot_sin[k] * 4.0;
            out[k] = multiplex[k] * sin_2pilot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn fft_peak(signal: &[f32], r: f32) -> (f32, f32) {
        let n = crate::math::next_pow2(signal.len(), 4).min(signal.len());
        let fft = crate::fft::Fft::of_length(n);
        let mut spectrum = vec![num_complex::Complex32::new(0.0, 0.0); fft.len()];
        fft.transform_real(&signal[..fft.len()], &mut spectrum);
        let mut best_bin = 0;
        let mut best_mag = 0.0f32;
        for (k, c) in spectrum.iter().enumerate().take(fft.len() / 2) {
            if c.norm() > best_mag {
                best_mag = c.norm();
                best_bin = k;
            }
        }
        let freq = best_bin as f32 * r / fft.len() as f32;
        (freq, best_mag * 2.0)
    }

    #[test]
    fn am_demod_recovers_tone_amplitude() {
        let r = 48_000.0;
        let carrier_amp = 1.0;
        let tone_freq = 600.0;
        let mod_index = 0.5;
        let n = 8192;
        let mut i = vec![0.0f32; n];
        let mut q = vec![0.0f32; n];
        for k in 0..n {
            let t = k as f32 / r;
            let env = carrier_amp * (1.0 + mod_index * (2.0 * PI * tone_freq * t).sin());
            i[k] = env;
            q[k] = 0.0;
        }
        let mut demod = AmDemod::new(r);
        let mut out = vec![0.0; n];
        demod.demodulate(&i, &q, &mut out);
        let (freq, mag) = fft_peak(&out[2000..], r);
        assert!((freq - tone_freq).abs() < 20.0, "freq {freq}");
        assert!((mag - mod_index).abs() < 0.05, "mag {mag}");
    }

    #[test]
    fn fm_demod_is_linear_in_deviation() {
        let r = 192_000.0;
        let max_dev = 75_000.0;
        for frac in [-1.0, -0.5, 0.0, 0.5, 1.0] {
            let dev = max_dev * frac;
            let n = 4000;
            let mut i = vec![0.0f32; n];
            let mut q = vec![0.0f32; n];
            let mut phase = 0.0f32;
            for k in 0..n {
                i[k] = phase.cos();
                q[k] = phase.sin();
                phase += 2.0 * PI * dev / r;
            }
            let mut demod = FmDemod::new(max_dev / r);
            let mut out = vec![0.0; n];
            demod.demodulate(&i, &q, &mut out);
            let tail = &out[n / 2..];
            let mean: f32 = tail.iter().sum::<f32>() / tail.len() as f32;
            assert!((mean - frac).abs() < 1e-3, "frac={frac} mean={mean}");
        }
    }

    #[test]
    fn ssb_usb_passes_tone_above_carrier() {
        let r = 48_000.0;
        let tone = 1500.0;
        let n = 8192;
        let mut i = vec![0.0f32; n];
        let mut q = vec![0.0f32; n];
        for k in 0..n {
            let t = k as f32 / r;
            i[k] = 0.5 * (2.0 * PI * tone * t).cos();
            q[k] = 0.5 * (2.0 * PI * tone * t).sin();
        }
        let mut demod = SsbDemod::new(63, true);
        let mut out = vec![0.0; n];
        demod.demodulate(&i, &q, &mut out);
        let (freq, mag) = fft_peak(&out[2000..], r);
        assert!((freq - tone).abs() < 30.0, "freq {freq}");
        assert!(mag > 0.3, "mag {mag}");
    }

    #[test]
    fn ssb_usb_rejects_tone_below_carrier() {
        let r = 48_000.0;
        let tone = -1500.0;
        let n = 8192;
        let mut i = vec![0.0f32; n];
        let mut q = vec![0.0f32; n];
        for k in 0..n {
            let t = k as f32 / r;
            i[k] = 0.5 * (2.0 * PI * tone * t).cos();
            q[k] = 0.5 * (2.0 * PI * tone * t).sin();
        }
        let mut demod = SsbDemod::new(63, true);
        let mut out = vec![0.0; n];
        demod.demodulate(&i, &q, &mut out);
        let tail = &out[2000..];
        let rms: f32 = (tail.iter().map(|x| x * x).sum::<f32>() / tail.len() as f32).sqrt();
        assert!(rms < 0.05, "rms {rms}");
    }
}
