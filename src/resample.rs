//! Integer-ratio decimators (spec.md §2 row F, §4.7).
//!
//! Every scheme pipeline downsamples at least twice: once from the raw
//! input rate to an intermediate rate, and again from the intermediate
//! rate to the audio output rate. Both stages are the same shape — a
//! low-pass [`Filter`] to band-limit, then a stride that keeps every
//! `ratio`-th sample — so this module factors that shape out once instead
//! of repeating it per scheme, the way `fundsp`'s own `resample.rs`
//! factors its (differently-shaped) variable-speed interpolation out of
//! its oscillator and filter nodes.

use crate::filter::{Filter, FilterKind};

/// Decimates a real-valued signal by an integer ratio, low-passing first
/// with whatever [`FilterKind`] the caller built (FIR or FFT-overlap-save,
/// per spec.md §4.4).
pub struct RealDecimator {
    filter: FilterKind,
    ratio: usize,
    /// Count of already-filtered samples processed, modulo `ratio`, so a
    /// decimator fed across several calls keeps alignment exactly as if the
    /// whole stream had been filtered in one call.
    phase: usize,
}

impl RealDecimator {
    pub fn new(filter: FilterKind, ratio: usize) -> Self {
        assert!(ratio >= 1, "decimation ratio must be at least 1");
        Self {
            filter,
            ratio,
            phase: 0,
        }
    }

    pub fn ratio(&self) -> usize {
        self.ratio
    }

    pub fn delay(&self) -> usize {
        self.filter.delay()
    }

    /// Filters `input` in place (scratch) and appends the decimated result
    /// to `out`. Returns the number of samples appended.
    pub fn process(&mut self, input: &[f32], scratch: &mut Vec<f32>, out: &mut Vec<f32>) -> usize {
        scratch.clear();
        scratch.extend_from_slice(input);
        self.filter.in_place(scratch);
        let mut appended = 0;
        for (k, &x) in scratch.iter().enumerate() {
            if (self.phase + k) % self.ratio == 0 {
                out.push(x);
                appended += 1;
            }
        }
        self.phase = (self.phase + scratch.len()) % self.ratio;
        appended
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.phase = 0;
    }
}

/// Decimates a complex (I/Q) signal by an integer ratio: an independent
/// low-pass filter on each rail, then a shared stride so I and Q samples
/// stay paired.
pub struct ComplexDecimator {
    i: RealDecimator,
    q: RealDecimator,
}

impl ComplexDecimator {
    /// `filter_factory` is called twice (once per rail) so each rail gets
    /// independent filter state — this is why the caller passes a factory
    /// rather than a single `FilterKind`.
    pub fn new(mut filter_factory: impl FnMut() -> FilterKind, ratio: usize) -> Self {
        Self {
            i: RealDecimator::new(filter_factory(), ratio),
            q: RealDecimator::new(filter_factory(), ratio),
        }
    }

    pub fn ratio(&self) -> usize {
        self.i.ratio()
    }

    pub fn delay(&self) -> usize {
        self.i.delay()
    }

    /// Decimates an I/Q block, appending results to `out_i`/`out_q`.
    pub fn process(
        &mut self,
        i: &[f32],
        q: &[f32],
        scratch: &mut Vec<f32>,
        out_i: &mut Vec<f32>,
        out_q: &mut Vec<f32>,
    ) {
        assert_eq!(i.len(), q.len());
        self.i.process(i, scratch, out_i);
        // Reuse the same scratch buffer for Q; its contents are overwritten
        // at the top of `process` before use.
        self.q.process(q, scratch, out_q);
    }

    pub fn reset(&mut self) {
        self.i.reset();
        self.q.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coeffs::low_pass_kernel;
    use crate::filter::Fir;
    use std::f32::consts::PI;

    #[test]
    fn real_decimator_keeps_every_nth_filtered_sample() {
        let kernel = low_pass_kernel(48_000.0, 4_000.0, 31, 1.0);
        let fir = FilterKind::Fir(Fir::new(kernel.clone()));
        let mut dec = RealDecimator::new(fir, 4);

        let n = 4000;
        let input: Vec<f32> = (0..n).map(|k| (2.0 * PI * 1000.0 * k as f32 / 48_000.0).sin()).collect();

        let mut reference_filter = Fir::new(kernel);
        let mut reference = input.clone();
        reference_filter.in_place(&mut reference);

        let mut scratch = Vec::new();
        let mut out = Vec::new();
        dec.process(&input, &mut scratch, &mut out);

        assert_eq!(out.len(), n / 4);
        for (k, &v) in out.iter().enumerate() {
            assert_eq!(v, reference[k * 4]);
        }
    }

    #[test]
    fn real_decimator_phase_is_consistent_across_calls() {
        let kernel = vec![1.0f32];
        let mut single = RealDecimator::new(FilterKind::Fir(Fir::new(kernel.clone())), 3);
        let mut split = RealDecimator::new(FilterKind::Fir(Fir::new(kernel)), 3);

        let input: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let mut scratch = Vec::new();
        let mut whole_out = Vec::new();
        single.process(&input, &mut scratch, &mut whole_out);

        let mut split_out = Vec::new();
        split.process(&input[..7], &mut scratch, &mut split_out);
        split.process(&input[7..], &mut scratch, &mut split_out);

        assert_eq!(whole_out, split_out);
    }

    #[test]
    fn complex_decimator_pairs_i_and_q() {
        let mk = || FilterKind::Fir(Fir::new(vec![1.0f32]));
        let mut dec = ComplexDecimator::new(mk, 2);
        let i: Vec<f32> = (0..10).map(|k| k as f32).collect();
        let q: Vec<f32> = (0..10).map(|k| -(k as f32)).collect();
        let mut scratch = Vec::new();
        let mut out_i = Vec::new();
        let mut out_q = Vec::new();
        dec.process(&i, &q, &mut scratch, &mut out_i, &mut out_q);
        assert_eq!(out_i, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(out_q, vec![0.0, -2.0, -4.0, -6.0, -8.0]);
    }
}
