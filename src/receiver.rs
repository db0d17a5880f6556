//! Sample receivers (spec.md §2 row K, §4.10).
//!
//! A `SampleReceiver` is the sink half of the data flow described in
//! spec.md §2: `SignalSource → Radio → SampleReceiver`, usually a
//! [`crate::pipeline::Demodulator`]. This module supplies the ancillary
//! receivers the radio composes alongside it: [`CompositeReceiver`] for
//! fanout, [`SampleCounter`] for periodic ticks, and [`SpectrumReceiver`]
//! for an FFT-based waterfall/panadapter feed.
//!
//! Grounded on `wkmp-ap`'s `Mixer`/output fanout for the "broadcast to an
//! ordered list of children with no error isolation" shape, and on this
//! crate's own [`crate::fft::Fft`] for the spectrum transform.

use std::sync::Arc;

use num_complex::Complex32;

use crate::fft::Fft;
use crate::math::blackman;

/// The sink contract every receiver implements (spec.md §4.10). Receivers
/// must not retain `i`/`q`/`data` beyond the call.
pub trait SampleReceiver: Send {
    fn set_sample_rate(&mut self, rate: u32);
    fn receive(&mut self, i: &[f32], q: &[f32], frequency: i64, data: Option<&[u8]>);
}

/// Broadcasts to an ordered list of children. No error isolation: this
/// crate's receivers are infallible by construction, so a panicking child
/// is a programming error the caller should see, not something to
/// swallow (spec.md §4.10: "failure in one propagates").
#[derive(Default)]
pub struct CompositeReceiver {
    children: Vec<Box<dyn SampleReceiver>>,
}

impl CompositeReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, child: Box<dyn SampleReceiver>) {
        self.children.push(child);
    }
}

impl SampleReceiver for CompositeReceiver {
    fn set_sample_rate(&mut self, rate: u32) {
        for child in &mut self.children {
            child.set_sample_rate(rate);
        }
    }

    fn receive(&mut self, i: &[f32], q: &[f32], frequency: i64, data: Option<&[u8]>) {
        for child in &mut self.children {
            child.receive(i, q, frequency, data);
        }
    }
}

/// Emits a tick every time the running sample count crosses a
/// `sample_rate / ticks_per_second` boundary (spec.md §4.10). Tolerant of
/// sample-rate changes: both the count and the threshold reset together.
pub struct SampleCounter {
    ticks_per_second: u32,
    sample_rate: u32,
    count: u64,
    on_tick: Box<dyn FnMut() + Send>,
}

impl SampleCounter {
    pub fn new(ticks_per_second: u32, on_tick: Box<dyn FnMut() + Send>) -> Self {
        Self {
            ticks_per_second,
            sample_rate: crate::math::DEFAULT_SAMPLE_RATE,
            count: 0,
            on_tick,
        }
    }

    fn threshold(&self) -> u64 {
        (self.sample_rate / self.ticks_per_second.max(1)).max(1) as u64
    }
}

impl SampleReceiver for SampleCounter {
    fn set_sample_rate(&mut self, rate: u32) {
        self.sample_rate = rate;
        self.count = 0;
    }

    fn receive(&mut self, i: &[f32], _q: &[f32], _frequency: i64, _data: Option<&[u8]>) {
        let prior_ticks = self.count / self.threshold();
        self.count += i.len() as u64;
        let new_ticks = self.count / self.threshold();
        for _ in prior_ticks..new_ticks {
            (self.on_tick)();
        }
    }
}

/// FFT-based spectrum feed (spec.md §4.10). Maintains I/Q ring buffers
/// sized to the transform length (rounded up to the next power of two,
/// floor 16); [`SpectrumReceiver::get_spectrum`] windows the latest N
/// samples with a Blackman-like window and writes `10*log10(|X[k]|^2)`,
/// bin 0 first (DC), positive frequencies through `N/2-1`, then the
/// aliased negative frequencies through the tail.
pub struct SpectrumReceiver {
    fft: Fft,
    len: usize,
    ring_i: crate::buffer::RingBuffer,
    ring_q: crate::buffer::RingBuffer,
    scratch: Vec<Complex32>,
}

impl SpectrumReceiver {
    pub fn new(requested_len: usize) -> Self {
        let len = crate::math::next_pow2(requested_len, 16);
        Self {
            fft: Fft::of_length(len),
            len,
            ring_i: crate::buffer::RingBuffer::new(len),
            ring_q: crate::buffer::RingBuffer::new(len),
            scratch: vec![Complex32::new(0.0, 0.0); len],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Writes `10*log10(|X[k]|^2)` for the latest `len()` samples into
    /// `dst` (must be exactly `len()` long). If fewer than `len()` samples
    /// have arrived yet, the missing oldest samples are treated as zero.
    pub fn get_spectrum(&self, dst: &mut [f32]) {
        assert_eq!(dst.len(), self.len, "destination must match spectrum length");
        let mut i_buf = vec![0.0f32; self.len];
        let mut q_buf = vec![0.0f32; self.len];
        self.ring_i.copy_to(&mut i_buf);
        self.ring_q.copy_to(&mut q_buf);

        let mut buf = self.scratch.clone();
        for k in 0..self.len {
            let w = blackman(k, self.len);
            buf[k] = Complex32::new(i_buf[k] * w, q_buf[k] * w);
        }
        self.fft.transform_in_place(&mut buf);

        for k in 0..self.len {
            let power = buf[k].norm_sqr().max(1e-20);
            dst[k] = 10.0 * power.log10();
        }
    }
}

impl SampleReceiver for SpectrumReceiver {
    fn set_sample_rate(&mut self, _rate: u32) {
        // The transform length is fixed at construction; sample-rate
        // changes only affect what frequency each bin maps to, which is
        // the caller's concern, not this receiver's.
    }

    fn receive(&mut self, i: &[f32], q: &[f32], _frequency: i64, _data: Option<&[u8]>) {
        self.ring_i.store(i);
        self.ring_q.store(q);
    }
}

/// Adapts a [`crate::pipeline::Demodulator`] (and a downstream
/// [`crate::pipeline::PlayerSink`]) into a [`SampleReceiver`], the
/// "demodulator-as-receiver" glue spec.md §2 calls out as part of this
/// component.
pub struct DemodulatorReceiver<S> {
    demod: crate::pipeline::Demodulator,
    sink: S,
}

impl<S: crate::pipeline::PlayerSink> DemodulatorReceiver<S> {
    pub fn new(demod: crate::pipeline::Demodulator, sink: S) -> Self {
        Self { demod, sink }
    }

    pub fn demodulator(&self) -> &crate::pipeline::Demodulator {
        &self.demod
    }

    pub fn demodulator_mut(&mut self) -> &mut crate::pipeline::Demodulator {
        &mut self.demod
    }
}

impl<S: crate::pipeline::PlayerSink> SampleReceiver for DemodulatorReceiver<S> {
    fn set_sample_rate(&mut self, _rate: u32) {
        // The demodulator's internal rate plan is driven by the center
        // frequency/sample rate pair the radio hands to `demodulate`; the
        // player's declared rate is fixed at construction per spec.md §6.
    }

    fn receive(&mut self, i: &[f32], q: &[f32], frequency: i64, _data: Option<&[u8]>) {
        let block = self.demod.demodulate(i, q, frequency);
        self.sink.play(&block.left, &block.right);
    }
}

/// A thread-safe handle some callers need (e.g. a spectrum receiver shared
/// between the radio's receive loop and a UI polling `get_spectrum`).
/// Grounded on `wkmp-ap`'s `Arc<Mutex<_>>` shared-state idiom.
pub type SharedSpectrum = Arc<std::sync::Mutex<SpectrumReceiver>>;
