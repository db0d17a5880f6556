//! Per-scheme demodulator pipelines (spec.md §2 row G, §4.7, §6).
//!
//! Each scheme wires the same stage order: frequency-shift the signal of
//! interest to baseband, complex-downsample to an intermediate rate,
//! band-limit to the scheme's bandwidth, run the scheme-specific
//! discriminator, downsample to an audio rate, then apply either stereo
//! separation + de-emphasis (WBFM) or de-emphasis/AGC (everything else).
//! [`Demodulator`] is the public orchestrator (§6's public surface);
//! [`SchemeCore`] is the closed per-scheme enum that does the actual DSP,
//! mirroring the `FilterKind` dispatch-once-per-block discipline from
//! `filter.rs`.

use crate::coeffs::low_pass_kernel;
use crate::config::{CW_BEAT_HZ, WBFM_INTERMEDIATE_RATE};
use crate::demod::{AmDemod, FmDemod, SsbDemod, StereoSeparator};
use crate::filter::{Agc, Emphasis, Filter, FilterKind, Fir, FreqShifter, PilotDetector};
use crate::mode::Mode;
use crate::resample::{ComplexDecimator, RealDecimator};

const ANTIALIAS_KERNEL_LEN: usize = 63;
const BANDLIMIT_KERNEL_LEN: usize = 127;
const AUDIO_KERNEL_LEN: usize = 63;

/// Demodulated audio block (spec.md §3): equal-length left/right arrays
/// (mono schemes set `left == right`), a stereo-lock flag, and an ordinal
/// SNR indicator.
#[derive(Clone, Debug, Default)]
pub struct AudioBlock {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub stereo: bool,
    pub snr: f32,
}

impl AudioBlock {
    fn mono(audio: Vec<f32>, snr: f32) -> Self {
        Self {
            right: audio.clone(),
            left: audio,
            stereo: false,
            snr,
        }
    }
}

/// Player sink contract (spec.md §6): out of this crate's scope to
/// implement (no wall-clock audio playback, per §1), but its surface is
/// specified here so a [`Demodulator`] can be driven against any
/// implementation, including a test double.
pub trait PlayerSink {
    fn sample_rate(&self) -> u32;
    fn play(&mut self, left: &[f32], right: &[f32]);
    fn set_volume(&mut self, v: f32);
    fn get_volume(&self) -> f32;
}

/// Events the demodulator emits (spec.md §4.9, §6).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DemodEvent {
    StereoStatus(bool),
}

fn decimation_ratio(input_rate: u32, target_rate: u32) -> usize {
    ((input_rate as f32 / target_rate as f32).round() as usize).max(1)
}

fn decimated_rate(input_rate: u32, ratio: usize) -> u32 {
    (input_rate as f32 / ratio as f32).round() as u32
}

fn power(i: &[f32], q: &[f32]) -> f32 {
    let n = i.len().max(1) as f32;
    let sum: f32 = i.iter().zip(q).map(|(a, b)| a * a + b * b).sum();
    sum / n
}

fn real_power(x: &[f32]) -> f32 {
    let n = x.len().max(1) as f32;
    x.iter().map(|a| a * a).sum::<f32>() / n
}

fn snr_ratio(in_band: f32, total: f32) -> f32 {
    if total > 1e-20 {
        (in_band / total).max(0.0)
    } else {
        0.0
    }
}

fn complex_lowpass(r: f32, cutoff: f32) -> (FilterKind, FilterKind) {
    let kernel = low_pass_kernel(r, cutoff, BANDLIMIT_KERNEL_LEN, 1.0);
    (
        FilterKind::Fir(Fir::new(kernel.clone())),
        FilterKind::Fir(Fir::new(kernel)),
    )
}

fn antialias_filter_factory(r: f32, cutoff: f32) -> impl FnMut() -> FilterKind {
    let kernel = low_pass_kernel(r, cutoff, ANTIALIAS_KERNEL_LEN, 1.0);
    move || FilterKind::Fir(Fir::new(kernel.clone()))
}

/// Wideband FM, with optional pilot-locked stereo (spec.md §4.7).
struct WbfmCore {
    intermediate_rate: u32,
    downsample: ComplexDecimator,
    bp_i: FilterKind,
    bp_q: FilterKind,
    fm: FmDemod,
    mpx_decimate: RealDecimator,
    mpx_rate: u32,
    pilot: PilotDetector,
    lowpass_l: FilterKind,
    lowpass_r: FilterKind,
    deemph_l: Emphasis,
    deemph_r: Emphasis,
    final_decimate_l: RealDecimator,
    final_decimate_r: RealDecimator,
    audio_rate: u32,
    deemphasis_tau: f32,
}

impl WbfmCore {
    fn new(input_rate: u32, audio_rate: u32, deemphasis_tau: f32) -> Self {
        let intermediate_rate = WBFM_INTERMEDIATE_RATE.min(input_rate.max(1));
        let ds_ratio = decimation_ratio(input_rate, intermediate_rate);
        let intermediate_rate = decimated_rate(input_rate, ds_ratio);
        let mut factory = antialias_filter_factory(input_rate as f32, intermediate_rate as f32 / 2.2);
        let downsample = ComplexDecimator::new(&mut factory, ds_ratio);

        let (bp_i, bp_q) = complex_lowpass(intermediate_rate as f32, 75_000.0);

        // MPX rate: enough headroom above the 53 kHz stereo multiplex
        // content (mono+pilot+38 kHz difference sideband).
        let mpx_target = 160_000u32.min(intermediate_rate.max(1));
        let mpx_ratio = decimation_ratio(intermediate_rate, mpx_target);
        let mpx_rate = decimated_rate(intermediate_rate, mpx_ratio);
        let mpx_kernel = low_pass_kernel(intermediate_rate as f32, mpx_rate as f32 / 2.2, ANTIALIAS_KERNEL_LEN, 1.0);
        let mpx_decimate = RealDecimator::new(FilterKind::Fir(Fir::new(mpx_kernel)), mpx_ratio);

        let pilot = PilotDetector::new(mpx_rate as f32, 19_000.0, 50.0);

        let audio_kernel = low_pass_kernel(mpx_rate as f32, 15_000.0, AUDIO_KERNEL_LEN, 1.0);
        let lowpass_l = FilterKind::Fir(Fir::new(audio_kernel.clone()));
        let lowpass_r = FilterKind::Fir(Fir::new(audio_kernel));

        let final_ratio = decimation_ratio(mpx_rate, audio_rate);
        let audio_rate = decimated_rate(mpx_rate, final_ratio);
        let final_kernel = low_pass_kernel(mpx_rate as f32, audio_rate as f32 / 2.2, AUDIO_KERNEL_LEN, 1.0);
        let final_decimate_l = RealDecimator::new(FilterKind::Fir(Fir::new(final_kernel.clone())), final_ratio);
        let final_decimate_r = RealDecimator::new(FilterKind::Fir(Fir::new(final_kernel)), final_ratio);

        Self {
            intermediate_rate,
            downsample,
            bp_i,
            bp_q,
            fm: FmDemod::new(75_000.0 / intermediate_rate as f32),
            mpx_decimate,
            mpx_rate,
            pilot,
            lowpass_l,
            lowpass_r,
            deemph_l: Emphasis::deemphasis(audio_rate as f32, deemphasis_tau),
            deemph_r: Emphasis::deemphasis(audio_rate as f32, deemphasis_tau),
            final_decimate_l,
            final_decimate_r,
            audio_rate,
            deemphasis_tau,
        }
    }

    fn audio_rate(&self) -> u32 {
        self.audio_rate
    }

    fn demodulate(&mut self, i: &[f32], q: &[f32], stereo_wanted: bool) -> AudioBlock {
        let mut scratch = Vec::new();
        let mut di = Vec::new();
        let mut dq = Vec::new();
        self.downsample.process(i, q, &mut scratch, &mut di, &mut dq);
        if di.is_empty() {
            return AudioBlock::mono(Vec::new(), 0.0);
        }

        let total = power(&di, &dq);
        self.bp_i.in_place(&mut di);
        self.bp_q.in_place(&mut dq);
        let in_band = power(&di, &dq);
        let snr = snr_ratio(in_band, total);

        let mut mpx = vec![0.0f32; di.len()];
        self.fm.demodulate(&di, &dq, &mut mpx);

        let mut mpx_dec = Vec::new();
        self.mpx_decimate.process(&mpx, &mut scratch, &mut mpx_dec);
        if mpx_dec.is_empty() {
            return AudioBlock::mono(Vec::new(), snr);
        }

        let zeros = vec![0.0f32; mpx_dec.len()];
        let mut pilot_cos = vec![0.0f32; mpx_dec.len()];
        let mut pilot_sin = vec![0.0f32; mpx_dec.len()];
        self.pilot.process(&mpx_dec, &zeros, &mut pilot_cos, &mut pilot_sin);
        let locked = stereo_wanted && self.pilot.locked();

        let (mut l, mut r) = if locked {
            let mut diff = vec![0.0f32; mpx_dec.len()];
            StereoSeparator::separate(&mpx_dec, &pilot_cos, &pilot_sin, &mut diff);
            let l: Vec<f32> = mpx_dec.iter().zip(&diff).map(|(m, d)| m + d).collect();
            let r: Vec<f32> = mpx_dec.iter().zip(&diff).map(|(m, d)| m - d).collect();
            (l, r)
        } else {
            (mpx_dec.clone(), mpx_dec)
        };

        self.lowpass_l.in_place(&mut l);
        self.lowpass_r.in_place(&mut r);
        self.deemph_l.in_place(&mut l);
        self.deemph_r.in_place(&mut r);

        let mut out_l = Vec::new();
        let mut out_r = Vec::new();
        let mut decim_scratch = Vec::new();
        self.final_decimate_l.process(&l, &mut decim_scratch, &mut out_l);
        self.final_decimate_r.process(&r, &mut decim_scratch, &mut out_r);

        AudioBlock {
            left: out_l,
            right: out_r,
            stereo: locked,
            snr,
        }
    }

    fn reset(&mut self) {
        self.downsample.reset();
        self.bp_i.reset();
        self.bp_q.reset();
        self.fm.reset();
        self.mpx_decimate.reset();
        self.pilot.reset();
        self.lowpass_l.reset();
        self.lowpass_r.reset();
        self.deemph_l.reset();
        self.deemph_r.reset();
        self.final_decimate_l.reset();
        self.final_decimate_r.reset();
    }

    fn set_deemphasis_tau(&mut self, tau: f32) {
        self.deemphasis_tau = tau;
        self.deemph_l = Emphasis::deemphasis(self.audio_rate as f32, tau);
        self.deemph_r = Emphasis::deemphasis(self.audio_rate as f32, tau);
    }
}

/// Shared mono pipeline body used by NBFM/AM/SSB/CW (spec.md §4.7): the
/// stage sequence is identical across these four schemes, only the
/// intermediate rate choice, bandlimit cutoff, and discriminator differ.
struct MonoCore {
    downsample: ComplexDecimator,
    bp_i: FilterKind,
    bp_q: FilterKind,
    discriminator: Discriminator,
    final_decimate: RealDecimator,
    post: PostProcess,
    audio_rate: u32,
}

enum Discriminator {
    Fm(FmDemod),
    Am(AmDemod),
    Ssb(SsbDemod),
    Cw,
}

enum PostProcess {
    Emphasis(Emphasis),
    Agc(Agc),
}

impl PostProcess {
    fn in_place(&mut self, buf: &mut [f32]) {
        match self {
            PostProcess::Emphasis(e) => e.in_place(buf),
            PostProcess::Agc(a) => a.in_place(buf),
        }
    }

    fn reset(&mut self) {
        match self {
            PostProcess::Emphasis(e) => e.reset(),
            PostProcess::Agc(a) => a.reset(),
        }
    }
}

impl MonoCore {
    fn nbfm(input_rate: u32, audio_rate: u32, max_f: f32) -> Self {
        let target_if = (max_f * 4.0).clamp(8_000.0, input_rate as f32);
        let ratio = decimation_ratio(input_rate, target_if as u32);
        let if_rate = decimated_rate(input_rate, ratio);
        let mut factory = antialias_filter_factory(input_rate as f32, if_rate as f32 / 2.2);
        let downsample = ComplexDecimator::new(&mut factory, ratio);
        let (bp_i, bp_q) = complex_lowpass(if_rate as f32, max_f);

        let final_ratio = decimation_ratio(if_rate, audio_rate);
        let audio_rate = decimated_rate(if_rate, final_ratio);
        let final_kernel = low_pass_kernel(if_rate as f32, audio_rate as f32 / 2.2, AUDIO_KERNEL_LEN, 1.0);
        let final_decimate = RealDecimator::new(FilterKind::Fir(Fir::new(final_kernel)), final_ratio);

        Self {
            downsample,
            bp_i,
            bp_q,
            discriminator: Discriminator::Fm(FmDemod::new(max_f / if_rate as f32)),
            final_decimate,
            post: PostProcess::Emphasis(Emphasis::deemphasis(audio_rate as f32, 50e-6)),
            audio_rate,
        }
    }

    fn am(input_rate: u32, audio_rate: u32, bandwidth: f32) -> Self {
        let target_if = (bandwidth * 4.0).clamp(8_000.0, input_rate as f32);
        let ratio = decimation_ratio(input_rate, target_if as u32);
        let if_rate = decimated_rate(input_rate, ratio);
        let mut factory = antialias_filter_factory(input_rate as f32, if_rate as f32 / 2.2);
        let downsample = ComplexDecimator::new(&mut factory, ratio);
        let (bp_i, bp_q) = complex_lowpass(if_rate as f32, bandwidth);

        let final_ratio = decimation_ratio(if_rate, audio_rate);
        let audio_rate = decimated_rate(if_rate, final_ratio);
        let final_kernel = low_pass_kernel(if_rate as f32, audio_rate as f32 / 2.2, AUDIO_KERNEL_LEN, 1.0);
        let final_decimate = RealDecimator::new(FilterKind::Fir(Fir::new(final_kernel)), final_ratio);

        Self {
            downsample,
            bp_i,
            bp_q,
            discriminator: Discriminator::Am(AmDemod::new(if_rate as f32)),
            final_decimate,
            post: PostProcess::Agc(Agc::new(audio_rate as f32, 50.0)),
            audio_rate,
        }
    }

    fn ssb(input_rate: u32, audio_rate: u32, bandwidth: f32, upper: bool) -> Self {
        let target_if = (bandwidth * 4.0).clamp(8_000.0, input_rate as f32);
        let ratio = decimation_ratio(input_rate, target_if as u32);
        let if_rate = decimated_rate(input_rate, ratio);
        let mut factory = antialias_filter_factory(input_rate as f32, if_rate as f32 / 2.2);
        let downsample = ComplexDecimator::new(&mut factory, ratio);
        // No pre-discriminator bandlimit for SSB: the Hilbert combiner
        // needs the full occupied image before rejecting the opposite
        // sideband; the low-pass that matters is post-discriminator, on
        // the real output (spec.md §4.7).
        let (bp_i, bp_q) = (
            FilterKind::Fir(Fir::new(vec![1.0])),
            FilterKind::Fir(Fir::new(vec![1.0])),
        );

        let final_ratio = decimation_ratio(if_rate, audio_rate);
        let audio_rate = decimated_rate(if_rate, final_ratio);
        let post_lowpass = low_pass_kernel(if_rate as f32, bandwidth, AUDIO_KERNEL_LEN, 1.0);
        let final_kernel_combined = post_lowpass; // bandwidth cutoff doubles as the anti-alias cutoff
        let final_decimate = RealDecimator::new(FilterKind::Fir(Fir::new(final_kernel_combined)), final_ratio);

        Self {
            downsample,
            bp_i,
            bp_q,
            discriminator: Discriminator::Ssb(SsbDemod::new(127, upper)),
            final_decimate,
            post: PostProcess::Agc(Agc::new(audio_rate as f32, 50.0)),
            audio_rate,
        }
    }

    fn cw(input_rate: u32, audio_rate: u32, bandwidth: f32) -> Self {
        let bandwidth = bandwidth.clamp(50.0, 1000.0);
        let target_if = (4_000.0f32).min(input_rate as f32);
        let ratio = decimation_ratio(input_rate, target_if as u32);
        let if_rate = decimated_rate(input_rate, ratio);
        let mut factory = antialias_filter_factory(input_rate as f32, if_rate as f32 / 2.2);
        let downsample = ComplexDecimator::new(&mut factory, ratio);
        let (bp_i, bp_q) = complex_lowpass(if_rate as f32, CW_BEAT_HZ + bandwidth);

        let final_ratio = decimation_ratio(if_rate, audio_rate);
        let audio_rate = decimated_rate(if_rate, final_ratio);
        // Bandpass-by-subtraction around the beat tone: a low-pass kernel
        // at the upper edge minus one at the lower edge.
        let n = AUDIO_KERNEL_LEN;
        let hi = low_pass_kernel(if_rate as f32, CW_BEAT_HZ + bandwidth / 2.0, n, 1.0);
        let lo = low_pass_kernel(if_rate as f32, (CW_BEAT_HZ - bandwidth / 2.0).max(1.0), n, 1.0);
        let bandpass: Vec<f32> = hi.iter().zip(&lo).map(|(h, l)| h - l).collect();
        let final_decimate = RealDecimator::new(FilterKind::Fir(Fir::new(bandpass)), final_ratio);

        Self {
            downsample,
            bp_i,
            bp_q,
            discriminator: Discriminator::Cw,
            final_decimate,
            post: PostProcess::Agc(Agc::new(audio_rate as f32, 50.0)),
            audio_rate,
        }
    }

    fn audio_rate(&self) -> u32 {
        self.audio_rate
    }

    fn demodulate(&mut self, i: &[f32], q: &[f32]) -> AudioBlock {
        let mut scratch = Vec::new();
        let mut di = Vec::new();
        let mut dq = Vec::new();
        self.downsample.process(i, q, &mut scratch, &mut di, &mut dq);
        if di.is_empty() {
            return AudioBlock::mono(Vec::new(), 0.0);
        }

        let total = power(&di, &dq);
        self.bp_i.in_place(&mut di);
        self.bp_q.in_place(&mut dq);
        let in_band = power(&di, &dq);
        let snr = snr_ratio(in_band, total);

        let mut audio = vec![0.0f32; di.len()];
        match &mut self.discriminator {
            Discriminator::Fm(d) => d.demodulate(&di, &dq, &mut audio),
            Discriminator::Am(d) => d.demodulate(&di, &dq, &mut audio),
            Discriminator::Ssb(d) => d.demodulate(&di, &dq, &mut audio),
            Discriminator::Cw => audio.copy_from_slice(&di),
        }

        let mut out = Vec::new();
        let mut decim_scratch = Vec::new();
        self.final_decimate.process(&audio, &mut decim_scratch, &mut out);
        self.post.in_place(&mut out);

        AudioBlock::mono(out, snr)
    }

    fn reset(&mut self) {
        self.downsample.reset();
        self.bp_i.reset();
        self.bp_q.reset();
        match &mut self.discriminator {
            Discriminator::Fm(d) => d.reset(),
            Discriminator::Am(d) => d.reset(),
            Discriminator::Ssb(d) => d.reset(),
            Discriminator::Cw => {}
        }
        self.final_decimate.reset();
        self.post.reset();
    }
}

enum SchemeCore {
    Wbfm(WbfmCore),
    Mono(MonoCore),
}

/// Orchestrates one tuned scheme: frequency shift, the scheme's core, and
/// the public surface from spec.md §6.
pub struct Demodulator {
    input_rate: u32,
    audio_rate_target: u32,
    mode: Mode,
    frequency_offset: f32,
    pending_retune: Option<(i64, f32)>,
    volume: f32,
    /// SNR threshold below which a block's audio is muted (spec.md §3:
    /// "squelch is stored alongside the demodulator state, not inside the
    /// mode"); `0.0` (the default) never squelches, since `snr_ratio` is
    /// clamped to `[0, ...)`.
    squelch: f32,
    shifter: FreqShifter,
    core: SchemeCore,
    event_handler: Option<Box<dyn FnMut(DemodEvent)>>,
    last_stereo: bool,
}

impl Demodulator {
    pub fn new(input_rate: u32, audio_rate_target: u32, mode: Mode) -> Self {
        let core = Self::build_core(input_rate, audio_rate_target, mode);
        Self {
            input_rate,
            audio_rate_target,
            mode,
            frequency_offset: 0.0,
            pending_retune: None,
            volume: 1.0,
            squelch: 0.0,
            shifter: FreqShifter::new(input_rate as f32, 0.0),
            core,
            event_handler: None,
            last_stereo: false,
        }
    }

    fn build_core(input_rate: u32, audio_rate_target: u32, mode: Mode) -> SchemeCore {
        match mode {
            Mode::Wbfm { .. } => SchemeCore::Wbfm(WbfmCore::new(input_rate, audio_rate_target, 50e-6)),
            Mode::Nbfm { max_f } => SchemeCore::Mono(MonoCore::nbfm(input_rate, audio_rate_target, max_f)),
            Mode::Am { bandwidth } => SchemeCore::Mono(MonoCore::am(input_rate, audio_rate_target, bandwidth)),
            Mode::Ssb { bandwidth, upper } => {
                SchemeCore::Mono(MonoCore::ssb(input_rate, audio_rate_target, bandwidth, upper))
            }
            Mode::Cw { bandwidth } => SchemeCore::Mono(MonoCore::cw(input_rate, audio_rate_target, bandwidth)),
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.core = Self::build_core(self.input_rate, self.audio_rate_target, mode);
        self.last_stereo = false;
    }

    pub fn get_mode(&self) -> Mode {
        self.mode
    }

    pub fn set_volume(&mut self, v: f32) {
        self.volume = v.clamp(0.0, 1.0);
    }

    pub fn get_volume(&self) -> f32 {
        self.volume
    }

    /// Sets the SNR threshold below which a block's audio is muted (the
    /// block's `snr` and `stereo` fields are still reported, only the
    /// `left`/`right` samples are zeroed). `0.0` disables squelch.
    pub fn set_squelch(&mut self, threshold: f32) {
        self.squelch = threshold.max(0.0);
    }

    pub fn get_squelch(&self) -> f32 {
        self.squelch
    }

    pub fn set_frequency_offset(&mut self, hz: f32) {
        self.frequency_offset = hz;
        self.pending_retune = None;
    }

    pub fn get_frequency_offset(&self) -> f32 {
        self.frequency_offset
    }

    /// Defers applying `new_offset_hz` until a block whose `frequency`
    /// field equals `new_center_hz` arrives, for glitch-free retuning
    /// across a center-frequency change (spec.md §6).
    pub fn expect_frequency_and_set_offset(&mut self, new_center_hz: i64, new_offset_hz: f32) {
        self.pending_retune = Some((new_center_hz, new_offset_hz));
    }

    pub fn set_event_handler(&mut self, handler: impl FnMut(DemodEvent) + 'static) {
        self.event_handler = Some(Box::new(handler));
    }

    pub fn audio_rate(&self) -> u32 {
        match &self.core {
            SchemeCore::Wbfm(c) => c.audio_rate(),
            SchemeCore::Mono(c) => c.audio_rate(),
        }
    }

    /// Demodulates one I/Q block tuned at `center_freq`. Applies a pending
    /// glitch-free retune if `center_freq` matches its expectation, shifts
    /// by `-frequency_offset` (CW instead shifts to land the carrier on
    /// its beat tone), runs the scheme core, scales by volume, and emits
    /// `stereo-status` on a WBFM lock-state change.
    pub fn demodulate(&mut self, i: &[f32], q: &[f32], center_freq: i64) -> AudioBlock {
        if let Some((expected, new_offset)) = self.pending_retune {
            if expected == center_freq {
                self.frequency_offset = new_offset;
                self.pending_retune = None;
            }
        }

        let shift_target = match self.mode {
            Mode::Cw { .. } => CW_BEAT_HZ - self.frequency_offset,
            _ => -self.frequency_offset,
        };
        self.shifter.set_frequency(shift_target);
        let mut si = i.to_vec();
        let mut sq = q.to_vec();
        self.shifter.shift(&mut si, &mut sq);

        let mut block = match &mut self.core {
            SchemeCore::Wbfm(c) => {
                let stereo_wanted = matches!(self.mode, Mode::Wbfm { stereo: true });
                c.demodulate(&si, &sq, stereo_wanted)
            }
            SchemeCore::Mono(c) => c.demodulate(&si, &sq),
        };

        let gain = if block.snr < self.squelch { 0.0 } else { self.volume };
        for x in block.left.iter_mut() {
            *x *= gain;
        }
        for x in block.right.iter_mut() {
            *x *= gain;
        }

        if block.stereo != self.last_stereo {
            self.last_stereo = block.stereo;
            if let Some(handler) = self.event_handler.as_mut() {
                handler(DemodEvent::StereoStatus(block.stereo));
            }
        }

        block
    }

    pub fn reset(&mut self) {
        self.shifter.reset();
        match &mut self.core {
            SchemeCore::Wbfm(c) => c.reset(),
            SchemeCore::Mono(c) => c.reset(),
        }
    }

    /// Overrides WBFM's de-emphasis time constant (spec.md §4.7: 50 us
    /// default, 75 us for US/Korea). No-op on other schemes.
    pub fn set_deemphasis_tau(&mut self, tau: f32) {
        if let SchemeCore::Wbfm(c) = &mut self.core {
            c.set_deemphasis_tau(tau);
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
    fn am_pipeline_recovers_tone() {
        let r = 2_000_000u32;
        let mut demod = Demodulator::new(r, 48_000, Mode::Am { bandwidth: 5_000.0 });
        let n = 200_000;
        let carrier_amp = 0.1f32;
        let tone_freq = 600.0f32;
        let mod_index = 0.5f32;
        let mut i = vec![0.0f32; n];
        let mut q = vec![0.0f32; n];
        for k in 0..n {
            let t = k as f32 / r as f32;
            let env = carrier_amp * (1.0 + mod_index * (2.0 * PI * tone_freq * t).sin());
            let carrier_phase = 2.0 * PI * 0.0 * t;
            i[k] = env * carrier_phase.cos();
            q[k] = env * carrier_phase.sin();
        }
        let block = demod.demodulate(&i, &q, 0);
        assert!(!block.left.is_empty());
        let audio_rate = demod.audio_rate() as f32;
        let settle = block.left.len() / 4;
        let (freq, mag) = fft_peak(&block.left[settle..], audio_rate);
        assert!((freq - tone_freq).abs() < 50.0, "freq {freq}");
        assert!(mag > 0.05, "mag {mag}");
    }

    #[test]
    fn nbfm_pipeline_recovers_tone() {
        let r = 200_000u32;
        let mut demod = Demodulator::new(r, 48_000, Mode::Nbfm { max_f: 5_000.0 });
        let n = 100_000;
        let tone_freq = 1_000.0f32;
        let dev = 4_000.0f32;
        let mut i = vec![0.0f32; n];
        let mut q = vec![0.0f32; n];
        let mut phase = 0.0f32;
        for k in 0..n {
            let t = k as f32 / r as f32;
            i[k] = 0.2 * phase.cos();
            q[k] = 0.2 * phase.sin();
            phase += 2.0 * PI * dev * (2.0 * PI * tone_freq * t).sin() / r as f32;
        }
        let block = demod.demodulate(&i, &q, 0);
        assert!(!block.left.is_empty());
        let audio_rate = demod.audio_rate() as f32;
        let settle = block.left.len() / 4;
        let (freq, mag) = fft_peak(&block.left[settle..], audio_rate);
        assert!((freq - tone_freq).abs() < 80.0, "freq {freq}");
        assert!(mag > 0.05, "mag {mag}");
    }

    #[test]
    fn ssb_usb_rejects_lower_sideband_tone() {
        let r = 500_000u32;
        let mut demod = Demodulator::new(r, 48_000, Mode::Ssb { bandwidth: 3_000.0, upper: true });
        let n = 100_000;
        let tone = -1500.0f32;
        let mut i = vec![0.0f32; n];
        let mut q = vec![0.0f32; n];
        for k in 0..n {
            let t = k as f32 / r as f32;
            i[k] = 0.5 * (2.0 * PI * tone * t).cos();
            q[k] = 0.5 * (2.0 * PI * tone * t).sin();
        }
        let block = demod.demodulate(&i, &q, 0);
        let tail = &block.left[block.left.len() / 2..];
        let rms: f32 = (tail.iter().map(|x| x * x).sum::<f32>() / tail.len().max(1) as f32).sqrt();
        assert!(rms < 0.2, "rms {rms}");
    }

    #[test]
    fn cw_beats_at_600hz_when_on_frequency() {
        let r = 200_000u32;
        let mut demod = Demodulator::new(r, 48_000, Mode::Cw { bandwidth: 200.0 });
        let n = 60_000;
        let mut i = vec![0.0f32; n];
        let mut q = vec![0.0f32; n];
        for k in 0..n {
            let t = k as f32 / r as f32;
            i[k] = 0.3 * (2.0 * PI * 0.0 * t).cos();
            q[k] = 0.3 * (2.0 * PI * 0.0 * t).sin();
        }
        let block = demod.demodulate(&i, &q, 0);
        assert!(!block.left.is_empty());
        let audio_rate = demod.audio_rate() as f32;
        let (freq, _mag) = fft_peak(&block.left[block.left.len() / 4..], audio_rate);
        assert!((freq - CW_BEAT_HZ).abs() < 60.0, "freq {freq}");
    }

    #[test]
    fn expect_frequency_defers_offset_until_matching_block() {
        let mut demod = Demodulator::new(48_000, 48_000, Mode::Am { bandwidth: 5_000.0 });
        demod.set_frequency_offset(100.0);
        demod.expect_frequency_and_set_offset(1_000_000, 200.0);
        assert_eq!(demod.get_frequency_offset(), 100.0);
        let zeros = vec![0.0f32; 256];
        demod.demodulate(&zeros, &zeros, 999_999);
        assert_eq!(demod.get_frequency_offset(), 100.0, "non-matching block must not retune");
        demod.demodulate(&zeros, &zeros, 1_000_000);
        assert_eq!(demod.get_frequency_offset(), 200.0, "matching block retunes");
    }

    #[test]
    fn squelch_mutes_audio_below_threshold_but_keeps_snr_and_stereo() {
        let mut demod = Demodulator::new(48_000, 48_000, Mode::Am { bandwidth: 5_000.0 });
        demod.set_squelch(10.0); // no real signal will ever clear this
        assert_eq!(demod.get_squelch(), 10.0);
        let n = 4096;
        let mut i = vec![0.0f32; n];
        let q = vec![0.0f32; n];
        for (k, x) in i.iter_mut().enumerate() {
            *x = 0.2 + 0.05 * (k as f32 * 0.1).sin();
        }
        let block = demod.demodulate(&i, &q, 0);
        assert!(block.left.iter().all(|&x| x == 0.0), "audio must be muted under squelch");
        assert!(block.snr >= 0.0, "snr is still reported while squelched");
    }

    #[test]
    fn volume_scales_output() {
        let mut demod = Demodulator::new(48_000, 48_000, Mode::Am { bandwidth: 5_000.0 });
        demod.set_volume(0.0);
        assert_eq!(demod.get_volume(), 0.0);
        let n = 4096;
        let mut i = vec![0.0f32; n];
        let q = vec![0.0f32; n];
        for (k, x) in i.iter_mut().enumerate() {
            *x = 0.2 + 0.05 * (k as f32 * 0.1).sin();
        }
        let block = demod.demodulate(&i, &q, 0);
        assert!(block.left.iter().all(|&x| x == 0.0));
    }
}
