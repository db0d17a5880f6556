//! Programmatic configuration surface (SPEC_FULL.md §12).
//!
//! This crate has no configuration file, CLI, or persisted state (spec.md
//! §6) — everything here is a plain constructor argument or a `Default`
//! impl a caller may override before building a [`crate::radio::Radio`].

/// Fallback sample rate used where a component has not yet been told its
/// real operating rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// WBFM's first-stage intermediate rate (spec.md §4.7): wide enough to
/// keep the 200 kHz-spaced FM channel and its pilot/stereo subcarrier
/// comfortably inside Nyquist before the final audio-rate downsample.
pub const WBFM_INTERMEDIATE_RATE: u32 = 336_000;

/// Default audio output rate handed to schemes that don't need a wide
/// intermediate stage (NBFM/AM/SSB/CW).
pub const DEFAULT_AUDIO_RATE: u32 = 48_000;

/// Default FM broadcast de-emphasis time constant, 50 microseconds
/// (Europe/most of the world; US and Korea use 75 us, spec.md §4.7).
pub const DEEMPHASIS_TAU_50US: f32 = 50e-6;
pub const DEEMPHASIS_TAU_75US: f32 = 75e-6;

/// CW's fixed beat tone, spec.md §4.7.
pub const CW_BEAT_HZ: f32 = 600.0;

/// Default FM max deviation used when a caller doesn't override NBFM's
/// `maxF` bandwidth/2 derivation at construction.
pub const DEFAULT_NBFM_BANDWIDTH_HZ: f32 = 12_500.0;

/// Radio control-plane tuning knobs (spec.md §4.9).
#[derive(Clone, Copy, Debug)]
pub struct RadioConfig {
    /// Target number of sample-receiver callbacks per second; determines
    /// `samples_per_buf` together with the source's sample rate.
    pub buffers_per_second: u32,
    /// Number of read transfers kept in flight concurrently
    /// (`PARALLEL_BUFFERS` in spec.md §4.9; default 2).
    pub parallel_buffers: usize,
    /// Capacity of the pending-read ring shared with the active source
    /// (spec.md §4.8; default 8). `Radio` never constructs a source itself
    /// (that's `SignalSourceProvider::get()`'s job per spec.md §1); a
    /// provider backed by [`crate::source::PacingSource`] or
    /// [`crate::source::PushSource`] passes this value as their
    /// `pending_capacity` constructor argument.
    pub pending_read_capacity: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            buffers_per_second: 20,
            parallel_buffers: 2,
            pending_read_capacity: 8,
        }
    }
}

impl RadioConfig {
    /// `samples_per_buf` per spec.md §4.9: `512 * ceil(sample_rate /
    /// (buffers_per_second * 512))`, rounded to 512-sample multiples.
    pub fn samples_per_buf(&self, sample_rate: u32) -> usize {
        let target = (self.buffers_per_second as u64) * 512;
        let blocks = (sample_rate as u64 + target - 1) / target;
        (blocks.max(1) * 512) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_per_buf_rounds_to_512_multiples() {
        let cfg = RadioConfig::default();
        let n = cfg.samples_per_buf(250_000);
        assert_eq!(n % 512, 0);
        assert!(n > 0);
    }

    #[test]
    fn samples_per_buf_matches_worked_example() {
        let cfg = RadioConfig::default();
        // 20 buffers/sec * 512 = 10240; 1_000_000 / 10240 = 97.65... -> 98 blocks.
        let n = cfg.samples_per_buf(1_000_000);
        assert_eq!(n, 98 * 512);
    }
}
