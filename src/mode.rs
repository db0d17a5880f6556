//! Mode registry and capability-uniform parameters (spec.md §3, §4.7, §6).
//!
//! `Mode` is the tagged variant describing which demodulation scheme is
//! tuned and the scheme-specific knob that's stored inside the mode (per
//! spec.md §3, squelch lives beside the demodulator, not inside `Mode`).
//! `ModeParams` is the capability-uniform accessor surface from spec.md
//! §4.7's closing paragraph: every scheme implements the same
//! `{has_bandwidth, has_stereo, has_squelch}` triple so a caller (a UI, or
//! this crate's own tests) can drive any scheme without matching on it.
//!
//! Grounded on the tagged-enum-with-uniform-accessor pattern `WkmpEvent`
//! uses in `wkmp-common/src/events.rs` (one enum, `event_type()` giving a
//! uniform view across variants), generalized here from an event enum to a
//! configuration enum.

use std::collections::HashMap;

/// Which scheme a [`Mode`] selects, independent of its parameters. Used as
/// the registry key (spec.md §6, `get_mode(scheme)`, `get_schemes()`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    Wbfm,
    Nbfm,
    Am,
    Ssb,
    Cw,
}

impl Scheme {
    pub fn all() -> [Scheme; 5] {
        [Scheme::Wbfm, Scheme::Nbfm, Scheme::Am, Scheme::Ssb, Scheme::Cw]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Wbfm => "WBFM",
            Scheme::Nbfm => "NBFM",
            Scheme::Am => "AM",
            Scheme::Ssb => "SSB",
            Scheme::Cw => "CW",
        }
    }
}

/// Demodulation mode, tagged by scheme (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mode {
    Wbfm { stereo: bool },
    Nbfm { max_f: f32 },
    Am { bandwidth: f32 },
    Ssb { bandwidth: f32, upper: bool },
    Cw { bandwidth: f32 },
}

impl Mode {
    pub fn scheme(&self) -> Scheme {
        match self {
            Mode::Wbfm { .. } => Scheme::Wbfm,
            Mode::Nbfm { .. } => Scheme::Nbfm,
            Mode::Am { .. } => Scheme::Am,
            Mode::Ssb { .. } => Scheme::Ssb,
            Mode::Cw { .. } => Scheme::Cw,
        }
    }

    /// Capability-uniform view onto this mode's parameters (spec.md §4.7).
    pub fn params(&self) -> ModeParams {
        match *self {
            Mode::Wbfm { stereo } => ModeParams {
                scheme: Scheme::Wbfm,
                bandwidth: Some(150_000.0),
                has_bandwidth: false, // fixed per spec.md §4.7, not user-adjustable
                stereo: Some(stereo),
                has_stereo: true,
                has_squelch: true,
                upper: None,
            },
            Mode::Nbfm { max_f } => ModeParams {
                scheme: Scheme::Nbfm,
                bandwidth: Some(max_f * 2.0),
                has_bandwidth: true,
                stereo: None,
                has_stereo: false,
                has_squelch: true,
                upper: None,
            },
            Mode::Am { bandwidth } => ModeParams {
                scheme: Scheme::Am,
                bandwidth: Some(bandwidth),
                has_bandwidth: true,
                stereo: None,
                has_stereo: false,
                has_squelch: true,
                upper: None,
            },
            Mode::Ssb { bandwidth, upper } => ModeParams {
                scheme: Scheme::Ssb,
                bandwidth: Some(bandwidth),
                has_bandwidth: true,
                stereo: None,
                has_stereo: false,
                has_squelch: true,
                upper: Some(upper),
            },
            Mode::Cw { bandwidth } => ModeParams {
                scheme: Scheme::Cw,
                bandwidth: Some(bandwidth),
                has_bandwidth: true,
                stereo: None,
                has_stereo: false,
                has_squelch: true,
                upper: None,
            },
        }
    }

    /// Sets bandwidth where the scheme supports it; no-ops on WBFM (fixed
    /// at 150 kHz per spec.md §4.7). For NBFM, `bandwidth` is halved to
    /// derive `max_f` per the spec's stated relationship.
    pub fn set_bandwidth(&mut self, bandwidth: f32) {
        match self {
            Mode::Wbfm { .. } => {}
            Mode::Nbfm { max_f } => *max_f = bandwidth / 2.0,
            Mode::Am { bandwidth: bw } => *bw = bandwidth,
            Mode::Ssb { bandwidth: bw, .. } => *bw = bandwidth,
            Mode::Cw { bandwidth: bw } => *bw = bandwidth.clamp(50.0, 1000.0),
        }
    }

    /// Sets the stereo flag; no-op on every scheme but WBFM.
    pub fn set_stereo(&mut self, stereo: bool) {
        if let Mode::Wbfm { stereo: s } = self {
            *s = stereo;
        }
    }

    /// Sets the sideband; no-op on every scheme but SSB.
    pub fn set_upper(&mut self, upper: bool) {
        if let Mode::Ssb { upper: u, .. } = self {
            *u = upper;
        }
    }
}

/// Capability-uniform snapshot of a [`Mode`]'s parameters (spec.md §4.7).
/// Getters that don't apply to a scheme return `None`/`false`; setters on
/// `Mode` no-op for schemes lacking the capability instead of erroring, so
/// a single UI surface can drive every scheme.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModeParams {
    pub scheme: Scheme,
    pub bandwidth: Option<f32>,
    pub has_bandwidth: bool,
    pub stereo: Option<bool>,
    pub has_stereo: bool,
    pub has_squelch: bool,
    pub upper: Option<bool>,
}

/// Factory for a scheme's default [`Mode`] plus demodulator construction
/// parameters. The registry itself is generic over the demodulator type a
/// caller wants constructed, so the DSP crate doesn't need to know about
/// whatever wraps it (a radio, a test harness, a UI preview).
pub struct ModeRegistry<D> {
    factories: HashMap<Scheme, (Mode, Box<dyn Fn(Mode) -> D>)>,
}

impl<D> Default for ModeRegistry<D> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<D> ModeRegistry<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a scheme with its default mode and a factory that builds
    /// a demodulator (`D`) from any mode of that scheme (spec.md §6).
    pub fn register(&mut self, scheme: Scheme, default_mode: Mode, factory: impl Fn(Mode) -> D + 'static) {
        assert_eq!(default_mode.scheme(), scheme, "default mode must match scheme");
        self.factories.insert(scheme, (default_mode, Box::new(factory)));
    }

    /// The default mode registered for `scheme`, if any.
    pub fn get_mode(&self, scheme: Scheme) -> Option<Mode> {
        self.factories.get(&scheme).map(|(mode, _)| *mode)
    }

    /// All registered schemes.
    pub fn get_schemes(&self) -> Vec<Scheme> {
        self.factories.keys().copied().collect()
    }

    /// Builds a demodulator instance for `mode` using the registered
    /// factory for its scheme.
    pub fn build(&self, mode: Mode) -> Option<D> {
        self.factories.get(&mode.scheme()).map(|(_, f)| f(mode))
    }

    /// The capability-uniform view for a scheme's default mode, or for an
    /// arbitrary mode directly (spec.md §6's `mode_parameters`).
    pub fn mode_parameters(&self, scheme: Scheme) -> Option<ModeParams> {
        self.get_mode(scheme).map(|m| m.params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wbfm_bandwidth_is_fixed_and_not_user_settable() {
        let mut m = Mode::Wbfm { stereo: false };
        m.set_bandwidth(5000.0);
        assert_eq!(m.params().bandwidth, Some(150_000.0));
        assert!(!m.params().has_bandwidth);
    }

    #[test]
    fn nbfm_bandwidth_is_twice_max_deviation() {
        let m = Mode::Nbfm { max_f: 5_000.0 };
        assert_eq!(m.params().bandwidth, Some(10_000.0));
    }

    #[test]
    fn setters_noop_on_schemes_without_the_capability() {
        let mut m = Mode::Am { bandwidth: 5000.0 };
        m.set_stereo(true);
        m.set_upper(true);
        assert_eq!(m.params().stereo, None);
        assert_eq!(m.params().upper, None);
    }

    #[test]
    fn registry_round_trips_default_mode_and_build() {
        let mut reg: ModeRegistry<Mode> = ModeRegistry::new();
        reg.register(Scheme::Am, Mode::Am { bandwidth: 5000.0 }, |m| m);
        assert_eq!(reg.get_mode(Scheme::Am), Some(Mode::Am { bandwidth: 5000.0 }));
        assert_eq!(reg.get_schemes(), vec![Scheme::Am]);
        let built = reg.build(Mode::Am { bandwidth: 8000.0 }).unwrap();
        assert_eq!(built, Mode::Am { bandwidth: 8000.0 });
    }
}
