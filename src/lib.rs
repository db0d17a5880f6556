//! Real-time software-defined-radio demodulation.
//!
//! Given a stream of complex (I/Q) baseband samples at an arbitrary sample
//! rate, this crate demodulates WBFM (with 19 kHz pilot stereo), NBFM, AM,
//! SSB (USB/LSB), and CW, producing a stream of audio at a lower target
//! rate plus a per-block signal-to-noise indicator. A frequency-domain
//! spectrum utility runs over the same sample stream.
//!
//! The crate is organized in three layers:
//!
//! - **DSP kernel** ([`buffer`], [`math`], [`fft`], [`coeffs`], [`filter`],
//!   [`demod`], [`resample`]): synchronous, allocation-avoiding, `f32`
//!   single-precision primitives with no knowledge of the control plane.
//! - **Demodulation** ([`mode`], [`pipeline`]): wires the kernel primitives
//!   into the five scheme pipelines behind one [`pipeline::Demodulator`]
//!   entry point, selected and reconfigured through [`mode::Mode`].
//! - **Control plane** ([`source`], [`receiver`], [`radio`], [`error`],
//!   [`config`]): the async signal-source contract, sample-receiver fanout,
//!   and the [`radio::Radio`] state machine that drives them, all built on
//!   `tokio`.
//!
//! This is a library: it has no CLI, no configuration file format, and no
//! bundled signal-source device drivers. Callers supply a
//! [`source::SignalSourceProvider`] and a [`receiver::SampleReceiver`] (most
//! commonly a [`pipeline::Demodulator`] via [`receiver::DemodulatorReceiver`])
//! and drive a [`radio::Radio`] around them.

pub mod buffer;
pub mod coeffs;
pub mod config;
pub mod demod;
pub mod error;
pub mod fft;
pub mod filter;
pub mod math;
pub mod mode;
pub mod pipeline;
pub mod radio;
pub mod receiver;
pub mod resample;
pub mod source;

pub use config::RadioConfig;
pub use error::{RadioError, SourceError};
pub use mode::{Mode, ModeParams, ModeRegistry, Scheme};
pub use pipeline::{AudioBlock, DemodEvent, Demodulator, PlayerSink};
pub use radio::{Radio, RadioEvent};
pub use receiver::{CompositeReceiver, DemodulatorReceiver, SampleCounter, SampleReceiver, SpectrumReceiver};
pub use source::{IqBlock, ParamValue, PacingSource, PendingReadRing, PushSource, SignalSource, SignalSourceProvider};
