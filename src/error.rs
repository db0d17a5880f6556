//! Typed errors for the control plane (spec.md §7, SPEC_FULL.md §11).
//!
//! The DSP kernel (buffers, FFT, filters, demodulator primitives) never
//! returns `Result` — it is infallible by construction, guarded at the
//! `sqrt`/divide call sites that would otherwise produce NaN or infinity.
//! Only the signal-source contract, the mode registry, and the radio state
//! machine signal failure through these typed values.

use thiserror::Error;

/// Errors a [`crate::source::SignalSource`] may return (spec.md §4.8, §7).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// A pending read was rejected because the source was closed or the
    /// radio stopped while the read was outstanding.
    #[error("transfer canceled")]
    TransferCanceled,

    /// The pending-read ring was already at capacity when another read was
    /// requested.
    #[error("too many simultaneous reads")]
    TooManyReads,

    /// Any other source failure (device error, I/O failure, etc.), carried
    /// as a message since the concrete source implementation is outside
    /// this crate's scope (spec.md §1).
    #[error("source failure: {0}")]
    Failure(String),
}

/// Errors from the radio state machine (spec.md §4.9, §7).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RadioError {
    /// A source-level failure, wrapped so the radio's command executor can
    /// distinguish "source misbehaved" from "caller misused the state
    /// machine".
    #[error(transparent)]
    Source(#[from] SourceError),

    /// `start` was requested while already `PLAYING`.
    #[error("radio is already playing")]
    AlreadyPlaying,

    /// `stop`, `set_frequency`, or `set_parameter` that requires an active
    /// source was requested while `OFF`.
    #[error("radio is not playing")]
    NotPlaying,
}
