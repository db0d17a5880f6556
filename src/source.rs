//! Signal-source contract and pacing (spec.md §2 row I, §4.8, §6).
//!
//! `SignalSource` is the pull-based contract the radio drives: set rate and
//! frequency, start, then issue possibly-several in-flight `read_samples`
//! calls that resolve in FIFO order (spec.md §5 ordering rule ii). Two
//! implementations ship with the core: [`PacingSource`], which turns an
//! offline sample generator into a wall-clock-paced stream, and
//! [`PushSource`], which lets an external producer hand samples in as they
//! arrive. Both share [`PendingReadRing`], the fixed-capacity FIFO of
//! outstanding read promises from spec.md §4.8/§4.1.
//!
//! Grounded on `wkmp-ap`'s `Arc<Mutex<..>>`/`Arc<RwLock<..>>` shared-state
//! idiom (`playback/engine/core.rs`) for the interior mutability a
//! multi-in-flight-read source needs, and on its `tokio::sync::{mpsc,
//! oneshot}` usage for the pending-read completions.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::SourceError;

/// An untyped parameter value a source may accept (spec.md §3).
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

/// One I/Q block (spec.md §3): equal-length I/Q arrays, the center
/// frequency that was tuned when they were produced, and optional opaque
/// side-channel data. Receivers must not retain references beyond their
/// callback.
#[derive(Clone, Debug, Default)]
pub struct IqBlock {
    pub i: Vec<f32>,
    pub q: Vec<f32>,
    pub frequency: i64,
    pub data: Option<Vec<u8>>,
}

impl IqBlock {
    pub fn new(i: Vec<f32>, q: Vec<f32>, frequency: i64) -> Self {
        assert_eq!(i.len(), q.len(), "I and Q must have equal length");
        Self { i, q, frequency, data: None }
    }

    pub fn len(&self) -> usize {
        self.i.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i.is_empty()
    }
}

/// The pull-based signal-source contract (spec.md §4.8, §6). All methods
/// may fail with [`SourceError::TransferCanceled`] once the source has been
/// closed. `Sync` because the radio shares one source across its
/// concurrent in-flight read-transfer loops (spec.md §4.9).
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn set_sample_rate(&self, rate: u32) -> Result<u32, SourceError>;
    async fn set_center_frequency(&self, freq: i64) -> Result<i64, SourceError>;
    /// Returns the value the source actually adopted, or `None` for an
    /// unrecognized key (spec.md §3, §7).
    async fn set_parameter(&self, key: &str, value: ParamValue) -> Result<Option<ParamValue>, SourceError>;
    async fn start_receiving(&self) -> Result<(), SourceError>;
    async fn read_samples(&self, n: usize) -> Result<IqBlock, SourceError>;
    async fn close(&self);
}

/// `SignalSourceProvider::get()` returns a freshly initialized source per
/// radio start (spec.md §6).
#[async_trait]
pub trait SignalSourceProvider: Send + Sync {
    async fn get(&self) -> Arc<dyn SignalSource>;
}

/// Fixed-capacity FIFO of outstanding read promises (spec.md §3, §4.1,
/// §4.8). `add` enqueues a completion handle; `resolve` pops the oldest
/// entry and sends it a value; `cancel` rejects every entry with
/// [`SourceError::TransferCanceled`].
#[derive(Default)]
pub struct PendingReadRing {
    capacity: usize,
    entries: VecDeque<(usize, oneshot::Sender<Result<IqBlock, SourceError>>)>,
}

impl PendingReadRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enqueues a pending read of `n` samples, returning the receiver half
    /// of its completion. Fails synchronously with `TooManyReads` if the
    /// ring is already at capacity.
    pub fn add(&mut self, n: usize) -> Result<oneshot::Receiver<Result<IqBlock, SourceError>>, SourceError> {
        if self.entries.len() >= self.capacity {
            return Err(SourceError::TooManyReads);
        }
        let (tx, rx) = oneshot::channel();
        self.entries.push_back((n, tx));
        Ok(rx)
    }

    /// The requested length of the oldest pending entry, if any.
    pub fn front_len(&self) -> Option<usize> {
        self.entries.front().map(|(n, _)| *n)
    }

    /// Resolves the oldest pending entry with `block`, in FIFO order
    /// (spec.md §5 ordering rule ii). No-op if the ring is empty.
    pub fn resolve(&mut self, block: IqBlock) {
        if let Some((_, tx)) = self.entries.pop_front() {
            let _ = tx.send(Ok(block));
        }
    }

    /// Rejects every pending entry with `TransferCanceled` (spec.md §4.8,
    /// §7: `close` cancels all pending reads).
    pub fn cancel(&mut self) {
        while let Some((_, tx)) = self.entries.pop_front() {
            let _ = tx.send(Err(SourceError::TransferCanceled));
        }
    }
}

struct PacingInner {
    sample_rate: u32,
    center_frequency: i64,
    parameters: HashMap<String, ParamValue>,
    ring_i: crate::buffer::RingBuffer,
    ring_q: crate::buffer::RingBuffer,
    pending: PendingReadRing,
    t0: Option<Instant>,
    /// Virtual stream position of the oldest sample still in the ring.
    first_sample_in_buffer: u64,
    cur_sample: u64,
    closed: bool,
}

/// Wraps an offline sample generator (any function that can produce
/// arbitrary sample counts instantaneously) and paces it to wall time
/// (spec.md §4.8). Ring capacity is `max(65536, sample_rate/10)`.
///
/// Driven by [`PacingSource::tick`], called on every wall-clock frame
/// (spec.md §9: "any periodic monotonic-time tick with sub-frame
/// resolution suffices"); this crate takes no dependency on a particular
/// timer/event-loop implementation beyond `tokio::time`, which the caller
/// is free to drive from an interval, a `select!` loop, or a UI frame
/// callback.
pub struct PacingSource {
    generator: Mutex<Box<dyn FnMut(usize) -> (Vec<f32>, Vec<f32>) + Send>>,
    inner: Mutex<PacingInner>,
}

impl PacingSource {
    /// `pending_capacity` sizes the pending-read ring (spec.md §4.8;
    /// `RadioConfig::pending_read_capacity`, default 8).
    pub fn new(
        sample_rate: u32,
        generator: Box<dyn FnMut(usize) -> (Vec<f32>, Vec<f32>) + Send>,
        pending_capacity: usize,
    ) -> Self {
        let ring_cap = (sample_rate as usize / 10).max(65_536);
        Self {
            generator: Mutex::new(generator),
            inner: Mutex::new(PacingInner {
                sample_rate,
                center_frequency: 0,
                parameters: HashMap::new(),
                ring_i: crate::buffer::RingBuffer::new(ring_cap),
                ring_q: crate::buffer::RingBuffer::new(ring_cap),
                pending: PendingReadRing::new(pending_capacity),
                t0: None,
                first_sample_in_buffer: 0,
                cur_sample: 0,
                closed: false,
            }),
        }
    }

    /// Advances the virtual stream position from wall time and services
    /// the pending-read ring (spec.md §4.8's three-step tick body).
    pub async fn tick(&self) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        let t0 = *inner.t0.get_or_insert_with(Instant::now);
        let elapsed_ms = Instant::now().duration_since(t0).as_millis() as u64;
        inner.cur_sample = elapsed_ms * inner.sample_rate as u64 / 1000;

        let ring_cap = inner.ring_i.capacity();
        if inner.pending.is_empty() {
            let available = inner.ring_i.available();
            let want = ring_cap.saturating_sub(available);
            if want > 0 {
                drop(inner);
                self.fill(want).await;
                inner = self.inner.lock().await;
            }
        }

        loop {
            let Some(requested) = inner.pending.front_len() else { break };
            let produced_so_far = inner.cur_sample.saturating_sub(inner.first_sample_in_buffer);
            if (requested as u64) > produced_so_far {
                break;
            }
            if inner.ring_i.available() < requested {
                // Demand outran the ring: refill mid-drain and accept the
                // resulting jitter (spec.md §4.8 open question).
                warn!(requested, available = inner.ring_i.available(), "pacing source refilling mid-drain");
                let need = requested - inner.ring_i.available();
                drop(inner);
                self.fill(need).await;
                inner = self.inner.lock().await;
            }
            let mut i = vec![0.0f32; requested];
            let mut q = vec![0.0f32; requested];
            inner.ring_i.move_to(&mut i);
            inner.ring_q.move_to(&mut q);
            inner.first_sample_in_buffer += requested as u64;
            let freq = inner.center_frequency;
            debug!(requested, "pacing source resolved a pending read");
            inner.pending.resolve(IqBlock::new(i, q, freq));
        }
    }

    async fn fill(&self, n: usize) {
        let (i, q) = {
            let mut gen = self.generator.lock().await;
            (gen)(n)
        };
        let mut inner = self.inner.lock().await;
        inner.ring_i.store(&i);
        inner.ring_q.store(&q);
    }
}

#[async_trait]
impl SignalSource for PacingSource {
    async fn set_sample_rate(&self, rate: u32) -> Result<u32, SourceError> {
        let mut inner = self.inner.lock().await;
        inner.sample_rate = rate;
        Ok(rate)
    }

    async fn set_center_frequency(&self, freq: i64) -> Result<i64, SourceError> {
        let mut inner = self.inner.lock().await;
        inner.center_frequency = freq;
        Ok(freq)
    }

    async fn set_parameter(&self, key: &str, value: ParamValue) -> Result<Option<ParamValue>, SourceError> {
        let mut inner = self.inner.lock().await;
        inner.parameters.insert(key.to_string(), value.clone());
        Ok(Some(value))
    }

    async fn start_receiving(&self) -> Result<(), SourceError> {
        let mut inner = self.inner.lock().await;
        inner.t0 = Some(Instant::now());
        inner.cur_sample = 0;
        inner.first_sample_in_buffer = 0;
        Ok(())
    }

    async fn read_samples(&self, n: usize) -> Result<IqBlock, SourceError> {
        let rx = {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(SourceError::TransferCanceled);
            }
            inner.pending.add(n)?
        };
        rx.await.unwrap_or(Err(SourceError::TransferCanceled))
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        inner.pending.cancel();
    }
}

struct PushInner {
    sample_rate: u32,
    center_frequency: i64,
    parameters: HashMap<String, ParamValue>,
    ring_i: crate::buffer::RingBuffer,
    ring_q: crate::buffer::RingBuffer,
    stored_freq: i64,
    pending: PendingReadRing,
    closed: bool,
}

/// Source driven by an external producer calling [`PushSource::push_samples`]
/// (spec.md §4.8). Resolves pending reads first from its internal ring,
/// then from freshly pushed data; any leftover is stored for the next
/// read. If no reads are pending when samples are pushed, they are simply
/// stored.
pub struct PushSource {
    inner: Mutex<PushInner>,
}

impl PushSource {
    /// `pending_capacity` sizes the pending-read ring (spec.md §4.8;
    /// `RadioConfig::pending_read_capacity`, default 8).
    pub fn new(sample_rate: u32, ring_capacity: usize, pending_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PushInner {
                sample_rate,
                center_frequency: 0,
                parameters: HashMap::new(),
                ring_i: crate::buffer::RingBuffer::new(ring_capacity),
                ring_q: crate::buffer::RingBuffer::new(ring_capacity),
                stored_freq: 0,
                pending: PendingReadRing::new(pending_capacity),
                closed: false,
            }),
        }
    }

    pub async fn push_samples(&self, i: &[f32], q: &[f32], freq: Option<i64>) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        inner.ring_i.store(i);
        inner.ring_q.store(q);
        if let Some(f) = freq {
            inner.stored_freq = f;
        }
        loop {
            let Some(requested) = inner.pending.front_len() else { break };
            if inner.ring_i.unconsumed() < requested {
                break;
            }
            let mut oi = vec![0.0f32; requested];
            let mut oq = vec![0.0f32; requested];
            inner.ring_i.move_to(&mut oi);
            inner.ring_q.move_to(&mut oq);
            let freq = inner.stored_freq;
            inner.pending.resolve(IqBlock::new(oi, oq, freq));
        }
    }
}

#[async_trait]
impl SignalSource for PushSource {
    async fn set_sample_rate(&self, rate: u32) -> Result<u32, SourceError> {
        let mut inner = self.inner.lock().await;
        inner.sample_rate = rate;
        Ok(rate)
    }

    async fn set_center_frequency(&self, freq: i64) -> Result<i64, SourceError> {
        let mut inner = self.inner.lock().await;
        inner.center_frequency = freq;
        inner.stored_freq = freq;
        Ok(freq)
    }

    async fn set_parameter(&self, key: &str, value: ParamValue) -> Result<Option<ParamValue>, SourceError> {
        let mut inner = self.inner.lock().await;
        inner.parameters.insert(key.to_string(), value.clone());
        Ok(Some(value))
    }

    async fn start_receiving(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn read_samples(&self, n: usize) -> Result<IqBlock, SourceError> {
        let rx = {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(SourceError::TransferCanceled);
            }
            // Try to satisfy immediately from already-stored data before
            // queuing, so a read that arrives after data was pushed with
            // no reads pending doesn't wait for the next push.
            if inner.ring_i.unconsumed() >= n && inner.pending.is_empty() {
                let mut oi = vec![0.0f32; n];
                let mut oq = vec![0.0f32; n];
                inner.ring_i.move_to(&mut oi);
                inner.ring_q.move_to(&mut oq);
                let freq = inner.stored_freq;
                return Ok(IqBlock::new(oi, oq, freq));
            }
            inner.pending.add(n)?
        };
        rx.await.unwrap_or(Err(SourceError::TransferCanceled))
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        inner.pending.cancel();
    }
}
