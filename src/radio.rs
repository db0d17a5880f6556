//! The radio state machine (spec.md §2 row J, §4.9, §6).
//!
//! `Radio` owns a [`crate::source::SignalSourceProvider`], a
//! [`crate::receiver::SampleReceiver`], and a [`crate::config::RadioConfig`].
//! Commands (`start`, `stop`, `set_frequency`, `set_parameter`,
//! `set_sample_rate`) are serialized through a single-consumer executor task
//! so each command fully completes, including every awaited call into the
//! source, before the next begins (spec.md §5 ordering rule i).
//!
//! Grounded on `wkmp-ap`'s `mpsc::unbounded_channel` command-queue pattern
//! (`playback/engine/core.rs`) for the single-consumer executor, and on
//! `wkmp-common`'s `broadcast`-based event distribution (`events.rs`,
//! `sse_broadcaster.rs`) for [`RadioEvent`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{error, info, warn};

use crate::config::RadioConfig;
use crate::error::{RadioError, SourceError};
use crate::receiver::SampleReceiver;
use crate::source::{ParamValue, SignalSource, SignalSourceProvider};

/// Events the radio emits (spec.md §4.9, §6).
#[derive(Clone, Debug)]
pub enum RadioEvent {
    Started,
    Stopped,
    Error(String),
}

enum Command {
    Start(oneshot::Sender<Result<(), RadioError>>),
    Stop(oneshot::Sender<Result<(), RadioError>>),
    SetFrequency(i64, oneshot::Sender<Result<(), RadioError>>),
    SetParameter(String, ParamValue, oneshot::Sender<Result<(), RadioError>>),
    SetSampleRate(u32, oneshot::Sender<Result<(), RadioError>>),
    /// Fire-and-forget: a transfer loop hit a source failure and the
    /// executor must downgrade to OFF (spec.md §4.9).
    SourceFailed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Off,
    Playing,
}

/// The radio control plane. Cloning a handle is cheap; every clone shares
/// the same executor task and state.
pub struct Radio {
    tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<RadioEvent>,
}

impl Radio {
    /// Spawns the command executor task and returns a handle. `receiver` is
    /// driven from the two in-flight read-transfer loops once `start` is
    /// called.
    pub fn new(
        provider: Arc<dyn SignalSourceProvider>,
        receiver: Arc<Mutex<dyn SampleReceiver>>,
        config: RadioConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(32);
        let executor = Executor {
            provider,
            receiver,
            config,
            state: State::Off,
            sample_rate: crate::config::DEFAULT_SAMPLE_RATE,
            center_frequency: 0,
            parameters: HashMap::new(),
            source: None,
            buffers_wanted: Arc::new(Mutex::new(0)),
            events: events_tx.clone(),
            self_tx: tx.clone(),
        };
        tokio::spawn(executor.run(rx));
        Self { tx, events: events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: impl FnOnce(oneshot::Sender<Result<(), RadioError>>) -> Command) -> Result<(), RadioError> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(command(tx)).is_err() {
            return Err(RadioError::Source(SourceError::Failure("radio executor is gone".into())));
        }
        rx.await.unwrap_or(Err(RadioError::Source(SourceError::Failure("radio executor dropped the reply".into()))))
    }

    pub async fn start(&self) -> Result<(), RadioError> {
        self.send(Command::Start).await
    }

    pub async fn stop(&self) -> Result<(), RadioError> {
        self.send(Command::Stop).await
    }

    pub async fn set_frequency(&self, freq: i64) -> Result<(), RadioError> {
        self.send(|tx| Command::SetFrequency(freq, tx)).await
    }

    pub async fn set_parameter(&self, key: impl Into<String>, value: ParamValue) -> Result<(), RadioError> {
        let key = key.into();
        self.send(move |tx| Command::SetParameter(key, value, tx)).await
    }

    pub async fn set_sample_rate(&self, rate: u32) -> Result<(), RadioError> {
        self.send(|tx| Command::SetSampleRate(rate, tx)).await
    }
}

/// Lives inside the spawned executor task; never shared, so its fields need
/// no locking of their own beyond what multiple in-flight transfer loops
/// require (`source`, `buffers_wanted`).
struct Executor {
    provider: Arc<dyn SignalSourceProvider>,
    receiver: Arc<Mutex<dyn SampleReceiver>>,
    config: RadioConfig,
    state: State,
    sample_rate: u32,
    center_frequency: i64,
    parameters: HashMap<String, ParamValue>,
    source: Option<Arc<dyn SignalSource>>,
    /// Shared with the transfer loops so `stop` can signal them to drain
    /// (spec.md §4.9: "set `buffers_wanted = 0`, await both transfer loops
    /// draining").
    buffers_wanted: Arc<Mutex<usize>>,
    events: broadcast::Sender<RadioEvent>,
    /// Lets a spawned transfer loop report a source failure back to the
    /// executor that owns the state machine.
    self_tx: mpsc::UnboundedSender<Command>,
}

impl Executor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Start(reply) => {
                    let result = self.handle_start().await;
                    let _ = reply.send(result);
                }
                Command::Stop(reply) => {
                    let result = self.handle_stop().await;
                    let _ = reply.send(result);
                }
                Command::SetFrequency(freq, reply) => {
                    let result = self.handle_set_frequency(freq).await;
                    let _ = reply.send(result);
                }
                Command::SetParameter(key, value, reply) => {
                    let result = self.handle_set_parameter(key, value).await;
                    let _ = reply.send(result);
                }
                Command::SetSampleRate(rate, reply) => {
                    let result = self.handle_set_sample_rate(rate).await;
                    let _ = reply.send(result);
                }
                Command::SourceFailed(message) => {
                    self.handle_source_failed(message).await;
                }
            }
        }
    }

    /// A transfer loop hit a source failure: downgrade to OFF (spec.md
    /// §4.9). Idempotent against a `stop` that already raced it to OFF.
    async fn handle_source_failed(&mut self, message: String) {
        if self.state != State::Playing {
            return;
        }
        *self.buffers_wanted.lock().await = 0;
        if let Some(source) = self.source.take() {
            source.close().await;
        }
        self.state = State::Off;
        self.events.send(RadioEvent::Error(message)).ok();
        warn!("radio downgraded to OFF after a source failure");
    }

    async fn handle_start(&mut self) -> Result<(), RadioError> {
        if self.state == State::Playing {
            return Err(RadioError::AlreadyPlaying);
        }
        let source = self.provider.get().await;
        if let Err(e) = self.apply_source_state(&source).await {
            self.events.send(RadioEvent::Error(e.to_string())).ok();
            return Err(RadioError::Source(e));
        }
        if let Err(e) = source.start_receiving().await {
            self.events.send(RadioEvent::Error(e.to_string())).ok();
            return Err(RadioError::Source(e));
        }

        self.source = Some(source.clone());
        self.state = State::Playing;
        *self.buffers_wanted.lock().await = self.config.parallel_buffers;

        self.receiver.lock().await.set_sample_rate(self.sample_rate);

        for _ in 0..self.config.parallel_buffers {
            let source = source.clone();
            let receiver = self.receiver.clone();
            let buffers_wanted = self.buffers_wanted.clone();
            let samples_per_buf = self.config.samples_per_buf(self.sample_rate);
            let self_tx = self.self_tx.clone();
            tokio::spawn(transfer_loop(source, receiver, buffers_wanted, samples_per_buf, self_tx));
        }

        self.events.send(RadioEvent::Started).ok();
        info!(sample_rate = self.sample_rate, center_frequency = self.center_frequency, "radio started");
        Ok(())
    }

    async fn apply_source_state(&self, source: &Arc<dyn SignalSource>) -> Result<(), SourceError> {
        source.set_sample_rate(self.sample_rate).await?;
        source.set_center_frequency(self.center_frequency).await?;
        for (key, value) in &self.parameters {
            source.set_parameter(key, value.clone()).await?;
        }
        Ok(())
    }

    async fn handle_stop(&mut self) -> Result<(), RadioError> {
        if self.state != State::Playing {
            return Err(RadioError::NotPlaying);
        }
        *self.buffers_wanted.lock().await = 0;
        if let Some(source) = self.source.take() {
            source.close().await;
        }
        self.state = State::Off;
        self.events.send(RadioEvent::Stopped).ok();
        info!("radio stopped");
        Ok(())
    }

    async fn handle_set_frequency(&mut self, freq: i64) -> Result<(), RadioError> {
        self.center_frequency = freq;
        if let Some(source) = &self.source {
            if let Err(e) = source.set_center_frequency(freq).await {
                self.events.send(RadioEvent::Error(e.to_string())).ok();
                warn!(error = %e, "set_center_frequency failed; radio stays playing");
                return Err(RadioError::Source(e));
            }
        }
        Ok(())
    }

    async fn handle_set_parameter(&mut self, key: String, value: ParamValue) -> Result<(), RadioError> {
        self.parameters.insert(key.clone(), value.clone());
        if let Some(source) = &self.source {
            if let Err(e) = source.set_parameter(&key, value).await {
                self.events.send(RadioEvent::Error(e.to_string())).ok();
                warn!(error = %e, key, "set_parameter failed; radio stays playing");
                return Err(RadioError::Source(e));
            }
        }
        Ok(())
    }

    async fn handle_set_sample_rate(&mut self, rate: u32) -> Result<(), RadioError> {
        // Only effective on next `start` (spec.md §4.9).
        self.sample_rate = rate;
        Ok(())
    }
}

/// One of the `PARALLEL_BUFFERS` concurrent read-transfer loops (spec.md
/// §4.9). Runs until `buffers_wanted` drops to zero (drained by `stop`) or
/// the source reports a failure, in which case it reports the failure back
/// to the executor (via `self_tx`) so the radio can downgrade to OFF, and
/// exits.
async fn transfer_loop(
    source: Arc<dyn SignalSource>,
    receiver: Arc<Mutex<dyn SampleReceiver>>,
    buffers_wanted: Arc<Mutex<usize>>,
    samples_per_buf: usize,
    self_tx: mpsc::UnboundedSender<Command>,
) {
    loop {
        if *buffers_wanted.lock().await == 0 {
            return;
        }
        match source.read_samples(samples_per_buf).await {
            Ok(block) => {
                receiver.lock().await.receive(&block.i, &block.q, block.frequency, block.data.as_deref());
            }
            Err(SourceError::TransferCanceled) => {
                return;
            }
            Err(e) => {
                error!(error = %e, "source failed during read; transfer loop exiting");
                let _ = self_tx.send(Command::SourceFailed(e.to_string()));
                *buffers_wanted.lock().await = 0;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex as TokioMutex;

    use crate::source::IqBlock;

    struct MockSource {
        calls: Arc<TokioMutex<Vec<String>>>,
    }

    #[async_trait]
    impl SignalSource for MockSource {
        async fn set_sample_rate(&self, rate: u32) -> Result<u32, SourceError> {
            self.calls.lock().await.push(format!("set_sample_rate({rate})"));
            Ok(rate)
        }

        async fn set_center_frequency(&self, freq: i64) -> Result<i64, SourceError> {
            self.calls.lock().await.push(format!("set_center_frequency({freq})"));
            Ok(freq)
        }

        async fn set_parameter(&self, key: &str, value: ParamValue) -> Result<Option<ParamValue>, SourceError> {
            self.calls.lock().await.push(format!("set_parameter({key})"));
            Ok(Some(value))
        }

        async fn start_receiving(&self) -> Result<(), SourceError> {
            self.calls.lock().await.push("start_receiving".to_string());
            Ok(())
        }

        async fn read_samples(&self, n: usize) -> Result<IqBlock, SourceError> {
            Ok(IqBlock::new(vec![0.0; n], vec![0.0; n], 0))
        }

        async fn close(&self) {
            self.calls.lock().await.push("close".to_string());
        }
    }

    struct MockProvider {
        calls: Arc<TokioMutex<Vec<String>>>,
    }

    #[async_trait]
    impl SignalSourceProvider for MockProvider {
        async fn get(&self) -> Arc<dyn SignalSource> {
            Arc::new(MockSource { calls: self.calls.clone() })
        }
    }

    struct NullReceiver;
    impl SampleReceiver for NullReceiver {
        fn set_sample_rate(&mut self, _rate: u32) {}
        fn receive(&mut self, _i: &[f32], _q: &[f32], _frequency: i64, _data: Option<&[u8]>) {}
    }

    #[tokio::test]
    async fn start_applies_frequency_before_parameter_when_issued_in_that_order() {
        let calls = Arc::new(TokioMutex::new(Vec::new()));
        let provider = Arc::new(MockProvider { calls: calls.clone() });
        let receiver = Arc::new(Mutex::new(NullReceiver));
        let radio = Radio::new(provider, receiver, RadioConfig::default());

        radio.set_frequency(99_000_000).await.unwrap();
        radio.set_parameter("squelch", ParamValue::Bool(true)).await.unwrap();
        radio.start().await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let log = calls.lock().await;
        let freq_pos = log.iter().position(|c| c == "set_center_frequency(99000000)").unwrap();
        let start_pos = log.iter().position(|c| c == "start_receiving").unwrap();
        assert!(freq_pos < start_pos);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let calls = Arc::new(TokioMutex::new(Vec::new()));
        let provider = Arc::new(MockProvider { calls });
        let receiver = Arc::new(Mutex::new(NullReceiver));
        let radio = Radio::new(provider, receiver, RadioConfig::default());

        radio.start().await.unwrap();
        let second = radio.start().await;
        assert!(matches!(second, Err(RadioError::AlreadyPlaying)));
    }

    #[tokio::test]
    async fn stop_without_start_is_rejected() {
        let calls = Arc::new(TokioMutex::new(Vec::new()));
        let provider = Arc::new(MockProvider { calls });
        let receiver = Arc::new(Mutex::new(NullReceiver));
        let radio = Radio::new(provider, receiver, RadioConfig::default());

        let result = radio.stop().await;
        assert!(matches!(result, Err(RadioError::NotPlaying)));
    }

    #[tokio::test]
    async fn stop_closes_the_source() {
        let calls = Arc::new(TokioMutex::new(Vec::new()));
        let provider = Arc::new(MockProvider { calls: calls.clone() });
        let receiver = Arc::new(Mutex::new(NullReceiver));
        let radio = Radio::new(provider, receiver, RadioConfig::default());

        radio.start().await.unwrap();
        radio.stop().await.unwrap();
        let log = calls.lock().await;
        assert!(log.iter().any(|c| c == "close"));
    }

    #[tokio::test]
    async fn started_event_is_broadcast() {
        let calls = Arc::new(TokioMutex::new(Vec::new()));
        let provider = Arc::new(MockProvider { calls });
        let receiver = Arc::new(Mutex::new(NullReceiver));
        let radio = Radio::new(provider, receiver, RadioConfig::default());
        let mut events = radio.subscribe();

        radio.start().await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, RadioEvent::Started));
    }
}
