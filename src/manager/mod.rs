//! Single-owner device manager.
//!
//! The manager owns both instrument handles inside one loop task and is the only
//! code that ever touches them. Clients hold a [`DeviceManager`] and talk to the
//! loop over per-target request channels; replies come back on per-request
//! oneshot channels. Each loop iteration serves at most one generator request,
//! otherwise one scope request, otherwise (when unpaused) polls the scope
//! trigger and reads one capture, then sleeps for the poll interval.
//!
//! Captures go out on a bounded broadcast channel. A consumer that falls behind
//! loses the oldest captures, never the newest, and sees the loss as a
//! `QueueOverflow` error; the loop itself never blocks on a slow consumer.
//!
//! Request failures are answered to the caller and logged. Nothing a client can
//! send will terminate the loop; only `stop` does that, after which every
//! further request fails with `ManagerNotRunning`.

pub mod request;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::error::{DaqError, DaqResult};
use crate::instrument::{
    lookup_readable, lookup_writable, method_table, AttributeId, AttributeValue, Instrument,
    MethodId, Target, Waveform,
};
use crate::regulator::{AmplitudeRegulator, AmplitudeState};

pub use request::InstrumentRequest;

/// Configuration for the [`DeviceManager`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Deadline for one request round trip.
    #[serde(with = "humantime_serde")]
    pub rpc_deadline: Duration,
    /// Idle sleep between loop iterations.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Capacity of the bounded output sample channel.
    pub sample_channel_capacity: usize,
    /// How long `stop` waits for the loop to exit before aborting it.
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,
    /// Run the amplitude regulator inside the acquisition loop.
    pub auto_regulate: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            rpc_deadline: Duration::from_secs(2),
            poll_interval: Duration::from_millis(1),
            sample_channel_capacity: 64,
            stop_timeout: Duration::from_secs(2),
            auto_regulate: false,
        }
    }
}

/// Point-in-time scope readout for display refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeStatus {
    pub instrument_name: String,
    pub analog_sample_rate: f64,
    pub record_length: i64,
    pub triggered: bool,
}

/// Point-in-time generator readout for display refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratorStatus {
    pub instrument_name: String,
    pub frequency: f64,
    pub amplitude: f64,
    pub output_on: bool,
}

/// Control flags shared between client handles and the loop task.
struct ControlFlags {
    paused: AtomicBool,
    stopped: AtomicBool,
    auto_regulate: AtomicBool,
}

impl ControlFlags {
    fn new(auto_regulate: bool) -> Self {
        Self {
            // Acquisition starts paused; resume() opens the tap.
            paused: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            auto_regulate: AtomicBool::new(auto_regulate),
        }
    }
}

fn float_of(target: Target, attribute: AttributeId, value: AttributeValue) -> DaqResult<f64> {
    let text = value.to_string();
    value.as_f64().ok_or_else(|| DaqError::TypeCoercion {
        target,
        attribute: attribute.name().to_string(),
        expected: "float",
        value: text,
    })
}

fn int_of(target: Target, attribute: AttributeId, value: AttributeValue) -> DaqResult<i64> {
    let text = value.to_string();
    value.as_i64().ok_or_else(|| DaqError::TypeCoercion {
        target,
        attribute: attribute.name().to_string(),
        expected: "int",
        value: text,
    })
}

fn bool_of(target: Target, attribute: AttributeId, value: AttributeValue) -> DaqResult<bool> {
    let text = value.to_string();
    value.as_bool().ok_or_else(|| DaqError::TypeCoercion {
        target,
        attribute: attribute.name().to_string(),
        expected: "bool",
        value: text,
    })
}

fn text_of(target: Target, attribute: AttributeId, value: AttributeValue) -> DaqResult<String> {
    let text = value.to_string();
    value.as_string().ok_or_else(|| DaqError::TypeCoercion {
        target,
        attribute: attribute.name().to_string(),
        expected: "text",
        value: text,
    })
}

async fn probe_identity(target: Target, instrument: &mut dyn Instrument) -> DaqResult<String> {
    match instrument.get(AttributeId::InstrumentName).await {
        Ok(value) => Ok(value
            .as_string()
            .unwrap_or_else(|| instrument.id().to_string())),
        Err(e) => Err(DaqError::Connection {
            target,
            reason: e.to_string(),
        }),
    }
}

/// Client handle to the device-manager loop.
///
/// The handle is deliberately not `Clone`: whoever holds it owns the session.
/// It can be shared behind an `Arc` if several tasks need read access, but
/// `stop` requires exclusive ownership.
pub struct DeviceManager {
    scope_tx: mpsc::Sender<InstrumentRequest>,
    generator_tx: mpsc::Sender<InstrumentRequest>,
    sample_tx: broadcast::Sender<Arc<Waveform>>,
    flags: Arc<ControlFlags>,
    task: Option<JoinHandle<()>>,
    rpc_deadline: Duration,
    stop_timeout: Duration,
    has_generator: bool,
}

impl DeviceManager {
    /// Verifies both instrument links and spawns the acquisition loop.
    ///
    /// The generator is optional; without one, generator requests fail with a
    /// `Connection` error while scope acquisition runs normally. A handle that
    /// cannot report its identity makes construction fail, since nothing else
    /// would work either.
    pub async fn connect(
        mut scope: Box<dyn Instrument>,
        mut generator: Option<Box<dyn Instrument>>,
        settings: &Settings,
    ) -> DaqResult<Self> {
        settings.validate()?;

        let scope_name = probe_identity(Target::Scope, scope.as_mut()).await?;
        info!("Connected to scope '{}'", scope_name);
        if let Some(generator) = generator.as_mut() {
            let generator_name = probe_identity(Target::Generator, generator.as_mut()).await?;
            info!("Connected to generator '{}'", generator_name);
        }
        let has_generator = generator.is_some();

        let flags = Arc::new(ControlFlags::new(settings.manager.auto_regulate));
        let (scope_tx, scope_rx) = mpsc::channel(1);
        let (generator_tx, generator_rx) = mpsc::channel(1);
        let (sample_tx, _) = broadcast::channel(settings.manager.sample_channel_capacity);

        let manager_loop = ManagerLoop {
            scope,
            generator,
            scope_rx,
            generator_rx,
            sample_tx: sample_tx.clone(),
            flags: flags.clone(),
            poll_interval: settings.manager.poll_interval,
            regulator: AmplitudeRegulator::new(settings.regulator.clone()),
            drive: None,
            sequence: 0,
        };
        let task = tokio::spawn(manager_loop.run());

        Ok(Self {
            scope_tx,
            generator_tx,
            sample_tx,
            flags,
            task: Some(task),
            rpc_deadline: settings.manager.rpc_deadline,
            stop_timeout: settings.manager.stop_timeout,
            has_generator,
        })
    }

    /// Whether a generator handle was attached at construction.
    pub fn has_generator(&self) -> bool {
        self.has_generator
    }

    /// Whether the loop has not been stopped.
    pub fn is_running(&self) -> bool {
        !self.flags.stopped.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    /// Suspends capture draining. Requests keep being served. Idempotent.
    pub fn pause(&self) {
        if !self.flags.paused.swap(true, Ordering::SeqCst) {
            info!("Acquisition paused");
        }
    }

    /// Resumes capture draining. Idempotent.
    pub fn resume(&self) {
        if self.flags.paused.swap(false, Ordering::SeqCst) {
            info!("Acquisition resumed");
        }
    }

    /// Flips the pause flag; returns `true` when the loop is now paused.
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.flags.paused.fetch_xor(true, Ordering::SeqCst);
        info!(
            "Acquisition {}",
            if paused { "paused" } else { "resumed" }
        );
        paused
    }

    /// Turns in-loop amplitude regulation on or off.
    pub fn set_auto_regulate(&self, enabled: bool) {
        if self.flags.auto_regulate.swap(enabled, Ordering::SeqCst) != enabled {
            info!(
                "In-loop amplitude regulation {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }

    pub fn auto_regulate_enabled(&self) -> bool {
        self.flags.auto_regulate.load(Ordering::SeqCst)
    }

    /// Opens a subscription to the bounded capture channel. Captures published
    /// before the subscription are not replayed.
    pub fn subscribe(&self) -> SampleSubscriber {
        SampleSubscriber {
            rx: self.sample_tx.subscribe(),
        }
    }

    /// Reads one attribute from the targeted instrument.
    pub async fn get_attribute(
        &self,
        target: Target,
        attribute: AttributeId,
    ) -> DaqResult<AttributeValue> {
        let (request, rx) = InstrumentRequest::get(attribute);
        self.dispatch(target, attribute.name(), request, rx).await
    }

    /// Writes one attribute on the targeted instrument. The value is coerced to
    /// the attribute's declared kind before the driver sees it.
    pub async fn set_attribute(
        &self,
        target: Target,
        attribute: AttributeId,
        value: AttributeValue,
    ) -> DaqResult<()> {
        let (request, rx) = InstrumentRequest::set(attribute, value);
        self.dispatch(target, attribute.name(), request, rx).await
    }

    /// Invokes a named method on the targeted instrument.
    pub async fn call_method(
        &self,
        target: Target,
        method: MethodId,
        args: Vec<AttributeValue>,
    ) -> DaqResult<AttributeValue> {
        let (request, rx) = InstrumentRequest::call(method, args);
        self.dispatch(target, method.name(), request, rx).await
    }

    /// Assembles the scope display values in one pass.
    pub async fn scope_status(&self) -> DaqResult<ScopeStatus> {
        let value = self
            .get_attribute(Target::Scope, AttributeId::InstrumentName)
            .await?;
        let instrument_name = text_of(Target::Scope, AttributeId::InstrumentName, value)?;
        let value = self
            .get_attribute(Target::Scope, AttributeId::AnalogSampleRate)
            .await?;
        let analog_sample_rate = float_of(Target::Scope, AttributeId::AnalogSampleRate, value)?;
        let value = self
            .get_attribute(Target::Scope, AttributeId::RecordLength)
            .await?;
        let record_length = int_of(Target::Scope, AttributeId::RecordLength, value)?;
        let value = self
            .get_attribute(Target::Scope, AttributeId::Triggered)
            .await?;
        let triggered = bool_of(Target::Scope, AttributeId::Triggered, value)?;
        Ok(ScopeStatus {
            instrument_name,
            analog_sample_rate,
            record_length,
            triggered,
        })
    }

    /// Assembles the generator display values in one pass.
    pub async fn generator_status(&self) -> DaqResult<GeneratorStatus> {
        let value = self
            .get_attribute(Target::Generator, AttributeId::InstrumentName)
            .await?;
        let instrument_name = text_of(Target::Generator, AttributeId::InstrumentName, value)?;
        let value = self
            .get_attribute(Target::Generator, AttributeId::Frequency)
            .await?;
        let frequency = float_of(Target::Generator, AttributeId::Frequency, value)?;
        let value = self
            .get_attribute(Target::Generator, AttributeId::Amplitude)
            .await?;
        let amplitude = float_of(Target::Generator, AttributeId::Amplitude, value)?;
        let value = self
            .get_attribute(Target::Generator, AttributeId::State)
            .await?;
        let output_on = bool_of(Target::Generator, AttributeId::State, value)?;
        Ok(GeneratorStatus {
            instrument_name,
            frequency,
            amplitude,
            output_on,
        })
    }

    /// Stops the loop and closes both instrument handles.
    ///
    /// Waits up to the configured stop timeout for a graceful exit, then aborts
    /// the loop task. Safe to call more than once; every request issued after
    /// the first call fails with `ManagerNotRunning`.
    pub async fn stop(&mut self) -> DaqResult<()> {
        self.flags.stopped.store(true, Ordering::SeqCst);
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.stop_timeout, &mut task).await {
            Ok(Ok(())) => {
                info!("Device manager stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Device manager task panicked during shutdown: {}", e);
                Ok(())
            }
            Err(_) => {
                warn!(
                    "Device manager did not stop within {:?}, aborting the loop",
                    self.stop_timeout
                );
                task.abort();
                Err(DaqError::ShutdownTimeout(self.stop_timeout))
            }
        }
    }

    fn sender_for(&self, target: Target) -> &mpsc::Sender<InstrumentRequest> {
        match target {
            Target::Scope => &self.scope_tx,
            Target::Generator => &self.generator_tx,
        }
    }

    async fn dispatch<T>(
        &self,
        target: Target,
        operation: &str,
        request: InstrumentRequest,
        rx: oneshot::Receiver<DaqResult<T>>,
    ) -> DaqResult<T> {
        if !self.is_running() {
            return Err(DaqError::ManagerNotRunning);
        }
        let sender = self.sender_for(target).clone();
        let exchange = async move {
            if sender.send(request).await.is_err() {
                return Err(DaqError::ManagerNotRunning);
            }
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(DaqError::ManagerNotRunning),
            }
        };
        match tokio::time::timeout(self.rpc_deadline, exchange).await {
            Ok(result) => result,
            Err(_) => Err(DaqError::Timeout {
                target,
                operation: operation.to_string(),
                deadline: self.rpc_deadline,
            }),
        }
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        // The loop exits on its own and closes the handles.
        self.flags.stopped.store(true, Ordering::SeqCst);
    }
}

/// Receiving side of the bounded capture channel.
pub struct SampleSubscriber {
    rx: broadcast::Receiver<Arc<Waveform>>,
}

impl SampleSubscriber {
    /// Awaits the next capture in sequence order.
    ///
    /// Falling behind the channel capacity surfaces as one `QueueOverflow`
    /// carrying the number of captures evicted; the subscription then continues
    /// from the oldest retained capture.
    pub async fn recv(&mut self) -> DaqResult<Arc<Waveform>> {
        match self.rx.recv().await {
            Ok(waveform) => Ok(waveform),
            Err(broadcast::error::RecvError::Lagged(dropped)) => {
                Err(DaqError::QueueOverflow { dropped })
            }
            Err(broadcast::error::RecvError::Closed) => Err(DaqError::ManagerNotRunning),
        }
    }

    /// Collects up to `max` captures that are already queued, without waiting.
    /// Returns the captures and the number evicted from under this subscriber.
    pub fn drain(&mut self, max: usize) -> (Vec<Arc<Waveform>>, u64) {
        use broadcast::error::TryRecvError;

        let mut drained = Vec::new();
        let mut dropped = 0;
        while drained.len() < max {
            match self.rx.try_recv() {
                Ok(waveform) => drained.push(waveform),
                Err(TryRecvError::Lagged(n)) => dropped += n,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        (drained, dropped)
    }
}

/// The acquisition loop. Owns the instruments; everything else talks to it
/// through channels and flags.
struct ManagerLoop {
    scope: Box<dyn Instrument>,
    generator: Option<Box<dyn Instrument>>,
    scope_rx: mpsc::Receiver<InstrumentRequest>,
    generator_rx: mpsc::Receiver<InstrumentRequest>,
    sample_tx: broadcast::Sender<Arc<Waveform>>,
    flags: Arc<ControlFlags>,
    poll_interval: Duration,
    regulator: AmplitudeRegulator,
    drive: Option<AmplitudeState>,
    sequence: u64,
}

impl ManagerLoop {
    async fn run(mut self) {
        info!("Device manager loop started");
        while !self.flags.stopped.load(Ordering::SeqCst) {
            if let Ok(request) = self.generator_rx.try_recv() {
                self.serve(Target::Generator, request).await;
            } else if let Ok(request) = self.scope_rx.try_recv() {
                self.serve(Target::Scope, request).await;
            } else if !self.flags.paused.load(Ordering::SeqCst) && self.trigger_satisfied().await {
                self.capture().await;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        // Graceful cleanup after the loop breaks
        if let Err(e) = self.scope.close().await {
            error!("Failed to close scope: {}", e);
        }
        if let Some(generator) = self.generator.as_mut() {
            if let Err(e) = generator.close().await {
                error!("Failed to close generator: {}", e);
            }
        }
        info!("Device manager loop shutting down");
    }

    async fn serve(&mut self, target: Target, request: InstrumentRequest) {
        match request {
            InstrumentRequest::Get {
                attribute,
                response,
            } => {
                let result = self.serve_get(target, attribute).await;
                if let Err(e) = &result {
                    warn!("{} get '{}' failed: {}", target, attribute, e);
                }
                let _ = response.send(result);
            }
            InstrumentRequest::Set {
                attribute,
                value,
                response,
            } => {
                let result = self.serve_set(target, attribute, value).await;
                if let Err(e) = &result {
                    warn!("{} set '{}' failed: {}", target, attribute, e);
                }
                let _ = response.send(result);
            }
            InstrumentRequest::Call {
                method,
                args,
                response,
            } => {
                let result = self.serve_call(target, method, args).await;
                if let Err(e) = &result {
                    warn!("{} call '{}' failed: {}", target, method, e);
                }
                let _ = response.send(result);
            }
        }
    }

    async fn serve_get(
        &mut self,
        target: Target,
        attribute: AttributeId,
    ) -> DaqResult<AttributeValue> {
        lookup_readable(target, attribute).ok_or_else(|| DaqError::AttributeNotFound {
            target,
            attribute: attribute.name().to_string(),
        })?;
        self.instrument(target)?.get(attribute).await
    }

    async fn serve_set(
        &mut self,
        target: Target,
        attribute: AttributeId,
        value: AttributeValue,
    ) -> DaqResult<()> {
        let spec = lookup_writable(target, attribute).ok_or_else(|| DaqError::AttributeNotFound {
            target,
            attribute: attribute.name().to_string(),
        })?;
        let coerced = value
            .coerce_to(spec.kind)
            .ok_or_else(|| DaqError::TypeCoercion {
                target,
                attribute: attribute.name().to_string(),
                expected: spec.kind.name(),
                value: value.to_string(),
            })?;
        let frequency_update = (target == Target::Generator
            && attribute == AttributeId::Frequency)
            .then(|| coerced.as_f64())
            .flatten();
        self.instrument(target)?.set(attribute, coerced).await?;
        // Keep the cached drive point in step with externally commanded frequency.
        if let (Some(drive), Some(frequency)) = (self.drive.as_mut(), frequency_update) {
            drive.frequency = frequency;
        }
        Ok(())
    }

    async fn serve_call(
        &mut self,
        target: Target,
        method: MethodId,
        args: Vec<AttributeValue>,
    ) -> DaqResult<AttributeValue> {
        if !method_table(target).contains(&method) {
            return Err(DaqError::AttributeNotFound {
                target,
                attribute: method.name().to_string(),
            });
        }
        self.instrument(target)?.call(method, &args).await
    }

    fn instrument(&mut self, target: Target) -> DaqResult<&mut Box<dyn Instrument>> {
        match target {
            Target::Scope => Ok(&mut self.scope),
            Target::Generator => self.generator.as_mut().ok_or_else(|| DaqError::Connection {
                target: Target::Generator,
                reason: "no generator attached".to_string(),
            }),
        }
    }

    async fn trigger_satisfied(&mut self) -> bool {
        match self.scope.get(AttributeId::Triggered).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(e) => {
                warn!("Trigger poll failed: {}", e);
                false
            }
        }
    }

    async fn capture(&mut self) {
        let samples = match self.scope.fetch_waveform().await {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Waveform fetch failed: {}", e);
                return;
            }
        };
        self.sequence += 1;
        let waveform = Arc::new(Waveform::new(self.sequence, samples));
        // Send fails only when no subscriber exists; those captures are droppable.
        let _ = self.sample_tx.send(waveform.clone());
        if self.flags.auto_regulate.load(Ordering::SeqCst) {
            self.regulate(&waveform).await;
        }
    }

    async fn regulate(&mut self, waveform: &Waveform) {
        if self.drive.is_none() {
            match self.read_drive_point().await {
                Ok(state) => {
                    info!(
                        "Regulating from {:.3} V at {:.0} Hz",
                        state.voltage, state.frequency
                    );
                    self.drive = Some(state);
                }
                Err(e) => {
                    warn!("Disabling in-loop regulation: {}", e);
                    self.flags.auto_regulate.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }
        let Some(state) = self.drive else { return };

        if let Err(e) = self.regulator.register_frame(&waveform.samples) {
            // Hold the last commanded voltage until a well-formed capture arrives.
            warn!("Capture rejected by regulator: {}", e);
            return;
        }
        let next = self
            .regulator
            .update_amplitude(state.voltage, state.frequency, state.sample_rate);
        if (next - state.voltage).abs() < f64::EPSILON {
            return;
        }
        match self.command_amplitude(next).await {
            Ok(()) => {
                if let Some(drive) = self.drive.as_mut() {
                    drive.voltage = next;
                }
            }
            Err(e) => warn!("Failed to command regulated amplitude: {}", e),
        }
    }

    async fn command_amplitude(&mut self, voltage: f64) -> DaqResult<()> {
        self.instrument(Target::Generator)?
            .set(AttributeId::Amplitude, AttributeValue::Float(voltage))
            .await
    }

    async fn read_drive_point(&mut self) -> DaqResult<AmplitudeState> {
        let value = self.scope.get(AttributeId::AnalogSampleRate).await?;
        let sample_rate = float_of(Target::Scope, AttributeId::AnalogSampleRate, value)?;
        // An unarmed digitizer reports a zero rate; detection math needs a real one.
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DaqError::Connection {
                target: Target::Scope,
                reason: format!("reports unusable sample rate {} Hz", sample_rate),
            });
        }
        let generator = self.instrument(Target::Generator)?;
        let value = generator.get(AttributeId::Frequency).await?;
        let frequency = float_of(Target::Generator, AttributeId::Frequency, value)?;
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(DaqError::Connection {
                target: Target::Generator,
                reason: format!("reports unusable drive frequency {} Hz", frequency),
            });
        }
        let value = generator.get(AttributeId::Amplitude).await?;
        let voltage = float_of(Target::Generator, AttributeId::Amplitude, value)?;
        Ok(AmplitudeState {
            voltage,
            frequency,
            sample_rate,
        })
    }
}
