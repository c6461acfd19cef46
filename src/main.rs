//! CLI entry point: runs the full acquisition pipeline against mock instruments.
//!
//! Connects a mock scope and generator, resumes acquisition, appends every
//! drained capture to a scratch file through the sequential scheduler, and
//! regulates the drive amplitude from the captured spectra. Stops cleanly after
//! `--captures` captures or Ctrl-C, writing the session metadata record last.
//!
//! # Usage
//!
//! ```bash
//! scope_daq --captures 25 --subharmonic
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::signal;

use scope_daq::instrument::{MockGenerator, MockScope};
use scope_daq::{
    AttributeId, AttributeValue, DaqError, DeviceManager, SampleSubscriber, ScratchWriter,
    SessionMetadata, Settings, Target, TaskScheduler, Waveform,
};

#[derive(Parser, Debug)]
#[command(name = "scope_daq")]
#[command(version, about = "Remote scope/generator control with amplitude regulation", long_about = None)]
struct Cli {
    /// Path to a TOML settings file
    #[arg(long)]
    config: Option<String>,

    /// Number of captures to drain before stopping
    #[arg(long, default_value_t = 25)]
    captures: usize,

    /// Drive frequency for the mock instruments, in Hz
    #[arg(long, default_value_t = 1.0e5)]
    frequency: f64,

    /// Inject a component at 1.5x the drive frequency into the mock scope signal
    #[arg(long)]
    subharmonic: bool,

    /// Regulate inside the acquisition loop instead of from this client
    #[arg(long)]
    auto_regulate: bool,

    /// Directory for scratch data and the metadata record
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&settings.log_level),
    )
    .init();
    if cli.auto_regulate {
        settings.manager.auto_regulate = true;
    }

    let scope = MockScope::new()
        .with_drive_frequency(cli.frequency)
        .with_subharmonic(if cli.subharmonic { 0.8 } else { 0.0 })
        .with_noise(0.01);
    let generator = MockGenerator::new().with_frequency(cli.frequency);
    let mut manager =
        DeviceManager::connect(Box::new(scope), Some(Box::new(generator)), &settings).await?;

    let scope_status = manager.scope_status().await?;
    info!(
        "Scope '{}' at {:.0} Sa/s, {} points per capture",
        scope_status.instrument_name, scope_status.analog_sample_rate, scope_status.record_length
    );
    manager
        .set_attribute(Target::Generator, AttributeId::State, AttributeValue::Bool(true))
        .await?;

    let out_dir = cli
        .out_dir
        .unwrap_or_else(|| settings.storage.scratch_dir.clone());
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let writer = ScratchWriter::new(out_dir.join("capture.bin"));
    let mut scheduler = TaskScheduler::new(
        settings.storage.queue_capacity,
        settings.storage.drain_timeout,
    );

    let mut subscriber = manager.subscribe();
    manager.resume();

    let drained = drain_captures(
        &manager,
        &scheduler,
        &writer,
        &mut subscriber,
        &settings,
        cli.captures,
        cli.auto_regulate,
    )
    .await?;

    manager.pause();
    // Pick up whatever was still queued when the loop paused.
    let (rest, _) = subscriber.drain(settings.manager.sample_channel_capacity);
    for waveform in &rest {
        let (label, work) = writer.append_job(waveform.clone());
        scheduler.schedule(&label, work).await?;
    }

    let metadata = SessionMetadata::collect(&manager).await?;
    let (label, work) = metadata.write_job(out_dir.join("metadata.json"));
    scheduler.schedule(&label, work).await?;

    scheduler.stop().await.context("persistence drain failed")?;
    manager.stop().await?;

    println!(
        "Captured {} waveform(s) -> {}",
        drained + rest.len(),
        out_dir.display()
    );
    Ok(())
}

/// Drains captures until the requested count or Ctrl-C, scheduling an append
/// job per capture and regulating amplitude from the client side unless the
/// loop is doing it already.
async fn drain_captures(
    manager: &DeviceManager,
    scheduler: &TaskScheduler,
    writer: &ScratchWriter,
    subscriber: &mut SampleSubscriber,
    settings: &Settings,
    captures: usize,
    auto_regulate: bool,
) -> Result<usize> {
    let mut regulator = scope_daq::AmplitudeRegulator::new(settings.regulator.clone());
    let scope_status = manager.scope_status().await?;
    let generator_status = manager.generator_status().await?;
    let mut voltage = generator_status.amplitude;
    let drive_frequency = generator_status.frequency;
    let sample_rate = scope_status.analog_sample_rate;

    let mut drained = 0;
    while drained < captures {
        let received = tokio::select! {
            result = subscriber.recv() => Some(result),
            _ = signal::ctrl_c() => None,
        };
        let Some(result) = received else {
            info!("Interrupted; shutting down");
            break;
        };
        let waveform: Arc<Waveform> = match result {
            Ok(waveform) => waveform,
            Err(DaqError::QueueOverflow { dropped }) => {
                warn!("Fell behind the capture channel; {} capture(s) lost", dropped);
                continue;
            }
            Err(e) => return Err(e).context("capture channel failed"),
        };
        drained += 1;

        let (label, work) = writer.append_job(waveform.clone());
        scheduler.schedule(&label, work).await?;

        if !auto_regulate {
            if let Err(e) = regulator.register_frame(&waveform.samples) {
                warn!("Capture rejected by regulator: {}", e);
                continue;
            }
            let next = regulator.update_amplitude(voltage, drive_frequency, sample_rate);
            if (next - voltage).abs() > f64::EPSILON {
                manager
                    .set_attribute(
                        Target::Generator,
                        AttributeId::Amplitude,
                        AttributeValue::Float(next),
                    )
                    .await?;
                info!("Amplitude {:.3} V -> {:.3} V", voltage, next);
                voltage = next;
            }
        }
    }
    Ok(drained)
}
