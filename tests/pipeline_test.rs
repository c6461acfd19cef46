//! End-to-end pipeline: mock instruments behind the manager, captures drained
//! from the bounded channel, persistence jobs drained in order, and the session
//! record written next to the raw samples.

use std::time::Duration;

use scope_daq::instrument::{MockGenerator, MockScope};
use scope_daq::{
    DeviceManager, Instrument, ScratchWriter, SessionMetadata, Settings, TaskScheduler,
};

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.manager.rpc_deadline = Duration::from_millis(500);
    settings.manager.stop_timeout = Duration::from_secs(2);
    settings
}

#[tokio::test]
async fn test_captures_round_trip_through_scheduler_and_scratch_file() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ScratchWriter::new(dir.path().join("capture.bin"));

    // Noise makes every synthesized capture distinct, so file order is checked
    // sample for sample, not just by byte count.
    let scope = MockScope::new().with_noise(0.01);
    let mut manager = DeviceManager::connect(
        Box::new(scope),
        Some(Box::new(MockGenerator::new()) as Box<dyn Instrument>),
        &test_settings(),
    )
    .await
    .unwrap();
    let mut scheduler = TaskScheduler::new(32, Duration::from_secs(2));

    let mut subscriber = manager.subscribe();
    manager.resume();
    let mut waveforms = Vec::new();
    for _ in 0..3 {
        let waveform = tokio::time::timeout(Duration::from_secs(1), subscriber.recv())
            .await
            .expect("capture timed out")
            .expect("capture channel failed");
        waveforms.push(waveform);
    }
    manager.pause();

    assert_eq!(
        waveforms.iter().map(|w| w.sequence).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    for waveform in &waveforms {
        let (label, work) = writer.append_job(waveform.clone());
        scheduler.schedule(&label, work).await.unwrap();
    }
    scheduler.stop().await.unwrap();

    let persisted = writer.read_all().unwrap();
    let expected: Vec<f64> = waveforms
        .iter()
        .flat_map(|w| w.samples.iter().copied())
        .collect();
    assert_eq!(persisted, expected);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_session_record_reflects_the_connected_pair() {
    let dir = tempfile::tempdir().unwrap();
    let scope = MockScope::new()
        .with_sample_rate(5.0e6)
        .with_record_length(250);
    let generator = MockGenerator::new()
        .with_frequency(2.0e5)
        .with_amplitude(0.6);
    let mut manager = DeviceManager::connect(
        Box::new(scope),
        Some(Box::new(generator) as Box<dyn Instrument>),
        &test_settings(),
    )
    .await
    .unwrap();

    let metadata = SessionMetadata::collect(&manager).await.unwrap();
    assert_eq!(metadata.scope_name, "Mock Scope");
    assert!((metadata.sample_rate - 5.0e6).abs() < 1e-6);
    assert_eq!(metadata.record_length, 250);
    assert_eq!(metadata.generator_frequency, Some(2.0e5));
    assert_eq!(metadata.generator_amplitude, Some(0.6));
    assert_eq!(metadata.software_version, env!("CARGO_PKG_VERSION"));

    let path = dir.path().join("metadata.json");
    metadata.write_json(&path).unwrap();
    let restored: SessionMetadata =
        serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(restored, metadata);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_session_record_without_generator_leaves_drive_fields_empty() {
    let mut manager = DeviceManager::connect(
        Box::new(MockScope::new()),
        None,
        &test_settings(),
    )
    .await
    .unwrap();

    let metadata = SessionMetadata::collect(&manager).await.unwrap();
    assert_eq!(metadata.generator_frequency, None);
    assert_eq!(metadata.generator_amplitude, None);

    manager.stop().await.unwrap();
}
