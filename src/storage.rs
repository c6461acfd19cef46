//! Scratch-file persistence and the session metadata record.
//!
//! Raw samples append to a single growing binary file, eight little-endian
//! bytes per sample, in the order the scheduler runs the append jobs. The
//! metadata record describing the session is written separately as JSON.

use std::fs::OpenOptions;
use std::future::Future;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DaqResult;
use crate::instrument::Waveform;
use crate::manager::DeviceManager;

/// Configuration for persistence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory scratch data and metadata records are written under.
    pub scratch_dir: PathBuf,
    /// Queue capacity of the persistence scheduler.
    pub queue_capacity: usize,
    /// Drain window granted to the scheduler on stop.
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("data"),
            queue_capacity: 32,
            drain_timeout: Duration::from_secs(2),
        }
    }
}

/// Appends raw little-endian samples to one growing scratch file.
///
/// The writer is a plain path wrapper; each append opens, extends, and closes
/// the file, so clones can be captured by queued jobs freely.
#[derive(Debug, Clone)]
pub struct ScratchWriter {
    path: PathBuf,
}

impl ScratchWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one capture's samples, creating the file on first use.
    /// Returns the number of bytes written.
    pub fn append(&self, samples: &[f64]) -> DaqResult<u64> {
        let mut bytes = Vec::with_capacity(samples.len() * 8);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Reads every sample back in append order.
    pub fn read_all(&self) -> DaqResult<Vec<f64>> {
        let mut bytes = Vec::new();
        std::fs::File::open(&self.path)?.read_to_end(&mut bytes)?;
        let mut samples = Vec::with_capacity(bytes.len() / 8);
        for chunk in bytes.chunks_exact(8) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            samples.push(f64::from_le_bytes(raw));
        }
        Ok(samples)
    }

    /// Scheduler-ready job appending `waveform`'s samples to this file.
    pub fn append_job(
        &self,
        waveform: Arc<Waveform>,
    ) -> (String, impl Future<Output = anyhow::Result<()>> + Send + 'static) {
        let writer = self.clone();
        let label = format!("append capture {}", waveform.sequence);
        let work = async move {
            writer
                .append(&waveform.samples)
                .with_context(|| format!("appending capture {}", waveform.sequence))?;
            Ok(())
        };
        (label, work)
    }
}

/// Metadata record assembled when a capture session is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub scope_name: String,
    pub sample_rate: f64,
    pub record_length: i64,
    /// Absent when the session ran without a generator.
    pub generator_frequency: Option<f64>,
    pub generator_amplitude: Option<f64>,
    pub saved_at: DateTime<Utc>,
    pub software_version: String,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            scope_name: String::new(),
            sample_rate: 0.0,
            record_length: 0,
            generator_frequency: None,
            generator_amplitude: None,
            saved_at: Utc::now(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl SessionMetadata {
    /// Reads the current instrument state through the manager and assembles the
    /// record. Generator fields stay empty when no generator is attached.
    pub async fn collect(manager: &DeviceManager) -> DaqResult<Self> {
        let scope = manager.scope_status().await?;
        let generator = if manager.has_generator() {
            Some(manager.generator_status().await?)
        } else {
            None
        };
        Ok(Self {
            scope_name: scope.instrument_name,
            sample_rate: scope.analog_sample_rate,
            record_length: scope.record_length,
            generator_frequency: generator.as_ref().map(|g| g.frequency),
            generator_amplitude: generator.as_ref().map(|g| g.amplitude),
            saved_at: Utc::now(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Writes the record as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> DaqResult<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Scheduler-ready job writing this record to `path`.
    pub fn write_job(
        self,
        path: PathBuf,
    ) -> (String, impl Future<Output = anyhow::Result<()>> + Send + 'static) {
        let label = format!("write metadata {}", path.display());
        let work = async move {
            self.write_json(&path)
                .with_context(|| format!("writing metadata to {}", path.display()))?;
            Ok(())
        };
        (label, work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let writer = ScratchWriter::new(dir.path().join("capture.bin"));

        writer.append(&[1.0, -2.5]).unwrap();
        writer.append(&[0.25]).unwrap();

        assert_eq!(writer.read_all().unwrap(), vec![1.0, -2.5, 0.25]);
    }

    #[test]
    fn test_append_returns_byte_count() {
        let dir = tempdir().unwrap();
        let writer = ScratchWriter::new(dir.path().join("capture.bin"));
        assert_eq!(writer.append(&[0.0; 4]).unwrap(), 32);
    }

    #[test]
    fn test_metadata_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let record = SessionMetadata {
            scope_name: "Mock Scope".to_string(),
            sample_rate: 2.5e6,
            record_length: 1000,
            generator_frequency: Some(1.0e5),
            generator_amplitude: Some(1.0),
            ..SessionMetadata::default()
        };

        record.write_json(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: SessionMetadata = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed, record);
        assert_eq!(parsed.software_version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_append_job_writes_the_capture() {
        let dir = tempdir().unwrap();
        let writer = ScratchWriter::new(dir.path().join("capture.bin"));
        let waveform = Arc::new(Waveform::new(3, vec![0.5, 0.5]));

        let (label, work) = writer.append_job(waveform);
        assert_eq!(label, "append capture 3");
        work.await.unwrap();

        assert_eq!(writer.read_all().unwrap(), vec![0.5, 0.5]);
    }
}
