//! Core library for remote oscilloscope and signal-generator control.
//!
//! The crate is organized around one actor: a device manager that owns both
//! instrument handles inside a single loop task, serves attribute and method
//! requests over channels, and drains triggered captures onto a bounded output
//! channel. Around it sit the amplitude regulator, which watches captures for
//! subharmonic activity and steps the drive voltage accordingly, and a
//! sequential scheduler that runs persistence jobs one at a time.
//!
//! ## Crate Structure
//!
//! - **`config`**: Settings tree with TOML and environment layering. See
//!   `config::Settings`.
//! - **`error`**: The `DaqError` enum used across the crate.
//! - **`instrument`**: The `Instrument` trait, attribute tables, waveform type,
//!   and mock drivers.
//! - **`manager`**: The `DeviceManager` handle and its acquisition loop.
//! - **`regulator`**: Subharmonic detection and the bang-bang voltage update.
//! - **`scheduler`**: FIFO background runner for persistence jobs.
//! - **`storage`**: Scratch-file sample writer and the session metadata record.

pub mod config;
pub mod error;
pub mod instrument;
pub mod manager;
pub mod regulator;
pub mod scheduler;
pub mod storage;

pub use config::Settings;
pub use error::{DaqError, DaqResult};
pub use instrument::{
    AttributeId, AttributeValue, Instrument, MethodId, MockGenerator, MockScope, Target, Waveform,
};
pub use manager::{DeviceManager, GeneratorStatus, SampleSubscriber, ScopeStatus};
pub use regulator::{AmplitudeRegulator, AmplitudeState, RollingRegister};
pub use scheduler::TaskScheduler;
pub use storage::{ScratchWriter, SessionMetadata};
