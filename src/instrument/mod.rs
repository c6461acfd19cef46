//! Instrument abstraction consumed by the device manager.
//!
//! A handle implementing [`Instrument`] wraps one piece of hardware (or a mock).
//! Handles are moved into the manager at construction and owned by its loop task
//! exclusively; nothing here is `Clone`, so a connection can never be driven from
//! two places at once. All client access goes through the manager's request
//! channels.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod attribute;
pub mod mock;
pub mod waveform;

pub use attribute::{
    attribute_table, lookup_readable, lookup_writable, method_table, AttributeAccess, AttributeId,
    AttributeKind, AttributeSpec, AttributeValue, MethodId,
};
pub use mock::{MockGenerator, MockScope};
pub use waveform::{time_axis, Waveform};

use crate::error::DaqResult;

/// Which of the two managed instruments a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    Scope,
    Generator,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Scope => write!(f, "scope"),
            Target::Generator => write!(f, "generator"),
        }
    }
}

/// Capability over one physical instrument.
///
/// Implementations receive attribute writes already coerced to the kind declared
/// in the target's table, so drivers only translate well-typed values into device
/// commands. Errors returned here are reported to the requesting client and never
/// terminate the acquisition loop.
#[async_trait]
pub trait Instrument: Send {
    /// Stable identifier used in logs and error context.
    fn id(&self) -> &str;

    /// Reads one attribute.
    async fn get(&mut self, id: AttributeId) -> DaqResult<AttributeValue>;

    /// Writes one attribute. Issues exactly one device command per call.
    async fn set(&mut self, id: AttributeId, value: AttributeValue) -> DaqResult<()>;

    /// Invokes a named method.
    async fn call(&mut self, method: MethodId, args: &[AttributeValue]) -> DaqResult<AttributeValue>;

    /// Reads one triggered capture.
    async fn fetch_waveform(&mut self) -> DaqResult<Vec<f64>>;

    /// Releases the hardware connection. Further calls on the handle fail.
    async fn close(&mut self) -> DaqResult<()>;
}
