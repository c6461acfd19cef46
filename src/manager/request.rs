//! Request messages serviced by the device-manager loop.
//!
//! This module defines the message type used for message-passing between client
//! handles and the acquisition loop. Each request carries the oneshot sender the
//! loop answers on; the helper constructors return the paired receiver so callers
//! can await the reply.

use tokio::sync::oneshot;

use crate::error::DaqResult;
use crate::instrument::{AttributeId, AttributeValue, MethodId};

/// One attribute or method request bound for a single instrument.
#[derive(Debug)]
pub enum InstrumentRequest {
    /// Read one attribute
    Get {
        attribute: AttributeId,
        response: oneshot::Sender<DaqResult<AttributeValue>>,
    },

    /// Write one attribute
    Set {
        attribute: AttributeId,
        value: AttributeValue,
        response: oneshot::Sender<DaqResult<()>>,
    },

    /// Invoke a named method
    Call {
        method: MethodId,
        args: Vec<AttributeValue>,
        response: oneshot::Sender<DaqResult<AttributeValue>>,
    },
}

impl InstrumentRequest {
    /// Helper to create a Get request
    pub fn get(attribute: AttributeId) -> (Self, oneshot::Receiver<DaqResult<AttributeValue>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Get {
                attribute,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a Set request
    pub fn set(
        attribute: AttributeId,
        value: AttributeValue,
    ) -> (Self, oneshot::Receiver<DaqResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Set {
                attribute,
                value,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a Call request
    pub fn call(
        method: MethodId,
        args: Vec<AttributeValue>,
    ) -> (Self, oneshot::Receiver<DaqResult<AttributeValue>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Call {
                method,
                args,
                response: tx,
            },
            rx,
        )
    }
}
