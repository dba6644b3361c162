//! Session events.
//!
//! Everything observable about a running session is reported as a
//! [`SessionEvent`] to an [`EventSink`]. The default [`TracingSink`] logs
//! events through `tracing`; applications can install any closure instead.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use sib_client::events::{EventSink, SessionEvent};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = {
//!     let seen = seen.clone();
//!     move |event: &SessionEvent| seen.lock().unwrap().push(event.to_string())
//! };
//! sink.emit(&SessionEvent::CommandIgnored { command: 3, sender: 0x11 });
//! assert_eq!(seen.lock().unwrap().len(), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::codec::DeviceInfo;
use crate::protocol::{Frame, PhysicalAddress};
use crate::session::SessionState;

/// Something that happened in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// A decoded frame arrived from the bus.
    FrameReceived(Frame),
    /// A frame was handed to the transport successfully.
    FrameSent(Frame),
    /// A transmit failed. The error is rendered to text so events stay `Clone`.
    SendFailed { frame: Frame, error: String },
    /// A received frame could not be decoded and was dropped.
    DecodeFailed { arbitration_id: u32, error: String },
    /// A topic frame replaced an entity's state.
    EntityUpdated {
        device: PhysicalAddress,
        entity: String,
    },
    /// Device info was seen for an address not in the directory.
    DeviceDiscovered {
        address: PhysicalAddress,
        info: DeviceInfo,
    },
    /// A command addressed to us has no handler.
    CommandIgnored { command: u8, sender: u8 },
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::StateChanged { from, to } => write!(f, "state {} -> {}", from, to),
            SessionEvent::FrameReceived(frame) => write!(f, "received {}", frame),
            SessionEvent::FrameSent(frame) => write!(f, "sent {}", frame),
            SessionEvent::SendFailed { frame, error } => {
                write!(f, "failed to send {}: {}", frame, error)
            }
            SessionEvent::DecodeFailed {
                arbitration_id,
                error,
            } => write!(f, "dropped frame {:#010x}: {}", arbitration_id, error),
            SessionEvent::EntityUpdated { device, entity } => {
                write!(f, "entity {} on {} updated", entity, device)
            }
            SessionEvent::DeviceDiscovered { address, info } => {
                write!(f, "discovered {} at {}", info, address)
            }
            SessionEvent::CommandIgnored { command, sender } => {
                write!(f, "ignored command {:#04x} from {:#04x}", command, sender)
            }
        }
    }
}

/// Receiver of session events.
///
/// Called from the session's tasks, so implementations must not block.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: &SessionEvent);
}

impl<F> EventSink for F
where
    F: Fn(&SessionEvent) + Send + Sync + 'static,
{
    fn emit(&self, event: &SessionEvent) {
        self(event)
    }
}

/// Shared sink handle.
pub type SharedEventSink = Arc<dyn EventSink>;

/// Logs every event at a level matching its severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged { .. } | SessionEvent::DeviceDiscovered { .. } => {
                tracing::info!("{}", event)
            }
            SessionEvent::SendFailed { .. } | SessionEvent::DecodeFailed { .. } => {
                tracing::warn!("{}", event)
            }
            SessionEvent::CommandIgnored { .. } => tracing::debug!("{}", event),
            SessionEvent::FrameReceived(_)
            | SessionEvent::FrameSent(_)
            | SessionEvent::EntityUpdated { .. } => tracing::trace!("{}", event),
        }
    }
}
