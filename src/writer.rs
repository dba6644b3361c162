//! Dedicated writer task for serialized frame transmission.
//!
//! The session, its dispatch task and the announcement loop all send frames.
//! Instead of sharing the transport behind a lock, they hand frames to a
//! single writer task over an mpsc channel. The task transmits one frame at a
//! time and only starts the next transmit once the previous one completed,
//! so frames leave in the order they were queued.
//!
//! # Architecture
//!
//! ```text
//! Session::send ─┐
//! Dispatch task ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► CanTransport
//! Announcer     ─┘                                      │
//!                         oneshot<Result<()>> ◄──────────┘
//! ```

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, SibError};
use crate::events::{SessionEvent, SharedEventSink};
use crate::protocol::Frame;
use crate::transport::CanTransport;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A frame queued for transmission.
#[derive(Debug)]
pub struct OutboundFrame {
    pub frame: Frame,
    /// Receives the transmit result. `None` for fire-and-forget sends.
    reply: Option<oneshot::Sender<Result<()>>>,
}

impl OutboundFrame {
    /// Frame whose result is reported back to the sender.
    #[inline]
    pub fn new(frame: Frame) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                frame,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// Frame whose result is only reported as an event.
    #[inline]
    pub fn detached(frame: Frame) -> Self {
        Self { frame, reply: None }
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue. Senders wait when it is full.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame and wait for its transmit result.
    ///
    /// # Errors
    ///
    /// The transport's error if the transmit failed, `MalformedFrame` if the
    /// frame cannot be encoded, `Transport` if the writer has stopped.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        let (outbound, reply) = OutboundFrame::new(frame);
        self.tx.send(outbound).await.map_err(|_| writer_closed())?;
        reply.await.map_err(|_| writer_closed())?
    }

    /// Queue a frame without waiting, neither for queue space nor for the
    /// transmit. The outcome is only reported as an event.
    ///
    /// # Errors
    ///
    /// `Transport` if the queue is full or the writer has stopped.
    pub fn try_send_detached(&self, frame: Frame) -> Result<()> {
        self.tx
            .try_send(OutboundFrame::detached(frame))
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    SibError::Transport("writer queue is full".to_string())
                }
                TrySendError::Closed(_) => writer_closed(),
            })
    }
}

fn writer_closed() -> SibError {
    SibError::Transport("writer task has stopped".to_string())
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends once every [`WriterHandle`] has been dropped and the queue
/// has drained.
pub fn spawn_writer_task(
    transport: Arc<dyn CanTransport>,
    events: SharedEventSink,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, transport, events));

    (WriterHandle { tx }, task)
}

async fn writer_loop(
    mut rx: mpsc::Receiver<OutboundFrame>,
    transport: Arc<dyn CanTransport>,
    events: SharedEventSink,
) {
    while let Some(outbound) = rx.recv().await {
        let result = transmit(transport.as_ref(), &outbound.frame).await;

        match &result {
            Ok(()) => events.emit(&SessionEvent::FrameSent(outbound.frame.clone())),
            Err(e) => events.emit(&SessionEvent::SendFailed {
                frame: outbound.frame.clone(),
                error: e.to_string(),
            }),
        }

        if let Some(reply) = outbound.reply {
            let _ = reply.send(result);
        }
    }
    tracing::debug!("Writer task finished");
}

async fn transmit(transport: &dyn CanTransport, frame: &Frame) -> Result<()> {
    let (arbitration_id, payload) = frame.encode()?;
    transport.transmit(arbitration_id, payload).await
}
