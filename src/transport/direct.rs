//! Linux SocketCAN interface.
//!
//! The kernel socket is blocking, so a dedicated reader thread polls it with
//! a short read timeout and transmits run on the blocking pool.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ::socketcan::{
    CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, SocketOptions,
};
use bytes::Bytes;

use super::{BoxFuture, CanTransport, ReceiveCallback, Receivers};
use crate::error::{Result, SibError};

/// How often the reader thread checks for shutdown.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// CAN transport on a local SocketCAN interface such as `can0`.
pub struct DirectTransport {
    socket: Arc<CanSocket>,
    receivers: Receivers,
    closed: Arc<AtomicBool>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DirectTransport {
    /// Open `channel`. Bitrate is configured on the interface itself.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the interface cannot be opened.
    pub fn open(channel: &str, receive_own_messages: bool) -> Result<Self> {
        let unavailable =
            |e: io::Error| SibError::TransportUnavailable(format!("open {}: {}", channel, e));

        let socket = CanSocket::open(channel).map_err(unavailable)?;
        socket
            .set_read_timeout(READ_POLL_INTERVAL)
            .map_err(unavailable)?;
        socket
            .set_recv_own_msgs(receive_own_messages)
            .map_err(unavailable)?;

        let socket = Arc::new(socket);
        let receivers = Receivers::default();
        let closed = Arc::new(AtomicBool::new(false));

        let reader = {
            let socket = socket.clone();
            let receivers = receivers.clone();
            let closed = closed.clone();
            let name = format!("sib-{}-reader", channel);
            std::thread::Builder::new()
                .name(name)
                .spawn(move || read_loop(&socket, &receivers, &closed))?
        };

        tracing::info!("SocketCAN interface {} opened", channel);
        Ok(Self {
            socket,
            receivers,
            closed,
            reader: parking_lot::Mutex::new(Some(reader)),
        })
    }
}

impl CanTransport for DirectTransport {
    fn transmit(&self, arbitration_id: u32, payload: Bytes) -> BoxFuture<'_, Result<()>> {
        let socket = self.socket.clone();
        let closed = self.closed.load(Ordering::Acquire);
        Box::pin(async move {
            if closed {
                return Err(SibError::Transport("interface has been shut down".to_string()));
            }
            let id = ExtendedId::new(arbitration_id).ok_or_else(|| {
                SibError::MalformedFrame(format!("{:#x} is not a 29-bit id", arbitration_id))
            })?;
            let frame = CanFrame::new(id, &payload).ok_or_else(|| {
                SibError::MalformedFrame(format!("payload of {} bytes", payload.len()))
            })?;

            tokio::task::spawn_blocking(move || socket.write_frame(&frame))
                .await
                .map_err(|e| SibError::Transport(format!("transmit task: {}", e)))?
                .map_err(|e| SibError::Transport(e.to_string()))
        })
    }

    fn on_receive(&self, callback: ReceiveCallback) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SibError::Transport("interface has been shut down".to_string()));
        }
        self.receivers.add(callback);
        Ok(())
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<()>> {
        let reader = if self.closed.swap(true, Ordering::AcqRel) {
            None
        } else {
            self.receivers.clear();
            self.reader.lock().take()
        };
        Box::pin(async move {
            if let Some(reader) = reader {
                // Exits within one poll interval.
                let _ = tokio::task::spawn_blocking(move || reader.join()).await;
                tracing::info!("SocketCAN interface closed");
            }
            Ok(())
        })
    }
}

impl Drop for DirectTransport {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

fn read_loop(socket: &CanSocket, receivers: &Receivers, closed: &AtomicBool) {
    while !closed.load(Ordering::Acquire) {
        match socket.read_frame() {
            Ok(CanFrame::Data(frame)) => match frame.id() {
                Id::Extended(id) => {
                    receivers.dispatch(id.as_raw(), &Bytes::copy_from_slice(frame.data()))
                }
                Id::Standard(id) => {
                    tracing::trace!("Ignoring standard frame {:#x}", id.as_raw())
                }
            },
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => {
                tracing::warn!("SocketCAN read failed: {}", e);
                return;
            }
        }
    }
}
