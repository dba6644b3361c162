//! socketcand network relay.
//!
//! A socketcand daemon exposes a remote CAN interface over TCP. After the
//! greeting the client opens a channel and switches to raw mode, after which
//! frames flow both ways as ASCII messages:
//!
//! ```text
//! server: < hi >
//! client: < open can0 >        server: < ok >
//! client: < rawmode >          server: < ok >
//! client: < send 120C0072 1 01 >
//! server: < frame 120C0072 1700000000.000000 01 >
//! ```
//!
//! A reader task parses incoming messages and hands frames to the
//! registered receive callbacks.

mod buffer;

pub use buffer::{RelayBuffer, RelayMessage, MAX_MESSAGE_SIZE};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use super::{BoxFuture, CanTransport, ReceiveCallback, Receivers};
use crate::error::{Result, SibError};

/// Time allowed for the TCP connect.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for the greeting, open and rawmode exchange.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

const READ_CHUNK_SIZE: usize = 4096;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// CAN transport relayed by a socketcand daemon.
pub struct RelayTransport {
    writer: tokio::sync::Mutex<BoxedWriter>,
    receivers: Receivers,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    receive_own_messages: bool,
    closed: AtomicBool,
}

impl RelayTransport {
    /// Connect to `host:port` and open `channel` in raw mode.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the connection is refused, times out,
    /// or the daemon rejects the channel.
    pub async fn connect(
        host: &str,
        port: u16,
        channel: &str,
        receive_own_messages: bool,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                SibError::TransportUnavailable(format!("connect to {}:{} timed out", host, port))
            })?
            .map_err(|e| {
                SibError::TransportUnavailable(format!("connect to {}:{}: {}", host, port, e))
            })?;
        stream.set_nodelay(true)?;

        let transport = Self::from_stream(stream, channel, receive_own_messages).await?;
        tracing::info!("socketcand relay {}:{} opened channel {}", host, port, channel);
        Ok(transport)
    }

    /// Run the handshake over an already connected stream.
    pub async fn from_stream<S>(stream: S, channel: &str, receive_own_messages: bool) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut buffer = RelayBuffer::new();

        tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            handshake(&mut reader, &mut writer, &mut buffer, channel),
        )
        .await
        .map_err(|_| SibError::TransportUnavailable("relay handshake timed out".to_string()))?
        .map_err(|e| match e {
            SibError::TransportUnavailable(_) => e,
            other => SibError::TransportUnavailable(format!("relay handshake: {}", other)),
        })?;

        let receivers = Receivers::default();
        let task = tokio::spawn(read_loop(reader, buffer, receivers.clone()));

        Ok(Self {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            receivers,
            reader: parking_lot::Mutex::new(Some(task)),
            receive_own_messages,
            closed: AtomicBool::new(false),
        })
    }

    async fn transmit_inner(&self, arbitration_id: u32, payload: Bytes) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SibError::Transport("relay has been shut down".to_string()));
        }

        let line = buffer::format_send(arbitration_id, &payload);
        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(line.as_bytes())
                .await
                .map_err(|e| SibError::Transport(format!("relay write: {}", e)))?;
            writer
                .flush()
                .await
                .map_err(|e| SibError::Transport(format!("relay flush: {}", e)))?;
        }

        if self.receive_own_messages {
            self.receivers.dispatch(arbitration_id, &payload);
        }
        Ok(())
    }
}

impl CanTransport for RelayTransport {
    fn transmit(&self, arbitration_id: u32, payload: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.transmit_inner(arbitration_id, payload))
    }

    fn on_receive(&self, callback: ReceiveCallback) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SibError::Transport("relay has been shut down".to_string()));
        }
        self.receivers.add(callback);
        Ok(())
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            if let Some(task) = self.reader.lock().take() {
                task.abort();
            }
            self.receivers.clear();

            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Relay socket shutdown: {}", e);
            }
            tracing::info!("socketcand relay closed");
            Ok(())
        })
    }
}

impl Drop for RelayTransport {
    fn drop(&mut self) {
        if let Some(task) = self.reader.get_mut().take() {
            task.abort();
        }
    }
}

async fn handshake<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut RelayBuffer,
    channel: &str,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut queued = VecDeque::new();

    expect_reply(reader, buffer, &mut queued, RelayMessage::Hi, "greeting").await?;

    writer
        .write_all(format!("< open {} >", channel).as_bytes())
        .await?;
    writer.flush().await?;
    expect_reply(reader, buffer, &mut queued, RelayMessage::Ok, "open").await?;

    writer.write_all(b"< rawmode >").await?;
    writer.flush().await?;
    expect_reply(reader, buffer, &mut queued, RelayMessage::Ok, "rawmode").await?;

    if !queued.is_empty() {
        tracing::trace!("Dropping {} relay messages received during handshake", queued.len());
    }
    Ok(())
}

async fn expect_reply<R>(
    reader: &mut R,
    buffer: &mut RelayBuffer,
    queued: &mut VecDeque<RelayMessage>,
    expected: RelayMessage,
    step: &str,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; MAX_MESSAGE_SIZE];
    loop {
        if let Some(message) = queued.pop_front() {
            return match message {
                m if m == expected => Ok(()),
                RelayMessage::Error(reason) => Err(SibError::TransportUnavailable(format!(
                    "relay rejected {}: {}",
                    step, reason
                ))),
                other => Err(SibError::TransportUnavailable(format!(
                    "unexpected relay reply to {}: {:?}",
                    step, other
                ))),
            };
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(SibError::TransportUnavailable(format!(
                "relay closed the connection during {}",
                step
            )));
        }
        queued.extend(buffer.push(&chunk[..n])?);
    }
}

async fn read_loop<S>(mut reader: ReadHalf<S>, mut buffer: RelayBuffer, receivers: Receivers)
where
    S: AsyncRead,
{
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                tracing::info!("socketcand relay closed the connection");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Relay read failed: {}", e);
                return;
            }
        };

        let messages = match buffer.push(&chunk[..n]) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Discarding relay input: {}", e);
                continue;
            }
        };

        for message in messages {
            match message {
                RelayMessage::Frame {
                    arbitration_id,
                    payload,
                } => receivers.dispatch(arbitration_id, &payload),
                RelayMessage::Error(reason) => tracing::warn!("Relay reported error: {}", reason),
                other => tracing::trace!("Ignoring relay message {:?}", other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{duplex, DuplexStream};
    use tokio::sync::mpsc;

    /// Read from the client until one message arrives.
    async fn next_command(server: &mut DuplexStream, buffer: &mut RelayBuffer) -> RelayMessage {
        let mut chunk = [0u8; 256];
        loop {
            let n = server.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed");
            let mut messages = buffer.push(&chunk[..n]).unwrap();
            if !messages.is_empty() {
                return messages.remove(0);
            }
        }
    }

    /// Play the daemon side of a successful handshake.
    async fn accept_handshake(mut server: DuplexStream, channel: &'static str) -> DuplexStream {
        let mut buffer = RelayBuffer::new();
        server.write_all(b"< hi >").await.unwrap();
        assert_eq!(
            next_command(&mut server, &mut buffer).await,
            RelayMessage::Other(format!("open {}", channel))
        );
        server.write_all(b"< ok >").await.unwrap();
        assert_eq!(
            next_command(&mut server, &mut buffer).await,
            RelayMessage::Other("rawmode".to_string())
        );
        server.write_all(b"< ok >").await.unwrap();
        server
    }

    async fn connected(receive_own: bool) -> (RelayTransport, DuplexStream) {
        let (client, server) = duplex(4096);
        let daemon = tokio::spawn(accept_handshake(server, "can0"));
        let transport = RelayTransport::from_stream(client, "can0", receive_own)
            .await
            .unwrap();
        (transport, daemon.await.unwrap())
    }

    fn channel_callback() -> (ReceiveCallback, mpsc::UnboundedReceiver<(u32, Bytes)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: ReceiveCallback = Arc::new(move |id, payload| {
            let _ = tx.send((id, payload));
        });
        (callback, rx)
    }

    #[tokio::test]
    async fn test_received_frames_dispatched() {
        let (transport, mut server) = connected(false).await;
        let (callback, mut rx) = channel_callback();
        transport.on_receive(callback).unwrap();

        server
            .write_all(b"< frame 120C0072 1700000000.000000 0102 >")
            .await
            .unwrap();

        let (id, payload) = rx.recv().await.unwrap();
        assert_eq!(id, 0x120C_0072);
        assert_eq!(payload.as_ref(), &[0x01, 0x02]);
    }

    #[tokio::test]
    async fn test_transmit_writes_send_command() {
        let (transport, mut server) = connected(false).await;

        transport
            .transmit(0x1000_FF72, Bytes::from_static(&[0x04, 0x01]))
            .await
            .unwrap();

        let mut buffer = RelayBuffer::new();
        assert_eq!(
            next_command(&mut server, &mut buffer).await,
            RelayMessage::Other("send 1000FF72 2 04 01".to_string())
        );
    }

    #[tokio::test]
    async fn test_receive_own_messages_loops_back() {
        let (transport, _server) = connected(true).await;
        let (callback, mut rx) = channel_callback();
        transport.on_receive(callback).unwrap();

        transport.transmit(0x42, Bytes::from_static(b"x")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), (0x42, Bytes::from_static(b"x")));
    }

    #[tokio::test]
    async fn test_open_rejected() {
        let (client, mut server) = duplex(4096);
        let daemon = tokio::spawn(async move {
            let mut buffer = RelayBuffer::new();
            server.write_all(b"< hi >").await.unwrap();
            next_command(&mut server, &mut buffer).await;
            server.write_all(b"< error could not open bus >").await.unwrap();
            server
        });

        let result = RelayTransport::from_stream(client, "can9", false).await;
        let _server = daemon.await.unwrap();
        match result {
            Err(SibError::TransportUnavailable(reason)) => assert!(reason.contains("open")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("handshake should fail"),
        }
    }

    #[tokio::test]
    async fn test_connection_closed_during_handshake() {
        let (client, server) = duplex(4096);
        drop(server);

        let result = RelayTransport::from_stream(client, "can0", false).await;
        assert!(matches!(result, Err(SibError::TransportUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_daemon_times_out() {
        let (client, _server) = duplex(4096);

        let result = RelayTransport::from_stream(client, "can0", false).await;
        assert!(matches!(result, Err(SibError::TransportUnavailable(_))));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (transport, _server) = connected(false).await;

        transport.shutdown().await.unwrap();
        transport.shutdown().await.unwrap();

        let result = transport.transmit(1, Bytes::new()).await;
        assert!(matches!(result, Err(SibError::Transport(_))));
        assert!(transport.on_receive(Arc::new(|_, _| {})).is_err());
    }

    #[tokio::test]
    async fn test_connect_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let daemon = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = RelayBuffer::new();
            let mut chunk = [0u8; 256];
            socket.write_all(b"< hi >").await.unwrap();
            for _ in 0..2 {
                loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if !buffer.push(&chunk[..n]).unwrap().is_empty() {
                        break;
                    }
                }
                socket.write_all(b"< ok >").await.unwrap();
            }
            socket
        });

        let transport = RelayTransport::connect("127.0.0.1", port, "can0", false)
            .await
            .unwrap();
        let _socket = daemon.await.unwrap();
        transport.shutdown().await.unwrap();
    }
}
