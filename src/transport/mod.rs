//! Transport module - the CAN capability the session consumes.
//!
//! The session never touches driver internals. It only sees
//! [`CanTransport`]: transmit one extended frame, register a receive
//! callback, and shut down. Implementations:
//! - [`VirtualBus`] - in-memory bus shared by any number of nodes
//! - [`RelayTransport`] - socketcand network relay over TCP
//! - `DirectTransport` - Linux SocketCAN (`socketcan` feature)
//!
//! A [`Connector`] acquires a transport when the session starts.
//! [`TransportConfig`] is the configuration-driven connector.
//!
//! # Example
//!
//! ```
//! use sib_client::transport::{CanTransport, Connector, VirtualBus};
//! use bytes::Bytes;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sib_client::Result<()> {
//! let bus = VirtualBus::new();
//! let node = bus.connect().await?;
//! node.transmit(0x1000_0072, Bytes::from_static(b"\x01")).await?;
//! assert_eq!(bus.history().len(), 1);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::{InterfaceKind, TransportConfig};
use crate::error::Result;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
mod direct;
mod relay;
mod virtual_bus;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use direct::DirectTransport;
pub use relay::{RelayBuffer, RelayMessage, RelayTransport};
pub use virtual_bus::{VirtualBus, VirtualConnector, VirtualTransport, DEFAULT_HISTORY_LIMIT};

/// Boxed future returned by transport operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback invoked once per received frame with `(arbitration id, payload)`.
pub type ReceiveCallback = Arc<dyn Fn(u32, Bytes) + Send + Sync>;

/// A CAN bus capability carrying 29-bit extended frames.
pub trait CanTransport: Send + Sync + 'static {
    /// Transmit one extended-format frame.
    fn transmit(&self, arbitration_id: u32, payload: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Register a handler invoked once per received frame.
    fn on_receive(&self, callback: ReceiveCallback) -> Result<()>;

    /// Release underlying resources. Receive callbacks are dropped.
    fn shutdown(&self) -> BoxFuture<'_, Result<()>>;
}

/// Acquires a transport when a session starts.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, Result<Arc<dyn CanTransport>>>;
}

impl Connector for TransportConfig {
    fn connect(&self) -> BoxFuture<'_, Result<Arc<dyn CanTransport>>> {
        Box::pin(connect(self))
    }
}

/// Acquire the transport described by `config`.
///
/// # Errors
///
/// Returns `TransportUnavailable` if a required parameter is missing or the
/// underlying interface cannot be opened.
pub async fn connect(config: &TransportConfig) -> Result<Arc<dyn CanTransport>> {
    config.validate()?;
    match config.interface {
        InterfaceKind::NetworkRelay => {
            let (host, port) = config.relay_endpoint()?;
            tracing::info!(
                "Attempting to initialize socketcand relay at {}:{} on channel {}",
                host,
                port,
                config.channel
            );
            let transport =
                RelayTransport::connect(host, port, &config.channel, config.receive_own_messages)
                    .await?;
            Ok(Arc::new(transport))
        }
        InterfaceKind::Direct => connect_direct(config),
    }
}

#[cfg(all(target_os = "linux", feature = "socketcan"))]
fn connect_direct(config: &TransportConfig) -> Result<Arc<dyn CanTransport>> {
    tracing::info!(
        "Attempting to initialize SocketCAN interface {} (bitrate {:?})",
        config.channel,
        config.bitrate
    );
    let transport = DirectTransport::open(&config.channel, config.receive_own_messages)?;
    Ok(Arc::new(transport))
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
fn connect_direct(config: &TransportConfig) -> Result<Arc<dyn CanTransport>> {
    Err(crate::error::SibError::TransportUnavailable(format!(
        "direct interface {} requires the `socketcan` feature on Linux",
        config.channel
    )))
}

/// Receive callbacks registered on one transport.
#[derive(Clone, Default)]
pub(crate) struct Receivers(Arc<Mutex<Vec<ReceiveCallback>>>);

impl Receivers {
    pub(crate) fn add(&self, callback: ReceiveCallback) {
        self.0.lock().push(callback);
    }

    /// Invoke every callback. The lock is released before calling out.
    pub(crate) fn dispatch(&self, arbitration_id: u32, payload: &Bytes) {
        let callbacks = self.0.lock().clone();
        for callback in callbacks {
            callback(arbitration_id, payload.clone());
        }
    }

    pub(crate) fn clear(&self) {
        self.0.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SibError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_connect_relay_without_host_is_unavailable() {
        let mut config = TransportConfig::network_relay("can0", "localhost", "29536");
        config.host = None;

        let result = connect(&config).await;
        assert!(matches!(result, Err(SibError::TransportUnavailable(_))));
    }

    #[tokio::test]
    async fn test_connect_direct_without_bitrate_is_unavailable() {
        let mut config = TransportConfig::direct("can0", 500_000);
        config.bitrate = None;

        let result = config.connect().await;
        assert!(matches!(result, Err(SibError::TransportUnavailable(_))));
    }

    #[tokio::test]
    async fn test_connect_relay_refused_is_unavailable() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = TransportConfig::network_relay("can0", "127.0.0.1", port.to_string());
        let result = connect(&config).await;
        assert!(matches!(result, Err(SibError::TransportUnavailable(_))));
    }

    #[test]
    fn test_receivers_dispatch_to_all() {
        let receivers = Receivers::default();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            receivers.add(Arc::new(move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        receivers.dispatch(1, &Bytes::new());
        assert_eq!(count.load(Ordering::SeqCst), 3);

        receivers.clear();
        receivers.dispatch(1, &Bytes::new());
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(receivers.len(), 0);
    }
}
