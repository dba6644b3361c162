//! In-memory CAN bus.
//!
//! Every node connected to a [`VirtualBus`] receives the frames transmitted
//! by every other node, in transmit order. A node also sees its own frames
//! when created with `receive_own_messages`. The bus keeps a bounded
//! transmit history and can be taken offline to make transmits fail.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::{BoxFuture, CanTransport, Connector, ReceiveCallback, Receivers};
use crate::error::{Result, SibError};
use crate::protocol::Frame;

/// Transmitted frames kept by [`VirtualBus::new`]. Older ones are dropped.
pub const DEFAULT_HISTORY_LIMIT: usize = 4096;

#[derive(Default)]
struct BusInner {
    nodes: Mutex<Vec<Arc<Node>>>,
    history: Mutex<VecDeque<(u32, Bytes)>>,
    history_limit: usize,
    offline: AtomicBool,
    next_node_id: AtomicUsize,
    shutdowns: AtomicUsize,
}

struct Node {
    id: usize,
    receivers: Receivers,
    receive_own_messages: bool,
}

/// Shared handle to an in-memory bus. Clones refer to the same bus.
#[derive(Clone)]
pub struct VirtualBus {
    inner: Arc<BusInner>,
}

impl VirtualBus {
    /// Create an empty bus keeping the last [`DEFAULT_HISTORY_LIMIT`] frames.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create an empty bus keeping at most `limit` transmitted frames.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                history_limit: limit,
                ..BusInner::default()
            }),
        }
    }

    /// Attach a new node.
    pub fn node(&self, receive_own_messages: bool) -> VirtualTransport {
        let node = Arc::new(Node {
            id: self.inner.next_node_id.fetch_add(1, Ordering::Relaxed),
            receivers: Receivers::default(),
            receive_own_messages,
        });
        self.inner.nodes.lock().push(node.clone());
        VirtualTransport {
            bus: self.inner.clone(),
            node,
            closed: AtomicBool::new(false),
        }
    }

    /// Connector that attaches a node per `connect()` call.
    pub fn connector(&self, receive_own_messages: bool) -> VirtualConnector {
        VirtualConnector {
            bus: self.clone(),
            receive_own_messages,
        }
    }

    /// Deliver a frame to every node as if sent by an outside device.
    ///
    /// Injected frames are not recorded in the history.
    pub fn inject(&self, arbitration_id: u32, payload: Bytes) {
        let nodes = self.inner.nodes.lock().clone();
        for node in nodes {
            node.receivers.dispatch(arbitration_id, &payload);
        }
    }

    /// Deliver a frame built with the codec.
    pub fn inject_frame(&self, frame: &Frame) -> Result<()> {
        let (id, payload) = frame.encode()?;
        self.inject(id, payload);
        Ok(())
    }

    /// Frames successfully transmitted on the bus, oldest first. Only the
    /// most recent ones up to the history limit are kept.
    pub fn history(&self) -> Vec<(u32, Bytes)> {
        self.inner.history.lock().iter().cloned().collect()
    }

    /// Transmitted frames decoded with the codec. Undecodable ones are skipped.
    pub fn frames(&self) -> Vec<Frame> {
        self.inner
            .history
            .lock()
            .iter()
            .filter_map(|(id, payload)| Frame::decode(*id, payload).ok())
            .collect()
    }

    pub fn clear_history(&self) {
        self.inner.history.lock().clear();
    }

    /// While offline every transmit fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::Release);
    }

    /// Number of attached nodes.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.lock().len()
    }

    /// Number of node shutdowns performed on this bus.
    pub fn shutdown_count(&self) -> usize {
        self.inner.shutdowns.load(Ordering::Acquire)
    }
}

impl Default for VirtualBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for VirtualBus {
    fn connect(&self) -> BoxFuture<'_, Result<Arc<dyn CanTransport>>> {
        let node: Arc<dyn CanTransport> = Arc::new(self.node(false));
        Box::pin(async move { Ok(node) })
    }
}

/// Connector attaching nodes with a fixed echo setting.
#[derive(Clone)]
pub struct VirtualConnector {
    bus: VirtualBus,
    receive_own_messages: bool,
}

impl Connector for VirtualConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Arc<dyn CanTransport>>> {
        let node: Arc<dyn CanTransport> = Arc::new(self.bus.node(self.receive_own_messages));
        Box::pin(async move { Ok(node) })
    }
}

/// One node on a [`VirtualBus`].
pub struct VirtualTransport {
    bus: Arc<BusInner>,
    node: Arc<Node>,
    closed: AtomicBool,
}

impl VirtualTransport {
    fn transmit_now(&self, arbitration_id: u32, payload: Bytes) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SibError::Transport("transport has been shut down".to_string()));
        }
        if self.bus.offline.load(Ordering::Acquire) {
            return Err(SibError::Transport("virtual bus is offline".to_string()));
        }

        {
            let mut history = self.bus.history.lock();
            if self.bus.history_limit > 0 {
                if history.len() == self.bus.history_limit {
                    history.pop_front();
                }
                history.push_back((arbitration_id, payload.clone()));
            }
        }

        let nodes = self.bus.nodes.lock().clone();
        for node in nodes {
            if node.id == self.node.id && !node.receive_own_messages {
                continue;
            }
            node.receivers.dispatch(arbitration_id, &payload);
        }
        Ok(())
    }
}

impl CanTransport for VirtualTransport {
    fn transmit(&self, arbitration_id: u32, payload: Bytes) -> BoxFuture<'_, Result<()>> {
        let result = self.transmit_now(arbitration_id, payload);
        Box::pin(async move { result })
    }

    fn on_receive(&self, callback: ReceiveCallback) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SibError::Transport("transport has been shut down".to_string()));
        }
        self.node.receivers.add(callback);
        Ok(())
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<()>> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.node.receivers.clear();
            self.bus.nodes.lock().retain(|n| n.id != self.node.id);
            self.bus.shutdowns.fetch_add(1, Ordering::AcqRel);
        }
        Box::pin(async { Ok(()) })
    }
}
