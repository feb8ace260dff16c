//! Per-peer connection identity, lifecycle state and outbound handle.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, mpsc};

use crate::error::LinkError;

/// Identifier of a connected peer, assigned sequentially from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable facts about a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Peer address.
    pub addr: SocketAddr,
    /// When the connection was accepted.
    pub connected_at: DateTime<Utc>,
}

/// Lifecycle of a connection: `Connecting → Active → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    /// Registered; device info not yet queued.
    Connecting = 0,
    /// Receiving broadcasts and commands.
    Active = 1,
    /// Terminal.
    Closed = 2,
}

impl ConnectionState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Active,
            _ => Self::Closed,
        }
    }
}

/// Message received from a peer, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Text command (`SET+...`, `DATA+...`).
    Text(String),
    /// Binary entity frame.
    Binary(Bytes),
}

/// Message queued for a peer, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON text (device info, response envelopes).
    Text(String),
    /// Encoded entity frame.
    Binary(Bytes),
}

/// Level-triggered close request shared by a connection's tasks.
#[derive(Debug, Clone, Default)]
pub struct CloseSignal {
    inner: Arc<CloseInner>,
}

#[derive(Debug, Default)]
struct CloseInner {
    requested: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    /// Requests the close. Idempotent.
    pub fn request(&self) {
        self.inner.requested.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Returns `true` once a close has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Completes once a close has been requested.
    pub async fn requested(&self) {
        let notified = self.inner.notify.notified();
        if self.is_requested() {
            return;
        }
        notified.await;
    }
}

#[derive(Debug)]
struct HandleInner {
    info: ConnectionInfo,
    state: AtomicU8,
    outbound: mpsc::Sender<Outbound>,
    close: CloseSignal,
}

/// Cheap, cloneable handle to one connection's outbound queue and state.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Creates a handle in the `Connecting` state.
    #[must_use]
    pub fn new(info: ConnectionInfo, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                info,
                state: AtomicU8::new(ConnectionState::Connecting as u8),
                outbound,
                close: CloseSignal::default(),
            }),
        }
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.info.id
    }

    /// Peer address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.inner.info.addr
    }

    /// Immutable connection facts.
    #[must_use]
    pub fn info(&self) -> &ConnectionInfo {
        &self.inner.info
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Returns `true` while the connection is `Active`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Moves `Connecting → Active`. Returns `false` if the connection is not
    /// `Connecting` any more.
    pub fn activate(&self) -> bool {
        self.inner
            .state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Moves to the terminal `Closed` state. Returns `false` if it was
    /// already closed.
    pub fn mark_closed(&self) -> bool {
        self.inner
            .state
            .swap(ConnectionState::Closed as u8, Ordering::AcqRel)
            != ConnectionState::Closed as u8
    }

    /// Queues `message`, waiting at most `timeout` for queue space.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ChannelClosed`] if the writer side is gone, or
    /// [`LinkError::SendTimeout`] if the queue stayed full for `timeout`.
    pub async fn send(&self, message: Outbound, timeout: Duration) -> Result<(), LinkError> {
        match tokio::time::timeout(timeout, self.inner.outbound.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(LinkError::ChannelClosed(self.id())),
            Err(_) => Err(LinkError::SendTimeout(self.id())),
        }
    }

    /// Asks the connection's receive loop to shut the connection down.
    pub fn request_close(&self) {
        self.inner.close.request();
    }

    /// Shared close signal, for tasks that must not keep the queue alive.
    #[must_use]
    pub fn close_signal(&self) -> CloseSignal {
        self.inner.close.clone()
    }
}
