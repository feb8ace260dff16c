//! Table of live connections.
//!
//! Inserts happen on accept, removals from each connection's own receive
//! loop, and iteration from the broadcast scheduler. Iteration always works
//! on a cloned snapshot so removals never disturb a fan-out in progress.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::{Notify, RwLock, mpsc};

use super::connection::{ConnectionHandle, ConnectionId, ConnectionInfo, Outbound};
use crate::error::LinkError;

/// How connections are identified and whether duplicates are allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPolicy {
    /// Sequential ids; any number of connections per address.
    #[default]
    Sequential,
    /// Sequential ids, but at most one live connection per peer IP.
    UniqueAddress,
}

impl FromStr for ConnectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "unique_address" | "unique-address" => Ok(Self::UniqueAddress),
            other => Err(format!("unknown connection policy '{other}'")),
        }
    }
}

/// Concurrent map of connection id → handle.
#[derive(Debug)]
pub struct ConnectionTable {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    next_id: AtomicU64,
    policy: ConnectionPolicy,
    drained: Notify,
}

impl ConnectionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(policy: ConnectionPolicy) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            policy,
            drained: Notify::new(),
        }
    }

    /// Identity policy in force.
    #[must_use]
    pub fn policy(&self) -> ConnectionPolicy {
        self.policy
    }

    /// Registers a new peer in the `Connecting` state.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionRejected`] under
    /// [`ConnectionPolicy::UniqueAddress`] when the peer's IP already has a
    /// live connection.
    pub async fn register(
        &self,
        addr: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<ConnectionHandle, LinkError> {
        let mut map = self.connections.write().await;

        if self.policy == ConnectionPolicy::UniqueAddress
            && map.values().any(|h| h.addr().ip() == addr.ip())
        {
            return Err(LinkError::ConnectionRejected(format!(
                "{} is already connected",
                addr.ip()
            )));
        }

        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = ConnectionHandle::new(
            ConnectionInfo {
                id,
                addr,
                connected_at: Utc::now(),
            },
            outbound,
        );
        map.insert(id, handle.clone());
        Ok(handle)
    }

    /// Removes a connection, returning its handle if it was still present.
    pub async fn remove(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let mut map = self.connections.write().await;
        let removed = map.remove(&id);
        if map.is_empty() {
            self.drained.notify_waiters();
        }
        removed
    }

    /// Clones every handle currently in the table.
    pub async fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Clones the handles that are `Active`.
    pub async fn active(&self) -> Vec<ConnectionHandle> {
        self.connections
            .read()
            .await
            .values()
            .filter(|h| h.is_active())
            .cloned()
            .collect()
    }

    /// Number of connections in any non-terminal state.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Completes once the table is empty.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.is_empty().await {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new(ConnectionPolicy::default())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 7], port))
    }

    #[tokio::test]
    async fn sequential_ids_allow_same_address() {
        let table = ConnectionTable::new(ConnectionPolicy::Sequential);
        let (tx, _rx) = mpsc::channel(1);

        let Ok(a) = table.register(peer(1000), tx.clone()).await else {
            panic!("first register failed");
        };
        let Ok(b) = table.register(peer(1000), tx).await else {
            panic!("second register failed");
        };
        assert_eq!(a.id(), ConnectionId::new(1));
        assert_eq!(b.id(), ConnectionId::new(2));
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test]
    async fn unique_address_rejects_duplicate_ip() {
        let table = ConnectionTable::new(ConnectionPolicy::UniqueAddress);
        let (tx, _rx) = mpsc::channel(1);

        let first = table.register(peer(1000), tx.clone()).await;
        assert!(first.is_ok());
        let second = table.register(peer(2000), tx.clone()).await;
        assert!(matches!(second, Err(LinkError::ConnectionRejected(_))));

        let Ok(first) = first else {
            panic!("first register failed");
        };
        let _ = table.remove(first.id()).await;
        assert!(table.register(peer(3000), tx).await.is_ok());
    }

    #[tokio::test]
    async fn active_filters_connecting_handles() {
        let table = ConnectionTable::default();
        let (tx, _rx) = mpsc::channel(1);
        let Ok(a) = table.register(peer(1), tx.clone()).await else {
            panic!("register failed");
        };
        let Ok(_b) = table.register(peer(2), tx).await else {
            panic!("register failed");
        };
        assert!(table.active().await.is_empty());

        a.activate();
        let active = table.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(table.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn snapshot_survives_concurrent_removal() {
        let table = ConnectionTable::default();
        let (tx, _rx) = mpsc::channel(1);
        let Ok(a) = table.register(peer(1), tx).await else {
            panic!("register failed");
        };
        let snapshot = table.snapshot().await;
        assert!(table.remove(a.id()).await.is_some());
        assert!(table.remove(a.id()).await.is_none());
        assert_eq!(snapshot.len(), 1);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn wait_drained_completes_after_last_removal() {
        let table = Arc::new(ConnectionTable::default());
        let (tx, _rx) = mpsc::channel(1);
        let Ok(a) = table.register(peer(1), tx).await else {
            panic!("register failed");
        };

        let waiter = {
            let table = Arc::clone(&table);
            tokio::spawn(async move { table.wait_drained().await })
        };
        tokio::task::yield_now().await;
        let _ = table.remove(a.id()).await;

        let joined = tokio::time::timeout(Duration::from_millis(200), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[test]
    fn policy_parses() {
        assert_eq!(
            "unique_address".parse::<ConnectionPolicy>(),
            Ok(ConnectionPolicy::UniqueAddress)
        );
        assert_eq!(
            "Sequential".parse::<ConnectionPolicy>(),
            Ok(ConnectionPolicy::Sequential)
        );
        assert!("by_ip".parse::<ConnectionPolicy>().is_err());
    }
}
