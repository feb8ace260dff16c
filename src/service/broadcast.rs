//! Periodic fan-out of pending outbound entity values.
//!
//! Each tick drains the outbound registry, encodes it into as many frames as
//! the records need and queues them on every active connection
//! concurrently. A failed or slow connection is asked to close; the others
//! are unaffected.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;

use crate::codec;
use crate::domain::{ConnectionTable, EntityRegistry, Outbound};
use crate::error::LinkError;

/// Result of one scheduler cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No active connection; the registry was left untouched.
    NoConnections,
    /// No pending value, or none that could be encoded.
    NothingToSend,
    /// Frames were fanned out.
    Sent {
        /// Frames the snapshot was split into.
        frames: usize,
        /// Connections every frame was queued on.
        delivered: usize,
        /// Connections whose send failed and that were asked to close.
        failed: usize,
    },
}

/// Shortest tick period; a zero interval is raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Drives the periodic broadcast of the outbound registry.
#[derive(Debug, Clone)]
pub struct BroadcastScheduler {
    registry: Arc<EntityRegistry>,
    connections: Arc<ConnectionTable>,
    interval: Duration,
    send_timeout: Duration,
}

impl BroadcastScheduler {
    /// Creates a scheduler over `registry` and `connections`.
    ///
    /// `interval` is raised to [`MIN_INTERVAL`] if shorter.
    #[must_use]
    pub fn new(
        registry: Arc<EntityRegistry>,
        connections: Arc<ConnectionTable>,
        interval: Duration,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            connections,
            interval: interval.max(MIN_INTERVAL),
            send_timeout,
        }
    }

    /// Runs one cycle: snapshot, encode, fan out.
    ///
    /// Entries that cannot be encoded are logged and dropped; the rest of
    /// the snapshot is still sent.
    pub async fn tick(&self) -> TickOutcome {
        let targets = self.connections.active().await;
        if targets.is_empty() {
            return TickOutcome::NoConnections;
        }

        let snapshot = self.registry.snapshot_and_clear().await;
        if snapshot.is_empty() {
            return TickOutcome::NothingToSend;
        }

        let batch = codec::encode_batch(&snapshot);
        for (entity, err) in &batch.rejected {
            tracing::warn!(%entity, error = %err, "dropping unencodable value");
        }
        if batch.is_empty() {
            return TickOutcome::NothingToSend;
        }

        let frames = &batch.frames;
        let sends = targets.iter().map(|handle| async move {
            for frame in frames {
                handle
                    .send(Outbound::Binary(frame.clone()), self.send_timeout)
                    .await?;
            }
            Ok::<(), LinkError>(())
        });
        let results = join_all(sends).await;

        let mut failed = 0;
        for (handle, result) in targets.iter().zip(results) {
            if let Err(err) = result {
                failed += 1;
                tracing::debug!(conn_id = %handle.id(), error = %err, "broadcast send failed");
                handle.request_close();
            }
        }

        TickOutcome::Sent {
            frames: frames.len(),
            delivered: targets.len() - failed,
            failed,
        }
    }

    /// Ticks every `interval` until `shutdown` flips to `true` or its sender
    /// is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_ms = self.interval.as_millis(), "broadcast scheduler started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            if let TickOutcome::Sent {
                frames,
                delivered,
                failed,
            } = self.tick().await
            {
                tracing::trace!(frames, delivered, failed, "snapshot broadcast");
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("broadcast scheduler stopped");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;

    use tokio::sync::mpsc;

    use super::*;
    use crate::codec::UnknownEntityPolicy;
    use crate::domain::{ConnectionHandle, EntityValue};

    const TIMEOUT: Duration = Duration::from_millis(50);

    async fn make_scheduler() -> (BroadcastScheduler, Arc<EntityRegistry>, Arc<ConnectionTable>) {
        let registry = Arc::new(EntityRegistry::new());
        let Ok(_) = registry.define("temp", 1, &["int16"]).await else {
            panic!("define failed");
        };
        let Ok(_) = registry.define("label", 2, &["str", "uint8"]).await else {
            panic!("define failed");
        };
        let connections = Arc::new(ConnectionTable::default());
        let scheduler = BroadcastScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&connections),
            Duration::from_millis(5),
            TIMEOUT,
        );
        (scheduler, registry, connections)
    }

    async fn connect(
        table: &ConnectionTable,
        capacity: usize,
    ) -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let Ok(handle) = table
            .register(SocketAddr::from(([127, 0, 0, 1], 7000)), tx)
            .await
        else {
            panic!("register failed");
        };
        handle.activate();
        (handle, rx)
    }

    #[tokio::test]
    async fn zero_clients_sends_nothing_and_keeps_values() {
        let (scheduler, registry, _) = make_scheduler().await;
        let _ = registry.set_value("temp", 1).await;

        let outcome = scheduler.tick().await;
        assert_eq!(outcome, TickOutcome::NoConnections);
        assert!(registry.get_value("temp").await.ok().flatten().is_some());
    }

    #[tokio::test]
    async fn empty_registry_sends_nothing() {
        let (scheduler, _, connections) = make_scheduler().await;
        let (_handle, mut rx) = connect(&connections, 4).await;

        let outcome = scheduler.tick().await;
        assert_eq!(outcome, TickOutcome::NothingToSend);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn frame_reaches_every_active_connection() {
        let (scheduler, registry, connections) = make_scheduler().await;
        let (_a, mut rx_a) = connect(&connections, 4).await;
        let (_b, mut rx_b) = connect(&connections, 4).await;
        let _ = registry.set_value("temp", -5).await;
        let _ = registry.set_value("label", "ok").await;

        let outcome = scheduler.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Sent {
                frames: 1,
                delivered: 2,
                failed: 0
            }
        );

        let expected = [0xA0, 0x07, 0x01, 0x01, 0xFF, 0xFB, 0x02, 0x02, 0x6F, 0x6B, 0xA1];
        for rx in [&mut rx_a, &mut rx_b] {
            let Ok(Outbound::Binary(frame)) = rx.try_recv() else {
                panic!("expected a binary frame");
            };
            assert_eq!(frame.as_ref(), &expected);
        }

        // Values were drained by the tick.
        assert_eq!(scheduler.tick().await, TickOutcome::NothingToSend);
    }

    #[tokio::test]
    async fn connecting_handles_are_skipped() {
        let (scheduler, registry, connections) = make_scheduler().await;
        let (tx, mut rx) = mpsc::channel(4);
        let Ok(_pending) = connections
            .register(SocketAddr::from(([127, 0, 0, 1], 7001)), tx)
            .await
        else {
            panic!("register failed");
        };
        let _ = registry.set_value("temp", 3).await;

        assert_eq!(scheduler.tick().await, TickOutcome::NoConnections);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broken_connection_does_not_block_others() {
        let (scheduler, registry, connections) = make_scheduler().await;
        let (broken, broken_rx) = connect(&connections, 4).await;
        drop(broken_rx);
        let (stalled, _stalled_rx) = connect(&connections, 1).await;
        let _ = stalled
            .send(Outbound::Text("fill".to_string()), TIMEOUT)
            .await;
        let (_healthy, mut healthy_rx) = connect(&connections, 4).await;

        let _ = registry.set_value("temp", 9).await;
        let outcome = scheduler.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Sent {
                frames: 1,
                delivered: 1,
                failed: 2
            }
        );

        assert!(matches!(healthy_rx.try_recv(), Ok(Outbound::Binary(_))));
        assert!(broken.close_signal().is_requested());
        assert!(stalled.close_signal().is_requested());
    }

    #[tokio::test]
    async fn out_of_range_value_does_not_drop_its_siblings() {
        let (scheduler, registry, connections) = make_scheduler().await;
        let Ok(_) = registry.define("hum", 3, &["uint8"]).await else {
            panic!("define failed");
        };
        let (_handle, mut rx) = connect(&connections, 4).await;
        let _ = registry.set_value("temp", 21).await;
        let _ = registry.set_value("hum", 1000).await;

        let outcome = scheduler.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Sent {
                frames: 1,
                delivered: 1,
                failed: 0
            }
        );

        let Ok(Outbound::Binary(frame)) = rx.try_recv() else {
            panic!("expected a binary frame");
        };
        assert_eq!(frame.as_ref(), &[0xA0, 0x03, 0x14, 0x01, 0x00, 0x15, 0xA1]);
        assert!(registry.get_value("hum").await.ok().flatten().is_none());
    }

    #[tokio::test]
    async fn only_unencodable_values_send_nothing() {
        let (scheduler, registry, connections) = make_scheduler().await;
        let (_handle, mut rx) = connect(&connections, 4).await;
        let _ = registry.set_value("temp", 70_000).await;

        assert_eq!(scheduler.tick().await, TickOutcome::NothingToSend);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn large_snapshot_is_split_across_frames() {
        let registry = Arc::new(EntityRegistry::new());
        for id in 1..=60_u8 {
            let Ok(_) = registry.define(&format!("c{id}"), id, &["uint32"]).await else {
                panic!("define failed");
            };
        }
        let connections = Arc::new(ConnectionTable::default());
        let scheduler = BroadcastScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&connections),
            Duration::from_millis(5),
            TIMEOUT,
        );
        let (_handle, mut rx) = connect(&connections, 4).await;
        for id in 1..=60_u8 {
            let _ = registry.set_value(format!("c{id}"), i64::from(id) + 100_000).await;
        }

        let outcome = scheduler.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Sent {
                frames: 2,
                delivered: 1,
                failed: 0
            }
        );

        let mut received = HashMap::new();
        while let Ok(Outbound::Binary(frame)) = rx.try_recv() {
            let Ok(decoded) = registry.decode(&frame, UnknownEntityPolicy::Reject).await else {
                panic!("broadcast frame should decode");
            };
            received.extend(decoded.to_named());
        }
        assert_eq!(received.len(), 60);
        for id in 1..=60_u8 {
            assert_eq!(
                received.get(&format!("c{id}")),
                Some(&EntityValue::Numbers(vec![i64::from(id) + 100_000]))
            );
        }
    }

    #[test]
    fn zero_interval_is_raised_to_minimum() {
        let scheduler = BroadcastScheduler::new(
            Arc::new(EntityRegistry::new()),
            Arc::new(ConnectionTable::default()),
            Duration::ZERO,
            TIMEOUT,
        );
        assert_eq!(scheduler.interval, MIN_INTERVAL);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (scheduler, _, _) = make_scheduler().await;
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(scheduler.run(rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = tx.send(true);

        let joined = tokio::time::timeout(Duration::from_millis(200), task).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }
}
