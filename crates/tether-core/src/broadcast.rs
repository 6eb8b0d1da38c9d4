//! Status fan-out to observers

use std::sync::RwLock;
use tether_api::SessionSnapshot;
use tokio::sync::broadcast;
use tracing::debug;

/// Pushes session snapshots to every subscribed observer.
///
/// Each observer has a ring of `capacity` snapshots. Publishing never waits;
/// an observer that falls behind loses its oldest snapshots and continues
/// from the newest retained one.
pub struct StatusBroadcaster {
    tx: broadcast::Sender<SessionSnapshot>,
    latest: RwLock<SessionSnapshot>,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize, initial: SessionSnapshot) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            latest: RwLock::new(initial),
        }
    }

    /// Send a snapshot to all observers and remember it as the latest
    pub fn publish(&self, snapshot: SessionSnapshot) {
        match self.latest.write() {
            Ok(mut latest) => *latest = snapshot.clone(),
            Err(poisoned) => *poisoned.into_inner() = snapshot.clone(),
        }

        // Err only means nobody is listening
        let delivered = self.tx.send(snapshot).unwrap_or(0);
        debug!(observers = delivered, "Status published");
    }

    /// Last published snapshot
    pub fn current(&self) -> SessionSnapshot {
        match self.latest.read() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn subscribe(&self) -> StatusObserver {
        StatusObserver {
            rx: self.tx.subscribe(),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One observer's view of the status stream. Dropping it unsubscribes.
pub struct StatusObserver {
    rx: broadcast::Receiver<SessionSnapshot>,
}

impl StatusObserver {
    /// Wait for the next snapshot. `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<SessionSnapshot> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Observer lagged, dropping oldest snapshots");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next snapshot if one is already queued
    pub fn try_recv(&mut self) -> Option<SessionSnapshot> {
        loop {
            match self.rx.try_recv() {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "Observer lagged, dropping oldest snapshots");
                }
                Err(_) => return None,
            }
        }
    }
}
