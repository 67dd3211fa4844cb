use crate::domain::market::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The observer is gone and should be dropped from the registry.
    Closed,
}

/// Receiver of feed snapshots. Each call gets its own copy.
pub trait Observer: Send + Sync {
    fn deliver(&self, snapshot: Snapshot) -> Delivery;
}

impl Observer for mpsc::UnboundedSender<Snapshot> {
    fn deliver(&self, snapshot: Snapshot) -> Delivery {
        match self.send(snapshot) {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Closed,
        }
    }
}

/// Latest-value observer: receivers only ever see the most recent snapshot.
impl Observer for watch::Sender<Option<Snapshot>> {
    fn deliver(&self, snapshot: Snapshot) -> Delivery {
        match self.send(Some(snapshot)) {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Closed,
        }
    }
}

/// Adapts a closure into an [`Observer`].
pub struct FnObserver<F>(pub F);

impl<F> Observer for FnObserver<F>
where
    F: Fn(Snapshot) + Send + Sync,
{
    fn deliver(&self, snapshot: Snapshot) -> Delivery {
        (self.0)(snapshot);
        Delivery::Delivered
    }
}

/// Observer registry. Iteration order is registration order because ids are
/// handed out monotonically.
#[derive(Default)]
pub struct Publisher {
    next_id: u64,
    observers: BTreeMap<SubscriptionId, Box<dyn Observer>>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Registers `observer` and immediately hands it `current`, so a new
    /// subscriber always starts with data.
    pub fn subscribe(&mut self, observer: Box<dyn Observer>, current: Snapshot) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);

        match observer.deliver(current) {
            Delivery::Delivered => {
                self.observers.insert(id, observer);
                tracing::debug!(%id, subscribers = self.observers.len(), "observer subscribed");
            }
            Delivery::Closed => {
                tracing::debug!(%id, "observer closed before first delivery; not registered");
            }
        }
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let removed = self.observers.remove(&id).is_some();
        if removed {
            tracing::debug!(%id, subscribers = self.observers.len(), "observer unsubscribed");
        }
        removed
    }

    /// Delivers a copy of `snapshot` to every observer. Closed observers are
    /// pruned. Returns the number of successful deliveries.
    pub fn notify(&mut self, snapshot: &Snapshot) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, observer) in &self.observers {
            match observer.deliver(snapshot.clone()) {
                Delivery::Delivered => delivered += 1,
                Delivery::Closed => closed.push(*id),
            }
        }

        for id in closed {
            self.observers.remove(&id);
            tracing::debug!(%id, "pruned closed observer");
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::Instrument;
    use crate::domain::market::FeedMode;
    use crate::feed::indices::derive_indices;
    use crate::time::nse_market::MarketSession;
    use std::sync::{Arc, Mutex};

    fn snapshot(sequence: u64) -> Snapshot {
        let instruments = vec![Instrument::priced("RELIANCE", "Reliance Industries Ltd", 2900.0)];
        Snapshot {
            sequence,
            taken_at: chrono::Utc::now(),
            mode: FeedMode::Simulated,
            session: MarketSession::Open,
            indices: derive_indices(&instruments),
            instruments,
        }
    }

    #[test]
    fn subscribe_delivers_current_snapshot_immediately() {
        let mut publisher = Publisher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        publisher.subscribe(Box::new(tx), snapshot(0));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(publisher.len(), 1);
    }

    #[test]
    fn notify_runs_in_registration_order() {
        let mut publisher = Publisher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            publisher.subscribe(
                Box::new(FnObserver(move |s: Snapshot| {
                    seen.lock().unwrap().push((name, s.sequence));
                })),
                snapshot(0),
            );
        }
        seen.lock().unwrap().clear();

        assert_eq!(publisher.notify(&snapshot(1)), 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("a", 1), ("b", 1), ("c", 1)]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut publisher = Publisher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = publisher.subscribe(Box::new(tx), snapshot(0));
        let _ = rx.try_recv();

        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        assert_eq!(publisher.notify(&snapshot(1)), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_observers_are_pruned() {
        let mut publisher = Publisher::new();
        let (tx, rx) = mpsc::unbounded_channel();
        publisher.subscribe(Box::new(tx), snapshot(0));
        drop(rx);

        assert_eq!(publisher.notify(&snapshot(1)), 0);
        assert!(publisher.is_empty());
    }

    #[test]
    fn observers_receive_independent_copies() {
        let mut publisher = Publisher::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        publisher.subscribe(Box::new(tx1), snapshot(0));
        publisher.subscribe(Box::new(tx2), snapshot(0));

        let mut a = rx1.try_recv().unwrap();
        a.instruments[0].price = 0.0;
        let b = rx2.try_recv().unwrap();
        assert_eq!(b.instruments[0].price, 2900.0);
    }

    #[test]
    fn watch_observer_keeps_latest() {
        let mut publisher = Publisher::new();
        let (tx, rx) = watch::channel(None);
        publisher.subscribe(Box::new(tx), snapshot(0));
        publisher.notify(&snapshot(1));
        publisher.notify(&snapshot(2));

        assert_eq!(rx.borrow().as_ref().map(|s| s.sequence), Some(2));
    }
}
