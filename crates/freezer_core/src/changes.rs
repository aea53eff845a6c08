//! Change stream for observing committed transactions.
//!
//! Every commit whose write block queued changes produces exactly one
//! batch, delivered to all subscribers in commit order. Delivery is
//! serialized onto one dedicated scheduler thread, so subscribers — and
//! the per-entity derived feed's initial read — observe a total order
//! consistent with commit order.
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = Store::open_in_memory()?;
//! let receiver = store.changes();
//!
//! std::thread::spawn(move || {
//!     while let Ok(batch) = receiver.recv() {
//!         for change in batch {
//!             println!("{:?} {}/{}", change.kind, change.entity_id, change.attribute);
//!         }
//!     }
//! });
//! ```

use crate::snapshot::{Database, EntityAttributes};
use crate::store::{self, StoreInner};
use freezer_codec::Value;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::warn;

/// Direction of a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A value was added.
    Add,
    /// A value or attribute was removed.
    Remove,
}

/// One committed change, visible to subscribers post-commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Whether the value was added or removed.
    pub kind: ChangeKind,
    /// Entity the change applies to.
    pub entity_id: String,
    /// Attribute the change applies to.
    pub attribute: String,
    /// The added value, the removed element, or null for a whole-attribute
    /// removal and for the synthetic initial change of a per-entity feed.
    pub delta: Value,
    /// Snapshot from before the committing transaction.
    pub previous: Database,
    /// Snapshot pinned at the committing transaction.
    pub changed: Database,
}

/// A change queued by a write block, before the commit attaches its
/// snapshots.
#[derive(Debug, Clone)]
pub(crate) struct PendingChange {
    pub(crate) kind: ChangeKind,
    pub(crate) entity_id: String,
    pub(crate) attribute: String,
    pub(crate) delta: Value,
}

/// Work items for the scheduler thread.
pub(crate) enum Task {
    /// A committed batch to broadcast.
    Publish {
        previous: Database,
        changed: Database,
        records: Vec<PendingChange>,
    },
    /// Register a whole-stream subscriber.
    Subscribe { sender: Sender<Vec<Change>> },
    /// Register a per-entity subscriber; the initial element is read and
    /// emitted on the scheduler so no commit can slip in between.
    SubscribeEntity {
        entity_id: String,
        sender: Sender<Vec<(EntityAttributes, Change)>>,
    },
    /// Stop the scheduler; subscribers disconnect.
    Shutdown,
}

/// Spawns the dedicated scheduler thread for one store.
///
/// The thread holds only a weak reference to the store internals; it
/// exits on [`Task::Shutdown`] or when every task sender is gone.
pub(crate) fn spawn_scheduler(store: Weak<StoreInner>) -> Sender<Task> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || scheduler_loop(&store, &receiver));
    sender
}

/// Hands a committed batch to the scheduler.
///
/// Called with the store's commit lock held, which is what makes the
/// delivery order match the commit order. A failed handoff is dropped:
/// the commit already succeeded.
pub(crate) fn publish(
    inner: &Arc<StoreInner>,
    previous: Database,
    changed: Database,
    records: Vec<PendingChange>,
) {
    let sender = inner.scheduler.lock().clone();
    let task = Task::Publish {
        previous,
        changed,
        records,
    };
    if sender.send(task).is_err() {
        warn!("change scheduler is gone; dropping notification");
    }
}

fn scheduler_loop(store: &Weak<StoreInner>, receiver: &Receiver<Task>) {
    let mut broadcast: Vec<Sender<Vec<Change>>> = Vec::new();
    let mut per_entity: Vec<(String, Sender<Vec<(EntityAttributes, Change)>>)> = Vec::new();

    while let Ok(task) = receiver.recv() {
        match task {
            Task::Subscribe { sender } => broadcast.push(sender),
            Task::SubscribeEntity { entity_id, sender } => {
                if let Some(initial) = initial_element(store, &entity_id) {
                    if sender.send(initial).is_ok() {
                        per_entity.push((entity_id, sender));
                    }
                }
            }
            Task::Publish {
                previous,
                changed,
                records,
            } => {
                let batch: Vec<Change> = records
                    .into_iter()
                    .map(|record| Change {
                        kind: record.kind,
                        entity_id: record.entity_id,
                        attribute: record.attribute,
                        delta: record.delta,
                        previous: previous.clone(),
                        changed: changed.clone(),
                    })
                    .collect();

                broadcast.retain(|sender| sender.send(batch.clone()).is_ok());

                per_entity.retain(|(entity_id, sender)| {
                    let filtered: Vec<Change> = batch
                        .iter()
                        .filter(|change| change.entity_id == *entity_id)
                        .cloned()
                        .collect();
                    if filtered.is_empty() {
                        return true;
                    }
                    match changed.get(entity_id) {
                        Ok(attributes) => {
                            let items = filtered
                                .into_iter()
                                .map(|change| (attributes.clone(), change))
                                .collect();
                            sender.send(items).is_ok()
                        }
                        Err(e) => {
                            warn!(entity = %entity_id, error = %e, "dropping change notification");
                            true
                        }
                    }
                });
            }
            Task::Shutdown => break,
        }
    }
}

/// Builds the immediate first element of a per-entity feed: the entity's
/// current attributes paired with a synthetic add change.
fn initial_element(
    store: &Weak<StoreInner>,
    entity_id: &str,
) -> Option<Vec<(EntityAttributes, Change)>> {
    let inner = store.upgrade()?;
    let db = match store::current_database(&inner) {
        Ok(db) => db,
        Err(e) => {
            warn!(entity = %entity_id, error = %e, "dropping initial change element");
            return None;
        }
    };
    let attributes = match db.get(entity_id) {
        Ok(attributes) => attributes,
        Err(e) => {
            warn!(entity = %entity_id, error = %e, "dropping initial change element");
            return None;
        }
    };
    let synthetic = Change {
        kind: ChangeKind::Add,
        entity_id: entity_id.to_string(),
        attribute: String::new(),
        delta: Value::Null,
        previous: db.clone(),
        changed: db,
    };
    Some(vec![(attributes, synthetic)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use freezer_codec::AttributeType;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn store_with_age() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .transactor()
            .add_attribute("age", AttributeType::Integer, false)
            .unwrap();
        store
    }

    #[test]
    fn commit_emits_one_batch() {
        let store = store_with_age();
        let receiver = store.changes();

        store
            .transactor()
            .add_value(&Value::Integer(42), "age", "alice")
            .unwrap();

        let batch = receiver.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind, ChangeKind::Add);
        assert_eq!(batch[0].entity_id, "alice");
        assert_eq!(batch[0].attribute, "age");
        assert_eq!(batch[0].delta, Value::Integer(42));
    }

    #[test]
    fn batches_arrive_in_commit_order() {
        let store = store_with_age();
        let receiver = store.changes();
        let transactor = store.transactor();

        for n in 1..=3 {
            transactor
                .add_value(&Value::Integer(n), "age", "alice")
                .unwrap();
        }

        let mut heads = Vec::new();
        for _ in 0..3 {
            let batch = receiver.recv_timeout(TIMEOUT).unwrap();
            heads.push(batch[0].changed.head_id());
        }
        assert!(heads.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn batch_carries_both_snapshots() {
        let store = store_with_age();
        let receiver = store.changes();

        store
            .transactor()
            .add_value(&Value::Integer(1), "age", "alice")
            .unwrap();

        let batch = receiver.recv_timeout(TIMEOUT).unwrap();
        let change = &batch[0];
        assert!(change.previous.head_id() < change.changed.head_id());
        assert!(change.previous.get("alice").unwrap().is_empty());
        assert!(!change.changed.get("alice").unwrap().is_empty());
    }

    #[test]
    fn schema_only_commit_emits_nothing() {
        let store = Store::open_in_memory().unwrap();
        let receiver = store.changes();

        store
            .transactor()
            .add_attribute("age", AttributeType::Integer, false)
            .unwrap();

        assert!(receiver.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn rolled_back_write_emits_nothing() {
        let store = store_with_age();
        let receiver = store.changes();
        let transactor = store.transactor();

        let result: crate::StoreResult<()> = store.write_transaction(|_, _| {
            transactor.add_value(&Value::Integer(1), "age", "alice")?;
            Err(crate::StoreError::schema("abort"))
        });
        assert!(result.is_err());

        assert!(receiver.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn dropped_subscriber_does_not_block_commits() {
        let store = store_with_age();
        let receiver = store.changes();
        drop(receiver);

        store
            .transactor()
            .add_value(&Value::Integer(1), "age", "alice")
            .unwrap();
    }

    #[test]
    fn stream_completes_when_store_dropped() {
        let store = store_with_age();
        let receiver = store.changes();
        drop(store);

        assert!(matches!(
            receiver.recv_timeout(TIMEOUT),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
    }
}
