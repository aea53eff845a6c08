//! Store facade and lifecycle.

use crate::changes::{self, Change, Task};
use crate::config::Config;
use crate::coordinator;
use crate::error::StoreResult;
use crate::lens::Lens;
use crate::log::{self, Tuple};
use crate::snapshot::{Database, EntityAttributes};
use crate::storage::{self, with_session};
use crate::transactor::Transactor;
use crate::types::TxId;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Marks the snapshot cache as holding no head.
const CACHE_INVALID: i64 = i64::MIN;

/// Allocates process-unique store ids for the per-thread session registry.
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Shared internals behind every store handle, snapshot, and transactor.
pub(crate) struct StoreInner {
    /// Key into the per-thread session registry.
    pub(crate) id: u64,
    /// Backing file path, or a shared-cache memory URI.
    pub(crate) path: String,
    /// Open-time options, applied to every per-thread connection.
    pub(crate) config: Config,
    /// Head of the memoized current snapshot; `CACHE_INVALID` until first
    /// read, refreshed at each commit.
    pub(crate) cached_head: AtomicI64,
    /// Serializes commit, cache refresh, and change publication.
    pub(crate) commit_lock: Mutex<()>,
    /// Handle to the change scheduler thread.
    pub(crate) scheduler: Mutex<Sender<Task>>,
    /// Keeps shared-cache in-memory databases alive for the store's
    /// lifetime; never used for queries.
    _anchor: Mutex<Connection>,
}

/// An embedded, append-only, transactional entity store.
///
/// A `Store` persists entity/attribute/value tuples in a local SQLite
/// file and exposes immutable snapshots indexed by a monotonically
/// increasing transaction id.
///
/// # Opening a store
///
/// ```rust,ignore
/// use freezer_core::Store;
///
/// let store = Store::open("my.freezer")?;
/// let transactor = store.transactor();
/// transactor.add_attribute("age", AttributeType::Integer, false)?;
/// transactor.add_value(&Value::Integer(42), "age", "alice")?;
///
/// let db = store.current_database()?;
/// assert!(db.get("alice")?.contains_key("age"));
/// ```
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Opens a store at the given path, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a store at the given path with custom configuration.
    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> StoreResult<Self> {
        let path = path.as_ref().to_string_lossy().into_owned();
        Self::new(path, config)
    }

    /// Opens a fresh in-memory store for testing.
    ///
    /// Backed by a uniquely named shared-cache memory database, so every
    /// thread's connection sees the same data. Contents are lost when the
    /// store and all its snapshots are dropped.
    pub fn open_in_memory() -> StoreResult<Self> {
        let path = format!("file:{}?mode=memory&cache=shared", Uuid::new_v4().simple());
        Self::new(path, Config::default())
    }

    fn new(path: String, config: Config) -> StoreResult<Self> {
        // The anchor connection both validates the configuration early and
        // pins shared-cache memory databases for the store's lifetime.
        let anchor = storage::open_connection(&path, &config)?;
        let inner = Arc::new_cyclic(|weak| StoreInner {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            path,
            config,
            cached_head: AtomicI64::new(CACHE_INVALID),
            commit_lock: Mutex::new(()),
            scheduler: Mutex::new(changes::spawn_scheduler(weak.clone())),
            _anchor: Mutex::new(anchor),
        });
        Ok(Self { inner })
    }

    /// Returns a transactor for appending tuples.
    #[must_use]
    pub fn transactor(&self) -> Transactor {
        Transactor::new(Arc::clone(&self.inner))
    }

    /// Returns the current snapshot.
    ///
    /// The head is memoized in a single atomic and refreshed at each
    /// commit; a store with no commits yields the empty snapshot with
    /// `head_id() == TxId::NONE`.
    pub fn current_database(&self) -> StoreResult<Database> {
        current_database(&self.inner)
    }

    /// Runs a block inside a read transaction.
    ///
    /// See the coordinator's nesting rules: read transactions nest freely
    /// inside reads and writes.
    pub fn read_transaction<T>(
        &self,
        block: impl FnOnce(&Database) -> StoreResult<T>,
    ) -> StoreResult<T> {
        coordinator::read_transaction(&self.inner, block)
    }

    /// Runs a block inside a write transaction.
    ///
    /// The block receives the snapshot pinned at the in-flight
    /// transaction id, and that id. Opening a write inside a read fails
    /// with a nesting error.
    pub fn write_transaction<T>(
        &self,
        block: impl FnOnce(&Database, TxId) -> StoreResult<T>,
    ) -> StoreResult<T> {
        coordinator::write_transaction(&self.inner, block)
    }

    /// Subscribes to committed change batches.
    ///
    /// Each commit that changed user data delivers exactly one non-empty
    /// batch, in commit order. The receiver disconnects when the store is
    /// dropped.
    #[must_use]
    pub fn changes(&self) -> Receiver<Vec<Change>> {
        let (sender, receiver) = mpsc::channel();
        self.send_task(Task::Subscribe { sender });
        receiver
    }

    /// Subscribes to one entity's values and changes.
    ///
    /// Immediately delivers the entity's current attributes paired with a
    /// synthetic add change, then every subsequent batch filtered to this
    /// entity id (compared by value), each record paired with the
    /// entity's attributes in the committed snapshot.
    #[must_use]
    pub fn values_and_changes_for(
        &self,
        entity_id: &str,
    ) -> Receiver<Vec<(EntityAttributes, Change)>> {
        let (sender, receiver) = mpsc::channel();
        self.send_task(Task::SubscribeEntity {
            entity_id: entity_id.to_string(),
            sender,
        });
        receiver
    }

    /// Returns a lens bound to one `(attribute, entity)` pair.
    #[must_use]
    pub fn lens(&self, attribute: &str, entity_id: &str) -> Lens {
        Lens::new(Arc::clone(&self.inner), attribute, entity_id)
    }

    /// Returns all tuples appended by one transaction, in insertion
    /// order. Inspection helper; a rolled-back id yields no tuples.
    pub fn tuples_at(&self, txid: TxId) -> StoreResult<Vec<Tuple>> {
        with_session(&self.inner, |s| log::enumerate_at(&s.conn, txid))
    }

    fn send_task(&self, task: Task) {
        if self.inner.scheduler.lock().send(task).is_err() {
            warn!("change scheduler is gone");
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Completes the change stream; queued batches are delivered first.
        let _ = self.inner.scheduler.lock().send(Task::Shutdown);
    }
}

/// Resolves the current snapshot, memoizing the head.
pub(crate) fn current_database(inner: &Arc<StoreInner>) -> StoreResult<Database> {
    let cached = inner.cached_head.load(Ordering::SeqCst);
    if cached != CACHE_INVALID {
        return Ok(Database::new(Arc::clone(inner), TxId::new(cached)));
    }
    let head = with_session(inner, |s| log::head(&s.conn))?.unwrap_or(TxId::NONE);
    // A commit may have stored a newer head since the read; only fill an
    // empty cache, never regress it.
    let _ = inner.cached_head.compare_exchange(
        CACHE_INVALID,
        head.as_i64(),
        Ordering::SeqCst,
        Ordering::SeqCst,
    );
    let current = inner.cached_head.load(Ordering::SeqCst);
    Ok(Database::new(Arc::clone(inner), TxId::new(current)))
}
