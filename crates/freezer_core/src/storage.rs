//! SQLite backend: connection configuration and per-thread sessions.
//!
//! Every thread that touches a store gets its own connection, created
//! lazily and cached until thread exit. WAL journaling permits concurrent
//! readers alongside the single writer without sharing handles across
//! threads. The per-thread session record also carries the transaction
//! coordinator's state: nesting depth, the queued changes, the
//! pre-transaction snapshot, and the in-flight transaction id.

use crate::changes::PendingChange;
use crate::config::Config;
use crate::error::StoreResult;
use crate::snapshot::Database;
use crate::store::StoreInner;
use crate::types::TxId;
use rusqlite::{Connection, OpenFlags};
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS data(\
    row_id INTEGER PRIMARY KEY AUTOINCREMENT,\
    entity_id TEXT NOT NULL,\
    key TEXT NOT NULL,\
    value BLOB,\
    tx_id INTEGER NOT NULL);\
CREATE INDEX IF NOT EXISTS lookup ON data(entity_id, key, tx_id);";

/// Opens and configures a connection to the backing file.
///
/// The coordinator serializes access, so SQLite's internal mutex is
/// disabled. Each connection gets WAL journaling, `synchronous = NORMAL`,
/// a sized statement cache, and the configured busy timeout, then ensures
/// the tuple table and its lookup index exist.
pub(crate) fn open_connection(path: &str, config: &Config) -> StoreResult<Connection> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_PRIVATE_CACHE
        | OpenFlags::SQLITE_OPEN_URI;
    if config.create_if_missing {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }

    let conn = Connection::open_with_flags(path, flags)?;
    conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
    conn.busy_timeout(config.busy_timeout)?;

    // journal_mode reports the resulting mode as a result row; in-memory
    // databases stay on their "memory" journal.
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "legacy_file_format", 0)?;

    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// Per-thread session for one store.
pub(crate) struct Session {
    /// This thread's connection.
    pub(crate) conn: Connection,
    /// Active transaction depth.
    pub(crate) depth: u32,
    /// In-flight transaction id; present only inside a write.
    pub(crate) txid: Option<TxId>,
    /// Head pinned at the outermost open, seen by all nested blocks.
    pub(crate) pinned_head: TxId,
    /// Set when any nested block fails; forces rollback at top-level exit.
    pub(crate) rolled_back: bool,
    /// Changes queued by the write block, published after commit.
    pub(crate) queue: Vec<PendingChange>,
    /// Snapshot taken before the outermost write opened.
    pub(crate) previous: Option<Database>,
}

impl Session {
    fn new(conn: Connection) -> Self {
        Self {
            conn,
            depth: 0,
            txid: None,
            pinned_head: TxId::NONE,
            rolled_back: false,
            queue: Vec::new(),
            previous: None,
        }
    }

    /// Whether any transaction is open on this thread.
    pub(crate) fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Whether the open transaction is a write.
    pub(crate) fn in_write(&self) -> bool {
        self.txid.is_some()
    }

    /// Clears all transaction state after a top-level commit or rollback.
    pub(crate) fn reset(&mut self) {
        self.depth = 0;
        self.txid = None;
        self.pinned_head = TxId::NONE;
        self.rolled_back = false;
        self.queue.clear();
        self.previous = None;
    }
}

thread_local! {
    /// Sessions keyed by store id; dropped at thread exit.
    static SESSIONS: RefCell<HashMap<u64, Session>> = RefCell::new(HashMap::new());
}

/// Runs `f` with this thread's session for the store, creating the
/// session (and its connection) on first use.
///
/// The session borrow must not be held across calls that re-enter the
/// registry; callers keep `f` free of snapshot reads and coordinator
/// calls, and release the borrow between steps instead.
pub(crate) fn with_session<T>(
    inner: &Arc<StoreInner>,
    f: impl FnOnce(&mut Session) -> StoreResult<T>,
) -> StoreResult<T> {
    SESSIONS.with(|cell| {
        let mut sessions = cell.borrow_mut();
        let session = match sessions.entry(inner.id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let conn = open_connection(&inner.path, &inner.config)?;
                entry.insert(Session::new(conn))
            }
        };
        f(session)
    })
}
