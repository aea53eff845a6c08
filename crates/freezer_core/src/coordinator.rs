//! Nested transaction coordination.
//!
//! Transactions nest by reference count, per thread. Only the outermost
//! open begins a DB-level transaction and only the outermost close
//! commits or rolls back; inner opens reuse the pinned head and, for
//! writes, the already-allocated transaction id. The first failing block
//! sets a sticky rollback flag, so a nested failure forces the top level
//! to roll back even when an outer block swallows the error.
//!
//! Per-thread state lives in the storage session registry:
//!
//! ```text
//!   IDLE ──open(first)──▶ OPEN(depth=1, txid=T, prev=S)
//!   OPEN ──open(nested)─▶ OPEN(depth+=1)
//!   OPEN ──close(nested,ok)─▶ OPEN(depth-=1)
//!   OPEN ──close(last,ok)─▶ COMMIT → publish → IDLE
//!   OPEN ──close(any,err)─▶ ROLLBACK → drop queue → IDLE
//! ```

use crate::changes;
use crate::error::{StoreError, StoreResult};
use crate::log;
use crate::snapshot::Database;
use crate::storage::with_session;
use crate::store::StoreInner;
use crate::transactor;
use crate::types::TxId;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Runs `block` inside a read transaction.
///
/// Opens a deferred DB transaction unless this thread is already inside
/// a transaction (read or write); the block sees a snapshot pinned for
/// the whole bracket. Commits on `Ok`, rolls back on `Err`.
pub(crate) fn read_transaction<T>(
    inner: &Arc<StoreInner>,
    block: impl FnOnce(&Database) -> StoreResult<T>,
) -> StoreResult<T> {
    let pinned = enter_read(inner)?;
    let db = Database::new(Arc::clone(inner), pinned);
    let result = block(&db);
    exit_read(inner, result)
}

/// Runs `block` inside a write transaction.
///
/// Opens an exclusive DB transaction unless this thread is already
/// inside a write, allocating a fresh transaction id at entry. The block
/// receives a snapshot pinned at the in-flight id, so its own appends
/// are visible to it. On top-level success the head advances, the
/// snapshot cache refreshes, and the queued changes are published; on
/// failure everything rolls back and the queue is dropped.
///
/// Opening a write inside a read transaction fails with a nesting error.
pub(crate) fn write_transaction<T>(
    inner: &Arc<StoreInner>,
    block: impl FnOnce(&Database, TxId) -> StoreResult<T>,
) -> StoreResult<T> {
    let txid = enter_write(inner)?;
    let db = Database::new(Arc::clone(inner), txid);
    let result = block(&db, txid);
    exit_write(inner, txid, result)
}

fn enter_read(inner: &Arc<StoreInner>) -> StoreResult<TxId> {
    with_session(inner, |s| {
        if s.in_transaction() {
            s.depth += 1;
            return Ok(s.pinned_head);
        }
        s.conn.execute_batch("BEGIN DEFERRED")?;
        let head = match log::head(&s.conn) {
            Ok(head) => head.unwrap_or(TxId::NONE),
            Err(e) => {
                let _ = s.conn.execute_batch("ROLLBACK");
                return Err(e);
            }
        };
        s.depth = 1;
        s.rolled_back = false;
        s.txid = None;
        s.pinned_head = head;
        Ok(head)
    })
}

fn exit_read<T>(inner: &Arc<StoreInner>, result: StoreResult<T>) -> StoreResult<T> {
    with_session(inner, move |s| {
        s.depth -= 1;
        if result.is_err() {
            s.rolled_back = true;
        }
        if s.depth > 0 {
            return result;
        }

        let rolled_back = s.rolled_back;
        let ended = s
            .conn
            .execute_batch(if rolled_back { "ROLLBACK" } else { "COMMIT" });
        s.reset();
        ended?;
        match result {
            Ok(_) if rolled_back => Err(StoreError::RolledBack),
            other => other,
        }
    })
}

fn enter_write(inner: &Arc<StoreInner>) -> StoreResult<TxId> {
    with_session(inner, |s| {
        if s.in_transaction() {
            return match s.txid {
                Some(txid) => {
                    s.depth += 1;
                    Ok(txid)
                }
                None => Err(StoreError::nesting(
                    "write transaction opened inside a read transaction",
                )),
            };
        }

        s.conn.execute_batch("BEGIN EXCLUSIVE")?;
        let opened = log::head(&s.conn)
            .map(|head| head.unwrap_or(TxId::NONE))
            .and_then(|previous_head| {
                let txid = transactor::insert_new_transaction(&s.conn)?;
                Ok((previous_head, txid))
            });
        match opened {
            Ok((previous_head, txid)) => {
                s.depth = 1;
                s.rolled_back = false;
                s.txid = Some(txid);
                s.pinned_head = txid;
                s.queue.clear();
                s.previous = Some(Database::new(Arc::clone(inner), previous_head));
                debug!(%txid, "write transaction opened");
                Ok(txid)
            }
            Err(e) => {
                let _ = s.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    })
}

fn exit_write<T>(inner: &Arc<StoreInner>, txid: TxId, result: StoreResult<T>) -> StoreResult<T> {
    with_session(inner, move |s| {
        s.depth -= 1;
        if result.is_err() {
            s.rolled_back = true;
        }
        if s.depth > 0 {
            return result;
        }

        if s.rolled_back {
            let _ = s.conn.execute_batch("ROLLBACK");
            s.reset();
            debug!(%txid, "write transaction rolled back");
            return match result {
                Ok(_) => Err(StoreError::RolledBack),
                err => err,
            };
        }

        if let Err(e) = transactor::update_head(&s.conn, txid) {
            let _ = s.conn.execute_batch("ROLLBACK");
            s.reset();
            return Err(e);
        }
        let changed = Database::new(Arc::clone(inner), txid);
        let previous = s
            .previous
            .take()
            .unwrap_or_else(|| Database::new(Arc::clone(inner), TxId::NONE));
        let queue = std::mem::take(&mut s.queue);

        // Commit, cache refresh, and publication happen under one lock so
        // subscribers observe batches in commit order and the cached head
        // never regresses.
        let commit_guard = inner.commit_lock.lock();
        if let Err(e) = s.conn.execute_batch("COMMIT") {
            drop(commit_guard);
            let _ = s.conn.execute_batch("ROLLBACK");
            s.reset();
            return Err(e.into());
        }
        inner.cached_head.store(txid.as_i64(), Ordering::SeqCst);
        s.reset();
        debug!(%txid, changes = queue.len(), "write transaction committed");
        if !queue.is_empty() {
            changes::publish(inner, previous, changed, queue);
        }
        drop(commit_guard);
        result
    })
}
