//! Schema-checked tuple appends.
//!
//! The transactor is the only writer of the tuple log. Every mutator runs
//! inside a write transaction, implicitly opening one when the caller is
//! not already inside one, so a bare `add_value` call is itself a commit.

use crate::changes::{ChangeKind, PendingChange};
use crate::coordinator;
use crate::error::{StoreError, StoreResult};
use crate::log;
use crate::snapshot::Database;
use crate::storage::with_session;
use crate::store::StoreInner;
use crate::types::{
    tx_entity_id, TxId, ATTRIBUTE_COLLECTION_KEY, ATTRIBUTE_TYPE_KEY, HEAD_ENTITY_ID, HEAD_KEY,
    RESERVED_PREFIX, TX_DATE_KEY,
};
use freezer_codec::{encode, AttributeType, Value};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};
use uuid::Uuid;

/// Facade for appending tuples and allocating transaction ids.
///
/// Obtained from [`crate::Store::transactor`]; cheap to clone.
#[derive(Clone)]
pub struct Transactor {
    inner: Arc<StoreInner>,
}

impl Transactor {
    pub(crate) fn new(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    /// Runs an operation against the active write transaction, opening
    /// one only when the caller is not already inside one.
    ///
    /// When nested, the operation runs inline: its failure fails the
    /// individual operation without forcing the enclosing block to roll
    /// back, so the caller may recover. When standalone, the operation is
    /// the whole transaction and its failure rolls back.
    fn with_write<T>(
        &self,
        op: impl FnOnce(&Database, TxId) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let current = with_session(&self.inner, |s| Ok(s.txid))?;
        match current {
            Some(txid) => {
                let db = Database::new(Arc::clone(&self.inner), txid);
                op(&db, txid)
            }
            None => coordinator::write_transaction(&self.inner, op),
        }
    }

    /// Declares an attribute with the given type and cardinality.
    ///
    /// Idempotent when the existing definition matches; fails with a
    /// schema error when the attribute is already declared with a
    /// different shape. Attribute names must not enter the engine's
    /// reserved `Freezer/` namespace.
    pub fn add_attribute(
        &self,
        name: &str,
        value_type: AttributeType,
        collection: bool,
    ) -> StoreResult<()> {
        if name.starts_with(RESERVED_PREFIX) {
            return Err(StoreError::schema(format!(
                "attribute name {name} is in the reserved namespace"
            )));
        }
        let name = name.to_string();
        self.with_write(|db, txid| {
            match db.attribute_definition(&name)? {
                Some(existing)
                    if existing.value_type == value_type && existing.collection == collection =>
                {
                    Ok(())
                }
                Some(existing) => Err(StoreError::schema(format!(
                    "attribute {name} is already defined as {}{}",
                    existing.value_type,
                    if existing.collection { " collection" } else { "" },
                ))),
                None => {
                    debug!(attribute = %name, %value_type, collection, "defining attribute");
                    with_session(&self.inner, |s| {
                        log::append(
                            &s.conn,
                            &name,
                            ATTRIBUTE_TYPE_KEY,
                            &encode(&Value::Integer(i64::from(value_type.tag()))),
                            txid,
                        )?;
                        log::append(
                            &s.conn,
                            &name,
                            ATTRIBUTE_COLLECTION_KEY,
                            &encode(&Value::Integer(i64::from(collection))),
                            txid,
                        )
                    })
                }
            }
        })
    }

    /// Appends a value for `(entity_id, attribute)`.
    ///
    /// The attribute must be declared and the value must match its
    /// declared type. For scalar attributes a later add overrides an
    /// earlier one, even within the same transaction; for collection
    /// attributes adding a value already in the set is a no-op.
    pub fn add_value(&self, value: &Value, attribute: &str, entity_id: &str) -> StoreResult<()> {
        if value.is_null() {
            return Err(StoreError::schema(
                "null is not a value; use remove_value to clear an attribute",
            ));
        }
        let (value, attribute, entity_id) =
            (value.clone(), attribute.to_string(), entity_id.to_string());
        self.with_write(|db, txid| {
            let definition = db.attribute_definition(&attribute)?.ok_or_else(|| {
                StoreError::schema(format!("unknown attribute {attribute}"))
            })?;
            let value_type = value
                .attribute_type()
                .ok_or_else(|| StoreError::schema("null is not a value"))?;
            if value_type != definition.value_type {
                return Err(StoreError::schema(format!(
                    "attribute {attribute} is declared {} but the value is {value_type}",
                    definition.value_type,
                )));
            }

            if definition.collection {
                if let Some(existing) = db.get_value(&entity_id, &attribute)? {
                    if existing.as_set().is_some_and(|set| set.contains(&value)) {
                        return Ok(());
                    }
                }
            }

            trace!(entity = %entity_id, attribute = %attribute, %txid, "append value");
            with_session(&self.inner, |s| {
                log::append(&s.conn, &entity_id, &attribute, &encode(&value), txid)?;
                s.queue.push(PendingChange {
                    kind: ChangeKind::Add,
                    entity_id: entity_id.clone(),
                    attribute: attribute.clone(),
                    delta: value.clone(),
                });
                Ok(())
            })
        })
    }

    /// Removes an attribute from an entity.
    ///
    /// Appends a removal marker: the attribute becomes absent (a
    /// collection becomes empty) in every snapshot at or past this
    /// transaction.
    pub fn remove_value(&self, attribute: &str, entity_id: &str) -> StoreResult<()> {
        let (attribute, entity_id) = (attribute.to_string(), entity_id.to_string());
        self.with_write(|db, txid| {
            if db.attribute_definition(&attribute)?.is_none() {
                return Err(StoreError::schema(format!("unknown attribute {attribute}")));
            }
            trace!(entity = %entity_id, attribute = %attribute, %txid, "append removal");
            with_session(&self.inner, |s| {
                log::append(&s.conn, &entity_id, &attribute, &log::removal_blob(None), txid)?;
                s.queue.push(PendingChange {
                    kind: ChangeKind::Remove,
                    entity_id: entity_id.clone(),
                    attribute: attribute.clone(),
                    delta: Value::Null,
                });
                Ok(())
            })
        })
    }

    /// Removes one value from a collection attribute.
    pub fn remove_value_element(
        &self,
        value: &Value,
        attribute: &str,
        entity_id: &str,
    ) -> StoreResult<()> {
        let (value, attribute, entity_id) =
            (value.clone(), attribute.to_string(), entity_id.to_string());
        self.with_write(|db, txid| {
            let definition = db.attribute_definition(&attribute)?.ok_or_else(|| {
                StoreError::schema(format!("unknown attribute {attribute}"))
            })?;
            if !definition.collection {
                return Err(StoreError::schema(format!(
                    "attribute {attribute} is not a collection"
                )));
            }
            trace!(entity = %entity_id, attribute = %attribute, %txid, "append element removal");
            with_session(&self.inner, |s| {
                log::append(
                    &s.conn,
                    &entity_id,
                    &attribute,
                    &log::removal_blob(Some(&value)),
                    txid,
                )?;
                s.queue.push(PendingChange {
                    kind: ChangeKind::Remove,
                    entity_id: entity_id.clone(),
                    attribute: attribute.clone(),
                    delta: value.clone(),
                });
                Ok(())
            })
        })
    }

    /// Returns a fresh opaque entity identifier.
    ///
    /// Uniqueness is probabilistic; callers requiring total uniqueness
    /// check against the current snapshot.
    #[must_use]
    pub fn generate_new_key(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

impl std::fmt::Debug for Transactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transactor").finish_non_exhaustive()
    }
}

/// Allocates the next transaction id and appends its transaction record.
///
/// Runs inside the already-open exclusive DB transaction, so the
/// `max(tx_id) + 1` read cannot race another writer.
pub(crate) fn insert_new_transaction(conn: &Connection) -> StoreResult<TxId> {
    let txid = TxId::new(log::max_tx_id(conn)? + 1);
    let issued = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    log::append(
        conn,
        &tx_entity_id(txid),
        TX_DATE_KEY,
        &encode(&Value::Date(issued)),
        txid,
    )?;
    Ok(txid)
}

/// Appends a head pointer tuple advancing the head to `txid`.
pub(crate) fn update_head(conn: &Connection, txid: TxId) -> StoreResult<()> {
    log::append(
        conn,
        HEAD_ENTITY_ID,
        HEAD_KEY,
        &encode(&Value::Integer(txid.as_i64())),
        txid,
    )
}
