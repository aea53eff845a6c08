//! Immutable snapshot reads.
//!
//! A [`Database`] is a lightweight value pinned to a head transaction id.
//! It resolves every lookup as "the newest tuple with `tx_id` at or below
//! my head", so two snapshots with equal heads are observationally
//! identical, and a snapshot never changes no matter how many commits
//! happen after it was taken.

use crate::error::{StoreError, StoreResult};
use crate::log::{self, Removal};
use crate::query::Query;
use crate::storage::with_session;
use crate::store::StoreInner;
use crate::types::{TxId, ATTRIBUTE_COLLECTION_KEY, ATTRIBUTE_TYPE_KEY};
use freezer_codec::{decode, AttributeType, CodecError, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A resolved attribute value: one value for scalar attributes, the
/// accumulated set for collection attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Last-writer-wins scalar.
    Scalar(Value),
    /// Accumulated collection, in first-insertion order.
    Set(Vec<Value>),
}

impl AttributeValue {
    /// Get this value as a scalar, if it is one.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            AttributeValue::Scalar(value) => Some(value),
            AttributeValue::Set(_) => None,
        }
    }

    /// Get this value as a collection, if it is one.
    #[must_use]
    pub fn as_set(&self) -> Option<&[Value]> {
        match self {
            AttributeValue::Set(values) => Some(values),
            AttributeValue::Scalar(_) => None,
        }
    }
}

/// All attributes of one entity, resolved at a snapshot's head.
pub type EntityAttributes = BTreeMap<String, AttributeValue>;

/// The declared shape of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDefinition {
    /// Declared value type.
    pub value_type: AttributeType,
    /// Whether the attribute accumulates a set of values.
    pub collection: bool,
}

/// An immutable view of the store pinned to a head transaction.
///
/// Snapshots are cheap to clone and safe to share across threads; reads
/// on another thread go through that thread's own connection.
#[derive(Clone)]
pub struct Database {
    inner: Arc<StoreInner>,
    head: TxId,
}

impl Database {
    pub(crate) fn new(inner: Arc<StoreInner>, head: TxId) -> Self {
        Self { inner, head }
    }

    /// The head transaction id this snapshot is pinned to.
    ///
    /// `TxId::NONE` for the empty snapshot of a store with no commits.
    #[must_use]
    pub fn head_id(&self) -> TxId {
        self.head
    }

    /// Resolves all attributes of an entity.
    ///
    /// Returns an empty map for an unknown entity. Attributes whose
    /// newest state is a removal marker are absent; collection attributes
    /// that folded down to the empty set are absent too.
    pub fn get(&self, entity_id: &str) -> StoreResult<EntityAttributes> {
        let rows = with_session(&self.inner, |s| log::all_for(&s.conn, entity_id, self.head))?;

        // all_for orders by key; regroup into per-key runs.
        let mut grouped: Vec<(String, Vec<Vec<u8>>)> = Vec::new();
        for (key, blob) in rows {
            match grouped.last_mut() {
                Some((last, blobs)) if *last == key => blobs.push(blob),
                _ => grouped.push((key, vec![blob])),
            }
        }

        let mut attributes = EntityAttributes::new();
        for (key, blobs) in grouped {
            let collection = self
                .attribute_definition(&key)?
                .is_some_and(|d| d.collection);
            if collection {
                let set = fold_set(&blobs)?;
                if !set.is_empty() {
                    attributes.insert(key, AttributeValue::Set(set));
                }
            } else if let Some(blob) = blobs.last() {
                if let Some(value) = resolve_scalar(blob)? {
                    attributes.insert(key, AttributeValue::Scalar(value));
                }
            }
        }
        Ok(attributes)
    }

    /// Resolves a single attribute of an entity.
    ///
    /// Scalar attributes short-circuit to a single indexed fetch.
    pub fn get_value(&self, entity_id: &str, attribute: &str) -> StoreResult<Option<AttributeValue>> {
        let collection = self
            .attribute_definition(attribute)?
            .is_some_and(|d| d.collection);
        if collection {
            let blobs = with_session(&self.inner, |s| {
                log::rows_for(&s.conn, entity_id, attribute, self.head)
            })?;
            let set = fold_set(&blobs)?;
            Ok((!set.is_empty()).then_some(AttributeValue::Set(set)))
        } else {
            let blob = with_session(&self.inner, |s| {
                log::latest_for(&s.conn, entity_id, attribute, self.head)
            })?;
            match blob {
                None => Ok(None),
                Some(blob) => Ok(resolve_scalar(&blob)?.map(AttributeValue::Scalar)),
            }
        }
    }

    /// Looks up the definition of an attribute, if it has been declared.
    pub fn attribute_definition(&self, name: &str) -> StoreResult<Option<AttributeDefinition>> {
        let (type_blob, collection_blob) = with_session(&self.inner, |s| {
            Ok((
                log::latest_for(&s.conn, name, ATTRIBUTE_TYPE_KEY, self.head)?,
                log::latest_for(&s.conn, name, ATTRIBUTE_COLLECTION_KEY, self.head)?,
            ))
        })?;
        let Some(type_blob) = type_blob else {
            return Ok(None);
        };
        let tag = decode(&type_blob)?
            .as_integer()
            .ok_or_else(|| CodecError::type_mismatch("attribute type", "integer"))?;
        let value_type = u8::try_from(tag)
            .ok()
            .and_then(AttributeType::from_tag)
            .ok_or_else(|| StoreError::schema(format!("attribute {name} has invalid type tag {tag}")))?;
        let collection = match collection_blob {
            Some(blob) => decode(&blob)?.as_integer().unwrap_or(0) != 0,
            None => false,
        };
        Ok(Some(AttributeDefinition {
            value_type,
            collection,
        }))
    }

    /// Returns a query builder bound to this snapshot.
    #[must_use]
    pub fn query(&self) -> Query {
        Query::new(self.clone())
    }

    pub(crate) fn entity_ids(&self) -> StoreResult<Vec<String>> {
        with_session(&self.inner, |s| log::entity_ids(&s.conn, self.head))
    }
}

impl PartialEq for Database {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) && self.head == other.head
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("head", &self.head).finish()
    }
}

/// Resolves a scalar blob: the value, or `None` for a removal marker.
fn resolve_scalar(blob: &[u8]) -> StoreResult<Option<Value>> {
    if log::removal_of(blob)?.is_some() {
        return Ok(None);
    }
    Ok(Some(decode(blob)?))
}

/// Folds a collection's tuple sequence into its accumulated set.
fn fold_set(blobs: &[Vec<u8>]) -> StoreResult<Vec<Value>> {
    let mut set: Vec<Value> = Vec::new();
    for blob in blobs {
        match log::removal_of(blob)? {
            Some(Removal::All) => set.clear(),
            Some(Removal::Element(value)) => set.retain(|v| *v != value),
            None => {
                let value = decode(blob)?;
                if !set.contains(&value) {
                    set.push(value);
                }
            }
        }
    }
    Ok(set)
}
