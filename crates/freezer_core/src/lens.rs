//! Lens accessor: an add/remove/read trio bound to one attribute of one
//! entity.

use crate::error::StoreResult;
use crate::snapshot::AttributeValue;
use crate::store::{self, StoreInner};
use crate::transactor::Transactor;
use freezer_codec::Value;
use std::sync::Arc;

/// A convenience accessor for a single `(attribute, entity)` pair.
///
/// Obtained from [`crate::Store::lens`]. Writes go through the
/// transactor; reads go through the current snapshot.
pub struct Lens {
    inner: Arc<StoreInner>,
    attribute: String,
    entity_id: String,
}

impl Lens {
    pub(crate) fn new(inner: Arc<StoreInner>, attribute: &str, entity_id: &str) -> Self {
        Self {
            inner,
            attribute: attribute.to_string(),
            entity_id: entity_id.to_string(),
        }
    }

    /// Adds a value for the bound attribute.
    pub fn add(&self, value: &Value) -> StoreResult<()> {
        Transactor::new(Arc::clone(&self.inner)).add_value(value, &self.attribute, &self.entity_id)
    }

    /// Removes the bound attribute.
    pub fn remove(&self) -> StoreResult<()> {
        Transactor::new(Arc::clone(&self.inner)).remove_value(&self.attribute, &self.entity_id)
    }

    /// Reads the bound attribute from the current snapshot.
    pub fn get(&self) -> StoreResult<Option<AttributeValue>> {
        store::current_database(&self.inner)?.get_value(&self.entity_id, &self.attribute)
    }
}

impl std::fmt::Debug for Lens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lens")
            .field("attribute", &self.attribute)
            .field("entity_id", &self.entity_id)
            .finish()
    }
}
