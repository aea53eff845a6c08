//! Core type definitions for the Freezer store.

use std::fmt;

/// Unique identifier for a committed or in-flight transaction.
///
/// Transaction ids are strictly increasing across commits and never
/// reused. `TxId::NONE` marks the head of a store that has no commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub i64);

impl TxId {
    /// The head of a store with no commits.
    pub const NONE: TxId = TxId(-1);

    /// Creates a transaction id from a raw value.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Checks whether this id marks the absence of any commit.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx:{}", self.0)
    }
}

/// Entity id of the head pointer chain.
pub const HEAD_ENTITY_ID: &str = "head";

/// Key of the head pointer tuples.
pub const HEAD_KEY: &str = "Freezer/head";

/// Key carrying the issuance timestamp of a transaction record.
pub const TX_DATE_KEY: &str = "Freezer/tx/date";

/// Key carrying the declared type tag of an attribute definition.
pub const ATTRIBUTE_TYPE_KEY: &str = "Freezer/attribute/type";

/// Key carrying the collection flag of an attribute definition.
pub const ATTRIBUTE_COLLECTION_KEY: &str = "Freezer/attribute/collection";

/// Prefix reserved for engine-internal keys.
pub const RESERVED_PREFIX: &str = "Freezer/";

/// Renders the entity id of a transaction record.
#[must_use]
pub fn tx_entity_id(id: TxId) -> String {
    format!("<tx:{}>", id.as_i64())
}
