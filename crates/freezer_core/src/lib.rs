//! # Freezer Core
//!
//! An embedded, append-only, transactional entity store with
//! multi-version snapshot reads and a change-notification stream.
//!
//! Freezer persists entity/attribute/value tuples in a local SQLite
//! table. State is never updated in place: every write appends tuples
//! carrying the id of the transaction that wrote them, and an immutable
//! snapshot ([`Database`]) resolves each attribute as the newest tuple
//! at or below its pinned head.
//!
//! This crate provides:
//! - The storage backend and append-only tuple log
//! - Immutable snapshots pinned to a head transaction id
//! - A schema-checked transactor for appending tuples
//! - Nested read/write transaction coordination with per-thread state
//! - A change stream publishing committed deltas in commit order
//!
//! ## Usage
//!
//! ```rust,ignore
//! use freezer_core::{AttributeType, Store, Value};
//!
//! let store = Store::open("people.freezer")?;
//! let transactor = store.transactor();
//!
//! transactor.add_attribute("age", AttributeType::Integer, false)?;
//! transactor.add_value(&Value::Integer(42), "age", "alice")?;
//!
//! let db = store.current_database()?;
//! assert!(db.get("alice")?.contains_key("age"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changes;
mod config;
mod coordinator;
mod error;
mod lens;
mod log;
mod query;
mod snapshot;
mod storage;
mod store;
mod transactor;
mod types;

pub use changes::{Change, ChangeKind};
pub use config::Config;
pub use error::{StoreError, StoreResult};
pub use lens::Lens;
pub use log::Tuple;
pub use query::Query;
pub use snapshot::{AttributeDefinition, AttributeValue, Database, EntityAttributes};
pub use store::Store;
pub use transactor::Transactor;
pub use types::TxId;

pub use freezer_codec::{AttributeType, CodecError, Value};
