//! Append-only tuple log.
//!
//! Every piece of state is one row of the `data` table: an
//! `(entity_id, key, value, tx_id)` tuple. Rows are never updated or
//! deleted; newer state is expressed by appending tuples with a higher
//! `tx_id`, and `row_id` establishes insertion order within one
//! transaction. All statements run through the connection's prepared
//! statement cache.

use crate::error::StoreResult;
use crate::types::{TxId, HEAD_ENTITY_ID, HEAD_KEY, RESERVED_PREFIX};
use freezer_codec::{decode, encode, CodecError, Value};
use rusqlite::{params, Connection, OptionalExtension};

/// One row of the append-only log.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    /// Insertion-ordered row id.
    pub row_id: i64,
    /// Entity the tuple belongs to.
    pub entity_id: String,
    /// Attribute key.
    pub key: String,
    /// Encoded value blob, possibly a removal marker.
    pub value: Vec<u8>,
    /// Transaction the tuple was appended in.
    pub tx_id: TxId,
}

/// Appends one tuple. Called only by the transactor.
pub(crate) fn append(
    conn: &Connection,
    entity_id: &str,
    key: &str,
    value: &[u8],
    txid: TxId,
) -> StoreResult<()> {
    let mut stmt =
        conn.prepare_cached("INSERT INTO data(entity_id, key, value, tx_id) VALUES (?1, ?2, ?3, ?4)")?;
    stmt.execute(params![entity_id, key, value, txid.as_i64()])?;
    Ok(())
}

/// Returns the newest tuple value for `(entity_id, key)` with
/// `tx_id <= head`, or `None` if no such tuple exists.
pub(crate) fn latest_for(
    conn: &Connection,
    entity_id: &str,
    key: &str,
    head: TxId,
) -> StoreResult<Option<Vec<u8>>> {
    let mut stmt = conn.prepare_cached(
        "SELECT value FROM data WHERE entity_id = ?1 AND key = ?2 AND tx_id <= ?3 \
         ORDER BY tx_id DESC, row_id DESC LIMIT 1",
    )?;
    let blob = stmt
        .query_row(params![entity_id, key, head.as_i64()], |row| row.get(0))
        .optional()?;
    Ok(blob)
}

/// Returns every tuple value for `(entity_id, key)` with `tx_id <= head`,
/// oldest first. Collection resolution folds over this sequence.
pub(crate) fn rows_for(
    conn: &Connection,
    entity_id: &str,
    key: &str,
    head: TxId,
) -> StoreResult<Vec<Vec<u8>>> {
    let mut stmt = conn.prepare_cached(
        "SELECT value FROM data WHERE entity_id = ?1 AND key = ?2 AND tx_id <= ?3 \
         ORDER BY tx_id ASC, row_id ASC",
    )?;
    let rows = stmt.query_map(params![entity_id, key, head.as_i64()], |row| row.get(0))?;
    let mut blobs = Vec::new();
    for blob in rows {
        blobs.push(blob?);
    }
    Ok(blobs)
}

/// Returns every tuple for the entity with `tx_id <= head`, grouped by
/// key and oldest first within each key.
pub(crate) fn all_for(
    conn: &Connection,
    entity_id: &str,
    head: TxId,
) -> StoreResult<Vec<(String, Vec<u8>)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT key, value FROM data WHERE entity_id = ?1 AND tx_id <= ?2 \
         ORDER BY key ASC, tx_id ASC, row_id ASC",
    )?;
    let rows = stmt.query_map(params![entity_id, head.as_i64()], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    let mut tuples = Vec::new();
    for tuple in rows {
        tuples.push(tuple?);
    }
    Ok(tuples)
}

/// Returns all tuples appended by exactly one transaction, in row order.
pub(crate) fn enumerate_at(conn: &Connection, txid: TxId) -> StoreResult<Vec<Tuple>> {
    let mut stmt = conn.prepare_cached(
        "SELECT row_id, entity_id, key, value, tx_id FROM data WHERE tx_id = ?1 \
         ORDER BY row_id ASC",
    )?;
    let rows = stmt.query_map(params![txid.as_i64()], |row| {
        Ok(Tuple {
            row_id: row.get(0)?,
            entity_id: row.get(1)?,
            key: row.get(2)?,
            value: row.get(3)?,
            tx_id: TxId::new(row.get(4)?),
        })
    })?;
    let mut tuples = Vec::new();
    for tuple in rows {
        tuples.push(tuple?);
    }
    Ok(tuples)
}

/// Returns the largest `tx_id` in the log, or 0 for an empty log.
pub(crate) fn max_tx_id(conn: &Connection) -> StoreResult<i64> {
    let mut stmt = conn.prepare_cached("SELECT COALESCE(MAX(tx_id), 0) FROM data")?;
    let max = stmt.query_row([], |row| row.get(0))?;
    Ok(max)
}

/// Returns the current head, the value of the newest head pointer tuple,
/// or `None` for a store with no commits.
pub(crate) fn head(conn: &Connection) -> StoreResult<Option<TxId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT value FROM data WHERE entity_id = ?1 AND key = ?2 \
         ORDER BY row_id DESC LIMIT 1",
    )?;
    let blob: Option<Vec<u8>> = stmt
        .query_row(params![HEAD_ENTITY_ID, HEAD_KEY], |row| row.get(0))
        .optional()?;
    match blob {
        None => Ok(None),
        Some(blob) => {
            let id = decode(&blob)?
                .as_integer()
                .ok_or_else(|| CodecError::type_mismatch("head pointer", "integer"))?;
            Ok(Some(TxId::new(id)))
        }
    }
}

/// Returns the distinct user entity ids visible at `head`, excluding the
/// head chain, transaction records, and entities that only carry
/// engine-reserved keys (attribute definitions).
pub(crate) fn entity_ids(conn: &Connection, head: TxId) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT entity_id FROM data WHERE tx_id <= ?1 \
         AND entity_id <> ?2 AND entity_id NOT LIKE '<tx:%' AND key NOT LIKE ?3 \
         ORDER BY entity_id ASC",
    )?;
    let pattern = format!("{RESERVED_PREFIX}%");
    let rows = stmt.query_map(params![head.as_i64(), HEAD_ENTITY_ID, pattern], |row| {
        row.get(0)
    })?;
    let mut ids = Vec::new();
    for id in rows {
        ids.push(id?);
    }
    Ok(ids)
}

/// A decoded removal marker.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Removal {
    /// Bare marker: the attribute is absent (scalar cleared, collection
    /// emptied).
    All,
    /// Element marker: one value removed from a collection.
    Element(Value),
}

/// Encodes a removal marker blob: the null tag alone clears the
/// attribute, the null tag followed by an encoded element removes that
/// element from a collection.
pub(crate) fn removal_blob(element: Option<&Value>) -> Vec<u8> {
    let mut blob = encode(&Value::Null);
    if let Some(element) = element {
        blob.extend_from_slice(&encode(element));
    }
    blob
}

/// Decodes a blob as a removal marker.
///
/// Returns `None` if the blob is an ordinary value. Only `Null` carries
/// tag 0 and null is rejected as a user value, so the leading tag byte is
/// unambiguous.
pub(crate) fn removal_of(blob: &[u8]) -> StoreResult<Option<Removal>> {
    match blob.first() {
        Some(0) if blob.len() == 1 => Ok(Some(Removal::All)),
        Some(0) => Ok(Some(Removal::Element(decode(&blob[1..])?))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::open_connection;

    fn test_conn(name: &str) -> Connection {
        let uri = format!("file:log_{name}?mode=memory&cache=shared");
        open_connection(&uri, &Config::default()).unwrap()
    }

    #[test]
    fn append_and_latest() {
        let conn = test_conn("latest");
        append(&conn, "alice", "age", &encode(&Value::Integer(42)), TxId::new(1)).unwrap();
        append(&conn, "alice", "age", &encode(&Value::Integer(43)), TxId::new(2)).unwrap();

        let at_one = latest_for(&conn, "alice", "age", TxId::new(1)).unwrap();
        assert_eq!(decode(&at_one.unwrap()).unwrap(), Value::Integer(42));

        let at_two = latest_for(&conn, "alice", "age", TxId::new(2)).unwrap();
        assert_eq!(decode(&at_two.unwrap()).unwrap(), Value::Integer(43));
    }

    #[test]
    fn latest_respects_head_bound() {
        let conn = test_conn("bound");
        append(&conn, "e", "k", &encode(&Value::Integer(1)), TxId::new(5)).unwrap();
        assert!(latest_for(&conn, "e", "k", TxId::new(4)).unwrap().is_none());
        assert!(latest_for(&conn, "e", "k", TxId::NONE).unwrap().is_none());
    }

    #[test]
    fn latest_within_one_transaction_is_last_row() {
        let conn = test_conn("last_row");
        append(&conn, "e", "k", &encode(&Value::Integer(1)), TxId::new(1)).unwrap();
        append(&conn, "e", "k", &encode(&Value::Integer(2)), TxId::new(1)).unwrap();
        let blob = latest_for(&conn, "e", "k", TxId::new(1)).unwrap().unwrap();
        assert_eq!(decode(&blob).unwrap(), Value::Integer(2));
    }

    #[test]
    fn all_for_groups_by_key_in_order() {
        let conn = test_conn("all_for");
        append(&conn, "e", "b", &encode(&Value::Integer(1)), TxId::new(1)).unwrap();
        append(&conn, "e", "a", &encode(&Value::Integer(2)), TxId::new(1)).unwrap();
        append(&conn, "e", "a", &encode(&Value::Integer(3)), TxId::new(2)).unwrap();
        append(&conn, "other", "a", &encode(&Value::Integer(9)), TxId::new(1)).unwrap();

        let rows = all_for(&conn, "e", TxId::new(2)).unwrap();
        let keys: Vec<&str> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["a", "a", "b"]);
    }

    #[test]
    fn enumerate_at_returns_only_that_transaction() {
        let conn = test_conn("enumerate");
        append(&conn, "e1", "k", &encode(&Value::Integer(1)), TxId::new(1)).unwrap();
        append(&conn, "e2", "k", &encode(&Value::Integer(2)), TxId::new(2)).unwrap();
        append(&conn, "e3", "k", &encode(&Value::Integer(3)), TxId::new(2)).unwrap();

        let tuples = enumerate_at(&conn, TxId::new(2)).unwrap();
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].entity_id, "e2");
        assert_eq!(tuples[1].entity_id, "e3");
        assert!(tuples[0].row_id < tuples[1].row_id);
    }

    #[test]
    fn max_tx_id_of_empty_log() {
        let conn = test_conn("max_empty");
        assert_eq!(max_tx_id(&conn).unwrap(), 0);
    }

    #[test]
    fn head_chain_newest_wins() {
        let conn = test_conn("head");
        assert_eq!(head(&conn).unwrap(), None);

        append(&conn, HEAD_ENTITY_ID, HEAD_KEY, &encode(&Value::Integer(1)), TxId::new(1)).unwrap();
        append(&conn, HEAD_ENTITY_ID, HEAD_KEY, &encode(&Value::Integer(2)), TxId::new(2)).unwrap();
        assert_eq!(head(&conn).unwrap(), Some(TxId::new(2)));
    }

    #[test]
    fn entity_ids_excludes_reserved() {
        let conn = test_conn("entities");
        append(&conn, "alice", "age", &encode(&Value::Integer(1)), TxId::new(1)).unwrap();
        append(&conn, HEAD_ENTITY_ID, HEAD_KEY, &encode(&Value::Integer(1)), TxId::new(1)).unwrap();
        append(&conn, "<tx:1>", "Freezer/tx/date", &encode(&Value::Date(0)), TxId::new(1)).unwrap();
        append(
            &conn,
            "age",
            "Freezer/attribute/type",
            &encode(&Value::Integer(1)),
            TxId::new(1),
        )
        .unwrap();

        assert_eq!(entity_ids(&conn, TxId::new(1)).unwrap(), ["alice"]);
    }

    #[test]
    fn removal_marker_roundtrip() {
        assert_eq!(removal_of(&removal_blob(None)).unwrap(), Some(Removal::All));

        let element = Value::String("b".to_string());
        let blob = removal_blob(Some(&element));
        assert_eq!(removal_of(&blob).unwrap(), Some(Removal::Element(element)));
    }

    #[test]
    fn ordinary_value_is_not_a_marker() {
        let blob = encode(&Value::Integer(7));
        assert_eq!(removal_of(&blob).unwrap(), None);
    }
}
