//! Filter/take query builder over one snapshot.

use crate::error::StoreResult;
use crate::snapshot::{Database, EntityAttributes};

/// A thin filter/take builder bound to a single snapshot.
///
/// The builder pulls entity ids and attribute maps from its snapshot
/// only, never through the live store, so running the same query against
/// the same snapshot always yields the same results.
pub struct Query {
    db: Database,
    filters: Vec<Box<dyn Fn(&str, &EntityAttributes) -> bool>>,
    limit: Option<usize>,
}

impl Query {
    pub(crate) fn new(db: Database) -> Self {
        Self {
            db,
            filters: Vec::new(),
            limit: None,
        }
    }

    /// Keeps only entities matching the predicate.
    ///
    /// Filters compose; an entity must match all of them.
    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&str, &EntityAttributes) -> bool + 'static) -> Self {
        self.filters.push(Box::new(predicate));
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn take(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    /// Runs the query, returning matching entities with their attributes.
    pub fn run(self) -> StoreResult<Vec<(String, EntityAttributes)>> {
        let mut results = Vec::new();
        if self.limit == Some(0) {
            return Ok(results);
        }
        for entity_id in self.db.entity_ids()? {
            let attributes = self.db.get(&entity_id)?;
            if self.filters.iter().all(|f| f(&entity_id, &attributes)) {
                results.push((entity_id, attributes));
                if self.limit.is_some_and(|n| results.len() >= n) {
                    break;
                }
            }
        }
        Ok(results)
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("head", &self.db.head_id())
            .field("filters", &self.filters.len())
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::AttributeValue;
    use crate::store::Store;
    use freezer_codec::{AttributeType, Value};

    fn populated_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        let transactor = store.transactor();
        transactor
            .add_attribute("age", AttributeType::Integer, false)
            .unwrap();
        for (name, age) in [("alice", 30), ("bob", 25), ("carol", 35)] {
            transactor
                .add_value(&Value::Integer(age), "age", name)
                .unwrap();
        }
        store
    }

    #[test]
    fn unfiltered_query_returns_all_user_entities() {
        let store = populated_store();
        let results = store.current_database().unwrap().query().run().unwrap();
        let names: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(names, ["alice", "bob", "carol"]);
    }

    #[test]
    fn filter_narrows_results() {
        let store = populated_store();
        let results = store
            .current_database()
            .unwrap()
            .query()
            .filter(|_, attributes| {
                attributes
                    .get("age")
                    .and_then(AttributeValue::as_scalar)
                    .and_then(Value::as_integer)
                    .is_some_and(|age| age >= 30)
            })
            .run()
            .unwrap();
        let names: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(names, ["alice", "carol"]);
    }

    #[test]
    fn take_caps_results() {
        let store = populated_store();
        let results = store
            .current_database()
            .unwrap()
            .query()
            .take(2)
            .run()
            .unwrap();
        assert_eq!(results.len(), 2);

        let none = store
            .current_database()
            .unwrap()
            .query()
            .take(0)
            .run()
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn query_is_pinned_to_its_snapshot() {
        let store = populated_store();
        let db = store.current_database().unwrap();
        store
            .transactor()
            .add_value(&Value::Integer(1), "age", "dave")
            .unwrap();

        let results = db.query().run().unwrap();
        assert_eq!(results.len(), 3);
    }
}
