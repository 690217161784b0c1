//! In-memory data engine
//!
//! Reference implementation of [`DataDelegate`] used by tests and embedded
//! runs; the production engine is an adapter over the platform's database.
//! Rows live in per-entity tables and ids follow the `"entity:snowflake"`
//! convention.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};

use super::{DataDelegate, ID_FIELD, StoreError, StoreResult, require_object};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(row: &Value, filter: &Map<String, Value>) -> bool {
        filter.iter().all(|(field, expected)| row.get(field) == Some(expected))
    }

    fn merge(row: &mut Value, data: &Map<String, Value>) {
        if let Value::Object(obj) = row {
            for (field, value) in data {
                obj.insert(field.clone(), value.clone());
            }
        }
    }
}

#[async_trait]
impl DataDelegate for MemoryStore {
    async fn create(&self, entity: &str, data: Value) -> StoreResult<Value> {
        let mut row = require_object(data, "data")?;
        row.entry(ID_FIELD.to_string()).or_insert_with(|| {
            Value::String(format!("{entity}:{}", shared::util::snowflake_id()))
        });
        let row = Value::Object(row);
        self.tables
            .entry(entity.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(&self, entity: &str, filter: Value, data: Value) -> StoreResult<Value> {
        let filter = require_object(filter, "filter")?;
        let data = require_object(data, "data")?;
        let mut table = self
            .tables
            .entry(entity.to_string())
            .or_default();
        for row in table.iter_mut() {
            if Self::matches(row, &filter) {
                Self::merge(row, &data);
                return Ok(row.clone());
            }
        }
        Err(StoreError::NotFound(entity.to_string()))
    }

    async fn update_many(&self, entity: &str, filter: Value, data: Value) -> StoreResult<u64> {
        let filter = require_object(filter, "filter")?;
        let data = require_object(data, "data")?;
        let mut count = 0;
        let mut table = self.tables.entry(entity.to_string()).or_default();
        for row in table.iter_mut() {
            if Self::matches(row, &filter) {
                Self::merge(row, &data);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete(&self, entity: &str, filter: Value) -> StoreResult<Value> {
        let filter = require_object(filter, "filter")?;
        let mut table = self.tables.entry(entity.to_string()).or_default();
        match table.iter().position(|row| Self::matches(row, &filter)) {
            Some(index) => Ok(table.remove(index)),
            None => Err(StoreError::NotFound(entity.to_string())),
        }
    }

    async fn delete_many(&self, entity: &str, filter: Value) -> StoreResult<u64> {
        let filter = require_object(filter, "filter")?;
        let mut table = self.tables.entry(entity.to_string()).or_default();
        let before = table.len();
        table.retain(|row| !Self::matches(row, &filter));
        Ok((before - table.len()) as u64)
    }

    async fn find_unique(&self, entity: &str, filter: Value) -> StoreResult<Option<Value>> {
        let filter = require_object(filter, "filter")?;
        Ok(self.tables.get(entity).and_then(|table| {
            table
                .iter()
                .find(|row| Self::matches(row, &filter))
                .cloned()
        }))
    }

    async fn find_many(&self, entity: &str, filter: Value) -> StoreResult<Vec<Value>> {
        let filter = require_object(filter, "filter")?;
        Ok(self
            .tables
            .get(entity)
            .map(|table| {
                table
                    .iter()
                    .filter(|row| Self::matches(row, &filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_assigns_prefixed_id() {
        let store = MemoryStore::new();
        let row = store.create("lot", json!({"title": "Vase"})).await.unwrap();
        let id = row["id"].as_str().unwrap();
        assert!(id.starts_with("lot:"));
    }

    #[tokio::test]
    async fn create_keeps_caller_supplied_id() {
        let store = MemoryStore::new();
        let row = store
            .create("lot", json!({"id": "lot:fixed", "title": "Vase"}))
            .await
            .unwrap();
        assert_eq!(row["id"], "lot:fixed");
    }

    #[tokio::test]
    async fn filters_match_by_field_equality() {
        let store = MemoryStore::new();
        store.create("lot", json!({"status": "open", "n": 1})).await.unwrap();
        store.create("lot", json!({"status": "open", "n": 2})).await.unwrap();
        store.create("lot", json!({"status": "closed", "n": 3})).await.unwrap();

        let open = store.find_many("lot", json!({"status": "open"})).await.unwrap();
        assert_eq!(open.len(), 2);

        let all = store.find_many("lot", json!({})).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn update_merges_fields_and_returns_post_state() {
        let store = MemoryStore::new();
        let row = store
            .create("lot", json!({"title": "Vase", "status": "open"}))
            .await
            .unwrap();
        let id = row["id"].clone();

        let updated = store
            .update("lot", json!({"id": id}), json!({"status": "closed"}))
            .await
            .unwrap();
        assert_eq!(updated["status"], "closed");
        assert_eq!(updated["title"], "Vase");
    }

    #[tokio::test]
    async fn missing_row_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update("lot", json!({"id": "lot:nope"}), json!({"x": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_many_returns_affected_count() {
        let store = MemoryStore::new();
        store.create("bid", json!({"lot": "a"})).await.unwrap();
        store.create("bid", json!({"lot": "a"})).await.unwrap();
        store.create("bid", json!({"lot": "b"})).await.unwrap();

        let removed = store.delete_many("bid", json!({"lot": "a"})).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.find_many("bid", json!({})).await.unwrap().len(), 1);
    }
}
