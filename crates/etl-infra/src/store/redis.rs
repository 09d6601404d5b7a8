use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::{debug, info};

use etl_core::{Document, DocumentStore, Filter, Sort, StoreResult};
use crate::{InfraError, Result};

#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub url: String,
    pub key_prefix: Option<String>,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            key_prefix: Some(String::from("etl:")),
        }
    }
}

impl RedisStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_key_prefix(mut self, prefix: Option<String>) -> Self {
        self.key_prefix = prefix;
        self
    }
}

/// Redis-backed document store.
///
/// Each collection is one hash (`{prefix}{collection}`) mapping a zero-padded
/// sequence id to the JSON document; ids come from `{prefix}{collection}:seq`
/// so that sorting ids recovers insertion order. Filtering happens client-side.
#[derive(Clone)]
pub struct RedisDocumentStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
}

impl RedisDocumentStore {
    pub async fn new(config: RedisStoreConfig) -> Result<Self> {
        info!("Connecting to Redis at {}", config.url);

        let client = Client::open(config.url.clone())?;
        let connection = ConnectionManager::new(client).await?;

        info!("Redis connection established");

        Ok(Self { connection, config })
    }

    fn collection_key(&self, collection: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}{}", prefix, collection),
            None => collection.to_string(),
        }
    }

    fn sequence_key(&self, collection: &str) -> String {
        format!("{}:seq", self.collection_key(collection))
    }

    /// Load every document of a collection, ordered by id
    async fn load(&self, collection: &str) -> Result<Vec<(String, Document)>> {
        let key = self.collection_key(collection);
        let mut conn = self.connection.clone();
        let raw: Vec<(String, String)> = conn.hgetall(&key).await?;

        let mut docs = raw
            .into_iter()
            .map(|(id, json)| -> Result<(String, Document)> {
                match serde_json::from_str::<serde_json::Value>(&json)? {
                    serde_json::Value::Object(doc) => Ok((id, doc)),
                    _ => Err(InfraError::CorruptDocument {
                        collection: collection.to_string(),
                        id,
                        reason: "stored value is not a JSON object".to_string(),
                    }),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(docs)
    }

    async fn insert(&self, collection: &str, docs: Vec<Document>) -> Result<u64> {
        if docs.is_empty() {
            return Ok(0);
        }

        let count = docs.len() as u64;
        let mut conn = self.connection.clone();
        let last: u64 = conn.incr(self.sequence_key(collection), count).await?;
        let first = last + 1 - count;

        let entries = docs
            .into_iter()
            .zip(first..=last)
            .map(|(doc, id)| -> Result<(String, String)> {
                Ok((format!("{:020}", id), serde_json::to_string(&doc)?))
            })
            .collect::<Result<Vec<(String, String)>>>()?;

        let _: () = conn
            .hset_multiple(self.collection_key(collection), &entries[..])
            .await?;

        debug!(collection = %collection, count = count, "Inserted documents into Redis");
        Ok(count)
    }

    async fn remove(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let ids: Vec<String> = self
            .load(collection)
            .await?
            .into_iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id)
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection.clone();
        let removed: u64 = conn.hdel(self.collection_key(collection), ids).await?;
        debug!(collection = %collection, removed = removed, "Deleted documents from Redis");
        Ok(removed)
    }
}

#[async_trait]
impl DocumentStore for RedisDocumentStore {
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StoreResult<u64> {
        Ok(self.insert(collection, docs).await?)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        Ok(self.remove(collection, filter).await?)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> StoreResult<Option<Document>> {
        let docs = self.load(collection).await?;
        let mut matching = docs
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(|doc| filter.matches(doc));

        Ok(match sort {
            Some(sort) => matching.min_by(|a, b| sort.compare(a, b)),
            None => matching.next(),
        })
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        Ok(self
            .load(collection)
            .await?
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(|doc| filter.matches(doc))
            .collect())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert_eq!(config.key_prefix.as_deref(), Some("etl:"));
    }

    #[test]
    fn test_config_builder() {
        let config = RedisStoreConfig::new("redis://cache:6380").with_key_prefix(None);
        assert_eq!(config.url, "redis://cache:6380");
        assert!(config.key_prefix.is_none());
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let result = RedisDocumentStore::new(RedisStoreConfig::new("not-a-url")).await;
        assert!(matches!(result, Err(InfraError::Redis(_))));
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at ETL_TEST_REDIS_URL"]
    async fn test_live_insert_find_and_delete() {
        let url = std::env::var("ETL_TEST_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let prefix = format!("etl-test:{}:", std::process::id());
        let store = RedisDocumentStore::new(RedisStoreConfig::new(url).with_key_prefix(Some(prefix)))
            .await
            .unwrap();

        let inserted = store
            .insert_many(
                "versions",
                vec![
                    doc(json!({"v": "2024-01-02", "kind": "a"})),
                    doc(json!({"v": "2024-01-03", "kind": "b"})),
                    doc(json!({"v": "2024-01-01", "kind": "a"})),
                ],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 3);

        let newest = store
            .find_one("versions", &Filter::new(), Some(&Sort::descending("v")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(newest["v"], json!("2024-01-03"));

        let first = store.find_one("versions", &Filter::new(), None).await.unwrap().unwrap();
        assert_eq!(first["v"], json!("2024-01-02"));

        let removed = store
            .delete_many("versions", &Filter::by("kind", "a"))
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let left = store.find_many("versions", &Filter::new()).await.unwrap();
        assert_eq!(left, vec![doc(json!({"v": "2024-01-03", "kind": "b"}))]);

        store.delete_many("versions", &Filter::new()).await.unwrap();
    }
}
