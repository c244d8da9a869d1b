use futures_util::TryStreamExt;
use log::info;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::{options::ClientOptions, Client, Collection, Database};
use serde::{Deserialize, Serialize};

use super::StoreError;

const COLLECTION: &str = "workspace_kv";

#[derive(Debug, Serialize, Deserialize)]
struct KvEntry {
    #[serde(rename = "_id")]
    key: String,
    value: String,
    updated_at: BsonDateTime,
}

/// Keeps each workspace key as one document in `workspace_kv`, keyed by `_id`.
pub struct MongoBackend {
    db: Database,
}

impl MongoBackend {
    pub async fn init(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        info!("Connected to MongoDB database {}", db_name);
        Ok(MongoBackend { db })
    }

    pub fn database_name(&self) -> &str {
        self.db.name()
    }

    fn entries(&self) -> Collection<KvEntry> {
        self.db.collection::<KvEntry>(COLLECTION)
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entry = self.entries().find_one(doc! { "_id": key }).await?;
        Ok(entry.map(|e| e.value))
    }

    pub async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let entry = KvEntry {
            key: key.to_string(),
            value,
            updated_at: BsonDateTime::now(),
        };
        self.entries()
            .replace_one(doc! { "_id": key }, &entry)
            .upsert(true)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().delete_one(doc! { "_id": key }).await?;
        Ok(())
    }

    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries: Vec<KvEntry> = self.entries().find(doc! {}).await?.try_collect().await?;
        let mut keys: Vec<String> = entries.into_iter().map(|e| e.key).collect();
        keys.sort();
        Ok(keys)
    }
}
