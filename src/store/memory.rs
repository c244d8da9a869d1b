use std::collections::HashMap;

use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn put(&self, key: &str, value: String) {
        self.entries.lock().await.insert(key.to_string(), value);
    }

    pub async fn remove(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}
