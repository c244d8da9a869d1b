use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use super::StoreError;

/// Stores each key as `<dir>/<key>.json`. Writes go to a temporary sibling
/// first and are renamed into place, so a crash never leaves a half-written
/// value behind.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: PathBuf) -> Self {
        FileBackend { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn io_error(key: &str, source: std::io::Error) -> StoreError {
        StoreError::Io {
            key: key.to_string(),
            source,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(key, e)),
        }
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::io_error(key, e))?;
        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, value)
            .await
            .map_err(|e| Self::io_error(key, e))?;
        fs::rename(&tmp, &target)
            .await
            .map_err(|e| Self::io_error(key, e))
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(key, e)),
        }
    }

    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error("*", e)),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error("*", e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_one_file_per_key() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(tmp.path().join("data"));

        assert_eq!(backend.get("delimhub_tasks").await.unwrap(), None);
        backend.put("delimhub_tasks", "[]").await.unwrap();
        backend.put("delimhub_team", "[{\"id\":\"u-root\"}]").await.unwrap();

        assert_eq!(backend.get("delimhub_tasks").await.unwrap().as_deref(), Some("[]"));
        assert!(tmp.path().join("data/delimhub_team.json").exists());
        assert_eq!(backend.keys().await.unwrap(), vec!["delimhub_tasks", "delimhub_team"]);
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_value() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(tmp.path().to_path_buf());
        backend.put("delimhub_docs", "[1]").await.unwrap();
        backend.put("delimhub_docs", "[1,2]").await.unwrap();
        assert_eq!(backend.get("delimhub_docs").await.unwrap().as_deref(), Some("[1,2]"));
    }

    #[tokio::test]
    async fn removing_a_missing_key_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(tmp.path().to_path_buf());
        backend.remove("delimhub_user").await.unwrap();
        backend.put("delimhub_user", "{}").await.unwrap();
        backend.remove("delimhub_user").await.unwrap();
        assert_eq!(backend.get("delimhub_user").await.unwrap(), None);
        assert!(backend.keys().await.unwrap().is_empty());
    }
}
