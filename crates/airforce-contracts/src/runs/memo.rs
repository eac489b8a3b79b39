use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::profiles::ParameterProfile;

/// Memoized outcome of one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoEntry {
    pub content_url: String,
    pub debug_request: String,
    pub debug_response: String,
    pub recorded_at: String,
}

/// Stable key over the outbound payload, prompt and caller invalidation key.
///
/// The invalidation key only feeds this hash; it never reaches the wire.
/// Supplying a new one is how a caller forces re-execution.
pub fn run_key(profile: &ParameterProfile, prompt: &str, invalidation: Option<&str>) -> String {
    let snapshot = serde_json::json!({
        "payload": profile.payload(),
        "prompt": prompt,
        "invalidation": invalidation,
    });
    let bytes = serde_json::to_vec(&snapshot).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// JSON file of run key -> [`MemoEntry`], merged with concurrent writers on flush.
#[derive(Debug, Clone)]
pub struct MemoStore {
    path: PathBuf,
    payload: Map<String, Value>,
    dirty_keys: Vec<String>,
}

impl MemoStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            payload: Map::new(),
            dirty_keys: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&mut self, key: &str) -> Option<MemoEntry> {
        self.reload();
        self.payload
            .get(key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn set(&mut self, key: &str, entry: &MemoEntry) -> anyhow::Result<()> {
        self.reload();
        let snapshot = serde_json::to_value(entry)?;
        if self.payload.get(key) == Some(&snapshot) {
            return Ok(());
        }
        self.payload.insert(key.to_string(), snapshot);
        if !self.dirty_keys.iter().any(|existing| existing == key) {
            self.dirty_keys.push(key.to_string());
        }
        self.flush()
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        if self.dirty_keys.is_empty() {
            return Ok(());
        }
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        for key in &self.dirty_keys {
            if let Some(value) = self.payload.get(key) {
                on_disk.insert(key.clone(), value.clone());
            }
        }
        write_json_object(&self.path, &on_disk)?;
        self.payload = on_disk;
        self.dirty_keys.clear();
        Ok(())
    }

    fn reload(&mut self) {
        let mut fresh = read_json_object(&self.path).unwrap_or_default();
        for key in &self.dirty_keys {
            if let Some(value) = self.payload.get(key) {
                fresh.insert(key.clone(), value.clone());
            }
        }
        self.payload = fresh;
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::profiles::{pack, ModelFamily, ProfileFields};

    use super::{run_key, MemoEntry, MemoStore};

    fn entry(url: &str) -> MemoEntry {
        MemoEntry {
            content_url: url.to_string(),
            debug_request: "{}".to_string(),
            debug_response: "[]".to_string(),
            recorded_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn run_key_changes_only_with_inputs() {
        let profile = pack(ModelFamily::Imagen, &ProfileFields::default());
        let a = run_key(&profile, "boat", None);
        assert_eq!(a, run_key(&profile, "boat", None));
        assert_ne!(a, run_key(&profile, "boat", Some("token-1")));
        assert_ne!(
            run_key(&profile, "boat", Some("token-1")),
            run_key(&profile, "boat", Some("token-2"))
        );
        assert_ne!(a, run_key(&profile, "ship", None));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn memo_store_roundtrips_entries() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = MemoStore::new(temp.path().join("memo.json"));
        assert!(store.get("missing").is_none());
        store.set("key", &entry("https://cdn.example/a.png"))?;

        let mut reloaded = MemoStore::new(temp.path().join("memo.json"));
        assert_eq!(reloaded.get("key"), Some(entry("https://cdn.example/a.png")));
        Ok(())
    }

    #[test]
    fn memo_store_merges_with_concurrent_writer() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("memo.json");
        let mut store_a = MemoStore::new(&path);
        let mut store_b = MemoStore::new(&path);

        store_a.set("a", &entry("https://cdn.example/a"))?;
        store_b.set("b", &entry("https://cdn.example/b"))?;
        store_a.set("c", &entry("https://cdn.example/c"))?;

        let mut reloaded = MemoStore::new(path);
        assert!(reloaded.get("a").is_some());
        assert!(reloaded.get("b").is_some());
        assert!(reloaded.get("c").is_some());
        Ok(())
    }

    #[test]
    fn corrupt_memo_file_reads_as_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("memo.json");
        std::fs::write(&path, "not json")?;
        let mut store = MemoStore::new(&path);
        assert!(store.get("key").is_none());
        store.set("key", &entry("https://cdn.example/x"))?;
        assert!(store.get("key").is_some());
        Ok(())
    }
}
