//! In-process note repository and asset storage.
//!
//! Notes are indexed by a SHA-256 digest of `(user, text)`; lookups still compare the text
//! byte for byte. Call counters and injectable failures make it suitable for pipeline tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::{AssetStorage, NewNote, Note, NoteRepository, StoreError, current_timestamp_rfc3339};

const DEFAULT_PUBLIC_BASE: &str = "memory://assets";

/// In-memory implementation of [`NoteRepository`] and [`AssetStorage`].
pub struct MemoryStore {
    state: RwLock<State>,
    public_base: String,
    storage_failure: Option<String>,
    lookup_failure: Option<String>,
    insert_failure: Option<String>,
    store_calls: AtomicU64,
    lookup_calls: AtomicU64,
    insert_calls: AtomicU64,
}

#[derive(Default)]
struct State {
    users: HashSet<i64>,
    notes: BTreeMap<i64, Note>,
    text_index: HashMap<String, Vec<i64>>,
    assets: HashMap<String, StoredObject>,
    next_id: i64,
}

struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with no users.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                next_id: 1,
                ..State::default()
            }),
            public_base: DEFAULT_PUBLIC_BASE.to_string(),
            storage_failure: None,
            lookup_failure: None,
            insert_failure: None,
            store_calls: AtomicU64::new(0),
            lookup_calls: AtomicU64::new(0),
            insert_calls: AtomicU64::new(0),
        }
    }

    /// Register existing users.
    pub fn with_users(mut self, users: impl IntoIterator<Item = i64>) -> Self {
        self.state.get_mut().users.extend(users);
        self
    }

    /// Make every `store` call fail with `message`.
    pub fn with_storage_failure(mut self, message: impl Into<String>) -> Self {
        self.storage_failure = Some(message.into());
        self
    }

    /// Make every `find_by_text` call fail with `message`.
    pub fn with_lookup_failure(mut self, message: impl Into<String>) -> Self {
        self.lookup_failure = Some(message.into());
        self
    }

    /// Make every `insert` call fail with `message`.
    pub fn with_insert_failure(mut self, message: impl Into<String>) -> Self {
        self.insert_failure = Some(message.into());
        self
    }

    /// Number of `store` calls, including failed ones.
    pub fn store_calls(&self) -> u64 {
        self.store_calls.load(Ordering::Relaxed)
    }

    /// Number of `find_by_text` calls, including failed ones.
    pub fn lookup_calls(&self) -> u64 {
        self.lookup_calls.load(Ordering::Relaxed)
    }

    /// Number of `insert` calls, including failed ones.
    pub fn insert_calls(&self) -> u64 {
        self.insert_calls.load(Ordering::Relaxed)
    }

    /// Number of persisted notes.
    pub async fn note_count(&self) -> usize {
        self.state.read().await.notes.len()
    }

    /// Number of stored assets.
    pub async fn asset_count(&self) -> usize {
        self.state.read().await.assets.len()
    }

    /// Content type recorded for the asset at `path`.
    pub async fn asset_content_type(&self, path: &str) -> Option<String> {
        self.state
            .read()
            .await
            .assets
            .get(path)
            .map(|object| object.content_type.clone())
    }

    /// Size in bytes of the asset at `path`.
    pub async fn asset_len(&self, path: &str) -> Option<usize> {
        self.state
            .read()
            .await
            .assets
            .get(path)
            .map(|object| object.bytes.len())
    }

    /// Paths of all stored assets, sorted.
    pub async fn asset_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.state.read().await.assets.keys().cloned().collect();
        paths.sort();
        paths
    }
}

fn text_digest(user_id: i64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl NoteRepository for MemoryStore {
    async fn user_exists(&self, user_id: i64) -> Result<bool, StoreError> {
        Ok(self.state.read().await.users.contains(&user_id))
    }

    async fn find_by_text(&self, user_id: i64, text: &str) -> Result<Option<Note>, StoreError> {
        self.lookup_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = &self.lookup_failure {
            return Err(StoreError::Rejected(message.clone()));
        }

        let state = self.state.read().await;
        let found = state
            .text_index
            .get(&text_digest(user_id, text))
            .into_iter()
            .flatten()
            .rev()
            .filter_map(|id| state.notes.get(id))
            .find(|note| note.user_id == user_id && note.extracted_text == text)
            .cloned();
        Ok(found)
    }

    async fn insert(&self, note: NewNote) -> Result<Note, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = &self.insert_failure {
            return Err(StoreError::Rejected(message.clone()));
        }

        let mut state = self.state.write().await;
        let id = state.next_id;
        state.next_id += 1;
        let stored = Note {
            id,
            user_id: note.user_id,
            title: note.title,
            original_image_url: note.original_image_url,
            extracted_text: note.extracted_text,
            analysis_result: note.analysis_result,
            created_at: current_timestamp_rfc3339(),
        };
        state
            .text_index
            .entry(text_digest(stored.user_id, &stored.extracted_text))
            .or_default()
            .push(id);
        state.notes.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, note_id: i64) -> Result<Option<Note>, StoreError> {
        Ok(self.state.read().await.notes.get(&note_id).cloned())
    }

    async fn delete(&self, note_id: i64) -> Result<(), StoreError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if let Some(note) = state.notes.remove(&note_id) {
            let digest = text_digest(note.user_id, &note.extracted_text);
            let now_empty = state.text_index.get_mut(&digest).is_some_and(|ids| {
                ids.retain(|id| *id != note_id);
                ids.is_empty()
            });
            if now_empty {
                state.text_index.remove(&digest);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AssetStorage for MemoryStore {
    async fn store(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        self.store_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = &self.storage_failure {
            return Err(StoreError::Rejected(message.clone()));
        }

        self.state.write().await.assets.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("{}/{path}", self.public_base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_note(user_id: i64, text: &str) -> NewNote {
        NewNote {
            user_id,
            title: "t".into(),
            original_image_url: "memory://assets/x".into(),
            extracted_text: text.into(),
            analysis_result: None,
        }
    }

    #[tokio::test]
    async fn find_by_text_is_scoped_to_user_and_exact() {
        let store = MemoryStore::new().with_users([1, 2]);
        let first = store.insert(new_note(1, "hello world")).await.expect("insert");

        let hit = store.find_by_text(1, "hello world").await.expect("lookup");
        assert_eq!(hit.map(|note| note.id), Some(first.id));
        assert!(store.find_by_text(2, "hello world").await.expect("lookup").is_none());
        assert!(store.find_by_text(1, "hello world ").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn find_by_text_returns_newest_match() {
        let store = MemoryStore::new();
        store.insert(new_note(1, "same")).await.expect("insert");
        let newer = store.insert(new_note(1, "same")).await.expect("insert");

        let hit = store.find_by_text(1, "same").await.expect("lookup").expect("note");
        assert_eq!(hit.id, newer.id);
    }

    #[tokio::test]
    async fn delete_removes_note_from_index() {
        let store = MemoryStore::new();
        let note = store.insert(new_note(1, "gone soon")).await.expect("insert");
        store.delete(note.id).await.expect("delete");

        assert!(store.get(note.id).await.expect("get").is_none());
        assert!(store.find_by_text(1, "gone soon").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn injected_storage_failure_is_reported() {
        let store = MemoryStore::new().with_storage_failure("Bucket not found");
        let error = store
            .store(vec![1], "user_1/1_a.png", "image/png")
            .await
            .expect_err("failure");
        assert_eq!(error.to_string(), "Bucket not found");
        assert_eq!(store.store_calls(), 1);
        assert_eq!(store.asset_count().await, 0);
    }

    #[tokio::test]
    async fn users_are_seeded() {
        let store = MemoryStore::new().with_users([5]);
        assert!(store.user_exists(5).await.expect("lookup"));
        assert!(!store.user_exists(6).await.expect("lookup"));
    }
}
