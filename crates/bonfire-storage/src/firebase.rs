//! Realtime-Database REST storage adapter.
//!
//! Speaks the Firebase-style REST dialect: every key is a URL ending in
//! `.json`, `GET` on a missing key returns the JSON literal `null`, and
//! `DELETE` on a missing key succeeds. Two top-level collections hold
//! everything:
//!
//! ```text
//! {base}/roomState/{roomId}.json     — the GameState blob
//! {base}/roomMetadata/{roomId}.json  — the RoomMetadata blob
//! ```
//!
//! One quirk this adapter must absorb: the backend elides empty
//! collections on write, so a zero-player room comes back without a
//! `players` field at all. Deserialization defaults it back to an empty
//! sequence, keeping the round-trip contract intact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bonfire_protocol::{GameState, RoomId, RoomMetadata};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Storage, StorageError};

/// [`Storage`] backed by a Realtime-Database REST endpoint.
pub struct FirebaseStorage {
    base_url: String,
    /// Database auth token appended as `?auth=...`, if configured.
    auth_token: Option<String>,
    client: reqwest::Client,
    initialized: AtomicBool,
}

impl FirebaseStorage {
    /// Creates an adapter for the database at `base_url`
    /// (e.g. `https://my-project.firebaseio.com`).
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            auth_token,
            client: reqwest::Client::new(),
            initialized: AtomicBool::new(false),
        }
    }

    fn ensure_initialized(&self) -> Result<(), StorageError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    fn url(&self, path: &str) -> String {
        match &self.auth_token {
            Some(token) => format!("{}/{path}.json?auth={token}", self.base_url),
            None => format!("{}/{path}.json", self.base_url),
        }
    }

    fn state_url(&self, room_id: &RoomId) -> String {
        self.url(&format!("roomState/{room_id}"))
    }

    fn metadata_url(&self, room_id: &RoomId) -> String {
        self.url(&format!("roomMetadata/{room_id}"))
    }

    /// GET a key; `null` bodies become `None`.
    async fn fetch<T: DeserializeOwned>(
        &self,
        op: &'static str,
        url: &str,
    ) -> Result<Option<T>, StorageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StorageError::backend(op, e))?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| StorageError::backend(op, e))?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StorageError::Serde { op, source: e })
    }

    /// PUT a full replacement at a key.
    async fn put<T: Serialize>(
        &self,
        op: &'static str,
        url: &str,
        body: &T,
    ) -> Result<(), StorageError> {
        self.client
            .put(url)
            .json(body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StorageError::backend(op, e))?;
        Ok(())
    }

    async fn delete(&self, op: &'static str, url: &str) -> Result<(), StorageError> {
        self.client
            .delete(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StorageError::backend(op, e))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FirebaseStorage {
    async fn initialize(&self) -> Result<(), StorageError> {
        // Shallow read of the metadata collection doubles as a
        // connectivity and credentials check.
        let url = self.url("roomMetadata");
        self.client
            .get(&url)
            .query(&[("shallow", "true")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StorageError::backend("initialize", e))?;
        self.initialized.store(true, Ordering::Release);
        tracing::info!(base_url = %self.base_url, "realtime database storage ready");
        Ok(())
    }

    async fn save_game_state(
        &self,
        room_id: &RoomId,
        state: &GameState,
    ) -> Result<(), StorageError> {
        self.ensure_initialized()?;
        self.put("save_game_state", &self.state_url(room_id), state)
            .await
    }

    async fn load_game_state(
        &self,
        room_id: &RoomId,
    ) -> Result<Option<GameState>, StorageError> {
        self.ensure_initialized()?;
        // `players: Vec<Player>` is `#[serde(default)]`, so a blob whose
        // empty array was elided still loads with an empty sequence.
        self.fetch("load_game_state", &self.state_url(room_id)).await
    }

    async fn delete_room(&self, room_id: &RoomId) -> Result<(), StorageError> {
        self.ensure_initialized()?;
        self.delete("delete_room", &self.state_url(room_id)).await?;
        self.delete("delete_room", &self.metadata_url(room_id)).await
    }

    async fn upsert_room_metadata(
        &self,
        room_id: &RoomId,
        metadata: &RoomMetadata,
    ) -> Result<(), StorageError> {
        self.ensure_initialized()?;
        self.put("upsert_room_metadata", &self.metadata_url(room_id), metadata)
            .await
    }

    async fn get_room_metadata(
        &self,
        room_id: &RoomId,
    ) -> Result<Option<RoomMetadata>, StorageError> {
        self.ensure_initialized()?;
        self.fetch("get_room_metadata", &self.metadata_url(room_id))
            .await
    }

    async fn list_all_room_metadata(&self) -> Result<Vec<RoomMetadata>, StorageError> {
        self.ensure_initialized()?;
        let all: Option<HashMap<String, RoomMetadata>> = self
            .fetch("list_all_room_metadata", &self.url("roomMetadata"))
            .await?;
        Ok(all.map(|m| m.into_values().collect()).unwrap_or_default())
    }

    async fn list_inactive_room_ids(
        &self,
        threshold_millis: u64,
    ) -> Result<Vec<RoomId>, StorageError> {
        // Fetch-then-filter: the REST dialect has no server-side range
        // query we can rely on across deployments.
        let all = self.list_all_room_metadata().await?;
        Ok(all
            .into_iter()
            .filter(|m| m.last_activity < threshold_millis)
            .map(|m| m.room_id)
            .collect())
    }

    async fn room_exists(&self, room_id: &RoomId) -> Result<bool, StorageError> {
        self.ensure_initialized()?;
        let state: Option<Value> = self.fetch("room_exists", &self.state_url(room_id)).await?;
        Ok(state.is_some())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building_strips_trailing_slash() {
        let storage = FirebaseStorage::new("https://db.example.com///", None);
        let room = RoomId::parse("ABC234").unwrap();
        assert_eq!(
            storage.state_url(&room),
            "https://db.example.com/roomState/ABC234.json"
        );
        assert_eq!(
            storage.metadata_url(&room),
            "https://db.example.com/roomMetadata/ABC234.json"
        );
    }

    #[test]
    fn test_url_building_appends_auth_token() {
        let storage = FirebaseStorage::new("https://db.example.com", Some("s3cret".into()));
        let room = RoomId::parse("ABC234").unwrap();
        assert_eq!(
            storage.state_url(&room),
            "https://db.example.com/roomState/ABC234.json?auth=s3cret"
        );
    }

    #[tokio::test]
    async fn test_ops_before_initialize_fail() {
        let storage = FirebaseStorage::new("https://db.example.com", None);
        let room = RoomId::parse("ABC234").unwrap();
        let result = storage.load_game_state(&room).await;
        assert!(matches!(result, Err(StorageError::NotInitialized)));
    }
}
