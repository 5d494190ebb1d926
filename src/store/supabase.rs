//! HTTP client for a Supabase project (PostgREST tables plus object storage).

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;

use super::{AssetStorage, NewNote, Note, NoteRepository, StoreError};

/// Lightweight HTTP client for the notes backend.
#[derive(Clone)]
pub struct SupabaseClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) service_key: String,
    pub(crate) bucket: String,
}

impl SupabaseClient {
    /// Construct a client for the given project.
    pub fn new(
        base_url: &str,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().user_agent("smartlens/0.1").build()?;
        let base_url = normalize_base_url(base_url).map_err(StoreError::InvalidUrl)?;
        let bucket = bucket.into();
        tracing::debug!(url = %base_url, bucket = %bucket, "Initialized Supabase HTTP client");

        Ok(Self {
            client,
            base_url,
            service_key: service_key.into(),
            bucket,
        })
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn rest_url(&self, table: &str) -> Result<Url, StoreError> {
        self.url_with_segments(&["rest", "v1", table])
    }

    fn object_url(&self, prefix: &[&str], path: &str) -> Result<Url, StoreError> {
        let mut segments: Vec<&str> = prefix.to_vec();
        segments.push(&self.bucket);
        segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
        self.url_with_segments(&segments)
    }

    fn url_with_segments(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|err| StoreError::InvalidUrl(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_rows<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<Vec<T>, StoreError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(operation, error = %error, "Supabase request failed");
            return Err(error);
        }
        response
            .json()
            .await
            .map_err(|err| StoreError::Decode(err.to_string()))
    }
}

#[async_trait]
impl NoteRepository for SupabaseClient {
    async fn user_exists(&self, user_id: i64) -> Result<bool, StoreError> {
        let response = self
            .request(Method::GET, self.rest_url("users")?)
            .query(&[
                ("select", "id".to_string()),
                ("id", format!("eq.{user_id}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = self.read_rows(response, "user_exists").await?;
        Ok(!rows.is_empty())
    }

    async fn find_by_text(&self, user_id: i64, text: &str) -> Result<Option<Note>, StoreError> {
        let response = self
            .request(Method::GET, self.rest_url("notes")?)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("extracted_text", format!("eq.{text}")),
                ("order", "created_at.desc".to_string()),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<Note> = self.read_rows(response, "find_by_text").await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, note: NewNote) -> Result<Note, StoreError> {
        let response = self
            .request(Method::POST, self.rest_url("notes")?)
            .header("Prefer", "return=representation")
            .json(&[&note])
            .send()
            .await?;
        let rows: Vec<Note> = self.read_rows(response, "insert").await?;
        let stored = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no rows".into()))?;
        tracing::debug!(note_id = stored.id, user_id = stored.user_id, "Note inserted");
        Ok(stored)
    }

    async fn get(&self, note_id: i64) -> Result<Option<Note>, StoreError> {
        let response = self
            .request(Method::GET, self.rest_url("notes")?)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{note_id}"))])
            .send()
            .await?;
        let rows: Vec<Note> = self.read_rows(response, "get").await?;
        Ok(rows.into_iter().next())
    }

    async fn delete(&self, note_id: i64) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, self.rest_url("notes")?)
            .query(&[("id", format!("eq.{note_id}"))])
            .send()
            .await?;
        if response.status().is_success() {
            tracing::debug!(note_id, "Note deleted");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(note_id, error = %error, "Supabase delete failed");
            Err(error)
        }
    }
}

#[async_trait]
impl AssetStorage for SupabaseClient {
    async fn store(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let size = bytes.len();
        let response = self
            .request(Method::POST, self.object_url(&["storage", "v1", "object"], path)?)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(path, error = %error, "Asset upload failed");
            return Err(error);
        }

        let public_url = self.object_url(&["storage", "v1", "object", "public"], path)?;
        tracing::debug!(path, bytes = size, "Asset stored");
        Ok(public_url.to_string())
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}
