//! HTTP client for the hosted document store.
//!
//! The store is a black box: authenticate, insert/update/query by filter.
//! Records are typed at this boundary — callers hand in and receive serde
//! structs, untyped JSON never crosses out of the adapter layer.
//!
//! Endpoints:
//! - `POST  {base}/v1/collections/{name}/find` — body `{filter, sort?, limit?, skip?}`
//! - `GET   {base}/v1/collections/{name}/records/{id}`
//! - `POST  {base}/v1/collections/{name}/records` — body is the record
//! - `PATCH {base}/v1/collections/{name}/records/{id}` — body is a partial patch

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store api error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            other => AppError::Store(other.to_string()),
        }
    }
}

/// Query options for `find`. Filters are Mongo-style JSON objects; the store
/// understands equality matches and `$or`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct FindQuery {
    pub filter: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,
}

impl FindQuery {
    pub fn filter(filter: Value) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    /// Sort by one field; `1` ascending, `-1` descending.
    pub fn sort_by(mut self, field: &str, direction: i64) -> Self {
        self.sort = Some(serde_json::json!({ field: direction }));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Deserialize)]
struct FindResponse<T> {
    records: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
}

#[derive(Clone)]
pub struct ZeroDbClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ZeroDbClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/v1/collections/{}", self.base_url, collection)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound);
        }
        if !status.is_success() {
            let message = resp
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    pub async fn find<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<Vec<T>, StoreError> {
        let resp = self
            .http
            .post(format!("{}/find", self.collection_url(collection)))
            .bearer_auth(&self.api_key)
            .json(query)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        let body: FindResponse<T> = resp.json().await?;
        Ok(body.records)
    }

    pub async fn find_by_id<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: Uuid,
    ) -> Result<T, StoreError> {
        let resp = self
            .http
            .get(format!("{}/records/{}", self.collection_url(collection), id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn insert_one<T: Serialize>(
        &self,
        collection: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        let resp = self
            .http
            .post(format!("{}/records", self.collection_url(collection)))
            .bearer_auth(&self.api_key)
            .json(record)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Partial update by id. Last write wins; there are no cross-document
    /// transactions, so multi-row updates are issued as independent patches.
    pub async fn update_one(
        &self,
        collection: &str,
        id: Uuid,
        patch: Value,
    ) -> Result<(), StoreError> {
        let resp = self
            .http
            .patch(format!("{}/records/{}", self.collection_url(collection), id))
            .bearer_auth(&self.api_key)
            .json(&patch)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_query_serialization() {
        let query = FindQuery::filter(serde_json::json!({"session_id": "abc"}))
            .sort_by("created_at", 1)
            .limit(50);
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["filter"]["session_id"], "abc");
        assert_eq!(value["sort"]["created_at"], 1);
        assert_eq!(value["limit"], 50);
        assert!(value.get("skip").is_none());
    }

    #[test]
    fn test_collection_url_trims_trailing_slash() {
        let client = ZeroDbClient::new("http://store.local/", "key");
        assert_eq!(
            client.collection_url("chat_messages"),
            "http://store.local/v1/collections/chat_messages"
        );
    }
}
