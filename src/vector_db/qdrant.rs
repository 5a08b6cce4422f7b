//! Qdrant REST client.
//!
//! Talks to the handful of endpoints the persistent store needs:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | exists | `GET /collections/{name}/exists` |
//! | create | `PUT /collections/{name}` |
//! | upsert | `PUT /collections/{name}/points?wait=true` |
//! | search | `POST /collections/{name}/points/search` |
//! | count | `GET /collections/{name}` |
//!
//! Points carry their chunk as payload in the common
//! `{"page_content": ..., "metadata": {...}}` layout, so collections
//! written by other LangChain-style tools remain searchable.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use habit_context_core::{Chunk, ContextError, ScoredChunk};

use super::{VectorDatabase, VectorPoint};
use crate::config::VectorDbConfig;

/// Points per upsert request.
const UPSERT_BATCH: usize = 256;

pub struct QdrantClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantClient {
    /// Build a client and verify the server answers.
    ///
    /// Fails with [`ContextError::Connectivity`] when the server cannot be
    /// reached within `connect_timeout_secs`.
    pub async fn connect(config: &VectorDbConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var)
                    .with_context(|| format!("{} environment variable not set", var))?,
            ),
            None => None,
        };
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let this = Self {
            base_url: base_url(&config.url, config.port),
            api_key,
            client,
        };

        let probe = this.send(this.client.get(format!("{}/collections", this.base_url)));
        match tokio::time::timeout(Duration::from_secs(config.connect_timeout_secs), probe).await
        {
            Ok(result) => {
                result?;
            }
            Err(_) => {
                return Err(this.unreachable("timed out waiting for a response").into());
            }
        }

        info!(url = %this.base_url, "connected to qdrant");
        Ok(this)
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/collections/{}", self.base_url, collection)
    }

    fn unreachable(&self, message: impl Into<String>) -> ContextError {
        ContextError::Connectivity {
            target: format!("qdrant at {}", self.base_url),
            message: message.into(),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let request = match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| self.unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Qdrant error {}: {}", status, body);
        }
        Ok(response.json().await?)
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.send(self.client.delete(self.collection_url(collection)))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorDatabase for QdrantClient {
    fn describe(&self) -> String {
        format!("qdrant {}", self.base_url)
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let json = self
            .send(
                self.client
                    .get(format!("{}/exists", self.collection_url(collection))),
            )
            .await?;
        parse_exists(&json)
    }

    async fn create_collection(
        &self,
        collection: &str,
        dims: usize,
        points: &[VectorPoint],
    ) -> Result<()> {
        let body = json!({ "vectors": { "size": dims, "distance": "Cosine" } });
        self.send(self.client.put(self.collection_url(collection)).json(&body))
            .await
            .with_context(|| format!("Failed to create collection {}", collection))?;
        info!(collection, dims, "created qdrant collection");

        if let Err(e) = self.upsert(collection, points).await {
            warn!(collection, error = %e, "initial upload failed; removing collection");
            if let Err(rollback) = self.delete_collection(collection).await {
                warn!(collection, error = %rollback, "failed to remove collection");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[VectorPoint]) -> Result<()> {
        let url = format!("{}/points?wait=true", self.collection_url(collection));
        for batch in points.chunks(UPSERT_BATCH) {
            let body = json!({ "points": batch.iter().map(point_json).collect::<Vec<_>>() });
            self.send(self.client.put(&url).json(&body)).await?;
            debug!(collection, points = batch.len(), "upserted points");
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let body = json!({ "vector": vector, "limit": limit, "with_payload": true });
        let json = self
            .send(
                self.client
                    .post(format!("{}/points/search", self.collection_url(collection)))
                    .json(&body),
            )
            .await?;
        parse_search(&json)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let json = self
            .send(self.client.get(self.collection_url(collection)))
            .await?;
        Ok(json
            .pointer("/result/points_count")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }
}

/// Join `url` and `port` unless `url` already names a port.
fn base_url(url: &str, port: u16) -> String {
    let url = url.trim_end_matches('/');
    let authority = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .split('/')
        .next()
        .unwrap_or("");
    let has_port = authority
        .rsplit_once(':')
        .is_some_and(|(_, p)| p.parse::<u16>().is_ok());
    if has_port {
        url.to_string()
    } else {
        format!("{}:{}", url, port)
    }
}

fn point_json(point: &VectorPoint) -> Value {
    json!({
        "id": point.chunk.id,
        "vector": point.vector,
        "payload": {
            "page_content": point.chunk.text,
            "metadata": {
                "source": point.chunk.source,
                "chunk_index": point.chunk.chunk_index,
                "hash": point.chunk.hash,
            }
        }
    })
}

fn parse_exists(json: &Value) -> Result<bool> {
    json.pointer("/result/exists")
        .and_then(Value::as_bool)
        .ok_or_else(|| anyhow::anyhow!("Invalid Qdrant response: missing result.exists"))
}

fn parse_search(json: &Value) -> Result<Vec<ScoredChunk>> {
    let hits = json
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow::anyhow!("Invalid Qdrant response: missing result array"))?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let id = match hit.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => bail!("Invalid Qdrant response: point without id"),
        };
        let payload = hit.get("payload").cloned().unwrap_or(Value::Null);
        let metadata = payload.get("metadata").cloned().unwrap_or(Value::Null);
        let text = payload
            .get("page_content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        results.push(ScoredChunk {
            chunk: Chunk {
                id,
                source: metadata
                    .get("source")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                chunk_index: metadata
                    .get("chunk_index")
                    .and_then(Value::as_i64)
                    .unwrap_or(0),
                hash: metadata
                    .get("hash")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                text,
            },
            score: hit.get("score").and_then(Value::as_f64).unwrap_or(0.0),
        });
    }
    Ok(results)
}
