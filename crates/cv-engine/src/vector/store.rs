//! Vector backend client.
//!
//! The backend requires collection creation with a configurable dimension
//! and cosine distance, point upsert, k-NN search with an optional
//! payload-match filter, and scroll with pagination.
//!
//! The backend wants numeric point ids, so the string chunk id is hashed
//! with 32-bit FNV-1a and the original string rides in the payload under
//! the reserved `chunk_id` key; the two are never mixed in one collection.

use std::time::Duration;

use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};

use cv_core::{Error, Result};

/// Reserved payload key carrying the canonical string id.
pub const CHUNK_ID_KEY: &str = "chunk_id";

/// A point as the engine sees it: string id, vector, JSON payload.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ScrollPage {
    pub points: Vec<VectorPoint>,
    /// Offset for the next page; `None` when the collection is exhausted.
    pub next: Option<u64>,
}

/// Deterministic 32-bit FNV-1a over the string id.
pub fn point_id(string_id: &str) -> u64 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in string_id.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    u64::from(hash)
}

pub struct VectorStore {
    client: Qdrant,
}

impl VectorStore {
    /// Connect and health-check the backend within `probe_timeout`.
    pub async fn connect(url: &str, probe_timeout: Duration) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| Error::Vector(format!("invalid backend url {url}: {e}")))?;

        tokio::time::timeout(probe_timeout, client.health_check())
            .await
            .map_err(|_| Error::Vector(format!("no vector backend at {url} (probe timed out)")))?
            .map_err(|e| Error::Vector(format!("vector backend at {url} unhealthy: {e}")))?;

        Ok(Self { client })
    }

    /// Create the collection (cosine distance) if it does not exist.
    pub async fn ensure_collection(&self, name: &str, dims: usize) -> Result<()> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| Error::Vector(format!("collection check failed: {e}")))?;
        if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dims as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| Error::Vector(format!("create collection {name} failed: {e}")))?;
        tracing::info!(collection = name, dims, "created vector collection");
        Ok(())
    }

    /// Drop and recreate a collection at a new dimensionality (provider
    /// change). The old collection is not archived.
    pub async fn rebuild_collection(&self, name: &str, dims: usize) -> Result<()> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| Error::Vector(format!("collection check failed: {e}")))?;
        if exists {
            self.client
                .delete_collection(name)
                .await
                .map_err(|e| Error::Vector(format!("delete collection {name} failed: {e}")))?;
            tracing::warn!(collection = name, dims, "rebuilding collection at new dimension");
        }
        self.ensure_collection(name, dims).await
    }

    pub async fn upsert(&self, collection: &str, point: VectorPoint) -> Result<()> {
        self.upsert_batch(collection, vec![point]).await
    }

    pub async fn upsert_batch(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let mut payload = p.payload;
                if let serde_json::Value::Object(ref mut map) = payload {
                    map.insert(CHUNK_ID_KEY.to_string(), serde_json::json!(p.id));
                }
                let payload = Payload::try_from(payload).unwrap_or_else(|_| Payload::new());
                PointStruct::new(point_id(&p.id), p.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| Error::Vector(format!("upsert into {collection} failed: {e}")))?;
        Ok(())
    }

    /// k-NN search with an optional payload equality filter.
    pub async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        k: usize,
        filter: &[(&str, &str)],
    ) -> Result<Vec<VectorHit>> {
        let mut builder = SearchPointsBuilder::new(collection, vector, k as u64).with_payload(true);
        if !filter.is_empty() {
            let conditions: Vec<Condition> = filter
                .iter()
                .map(|(key, value)| Condition::matches(*key, value.to_string()))
                .collect();
            builder = builder.filter(Filter::must(conditions));
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| Error::Vector(format!("search in {collection} failed: {e}")))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let payload = payload_to_json(point.payload);
                let id = payload
                    .get(CHUNK_ID_KEY)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                VectorHit {
                    id,
                    score: point.score,
                    payload,
                }
            })
            .collect())
    }

    /// Page through a collection. Pass the previous page's `next` to resume.
    pub async fn scroll(
        &self,
        collection: &str,
        limit: usize,
        offset: Option<u64>,
    ) -> Result<ScrollPage> {
        let mut builder = ScrollPointsBuilder::new(collection)
            .limit(limit as u32)
            .with_payload(true)
            .with_vectors(true);
        if let Some(offset) = offset {
            builder = builder.offset(offset);
        }

        let response = self
            .client
            .scroll(builder)
            .await
            .map_err(|e| Error::Vector(format!("scroll of {collection} failed: {e}")))?;

        let next = response.next_page_offset.and_then(|id| match id.point_id_options {
            Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => Some(n),
            _ => None,
        });

        let points = response
            .result
            .into_iter()
            .map(|point| {
                let payload = payload_to_json(point.payload);
                let id = payload
                    .get(CHUNK_ID_KEY)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let vector = point
                    .vectors
                    .and_then(|v| v.vectors_options)
                    .and_then(|options| match options {
                        qdrant_client::qdrant::vectors_output::VectorsOptions::Vector(v) => {
                            Some(v.data)
                        }
                        _ => None,
                    })
                    .unwrap_or_default();
                VectorPoint {
                    id,
                    vector,
                    payload,
                }
            })
            .collect();

        Ok(ScrollPage { points, next })
    }

    pub async fn delete(&self, collection: &str, string_id: &str) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList {
                        ids: vec![point_id(string_id).into()],
                    })
                    .wait(true),
            )
            .await
            .map_err(|e| Error::Vector(format!("delete from {collection} failed: {e}")))?;
        Ok(())
    }

    /// Drop the collection entirely.
    pub async fn clear(&self, collection: &str) -> Result<()> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| Error::Vector(format!("collection check failed: {e}")))?;
        if exists {
            self.client
                .delete_collection(collection)
                .await
                .map_err(|e| Error::Vector(format!("delete collection failed: {e}")))?;
        }
        Ok(())
    }

    pub async fn collection_exists(&self, collection: &str) -> Result<bool> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(|e| Error::Vector(format!("collection check failed: {e}")))
    }

    pub async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(|e| Error::Vector(format!("count of {collection} failed: {e}")))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}

/// Decode a qdrant payload map into plain JSON.
fn payload_to_json(
    payload: std::collections::HashMap<String, qdrant_client::qdrant::Value>,
) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = payload
        .into_iter()
        .map(|(k, v)| (k, qdrant_value_to_json(v)))
        .collect();
    serde_json::Value::Object(map)
}

fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::json!(i),
        Some(Kind::DoubleValue(d)) => serde_json::json!(d),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => serde_json::Value::Array(
            list.values.into_iter().map(qdrant_value_to_json).collect(),
        ),
        Some(Kind::StructValue(s)) => payload_to_json(s.fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_is_deterministic() {
        let a = point_id("src/a.ts:1:10");
        assert_eq!(a, point_id("src/a.ts:1:10"));
        assert_ne!(a, point_id("src/a.ts:1:11"));
        // 32-bit hash widened to u64.
        assert!(a <= u64::from(u32::MAX));
    }

    #[test]
    fn fnv_reference_value() {
        // FNV-1a of empty input is the offset basis.
        assert_eq!(point_id(""), 0x811c_9dc5);
    }
}
