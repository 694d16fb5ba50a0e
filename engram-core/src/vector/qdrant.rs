//! Qdrant adapter for [`VectorStore`].

use super::{PointFilter, ScoredPoint, StoredPoint, VectorStore};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::Collection;
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, Condition, CountPointsBuilder,
    CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Direction, Distance, FieldType,
    Filter, KeywordIndexParamsBuilder, OrderByBuilder, PointId, PointStruct, PointVectors, Range,
    ScalarQuantizationBuilder, ScrollPointsBuilder, SearchPointsBuilder,
    SetPayloadPointsBuilder, UpdateCollectionBuilder, UpdatePointVectorsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

/// Thin typed wrapper over the Qdrant gRPC client.
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Connect using the configured endpoint and optional API key.
    pub fn connect(config: &Config) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.qdrant_url);
        if let Some(key) = &config.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(Self { client })
    }

    fn to_filter(filter: &PointFilter) -> Option<Filter> {
        if filter.is_empty() {
            return None;
        }
        let mut must: Vec<Condition> = Vec::new();
        if let Some(group_id) = &filter.group_id {
            must.push(Condition::matches("group_id", group_id.clone()));
        }
        if let Some(hash) = &filter.content_hash {
            must.push(Condition::matches("content_hash", hash.clone()));
        }
        if let Some(types) = &filter.memory_types {
            let tags: Vec<String> = types.iter().map(|t| t.tag().to_string()).collect();
            must.push(Condition::matches("type", tags));
        }
        if let Some(agent_id) = &filter.agent_id {
            must.push(Condition::matches("agent_id", agent_id.clone()));
        }
        if let Some(source) = &filter.source {
            must.push(Condition::matches("source", source.clone()));
        }
        if let Some(status) = &filter.embedding_status {
            must.push(Condition::matches("embedding_status", status.clone()));
        }
        if let Some(after) = filter.ts_after {
            #[allow(clippy::cast_precision_loss)]
            must.push(Condition::range(
                "ts",
                Range {
                    gt: Some(after as f64),
                    ..Range::default()
                },
            ));
        }
        Some(Filter::must(must))
    }

    fn to_payload(payload: Map<String, Value>) -> Result<Payload> {
        Payload::try_from(Value::Object(payload)).map_err(|e| Error::Store(e.to_string()))
    }
}

fn store_err(e: qdrant_client::QdrantError) -> Error {
    let text = e.to_string();
    // Transport-level failures park the write in the retry queue;
    // everything else is a hard store error.
    if text.contains("transport")
        || text.contains("connect")
        || text.contains("Connection")
        || text.contains("timeout")
        || text.contains("unavailable")
    {
        Error::StoreUnavailable(text)
    } else {
        Error::Store(text)
    }
}

fn parse_point_id(id: Option<&PointId>) -> Uuid {
    id.and_then(|pid| match &pid.point_id_options {
        Some(PointIdOptions::Uuid(s)) => Uuid::parse_str(s).ok(),
        _ => None,
    })
    .unwrap_or_else(Uuid::nil)
}

fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> Value {
    match value.kind {
        Some(Kind::NullValue(_)) | None => Value::Null,
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map_or(Value::Null, Value::Number),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
        Some(Kind::ListValue(l)) => {
            Value::Array(l.values.into_iter().map(qdrant_value_to_json).collect())
        }
    }
}

fn payload_to_json(
    payload: std::collections::HashMap<String, qdrant_client::qdrant::Value>,
) -> Map<String, Value> {
    payload
        .into_iter()
        .map(|(k, v)| (k, qdrant_value_to_json(v)))
        .collect()
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, collection: Collection, dim: u64) -> Result<()> {
        let exists = self
            .client
            .collection_exists(collection.name())
            .await
            .map_err(store_err)?;
        if exists {
            return Ok(());
        }
        debug!(collection = collection.name(), dim, "creating collection");
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection.name())
                    .vectors_config(VectorParamsBuilder::new(dim, Distance::Cosine)),
            )
            .await
            .map_err(store_err)?;
        self.create_payload_indexes(collection).await
    }

    async fn upsert(
        &self,
        collection: Collection,
        id: Uuid,
        vector: Vec<f32>,
        payload: Map<String, Value>,
    ) -> Result<()> {
        let point = PointStruct::new(id.to_string(), vector, Self::to_payload(payload)?);
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection.name(), vec![point]))
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn scroll(
        &self,
        collection: Collection,
        filter: &PointFilter,
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<StoredPoint>> {
        #[allow(clippy::cast_possible_truncation)]
        let mut builder = ScrollPointsBuilder::new(collection.name())
            .limit(limit as u32)
            .with_payload(true)
            .with_vectors(with_vectors);
        if let Some(f) = Self::to_filter(filter) {
            builder = builder.filter(f);
        }
        let response = self.client.scroll(builder).await.map_err(store_err)?;
        Ok(response
            .result
            .into_iter()
            .map(|point| StoredPoint {
                id: parse_point_id(point.id.as_ref()),
                payload: payload_to_json(point.payload),
                vector: point.vectors.and_then(|v| match v.vectors_options {
                    Some(qdrant_client::qdrant::vectors_output::VectorsOptions::Vector(v)) => {
                        Some(v.data)
                    }
                    _ => None,
                }),
            })
            .collect())
    }

    async fn scroll_recent(
        &self,
        collection: Collection,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<StoredPoint>> {
        #[allow(clippy::cast_possible_truncation)]
        let mut builder = ScrollPointsBuilder::new(collection.name())
            .limit(limit as u32)
            .with_payload(true)
            .with_vectors(false)
            .order_by(OrderByBuilder::new("ts").direction(Direction::Desc as i32));
        if let Some(f) = Self::to_filter(filter) {
            builder = builder.filter(f);
        }
        let response = self.client.scroll(builder).await.map_err(store_err)?;
        Ok(response
            .result
            .into_iter()
            .map(|point| StoredPoint {
                id: parse_point_id(point.id.as_ref()),
                payload: payload_to_json(point.payload),
                vector: None,
            })
            .collect())
    }

    async fn search(
        &self,
        collection: Collection,
        vector: &[f32],
        filter: &PointFilter,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>> {
        let mut builder =
            SearchPointsBuilder::new(collection.name(), vector.to_vec(), limit as u64)
                .with_payload(true);
        if let Some(f) = Self::to_filter(filter) {
            builder = builder.filter(f);
        }
        if let Some(threshold) = score_threshold {
            builder = builder.score_threshold(threshold);
        }
        let response = self.client.search_points(builder).await.map_err(store_err)?;
        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredPoint {
                id: parse_point_id(point.id.as_ref()),
                score: point.score,
                payload: payload_to_json(point.payload),
            })
            .collect())
    }

    async fn set_payload(
        &self,
        collection: Collection,
        id: Uuid,
        updates: Map<String, Value>,
    ) -> Result<()> {
        self.client
            .set_payload(
                SetPayloadPointsBuilder::new(collection.name(), Self::to_payload(updates)?)
                    .points_selector(vec![PointId::from(id.to_string())]),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn update_vector(
        &self,
        collection: Collection,
        id: Uuid,
        vector: Vec<f32>,
    ) -> Result<()> {
        self.client
            .update_vectors(
                UpdatePointVectorsBuilder::new(
                    collection.name(),
                    vec![PointVectors {
                        id: Some(PointId::from(id.to_string())),
                        vectors: Some(vector.into()),
                    }],
                ),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn create_payload_indexes(&self, collection: Collection) -> Result<()> {
        // Tenant flag co-locates each group's points in the HNSW graph.
        for field in ["group_id", "source"] {
            self.client
                .create_field_index(
                    CreateFieldIndexCollectionBuilder::new(
                        collection.name(),
                        field,
                        FieldType::Keyword,
                    )
                    .field_index_params(KeywordIndexParamsBuilder::default().is_tenant(true)),
                )
                .await
                .map_err(store_err)?;
        }
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                collection.name(),
                "ts",
                FieldType::Integer,
            ))
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn enable_quantization(&self, collection: Collection) -> Result<()> {
        self.client
            .update_collection(
                UpdateCollectionBuilder::new(collection.name()).quantization_config(
                    ScalarQuantizationBuilder::default()
                        .quantile(0.99)
                        .always_ram(true),
                ),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn count(&self, collection: Collection, filter: &PointFilter) -> Result<u64> {
        let mut builder = CountPointsBuilder::new(collection.name()).exact(true);
        if let Some(f) = Self::to_filter(filter) {
            builder = builder.filter(f);
        }
        let response = self.client.count(builder).await.map_err(store_err)?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    async fn healthy(&self) -> bool {
        self.client.health_check().await.is_ok()
    }
}
