//! HTTP client wrapper for interacting with Qdrant.

use crate::qdrant::types::{PointUpsert, QdrantError};
use reqwest::{Client, Method, StatusCode};
use serde_json::json;

/// Lightweight HTTP client for the Qdrant write path.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(client: Client, url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create a collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::info!(collection = collection_name, vector_size, "Creating collection");
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection created");
        })
        .await
    }

    /// Ensure keyword indexes exist for the fields retrieval filters on.
    pub async fn ensure_payload_indexes(&self, collection_name: &str) -> Result<(), QdrantError> {
        for field in ["content_id", "project_id"] {
            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))
                .json(&json!({ "field_name": field, "field_schema": "keyword" }))
                .send()
                .await?;

            match response.status() {
                status if status.is_success() || status == StatusCode::CONFLICT => {
                    tracing::debug!(collection = collection_name, field, "Payload index ensured");
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    let error = QdrantError::UnexpectedStatus { status, body };
                    tracing::warn!(collection = collection_name, field, error = %error, "Failed to ensure payload index");
                }
            }
        }
        Ok(())
    }

    /// Upsert points, waiting until Qdrant has applied them.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        points: Vec<PointUpsert>,
    ) -> Result<usize, QdrantError> {
        if points.is_empty() {
            return Ok(0);
        }

        let point_count = points.len();
        let serialized: Vec<_> = points
            .into_iter()
            .map(|point| {
                json!({
                    "id": point.id,
                    "vector": point.vector,
                    "payload": point.payload,
                })
            })
            .collect();

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, points = point_count, "Points upserted");
        })
        .await?;

        Ok(point_count)
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, Method::PUT, MockServer};

    fn service(server: &MockServer, api_key: Option<&str>) -> QdrantService {
        QdrantService {
            client: Client::builder()
                .user_agent("kontext-pipeline-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: api_key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn upsert_points_waits_and_sends_api_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/knowledge/points")
                    .query_param("wait", "true")
                    .header("api-key", "secret")
                    .body_contains("\"id\":\"point-1\"");
                then.status(200)
                    .json_body(json!({ "status": "ok", "result": { "status": "completed" } }));
            })
            .await;

        let written = service(&server, Some("secret"))
            .upsert_points(
                "knowledge",
                vec![PointUpsert {
                    id: "point-1".into(),
                    vector: vec![0.5, 0.5],
                    payload: json!({ "text": "alpha" }),
                }],
            )
            .await
            .expect("upsert");
        mock.assert();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn missing_collection_is_created() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/knowledge");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/knowledge")
                    .body_contains("\"size\":8");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        service(&server, None)
            .create_collection_if_not_exists("knowledge", 8)
            .await
            .expect("collection");
        exists.assert();
        create.assert();
    }

    #[tokio::test]
    async fn upsert_failure_maps_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/knowledge/points");
                then.status(400).body("wrong vector size");
            })
            .await;

        let err = service(&server, None)
            .upsert_points(
                "knowledge",
                vec![PointUpsert {
                    id: "p".into(),
                    vector: vec![1.0],
                    payload: json!({}),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QdrantError::UnexpectedStatus { status, .. } if status == StatusCode::BAD_REQUEST));
    }

    #[test]
    fn endpoints_join_cleanly() {
        assert_eq!(
            format_endpoint("http://localhost:6333/", "/collections/x"),
            "http://localhost:6333/collections/x"
        );
        assert_eq!(
            normalize_base_url("http://localhost:6333/qdrant/").expect("url"),
            "http://localhost:6333/qdrant"
        );
    }
}
