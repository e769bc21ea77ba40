//! S3-compatible artifact store using signed `GetObject` and `DeleteObject` calls.

use crate::artifacts::{ArtifactChunk, ArtifactError, ArtifactStore, decode_chunks};
use crate::aws::sigv4::uri_encode;
use crate::aws::{AwsCredentials, SigV4Signer, signed_request};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};

/// Artifact store backed by S3 or an S3-compatible endpoint (MinIO, LocalStack).
pub struct S3ArtifactStore {
    client: Client,
    signer: SigV4Signer,
    region: String,
    endpoint: Option<String>,
}

impl S3ArtifactStore {
    /// Build a store for `region`; a custom `endpoint` switches to path-style addressing.
    pub fn new(
        client: Client,
        credentials: AwsCredentials,
        region: impl Into<String>,
        endpoint: Option<String>,
    ) -> Self {
        let region = region.into();
        tracing::debug!(region = %region, endpoint = ?endpoint, "Initialized S3 artifact store");
        Self {
            client,
            signer: SigV4Signer::new(credentials, region.clone(), "s3"),
            region,
            endpoint: endpoint.map(|value| value.trim_end_matches('/').to_string()),
        }
    }

    /// URL of `bucket`/`key`. Keys with `.` or `..` segments are refused because URL
    /// normalization would resolve them to a different object.
    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, String> {
        if key.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(format!("key `{key}` contains relative path segments"));
        }
        let encoded_key = key
            .split('/')
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");
        let raw = match &self.endpoint {
            Some(endpoint) => format!("{endpoint}/{bucket}/{encoded_key}"),
            None => format!("https://{bucket}.s3.{}.amazonaws.com/{encoded_key}", self.region),
        };
        Url::parse(&raw).map_err(|err| err.to_string())
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<ArtifactChunk>, ArtifactError> {
        let read_error = |reason: String| ArtifactError::Read {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason,
        };

        let url = self.object_url(bucket, key).map_err(read_error)?;
        let response = signed_request(&self.client, &self.signer, Method::GET, url, &[], Vec::new())
            .send()
            .await
            .map_err(|err| read_error(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|err| read_error(err.to_string()))?;
                let chunks = decode_chunks(bucket, key, &bytes)?;
                tracing::debug!(bucket, key, chunks = chunks.len(), bytes = bytes.len(), "Artifact fetched");
                Ok(chunks)
            }
            StatusCode::NOT_FOUND => Err(ArtifactError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(read_error(format!("unexpected status {status}: {body}")))
            }
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ArtifactError> {
        let delete_error = |reason: String| ArtifactError::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason,
        };

        let url = self.object_url(bucket, key).map_err(delete_error)?;
        let response =
            signed_request(&self.client, &self.signer, Method::DELETE, url, &[], Vec::new())
                .send()
                .await
                .map_err(|err| delete_error(err.to_string()))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            tracing::debug!(bucket, key, "Artifact deleted");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(delete_error(format!("unexpected status {status}: {body}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::DELETE, Method::GET, MockServer};
    use serde_json::json;

    fn store(server: &MockServer) -> S3ArtifactStore {
        S3ArtifactStore::new(
            Client::builder()
                .user_agent("kontext-pipeline-test")
                .build()
                .expect("client"),
            AwsCredentials::new("test", "test", None),
            "us-east-1",
            Some(format!("{}/", server.base_url())),
        )
    }

    #[tokio::test]
    async fn fetch_reads_chunk_array_path_style() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/artifacts/processed/k-1.json")
                    .header_exists("authorization")
                    .header_exists("x-amz-content-sha256");
                then.status(200).json_body(json!([
                    { "text": "alpha", "metadata": { "contentId": "k-1" } },
                    { "text": "beta", "metadata": { "contentId": "k-1" } }
                ]));
            })
            .await;

        let chunks = store(&server)
            .fetch("artifacts", "processed/k-1.json")
            .await
            .expect("fetch");
        mock.assert();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "beta");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/artifacts/gone.json");
                then.status(404).body("<Error><Code>NoSuchKey</Code></Error>");
            })
            .await;

        let err = store(&server)
            .fetch("artifacts", "gone.json")
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound { .. }));
    }

    #[tokio::test]
    async fn server_error_is_a_read_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(503).body("SlowDown");
            })
            .await;

        let err = store(&server).fetch("artifacts", "a.json").await.unwrap_err();
        assert!(matches!(err, ArtifactError::Read { ref reason, .. } if reason.contains("503")));
    }

    #[tokio::test]
    async fn delete_accepts_no_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/artifacts/processed/k-1.json");
                then.status(204);
            })
            .await;

        store(&server)
            .delete("artifacts", "processed/k-1.json")
            .await
            .expect("delete");
        mock.assert();
    }

    #[tokio::test]
    async fn delete_failure_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE);
                then.status(403).body("AccessDenied");
            })
            .await;

        let err = store(&server)
            .delete("artifacts", "processed/k-1.json")
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Delete { .. }));
    }

    #[tokio::test]
    async fn dot_segment_keys_are_refused_without_a_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|_when, then| {
                then.status(200).json_body(json!([]));
            })
            .await;
        let store = store(&server);

        let err = store.fetch("artifacts", "a/../b.json").await.unwrap_err();
        assert!(
            matches!(err, ArtifactError::Read { ref reason, .. } if reason.contains("relative path")),
            "unexpected error: {err}"
        );
        let err = store.delete("artifacts", "a/./b.json").await.unwrap_err();
        assert!(matches!(err, ArtifactError::Delete { .. }));
        mock.assert_hits(0);

        assert!(store.object_url("artifacts", "a/..b/c.json").is_ok());
    }

    #[test]
    fn virtual_hosted_urls_encode_key_segments() {
        let store = S3ArtifactStore::new(
            Client::new(),
            AwsCredentials::new("a", "b", None),
            "eu-west-1",
            None,
        );
        let url = store
            .object_url("bucket", "processed/my file.json")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://bucket.s3.eu-west-1.amazonaws.com/processed/my%20file.json"
        );
    }
}
