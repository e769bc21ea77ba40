//! Amazon SQS client speaking the JSON protocol over signed HTTP requests.

use crate::aws::{AwsCredentials, SigV4Signer, signed_request};
use crate::queue::{QueueError, QueueMessage, QueueReceiver, QueueSender, ReceiveRequest};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// One SQS queue addressed through a service endpoint.
pub struct SqsQueue {
    client: Client,
    signer: SigV4Signer,
    endpoint: Url,
    queue_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageResponse {
    message_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageResponse {
    #[serde(default)]
    messages: Vec<ReceivedMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceivedMessage {
    message_id: String,
    receipt_handle: String,
    body: String,
    #[serde(default)]
    attributes: Option<ReceivedAttributes>,
}

#[derive(Deserialize)]
struct ReceivedAttributes {
    #[serde(rename = "ApproximateReceiveCount", default)]
    approximate_receive_count: Option<String>,
}

impl SqsQueue {
    /// Build a client for `queue_url` talking to `endpoint`.
    pub fn new(
        client: Client,
        signer: SigV4Signer,
        endpoint: &str,
        queue_url: impl Into<String>,
    ) -> Result<Self, QueueError> {
        let endpoint =
            Url::parse(endpoint).map_err(|err| QueueError::InvalidEndpoint(err.to_string()))?;
        Ok(Self {
            client,
            signer,
            endpoint,
            queue_url: queue_url.into(),
        })
    }

    /// Build a client from region, optional endpoint override, and environment credentials.
    pub fn from_settings(
        client: Client,
        credentials: AwsCredentials,
        region: &str,
        endpoint: Option<&str>,
        queue_url: impl Into<String>,
    ) -> Result<Self, QueueError> {
        let endpoint = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://sqs.{region}.amazonaws.com/"));
        tracing::debug!(endpoint = %endpoint, region, "Initialized SQS client");
        Self::new(
            client,
            SigV4Signer::new(credentials, region, "sqs"),
            &endpoint,
            queue_url,
        )
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, body: Value) -> Result<T, QueueError> {
        let target = format!("AmazonSQS.{action}");
        let payload = serde_json::to_vec(&body)?;
        let response = signed_request(
            &self.client,
            &self.signer,
            Method::POST,
            self.endpoint.clone(),
            &[("content-type", CONTENT_TYPE), ("x-amz-target", target.as_str())],
            payload,
        )
        .send()
        .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = QueueError::Rejected { status, body };
            tracing::error!(action, queue = %self.queue_url, error = %error, "SQS request failed");
            return Err(error);
        }

        let bytes = response.bytes().await?;
        let raw: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
        serde_json::from_slice(raw)
            .map_err(|err| QueueError::MalformedResponse(format!("{action}: {err}")))
    }
}

#[async_trait]
impl QueueSender for SqsQueue {
    async fn send(&self, body: &str) -> Result<String, QueueError> {
        let response: SendMessageResponse = self
            .call(
                "SendMessage",
                json!({ "QueueUrl": self.queue_url, "MessageBody": body }),
            )
            .await?;
        Ok(response.message_id)
    }
}

#[async_trait]
impl QueueReceiver for SqsQueue {
    async fn receive(&self, request: ReceiveRequest) -> Result<Vec<QueueMessage>, QueueError> {
        let response: ReceiveMessageResponse = self
            .call(
                "ReceiveMessage",
                json!({
                    "QueueUrl": self.queue_url,
                    "MaxNumberOfMessages": request.max_messages.clamp(1, 10),
                    "WaitTimeSeconds": request.wait.as_secs().min(20),
                    "VisibilityTimeout": request.visibility_timeout.as_secs(),
                    "MessageSystemAttributeNames": ["ApproximateReceiveCount"],
                }),
            )
            .await?;

        Ok(response
            .messages
            .into_iter()
            .map(|message| QueueMessage {
                receive_count: message
                    .attributes
                    .and_then(|attributes| attributes.approximate_receive_count)
                    .and_then(|count| count.parse().ok())
                    .unwrap_or(1),
                message_id: message.message_id,
                receipt_handle: message.receipt_handle,
                body: message.body,
            })
            .collect())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let _: Value = self
            .call(
                "DeleteMessage",
                json!({ "QueueUrl": self.queue_url, "ReceiptHandle": receipt_handle }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use std::time::Duration;

    const QUEUE_URL: &str = "http://localhost:4566/000000000000/kontext-status";

    fn queue(server: &MockServer) -> SqsQueue {
        SqsQueue::from_settings(
            Client::builder()
                .user_agent("kontext-pipeline-test")
                .build()
                .expect("client"),
            AwsCredentials::new("test", "test", None),
            "us-east-1",
            Some(&server.base_url()),
            QUEUE_URL,
        )
        .expect("sqs queue")
    }

    #[tokio::test]
    async fn send_message_returns_message_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .header("x-amz-target", "AmazonSQS.SendMessage")
                    .header("content-type", CONTENT_TYPE)
                    .header_exists("authorization")
                    .header_exists("x-amz-date")
                    .json_body(json!({ "QueueUrl": QUEUE_URL, "MessageBody": "{\"a\":1}" }));
                then.status(200)
                    .json_body(json!({ "MessageId": "m-1", "MD5OfMessageBody": "x" }));
            })
            .await;

        let id = queue(&server).send("{\"a\":1}").await.expect("send");
        mock.assert();
        assert_eq!(id, "m-1");
    }

    #[tokio::test]
    async fn receive_maps_messages_and_receive_count() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .header("x-amz-target", "AmazonSQS.ReceiveMessage")
                    .body_contains("\"WaitTimeSeconds\":20");
                then.status(200).json_body(json!({
                    "Messages": [
                        {
                            "MessageId": "m-1",
                            "ReceiptHandle": "rh-1",
                            "Body": "{}",
                            "Attributes": { "ApproximateReceiveCount": "3" }
                        },
                        {
                            "MessageId": "m-2",
                            "ReceiptHandle": "rh-2",
                            "Body": "[]"
                        }
                    ]
                }));
            })
            .await;

        let messages = queue(&server)
            .receive(ReceiveRequest {
                max_messages: 10,
                wait: Duration::from_secs(20),
                visibility_timeout: Duration::from_secs(60),
            })
            .await
            .expect("receive");

        mock.assert();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].receive_count, 3);
        assert_eq!(messages[0].receipt_handle, "rh-1");
        assert_eq!(messages[1].receive_count, 1);
    }

    #[tokio::test]
    async fn empty_receive_yields_no_messages() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .header("x-amz-target", "AmazonSQS.ReceiveMessage");
                then.status(200).json_body(json!({}));
            })
            .await;

        let messages = queue(&server)
            .receive(ReceiveRequest {
                max_messages: 5,
                wait: Duration::from_secs(1),
                visibility_timeout: Duration::from_secs(30),
            })
            .await
            .expect("receive");
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn delete_sends_receipt_handle() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .header("x-amz-target", "AmazonSQS.DeleteMessage")
                    .json_body(json!({ "QueueUrl": QUEUE_URL, "ReceiptHandle": "rh-9" }));
                then.status(200).body("");
            })
            .await;

        queue(&server).delete("rh-9").await.expect("delete");
        mock.assert();
    }

    #[tokio::test]
    async fn server_errors_surface_as_transient_rejections() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(500)
                    .body(r#"{"__type":"com.amazonaws.sqs#InternalError"}"#);
            })
            .await;

        let err = queue(&server).send("{}").await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
