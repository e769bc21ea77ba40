//! HTTP surface for the knowledge pipeline.
//!
//! - `POST /projects/:project_id/knowledge` registers an uploaded file and publishes a request.
//! - `POST /projects/:project_id/knowledge/web` registers a web URL and publishes a request.
//! - `GET /projects/:project_id/knowledge/:knowledge_id` returns the record.
//! - `GET /projects/:project_id/knowledge/:knowledge_id/status?timeoutMs=` long-polls until the
//!   record leaves PROCESSING. It answers 408 with the PROCESSING record on timeout.
//! - `POST /projects/:project_id/knowledge/:knowledge_id/resend` re-publishes a PROCESSING record.
//! - `GET /metrics` returns the pipeline counters.
//!
//! Successful responses are `{ "message", "data" }`; errors are `{ "message", "code" }`.

use crate::knowledge::KnowledgeView;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{
    FileSubmission, KnowledgeApi, ServiceError, SubmissionError, Submitted, WebSubmission,
};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Build the HTTP router exposing the knowledge API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: KnowledgeApi + 'static,
{
    Router::new()
        .route("/projects/:project_id/knowledge", post(submit_file::<S>))
        .route("/projects/:project_id/knowledge/web", post(submit_web::<S>))
        .route(
            "/projects/:project_id/knowledge/:knowledge_id",
            get(get_knowledge::<S>),
        )
        .route(
            "/projects/:project_id/knowledge/:knowledge_id/status",
            get(await_status::<S>),
        )
        .route(
            "/projects/:project_id/knowledge/:knowledge_id/resend",
            post(resend::<S>),
        )
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
}

/// Success envelope shared by every data-returning endpoint.
#[derive(Serialize)]
struct ApiResponse<T> {
    message: &'static str,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn with(status: StatusCode, message: &'static str, data: T) -> Response {
        (status, Json(Self { message, data })).into_response()
    }
}

/// Query string of the status endpoint.
#[derive(Deserialize)]
struct StatusQuery {
    /// Requested wait in milliseconds; negative values mean no wait.
    #[serde(default, rename = "timeoutMs")]
    timeout_ms: Option<i64>,
}

/// Request body of the resend endpoint.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ResendRequest {
    #[serde(default)]
    user_id: Option<String>,
}

async fn submit_file<S>(
    State(service): State<Arc<S>>,
    Path(project_id): Path<String>,
    Json(submission): Json<FileSubmission>,
) -> Result<Response, AppError>
where
    S: KnowledgeApi,
{
    let Submitted { record, .. } = service.submit_file(&project_id, submission).await?;
    Ok(ApiResponse::with(
        StatusCode::CREATED,
        "File knowledge uploaded successfully",
        KnowledgeView::from(&record),
    ))
}

async fn submit_web<S>(
    State(service): State<Arc<S>>,
    Path(project_id): Path<String>,
    Json(submission): Json<WebSubmission>,
) -> Result<Response, AppError>
where
    S: KnowledgeApi,
{
    let Submitted { record, .. } = service.submit_web(&project_id, submission).await?;
    Ok(ApiResponse::with(
        StatusCode::CREATED,
        "Web knowledge created successfully",
        KnowledgeView::from(&record),
    ))
}

async fn get_knowledge<S>(
    State(service): State<Arc<S>>,
    Path((project_id, knowledge_id)): Path<(String, String)>,
) -> Result<Response, AppError>
where
    S: KnowledgeApi,
{
    let id = parse_id(&knowledge_id)?;
    let record = service.get(&project_id, id).await?;
    Ok(ApiResponse::with(
        StatusCode::OK,
        "Knowledge retrieved successfully",
        KnowledgeView::from(&record),
    ))
}

/// Long-poll a record's processing status.
///
/// The handler future is dropped when the client disconnects, which stops the wait.
async fn await_status<S>(
    State(service): State<Arc<S>>,
    Path((project_id, knowledge_id)): Path<(String, String)>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, AppError>
where
    S: KnowledgeApi,
{
    let id = parse_id(&knowledge_id)?;
    let max_wait = query
        .timeout_ms
        .map(|ms| Duration::from_millis(ms.max(0) as u64));
    let resolution = service.await_status(&project_id, id, max_wait).await?;
    let status = if resolution.timed_out() {
        StatusCode::REQUEST_TIMEOUT
    } else {
        StatusCode::OK
    };
    Ok(ApiResponse::with(
        status,
        resolution.message(),
        KnowledgeView::from(&resolution.record),
    ))
}

async fn resend<S>(
    State(service): State<Arc<S>>,
    Path((project_id, knowledge_id)): Path<(String, String)>,
    body: Option<Json<ResendRequest>>,
) -> Result<Response, AppError>
where
    S: KnowledgeApi,
{
    let id = parse_id(&knowledge_id)?;
    let ResendRequest { user_id } = body.map(|Json(body)| body).unwrap_or_default();
    let Submitted { record, receipt } = service.resend(&project_id, id, user_id).await?;
    tracing::info!(content_id = %record.id, event_id = %receipt.event_id, "Resend request completed");
    Ok(ApiResponse::with(
        StatusCode::ACCEPTED,
        "Processing request resent",
        KnowledgeView::from(&record),
    ))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: KnowledgeApi,
{
    Json(service.metrics_snapshot())
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::UnknownId(raw.to_string()))
}

/// Error body returned by every endpoint.
#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: &'static str,
}

enum AppError {
    Service(ServiceError),
    UnknownId(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::UnknownId(_) | Self::Service(ServiceError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "KNOWLEDGE_NOT_FOUND")
            }
            Self::Service(ServiceError::Invalid(invalid)) => match invalid {
                SubmissionError::UnsupportedContentType(_) => {
                    (StatusCode::BAD_REQUEST, "UNSUPPORTED_CONTENT_TYPE")
                }
                SubmissionError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "INVALID_URL"),
                SubmissionError::InvalidLocation(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_LOCATION")
                }
            },
            Self::Service(ServiceError::Conflict { .. }) => {
                (StatusCode::CONFLICT, "KNOWLEDGE_ALREADY_PROCESSED")
            }
            Self::Service(ServiceError::Publish { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PROCESSING_REQUEST_FAILED")
            }
            Self::Service(ServiceError::StatusCheck(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PROCESSING_STATUS_CHECK_FAILED")
            }
            Self::Service(ServiceError::Store(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "KNOWLEDGE_STORE_ERROR")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            Self::Service(err) => err.to_string(),
            Self::UnknownId(raw) => format!("Knowledge {raw} not found"),
        };
        if status.is_server_error() {
            tracing::error!(%status, code, error = %message, "Request failed");
        }
        (status, Json(ErrorBody { message, code })).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self::Service(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::knowledge::{
        ContentSource, ContentType, KnowledgeRecord, NewKnowledge, ProcessingStatus, StoreError,
    };
    use crate::metrics::MetricsSnapshot;
    use crate::pipeline::{
        FileSubmission, KnowledgeApi, PublishError, PublishReceipt, Resolution, ResolutionKind,
        ServiceError, StatusCheckError, Submitted, WebSubmission,
    };
    use crate::queue::QueueError;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[derive(Clone, Copy)]
    enum StatusBehavior {
        Resolved,
        TimedOut,
        Broken,
    }

    struct StubKnowledgeService {
        record: KnowledgeRecord,
        status: StatusBehavior,
        publish_fails: bool,
        waits: Mutex<Vec<Option<Duration>>>,
    }

    impl StubKnowledgeService {
        fn new(status: StatusBehavior) -> Self {
            Self {
                record: KnowledgeRecord::new(NewKnowledge {
                    project_id: "p-1".into(),
                    name: "report.pdf".into(),
                    content_type: ContentType::Document,
                    mime_type: Some("application/pdf".into()),
                    size: Some(2048),
                    source: ContentSource::Object {
                        bucket: "uploads".into(),
                        key: "report.pdf".into(),
                    },
                }),
                status,
                publish_fails: false,
                waits: Mutex::new(Vec::new()),
            }
        }

        fn submitted(&self) -> Result<Submitted, ServiceError> {
            if self.publish_fails {
                return Err(ServiceError::Publish {
                    id: self.record.id,
                    source: PublishError::Exhausted {
                        attempts: 4,
                        source: QueueError::MalformedResponse("unavailable".into()),
                    },
                });
            }
            Ok(Submitted {
                record: self.record.clone(),
                receipt: PublishReceipt {
                    event_id: "evt-1".into(),
                    message_id: "msg-1".into(),
                    attempts: 1,
                },
            })
        }
    }

    #[async_trait]
    impl KnowledgeApi for StubKnowledgeService {
        async fn submit_file(
            &self,
            project_id: &str,
            submission: FileSubmission,
        ) -> Result<Submitted, ServiceError> {
            submission.prepare(project_id)?;
            self.submitted()
        }

        async fn submit_web(
            &self,
            project_id: &str,
            submission: WebSubmission,
        ) -> Result<Submitted, ServiceError> {
            submission.prepare(project_id)?;
            self.submitted()
        }

        async fn get(&self, project_id: &str, id: Uuid) -> Result<KnowledgeRecord, ServiceError> {
            if project_id == self.record.project_id && id == self.record.id {
                Ok(self.record.clone())
            } else {
                Err(ServiceError::NotFound(id))
            }
        }

        async fn resend(
            &self,
            _project_id: &str,
            _id: Uuid,
            _user_id: Option<String>,
        ) -> Result<Submitted, ServiceError> {
            Err(ServiceError::Conflict {
                id: self.record.id,
                status: ProcessingStatus::Success,
            })
        }

        async fn await_status(
            &self,
            _project_id: &str,
            _id: Uuid,
            max_wait: Option<Duration>,
        ) -> Result<Resolution, ServiceError> {
            self.waits.lock().await.push(max_wait);
            let mut record = self.record.clone();
            match self.status {
                StatusBehavior::Resolved => {
                    record.processing_status = ProcessingStatus::Success;
                    Ok(Resolution {
                        kind: ResolutionKind::Resolved,
                        record,
                    })
                }
                StatusBehavior::TimedOut => Ok(Resolution {
                    kind: ResolutionKind::TimedOut,
                    record,
                }),
                StatusBehavior::Broken => Err(ServiceError::StatusCheck(StatusCheckError(
                    StoreError::Corrupt("offline".into()),
                ))),
            }
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                requests_published: 3,
                ..MetricsSnapshot::default()
            }
        }
    }

    async fn call(
        service: Arc<StubKnowledgeService>,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = create_router(service)
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn status_route_returns_resolved_record() {
        let service = Arc::new(StubKnowledgeService::new(StatusBehavior::Resolved));
        let id = service.record.id;
        let (status, json) = call(
            service.clone(),
            Method::GET,
            &format!("/projects/p-1/knowledge/{id}/status?timeoutMs=1500"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Knowledge processing completed successfully");
        assert_eq!(json["data"]["processingStatus"], "SUCCESS");
        assert_eq!(
            *service.waits.lock().await,
            vec![Some(Duration::from_millis(1500))]
        );
    }

    #[tokio::test]
    async fn status_route_times_out_with_408() {
        let service = Arc::new(StubKnowledgeService::new(StatusBehavior::TimedOut));
        let id = service.record.id;
        let (status, json) = call(
            service.clone(),
            Method::GET,
            &format!("/projects/p-1/knowledge/{id}/status?timeoutMs=-5"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(json["message"], "Processing status check timeout");
        assert_eq!(json["data"]["processingStatus"], "PROCESSING");
        assert_eq!(*service.waits.lock().await, vec![Some(Duration::ZERO)]);
    }

    #[tokio::test]
    async fn status_store_failure_is_503() {
        let service = Arc::new(StubKnowledgeService::new(StatusBehavior::Broken));
        let id = service.record.id;
        let (status, json) = call(
            service,
            Method::GET,
            &format!("/projects/p-1/knowledge/{id}/status"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["code"], "PROCESSING_STATUS_CHECK_FAILED");
    }

    #[tokio::test]
    async fn malformed_ids_are_not_found() {
        let service = Arc::new(StubKnowledgeService::new(StatusBehavior::Resolved));
        let (status, json) = call(service, Method::GET, "/projects/p-1/knowledge/abc", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "KNOWLEDGE_NOT_FOUND");
    }

    #[tokio::test]
    async fn file_submission_returns_created_record() {
        let service = Arc::new(StubKnowledgeService::new(StatusBehavior::Resolved));
        let (status, json) = call(
            service,
            Method::POST,
            "/projects/p-1/knowledge",
            Some(json!({
                "name": "report.pdf",
                "mimeType": "application/pdf",
                "size": 2048,
                "bucket": "uploads",
                "key": "report.pdf"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["message"], "File knowledge uploaded successfully");
        assert_eq!(json["data"]["contentType"], "DOCUMENT");
    }

    #[tokio::test]
    async fn unsupported_upload_is_400() {
        let service = Arc::new(StubKnowledgeService::new(StatusBehavior::Resolved));
        let (status, json) = call(
            service,
            Method::POST,
            "/projects/p-1/knowledge",
            Some(json!({ "mimeType": "video/mp4", "bucket": "b", "key": "k" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "UNSUPPORTED_CONTENT_TYPE");
    }

    #[tokio::test]
    async fn publish_exhaustion_is_503() {
        let mut stub = StubKnowledgeService::new(StatusBehavior::Resolved);
        stub.publish_fails = true;
        let (status, json) = call(
            Arc::new(stub),
            Method::POST,
            "/projects/p-1/knowledge/web",
            Some(json!({ "url": "https://example.org" })),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["code"], "PROCESSING_REQUEST_FAILED");
    }

    #[tokio::test]
    async fn resending_terminal_record_conflicts() {
        let service = Arc::new(StubKnowledgeService::new(StatusBehavior::Resolved));
        let id = service.record.id;
        let (status, json) = call(
            service,
            Method::POST,
            &format!("/projects/p-1/knowledge/{id}/resend"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["code"], "KNOWLEDGE_ALREADY_PROCESSED");
    }

    #[tokio::test]
    async fn metrics_route_serializes_snapshot() {
        let service = Arc::new(StubKnowledgeService::new(StatusBehavior::Resolved));
        let (status, json) = call(service, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["requestsPublished"], 3);
    }
}
