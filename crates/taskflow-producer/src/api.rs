use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskflow_broker::TaskPublisher;
use taskflow_core::{TaskEnvelope, TaskId};
use tracing::{error, info};

type Publisher = Arc<dyn TaskPublisher>;

/// HTTP ingress routes.
pub fn create_router(publisher: Publisher) -> Router {
    Router::new()
        .route("/tasks", post(submit_task))
        .route("/health", get(health_check))
        .with_state(publisher)
}

#[derive(Debug, Deserialize)]
struct SubmitTaskRequest {
    task_type: String,
    #[serde(default)]
    payload: serde_json::Map<String, serde_json::Value>,
    /// Caller-supplied id for idempotent submission; generated when absent.
    task_id: Option<TaskId>,
    max_retries: Option<u32>,
}

#[derive(Debug, Serialize)]
struct TaskResponse {
    task_id: TaskId,
    status: String,
    message: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    timestamp: DateTime<Utc>,
}

async fn submit_task(
    State(publisher): State<Publisher>,
    Json(request): Json<SubmitTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), (StatusCode, Json<ErrorResponse>)> {
    let mut envelope = TaskEnvelope::new(request.task_type, request.payload);
    if let Some(task_id) = request.task_id {
        envelope = envelope.with_task_id(task_id);
    }
    if let Some(max_retries) = request.max_retries {
        envelope = envelope.with_max_retries(max_retries);
    }

    let body = envelope.to_bytes().map_err(|e| {
        error!(error = %e, "Failed to encode task");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    publisher
        .publish_task(&body, &envelope.task_id.to_string())
        .await
        .map_err(|e| {
            error!(task_id = %envelope.task_id, error = %e, "Failed to publish task");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "failed to queue task".to_string(),
                }),
            )
        })?;

    info!(
        task_id = %envelope.task_id,
        task_type = %envelope.task_type,
        "Task queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskResponse {
            task_id: envelope.task_id,
            status: "queued".to_string(),
            message: "task accepted for processing".to_string(),
            created_at: envelope.created_at,
        }),
    ))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "producer".to_string(),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use taskflow_broker::BrokerError;
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakePublisher {
        published: Mutex<Vec<Vec<u8>>>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl TaskPublisher for FakePublisher {
        async fn publish_task(&self, body: &[u8], _message_id: &str) -> Result<(), BrokerError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(BrokerError::PublishNotConfirmed);
            }
            self.published.lock().push(body.to_vec());
            Ok(())
        }

        async fn publish_dead_letter(
            &self,
            _body: &[u8],
            _message_id: &str,
        ) -> Result<(), BrokerError> {
            unreachable!("the producer never dead-letters");
        }
    }

    fn post_tasks(json: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/tasks")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let router = create_router(Arc::new(FakePublisher::default()));

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_submit_publishes_envelope() {
        let publisher = Arc::new(FakePublisher::default());
        let router = create_router(publisher.clone());

        let response = router
            .oneshot(post_tasks(serde_json::json!({
                "task_type": "send_email",
                "payload": { "recipient": "user@example.com" },
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let published = publisher.published.lock();
        assert_eq!(published.len(), 1);
        let envelope = TaskEnvelope::from_bytes(&published[0]).unwrap();
        assert_eq!(envelope.task_type, "send_email");
        assert_eq!(envelope.attempt_count, 0);
    }

    #[tokio::test]
    async fn test_submit_respects_caller_task_id() {
        let publisher = Arc::new(FakePublisher::default());
        let router = create_router(publisher.clone());
        let task_id = uuid::Uuid::new_v4();

        let response = router
            .oneshot(post_tasks(serde_json::json!({
                "task_type": "send_email",
                "task_id": task_id,
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let published = publisher.published.lock();
        let envelope = TaskEnvelope::from_bytes(&published[0]).unwrap();
        assert_eq!(envelope.task_id, task_id);
    }

    #[tokio::test]
    async fn test_publish_failure_returns_503() {
        let publisher = Arc::new(FakePublisher::default());
        publisher.failing.store(true, Ordering::SeqCst);
        let router = create_router(publisher);

        let response = router
            .oneshot(post_tasks(serde_json::json!({ "task_type": "send_email" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
