//! Integration tests for the analysis coordinator against a mock analysis
//! service.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::{Mutex, Notify, watch};

use nutrifit_client::analysis::{AnalysisClient, AnalysisCoordinator, AnalysisError, ImageHandle};
use nutrifit_client::session::SessionSnapshot;
use nutrifit_core::SessionStatus;

use common::{REQUEST_TIMEOUT, notifier, serve, signed_in_session};

/// What the mock answers with.
#[derive(Clone)]
enum Reply {
    Ok(Value),
    Status(StatusCode, &'static str),
}

/// A received multipart upload.
#[derive(Debug, Clone, Default)]
struct Upload {
    file: Vec<u8>,
    file_name: Option<String>,
    content_type: Option<String>,
    user_id: Option<String>,
}

struct MockService {
    hits: AtomicUsize,
    reply: Mutex<Reply>,
    uploads: Mutex<Vec<Upload>>,
    /// When set, each request waits for a permit before answering.
    hold: Option<Arc<Notify>>,
}

impl MockService {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            hits: AtomicUsize::new(0),
            reply: Mutex::new(reply),
            uploads: Mutex::new(Vec::new()),
            hold: None,
        })
    }

    fn held(reply: Reply, hold: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            hits: AtomicUsize::new(0),
            reply: Mutex::new(reply),
            uploads: Mutex::new(Vec::new()),
            hold: Some(hold),
        })
    }

    async fn set_reply(&self, reply: Reply) {
        *self.reply.lock().await = reply;
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn calculate_nutrition(
    State(mock): State<Arc<MockService>>,
    mut multipart: Multipart,
) -> Response {
    mock.hits.fetch_add(1, Ordering::SeqCst);

    let mut upload = Upload::default();
    while let Some(field) = multipart.next_field().await.unwrap() {
        match field.name() {
            Some("file") => {
                upload.file_name = field.file_name().map(str::to_string);
                upload.content_type = field.content_type().map(str::to_string);
                upload.file = field.bytes().await.unwrap().to_vec();
            }
            Some("user_id") => upload.user_id = Some(field.text().await.unwrap()),
            _ => {}
        }
    }
    mock.uploads.lock().await.push(upload);

    if let Some(hold) = &mock.hold {
        hold.notified().await;
    }

    match mock.reply.lock().await.clone() {
        Reply::Ok(body) => Json(body).into_response(),
        Reply::Status(status, body) => (status, body).into_response(),
    }
}

async fn start_service(mock: Arc<MockService>) -> AnalysisClient {
    let router = Router::new()
        .route("/calculate-nutrition/", post(calculate_nutrition))
        .with_state(mock);
    let base = serve(router).await;
    AnalysisClient::new(&base, REQUEST_TIMEOUT).unwrap()
}

fn avocado_toast() -> Value {
    json!({
        "total_calories": 350,
        "food_items": [
            {"item": "Avocado Toast", "calories": 350}
        ],
        "healthiness": "Healthy",
        "nutrient_breakdown": {
            "carbohydrates": "30g (10%)",
            "protein": "8g (16%)",
            "fats": "22g (28%)",
            "fiber": "7g (25%)",
            "sugar": "2g (2%)"
        },
        "is_safe_to_consume": true
    })
}

fn photo() -> ImageHandle {
    ImageHandle::new("toast.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0])
}

#[tokio::test]
async fn test_avocado_toast_end_to_end() {
    let mock = MockService::new(Reply::Ok(avocado_toast()));
    let client = start_service(Arc::clone(&mock)).await;
    let (_session, rx) = signed_in_session("user-42");
    let (recorded, notifier) = notifier();
    let coordinator = AnalysisCoordinator::new(client, rx, notifier);

    let image = photo();
    let image_id = image.id.clone();
    let result = coordinator.submit(image).await.unwrap();

    assert!((result.total_calories - 350.0).abs() < f64::EPSILON);
    assert_eq!(result.food_items.len(), 1);
    assert_eq!(result.food_items[0].item, "Avocado Toast");
    assert_eq!(result.healthiness, "Healthy");
    assert_eq!(result.nutrient_breakdown.protein, "8g (16%)");
    assert!(result.is_safe_to_consume);

    let state = coordinator.state();
    assert!(!state.is_analyzing());
    assert_eq!(state.result.as_deref(), Some(&result));
    assert_eq!(state.image_id.as_deref(), Some(image_id.as_str()));
    assert_eq!(recorded.titles(), ["Analysis complete"]);

    let uploads = mock.uploads.lock().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].file, vec![0xFF, 0xD8, 0xFF, 0xE0]);
    assert_eq!(uploads[0].file_name.as_deref(), Some("toast.jpg"));
    assert_eq!(uploads[0].content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(uploads[0].user_id.as_deref(), Some("user-42"));
}

#[tokio::test]
async fn test_not_authenticated_makes_no_request() {
    let mock = MockService::new(Reply::Ok(avocado_toast()));
    let client = start_service(Arc::clone(&mock)).await;

    for status in [SessionStatus::Resolving, SessionStatus::Unauthenticated] {
        let (_session, rx) = watch::channel(SessionSnapshot { status, seq: 1 });
        let (_, notifier) = notifier();
        let coordinator = AnalysisCoordinator::new(client.clone(), rx, notifier);

        let err = coordinator.submit(photo()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::NotAuthenticated));
        assert!(!coordinator.is_analyzing());
    }

    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn test_service_error_keeps_previous_result() {
    let mock = MockService::new(Reply::Ok(avocado_toast()));
    let client = start_service(Arc::clone(&mock)).await;
    let (_session, rx) = signed_in_session("user-42");
    let (recorded, notifier) = notifier();
    let coordinator = AnalysisCoordinator::new(client, rx, notifier);

    let first = coordinator.submit(photo()).await.unwrap();
    let first_image = coordinator.state().image_id;

    mock.set_reply(Reply::Status(StatusCode::INTERNAL_SERVER_ERROR, "model offline"))
        .await;
    let err = coordinator.submit(photo()).await.unwrap_err();

    match err {
        AnalysisError::Service { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "model offline");
        }
        other => panic!("expected service error, got {other:?}"),
    }

    let state = coordinator.state();
    assert!(!state.is_analyzing());
    assert_eq!(state.result.as_deref(), Some(&first));
    assert_eq!(state.image_id, first_image);
    assert_eq!(recorded.titles(), ["Analysis complete", "Analysis failed"]);
    assert_eq!(mock.hits(), 2);
}

#[tokio::test]
async fn test_malformed_body_is_reported() {
    let mock = MockService::new(Reply::Ok(json!({
        "total_calories": "lots",
        "food_items": []
    })));
    let client = start_service(Arc::clone(&mock)).await;
    let (_session, rx) = signed_in_session("user-42");
    let (_, notifier) = notifier();
    let coordinator = AnalysisCoordinator::new(client, rx, notifier);

    let err = coordinator.submit(photo()).await.unwrap_err();
    assert!(matches!(err, AnalysisError::MalformedResponse(_)));
    assert!(coordinator.state().result.is_none());
}

#[tokio::test]
async fn test_missing_safety_flag_is_malformed() {
    let mut body = avocado_toast();
    body.as_object_mut().unwrap().remove("is_safe_to_consume");
    let mock = MockService::new(Reply::Ok(body));
    let client = start_service(mock).await;
    let (_session, rx) = signed_in_session("user-42");
    let (_, notifier) = notifier();
    let coordinator = AnalysisCoordinator::new(client, rx, notifier);

    let err = coordinator.submit(photo()).await.unwrap_err();
    assert!(matches!(err, AnalysisError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_is_analyzing_while_outstanding() {
    let hold = Arc::new(Notify::new());
    let mock = MockService::held(Reply::Ok(avocado_toast()), Arc::clone(&hold));
    let client = start_service(Arc::clone(&mock)).await;
    let (_session, rx) = signed_in_session("user-42");
    let (_, notifier) = notifier();
    let coordinator = Arc::new(AnalysisCoordinator::new(client, rx, notifier));

    let mut state = coordinator.subscribe();
    let task = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.submit(photo()).await }
    });

    state.wait_for(|state| state.is_analyzing()).await.unwrap();
    assert!(coordinator.is_analyzing());

    hold.notify_one();
    task.await.unwrap().unwrap();
    assert!(!coordinator.is_analyzing());
}

#[tokio::test]
async fn test_dropped_request_clears_is_analyzing() {
    let hold = Arc::new(Notify::new());
    let mock = MockService::held(Reply::Ok(avocado_toast()), hold);
    let client = start_service(Arc::clone(&mock)).await;
    let (_session, rx) = signed_in_session("user-42");
    let (_, notifier) = notifier();
    let coordinator = Arc::new(AnalysisCoordinator::new(client, rx, notifier));

    let mut state = coordinator.subscribe();
    let task = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.submit(photo()).await }
    });
    state.wait_for(|state| state.is_analyzing()).await.unwrap();

    // The caller goes away mid-request
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert!(!coordinator.is_analyzing());
    assert!(coordinator.state().result.is_none());
}

#[tokio::test]
async fn test_reset_clears_result() {
    let mock = MockService::new(Reply::Ok(avocado_toast()));
    let client = start_service(mock).await;
    let (_session, rx) = signed_in_session("user-42");
    let (_, notifier) = notifier();
    let coordinator = AnalysisCoordinator::new(client, rx, notifier);

    coordinator.submit(photo()).await.unwrap();
    assert!(coordinator.state().result.is_some());

    coordinator.reset();
    let state = coordinator.state();
    assert!(state.result.is_none());
    assert!(state.image_id.is_none());
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    // Bind then drop a listener so the port is closed
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let base = url::Url::parse(&format!("http://{addr}/")).unwrap();
    let client = AnalysisClient::new(&base, REQUEST_TIMEOUT).unwrap();
    let (_session, rx) = signed_in_session("user-42");
    let (_, notifier) = notifier();
    let coordinator = AnalysisCoordinator::new(client, rx, notifier);

    let err = coordinator.submit(photo()).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Transport(_)));
    assert!(!coordinator.is_analyzing());
}
