use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use gemini_relay::{
    config::GeminiConfig,
    gemini::{ChatBackend, GeminiClient, ModelHandle, RelayError},
};

#[derive(Clone, Default)]
struct Recorded {
    calls: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

async fn generate_content(
    State(rec): State<Recorded>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    rec.calls
        .lock()
        .unwrap()
        .push((action.clone(), key.clone(), body.clone()));

    if key.as_deref() != Some("good-key") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}})),
        );
    }

    let prompt = body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default();
    match prompt {
        "blocked" => (
            StatusCode::OK,
            Json(json!({"promptFeedback": {"blockReason": "SAFETY"}})),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "hi "}, {"text": "there"}]},
                    "finishReason": "STOP"
                }]
            })),
        ),
    }
}

async fn list_models(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("pageToken").map(String::as_str) {
        None => Json(json!({
            "models": [{"name": "models/gemini-pro"}, {"name": "models/gemini-1.0-pro"}],
            "nextPageToken": "page-2"
        })),
        Some("page-2") => Json(json!({"models": [{"name": "models/gemini-1.5-flash"}]})),
        Some(_) => Json(json!({"models": []})),
    }
}

async fn spawn_fake_gemini() -> (String, Recorded) {
    let rec = Recorded::default();
    let app = Router::new()
        .route("/v1beta/models", get(list_models))
        .route("/v1beta/models/{action}", post(generate_content))
        .with_state(rec.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), rec)
}

fn client_for(base: &str, key: &str) -> GeminiClient {
    let mut config = GeminiConfig::with_api_key(key);
    config.api_base = base.to_string();
    config.timeout = Some(Duration::from_secs(5));
    GeminiClient::new(&config).unwrap()
}

#[tokio::test]
async fn generate_sends_user_turn_with_api_key() {
    let (base, rec) = spawn_fake_gemini().await;
    let client = client_for(&base, "good-key");

    let model = client.resolve_model("gemini-pro").unwrap();
    let text = client.generate(&model, "hello").await.unwrap();

    assert_eq!(text, "hi there");
    let calls = rec.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (action, key, body) = &calls[0];
    assert_eq!(action, "gemini-pro:generateContent");
    assert_eq!(key.as_deref(), Some("good-key"));
    assert_eq!(
        body,
        &json!({"contents": [{"role": "user", "parts": [{"text": "hello"}]}]})
    );
}

#[tokio::test]
async fn upstream_error_body_is_decoded() {
    let (base, _) = spawn_fake_gemini().await;
    let client = client_for(&base, "bad-key");

    let err = client
        .generate(&ModelHandle::fallback(), "hello")
        .await
        .unwrap_err();

    match &err {
        RelayError::Upstream {
            status, message, ..
        } => {
            assert_eq!(*status, 400);
            assert_eq!(message, "API key not valid. (INVALID_ARGUMENT)");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let text = err.to_string();
    assert!(text.contains("[400]"), "{text}");
    assert!(!text.contains(base.trim_end_matches('/')), "{text}");
}

#[tokio::test]
async fn blocked_prompt_is_an_error() {
    let (base, _) = spawn_fake_gemini().await;
    let client = client_for(&base, "good-key");

    let err = client
        .generate(&ModelHandle::fallback(), "blocked")
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Blocked(reason) if reason == "SAFETY"));
}

#[tokio::test]
async fn list_models_follows_pagination() {
    let (base, _) = spawn_fake_gemini().await;
    let client = client_for(&base, "good-key");

    let models = client.list_models().await.unwrap();

    assert_eq!(
        models,
        vec![
            "models/gemini-pro".to_string(),
            "models/gemini-1.0-pro".to_string(),
            "models/gemini-1.5-flash".to_string(),
        ]
    );
}

#[tokio::test]
async fn unreachable_backend_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(&format!("http://{addr}"), "good-key");
    let err = client.list_models().await.unwrap_err();

    assert!(matches!(err, RelayError::Transport(_)));
    let text = err.to_string();
    assert!(!text.contains(&addr.to_string()), "{text}");
}

/// Serves `/v1beta/models` forever, naming each next page with `token_for(call)`.
async fn spawn_endless_models(token_for: fn(usize) -> String) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/v1beta/models",
        get(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Json(json!({
                    "models": [{"name": format!("models/page-{n}")}],
                    "nextPageToken": token_for(n)
                }))
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), calls)
}

#[tokio::test]
async fn list_models_stops_on_repeated_page_token() {
    let (base, calls) = spawn_endless_models(|_| "again".to_string()).await;
    let client = client_for(&base, "good-key");

    let models = client.list_models().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(models, vec!["models/page-0", "models/page-1"]);
}

#[tokio::test]
async fn list_models_caps_endless_pagination() {
    let (base, calls) = spawn_endless_models(|n| format!("token-{n}")).await;
    let client = client_for(&base, "good-key");

    let models = client.list_models().await.unwrap();

    let pages = calls.load(Ordering::SeqCst);
    assert!(pages > 1 && pages <= 50, "fetched {pages} pages");
    assert_eq!(models.len(), pages);
}

#[test]
fn resolve_uses_configured_allow_list() {
    let client = GeminiClient::new(&GeminiConfig::with_api_key("k")).unwrap();
    assert!(client.resolve_model("gemini-1.5-flash").is_ok());
    assert!(client.resolve_model("gemini-ultra").is_err());
}
