//! End-to-end tests for the gateway router: every route exercised
//! through `tower::ServiceExt::oneshot` against counting mock providers,
//! with no network and no database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use quelle::ai::core::providers::{
    ChatCompletionProvider, ChatMessage, CompletionRequest, CompletionResponse, CompletionStream,
    FileSearchOptions, GeneratedImage, ImageGenerator, ImageLocator, ImageRequest, PromptEnhancer,
    ProviderError, SearchOutcome, SearchProvider, TalkRequest, TalkResult, TalkSynthesizer, Usage,
    VisionInput, VisionProvider, VisionResponse, WebSearchCall, WebSearchOptions,
};
use quelle::ai::flow::{Capabilities, FlowConfig, SessionRegistry};
use quelle::api::state::AppState;
use quelle::create_router;
use quelle::database::models::SubscriptionChange;
use quelle::payments::webhook::{sign_payload, StoreError, SubscriptionStore};

const WEBHOOK_SECRET: &str = "whsec_test_secret";

// =============================================================================
// Mocks
// =============================================================================

#[derive(Default)]
struct MockChat {
    calls: AtomicUsize,
    fail_with: Option<String>,
}

#[async_trait]
impl ChatCompletionProvider for MockChat {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(ProviderError::upstream("openai", message.clone()));
        }
        Ok(CompletionResponse {
            content: "mock reply".to_string(),
            model: "mock-model".to_string(),
            usage: Some(Usage {
                prompt_tokens: Some(10),
                completion_tokens: Some(5),
                total_tokens: Some(15),
            }),
        })
    }

    async fn complete_stream(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionStream, ProviderError> {
        Err(ProviderError::upstream("openai", "streaming not mocked"))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Default)]
struct MockEnhancer {
    calls: AtomicUsize,
}

#[async_trait]
impl PromptEnhancer for MockEnhancer {
    async fn enhance(&self, message: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("enhanced: {}", message))
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

#[derive(Default)]
struct MockImage {
    calls: AtomicUsize,
}

#[async_trait]
impl ImageGenerator for MockImage {
    async fn generate(&self, _request: ImageRequest) -> Result<GeneratedImage, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedImage {
            image: ImageLocator::url(format!("https://cdn.example/gen-{}.png", n)),
            model: "mock-image-model".to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "replicate"
    }
}

#[derive(Default)]
struct MockSearch {
    calls: AtomicUsize,
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(
        &self,
        _messages: &[ChatMessage],
        web: Option<&WebSearchOptions>,
        _file: Option<&FileSearchOptions>,
    ) -> Result<SearchOutcome, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outcome = SearchOutcome {
            content: "search-grounded reply".to_string(),
            ..Default::default()
        };
        if let Some(web) = web {
            outcome.web_search_calls.push(WebSearchCall {
                id: "ws_1".to_string(),
                status: "completed".to_string(),
                query: web.query.clone(),
                domains: web.allowed_domains.clone(),
            });
        }
        Ok(outcome)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Default)]
struct MockVision {
    calls: AtomicUsize,
}

#[async_trait]
impl VisionProvider for MockVision {
    async fn describe(
        &self,
        _input: VisionInput,
        _prompt: Option<String>,
    ) -> Result<VisionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(VisionResponse {
            description: "a ceramic mug on a walnut table".to_string(),
            model: "mock-vision-model".to_string(),
            usage: None,
        })
    }

    fn provider_name(&self) -> &'static str {
        "google"
    }
}

#[derive(Default)]
struct MockTalks;

#[async_trait]
impl TalkSynthesizer for MockTalks {
    async fn synthesize(&self, _request: TalkRequest) -> Result<TalkResult, ProviderError> {
        Ok(TalkResult {
            talk_id: "tlk_1".to_string(),
            result_url: "https://cdn.example/talk.mp4".to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "d-id"
    }
}

#[derive(Default)]
struct CountingStore {
    upserts: AtomicUsize,
    cancels: AtomicUsize,
}

#[async_trait]
impl SubscriptionStore for CountingStore {
    async fn upsert(&self, _change: SubscriptionChange) -> Result<(), StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mark_canceled(&self, _id: &str) -> Result<(), StoreError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Fixture {
    chat: Arc<MockChat>,
    enhancer: Arc<MockEnhancer>,
    image: Arc<MockImage>,
    search: Arc<MockSearch>,
    store: Arc<CountingStore>,
    app: axum::Router,
}

fn fixture() -> Fixture {
    fixture_with_chat(MockChat::default())
}

fn fixture_with_chat(chat: MockChat) -> Fixture {
    let chat = Arc::new(chat);
    let enhancer = Arc::new(MockEnhancer::default());
    let image = Arc::new(MockImage::default());
    let search = Arc::new(MockSearch::default());
    let store = Arc::new(CountingStore::default());

    let caps = Arc::new(Capabilities {
        chat: chat.clone(),
        enhancer: enhancer.clone(),
        image: image.clone(),
        search: search.clone(),
    });

    let state = AppState::new(
        caps,
        SessionRegistry::new(FlowConfig::default(), chrono::Duration::seconds(300)),
        Arc::new(MockVision::default()),
        Arc::new(MockTalks),
        None,
        store.clone(),
        Some(WEBHOOK_SECRET.to_string()),
    );

    Fixture {
        chat,
        enhancer,
        image,
        search,
        store,
        app: create_router(state),
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_reports_services() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    assert!(body["services"].is_object());
    assert!(body["uptime_seconds"].is_number());
}

#[tokio::test]
async fn test_diagnostic_headers_present() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(resp.headers().contains_key("x-quelle-request-id"));
    assert!(resp.headers().contains_key("x-quelle-processing-ms"));
}

// =============================================================================
// Chat orchestration
// =============================================================================

#[tokio::test]
async fn test_missing_message_is_400_with_no_provider_call() {
    let f = fixture();
    let resp = f
        .app
        .clone()
        .oneshot(post_json("/api/chat", json!({})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert!(body["error"].as_str().unwrap().contains("message"));

    // No external call was attempted
    assert_eq!(f.chat.calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.enhancer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.image.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_blank_message_is_400() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json("/api/chat", json!({ "message": "   " })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_plain_message_yields_text_envelope() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json("/api/chat", json!({ "message": "hello there" })))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["type"], "text");
    assert_eq!(body["content"], "mock reply");
    assert!(body["chat_id"].as_str().is_some());
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_image_trigger_yields_image_envelope() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json(
            "/api/chat",
            json!({ "message": "generate a picture of a dog" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["type"], "image");
    assert_eq!(body["image_url"], "https://cdn.example/gen-0.png");
    let enhanced = body["enhanced_prompt"].as_str().unwrap();
    assert!(!enhanced.is_empty());
    assert_eq!(f.enhancer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.image.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_history_accumulates_and_reference_images_follow_generation() {
    let f = fixture();
    let chat_id = Uuid::new_v4();

    let resp = f
        .app
        .clone()
        .oneshot(post_json(
            "/api/chat",
            json!({ "message": "hello there", "chat_id": chat_id }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = f
        .app
        .clone()
        .oneshot(post_json(
            "/api/chat",
            json!({ "message": "generate a product shot", "chat_id": chat_id }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = f
        .app
        .oneshot(
            Request::get(format!("/api/chat?chat_id={}", chat_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;

    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 4); // two user/assistant pairs
    assert_eq!(history[0]["role"], "user");
    assert_eq!(history[0]["content"], "hello there");
    assert_eq!(history[1]["role"], "assistant");

    // The generated image is the most recent reference image
    let images = body["reference_images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["url"], "https://cdn.example/gen-0.png");
}

#[tokio::test]
async fn test_get_unknown_session_returns_empty_state() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(
            Request::get(format!("/api/chat?chat_id={}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["history"].as_array().unwrap().len(), 0);
    assert_eq!(body["reference_images"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_clear_history_keeps_reference_images() {
    let f = fixture();
    let chat_id = Uuid::new_v4();

    f.app
        .clone()
        .oneshot(post_json(
            "/api/chat",
            json!({ "message": "generate a lifestyle shot", "chat_id": chat_id }),
        ))
        .await
        .unwrap();

    let resp = f
        .app
        .clone()
        .oneshot(
            Request::delete(format!("/api/chat?chat_id={}", chat_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["success"], true);

    let resp = f
        .app
        .clone()
        .oneshot(
            Request::get(format!("/api/chat?chat_id={}", chat_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["history"].as_array().unwrap().len(), 0);
    // Images survive a history reset
    assert_eq!(body["reference_images"].as_array().unwrap().len(), 1);

    // A subsequent message still succeeds and is the sole history entry pair
    f.app
        .clone()
        .oneshot(post_json(
            "/api/chat",
            json!({ "message": "back to plain chat", "chat_id": chat_id }),
        ))
        .await
        .unwrap();
    let resp = f
        .app
        .oneshot(
            Request::get(format!("/api/chat?chat_id={}", chat_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["history"].as_array().unwrap().len(), 2);
    assert_eq!(body["history"][0]["content"], "back to plain chat");
}

#[tokio::test]
async fn test_clear_with_images_flag_discards_both() {
    let f = fixture();
    let chat_id = Uuid::new_v4();

    f.app
        .clone()
        .oneshot(post_json(
            "/api/chat",
            json!({ "message": "generate a packshot", "chat_id": chat_id }),
        ))
        .await
        .unwrap();

    f.app
        .clone()
        .oneshot(
            Request::delete(format!("/api/chat?chat_id={}&images=true", chat_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let resp = f
        .app
        .oneshot(
            Request::get(format!("/api/chat?chat_id={}", chat_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["history"].as_array().unwrap().len(), 0);
    assert_eq!(body["reference_images"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_web_search_options_merge_call_records() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json(
            "/api/chat",
            json!({
                "message": "what does the press say about us",
                "web_search": { "query": "quelle reviews" }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["type"], "text");
    assert_eq!(body["content"], "search-grounded reply");
    assert_eq!(body["web_search_calls"][0]["id"], "ws_1");
    assert_eq!(f.search.calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.chat.calls.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Upstream failure classification
// =============================================================================

async fn failure_status(upstream_message: &str) -> StatusCode {
    let f = fixture_with_chat(MockChat {
        fail_with: Some(upstream_message.to_string()),
        ..Default::default()
    });
    f.app
        .oneshot(post_json("/api/chat", json!({ "message": "hello" })))
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_rate_limit_failure_maps_to_429() {
    assert_eq!(
        failure_status("Rate limit exceeded, try again later").await,
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_content_policy_failure_maps_to_400() {
    assert_eq!(
        failure_status("rejected by our content policy").await,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_api_key_failure_maps_to_401() {
    assert_eq!(
        failure_status("Incorrect API key provided").await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_unclassified_failure_maps_to_500() {
    assert_eq!(
        failure_status("connection reset by peer").await,
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn test_failure_body_carries_error_field() {
    let f = fixture_with_chat(MockChat {
        fail_with: Some("Rate limit exceeded".to_string()),
        ..Default::default()
    });
    let resp = f
        .app
        .oneshot(post_json("/api/chat", json!({ "message": "hello" })))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert!(body["error"].as_str().is_some());
    assert!(body["error_code"].as_str().is_some());
}

// =============================================================================
// Completions
// =============================================================================

#[tokio::test]
async fn test_completion_returns_content_and_metadata() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json(
            "/api/completions",
            json!({ "messages": [{ "role": "user", "content": "hi" }] }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("x-quelle-provider").unwrap(),
        "openai"
    );
    let body = json_body(resp).await;
    assert_eq!(body["content"], "mock reply");
    assert_eq!(body["metadata"]["model"], "mock-model");
    assert_eq!(body["usage"]["total_tokens"], 15);
}

#[tokio::test]
async fn test_completion_rejects_empty_messages() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json("/api/completions", json!({ "messages": [] })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_completion_rejects_unknown_role() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json(
            "/api/completions",
            json!({ "messages": [{ "role": "wizard", "content": "hi" }] }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Images / vision / video
// =============================================================================

#[tokio::test]
async fn test_image_generation_without_prompt_is_400() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json("/api/images", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_image_generation_returns_url() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json(
            "/api/images",
            json!({ "prompt": "a mug on a table" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["image_url"], "https://cdn.example/gen-0.png");
    assert_eq!(body["model"], "mock-image-model");
}

#[tokio::test]
async fn test_vision_without_image_is_400() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json("/api/vision", json!({ "prompt": "what is this" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_vision_describes_url_input() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json(
            "/api/vision",
            json!({ "image_url": "https://cdn.example/in.png" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["description"], "a ceramic mug on a walnut table");
}

#[tokio::test]
async fn test_video_talk_requires_fields() {
    let f = fixture();
    let resp = f
        .app
        .clone()
        .oneshot(post_json("/api/video/talks", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = f
        .app
        .oneshot(post_json(
            "/api/video/talks",
            json!({ "image_url": "https://cdn.example/face.png", "script_text": "hello" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["result_url"], "https://cdn.example/talk.mp4");
}

// =============================================================================
// Payments
// =============================================================================

#[tokio::test]
async fn test_checkout_requires_fields() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(post_json(
            "/api/payments/checkout",
            json!({ "plan": "pro" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

fn webhook_request(body: &str, signature: &str) -> Request<Body> {
    Request::post("/api/payments/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn checkout_event_body() -> String {
    json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_1",
                "subscription": "sub_123",
                "metadata": {
                    "user_id": Uuid::new_v4().to_string(),
                    "plan": "pro",
                    "billing_cycle": "monthly"
                }
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_webhook_invalid_signature_is_400_with_zero_writes() {
    let f = fixture();
    let body = checkout_event_body();
    let resp = f
        .app
        .oneshot(webhook_request(&body, "t=123,v1=deadbeef"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(f.store.upserts.load(Ordering::SeqCst), 0);
    assert_eq!(f.store.cancels.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_webhook_missing_signature_is_400() {
    let f = fixture();
    let resp = f
        .app
        .oneshot(
            Request::post("/api/payments/webhook")
                .header("content-type", "application/json")
                .body(Body::from(checkout_event_body()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(f.store.upserts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_webhook_valid_signature_upserts_exactly_once() {
    let f = fixture();
    let body = checkout_event_body();
    let signature = sign_payload(body.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp());

    let resp = f
        .app
        .oneshot(webhook_request(&body, &signature))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let ack = json_body(resp).await;
    assert_eq!(ack["received"], true);
    assert_eq!(f.store.upserts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_webhook_unknown_event_acked_without_writes() {
    let f = fixture();
    let body = json!({ "id": "evt_2", "type": "invoice.paid", "data": { "object": {} } }).to_string();
    let signature = sign_payload(body.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp());

    let resp = f
        .app
        .oneshot(webhook_request(&body, &signature))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(f.store.upserts.load(Ordering::SeqCst), 0);
    assert_eq!(f.store.cancels.load(Ordering::SeqCst), 0);
}
