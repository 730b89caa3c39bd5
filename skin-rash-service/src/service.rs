use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use rash_dialogue::{
    AnalysisRequest, AnalysisResponse, ConversationOrchestrator, Stage, VisionFeatureExtractor,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::{
    clients::{BlipCaptioner, OpenRouterClient, UnavailableCaptioner},
    config::Config,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConversationOrchestrator>,
}

/// Wire the collaborators once per process and hand them to the orchestrator.
///
/// The captioning model is loaded here, before the first request. If it cannot
/// be loaded the service still starts; strict_local turns then report the
/// load error and native_direct is unaffected.
pub async fn build_orchestrator(config: &Config) -> ConversationOrchestrator {
    let reasoning = OpenRouterClient::new(
        reqwest::Client::new(),
        &config.base_url,
        &config.api_key,
        &config.reasoning_model,
    );

    let vision: Arc<dyn VisionFeatureExtractor> =
        match BlipCaptioner::load(&config.blip_model, &config.blip_revision).await {
            Ok(captioner) => Arc::new(captioner),
            Err(e) => {
                warn!(
                    model = %config.blip_model,
                    error = %format!("{:#}", e),
                    "Captioning model unavailable, strict_local turns will fail"
                );
                Arc::new(UnavailableCaptioner::new(format!("{:#}", e)))
            }
        };

    ConversationOrchestrator::new(vision, Arc::new(reasoning))
}

pub async fn create_app(config: &Config) -> Router {
    build_router(AppState {
        orchestrator: Arc::new(build_orchestrator(config).await),
    })
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/analyze", post(analyze))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Skin Rash Differential Diagnosis Dialogue",
        "version": "1.0.0",
        "description": "Multi-turn dialogue that asks clarifying questions about a skin image and submits a structured differential diagnosis",
        "endpoints": {
            "POST /analyze": "Run one dialogue turn; resubmit updated_history as conversation_history on the next call",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> ApiResult<AnalysisResponse> {
    info!(
        mode = ?request.mode,
        history_len = request.history.len(),
        "Processing analyze request"
    );

    validate_image(&request)?;

    let response = state.orchestrator.process(request).await;

    match (response.stage, &response.final_diagnosis) {
        (Stage::Diagnosis, None) => warn!(content = %response.content, "Turn ended in a failure"),
        (stage, _) => info!(stage = ?stage, "Turn completed"),
    }

    Ok(Json(response))
}

fn validate_image(request: &AnalysisRequest) -> Result<(), ApiError> {
    if request.image.is_blank() {
        return Err(bad_request_error("image_base64 is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use rash_dialogue::{
        CompletionReply, ImagePayload, PromptTurn, ReasoningModelClient, SUBMIT_DIAGNOSIS,
    };
    use rig::completion::ToolDefinition;
    use tower::ServiceExt;

    struct FixedVision;

    #[async_trait]
    impl VisionFeatureExtractor for FixedVision {
        async fn analyze(&self, _image: &ImagePayload) -> anyhow::Result<String> {
            Ok("Visual Analysis Report:\n1. General View: red patch".to_string())
        }
    }

    struct FixedModel(CompletionReply);

    #[async_trait]
    impl ReasoningModelClient for FixedModel {
        async fn complete(
            &self,
            _turns: &[PromptTurn],
            _tools: &[ToolDefinition],
        ) -> anyhow::Result<CompletionReply> {
            Ok(self.0.clone())
        }
    }

    fn app(reply: CompletionReply) -> Router {
        build_router(AppState {
            orchestrator: Arc::new(ConversationOrchestrator::new(
                Arc::new(FixedVision),
                Arc::new(FixedModel(reply)),
            )),
        })
    }

    async fn post_analyze(app: Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/analyze")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = app(CompletionReply::text("unused"))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_first_turn_question() {
        let (status, body) = post_analyze(
            app(CompletionReply::text("Do you have itching?")),
            json!({ "image_base64": "aGVsbG8=", "pipeline_mode": "native_direct" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "stage": "questioning",
                "content": "Do you have itching?",
                "final_diagnosis": null,
                "updated_history": [{ "role": "assistant", "content": "Do you have itching?" }]
            })
        );
    }

    #[tokio::test]
    async fn test_strict_mode_diagnosis() {
        let reply = CompletionReply::tool_call(
            SUBMIT_DIAGNOSIS,
            json!({
                "diagnosis_options": ["Eczema", "Psoriasis"],
                "key_differences": "Scale and distribution differ",
                "symptoms_to_check": ["itching"],
                "diagnostic_methods": ["dermatoscopy"]
            })
            .to_string(),
        );

        let (status, body) = post_analyze(
            app(reply),
            json!({
                "image_base64": "aGVsbG8=",
                "pipeline_mode": "strict_local",
                "conversation_history": [
                    { "role": "assistant", "content": "Does it itch?" },
                    { "role": "user", "content": "Yes" }
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stage"], "diagnosis");
        assert_eq!(
            body["final_diagnosis"]["diagnosis_options"],
            json!(["Eczema", "Psoriasis"])
        );
        assert_eq!(
            body["final_diagnosis"]["disclaimer"],
            rash_dialogue::DEFAULT_DISCLAIMER
        );
        assert_eq!(body["updated_history"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unloaded_captioner_fails_strict_turn_only() {
        let app = build_router(AppState {
            orchestrator: Arc::new(ConversationOrchestrator::new(
                Arc::new(UnavailableCaptioner::new("weights not downloaded")),
                Arc::new(FixedModel(CompletionReply::text("Does it itch?"))),
            )),
        });

        let (status, body) = post_analyze(
            app.clone(),
            json!({ "image_base64": "aGVsbG8=", "pipeline_mode": "strict_local" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stage"], "diagnosis");
        assert!(body["final_diagnosis"].is_null());
        let content = body["content"].as_str().unwrap();
        assert!(content.contains("vision feature extraction failed"));
        assert!(content.contains("weights not downloaded"));
        assert_eq!(body["updated_history"], json!([]));

        let (status, body) = post_analyze(
            app,
            json!({ "image_base64": "aGVsbG8=", "pipeline_mode": "native_direct" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stage"], "questioning");
        assert_eq!(body["content"], "Does it itch?");
    }

    #[tokio::test]
    async fn test_blank_image_is_rejected() {
        let (status, body) = post_analyze(
            app(CompletionReply::text("unused")),
            json!({ "image_base64": "   " }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "image_base64 is required");
    }
}
