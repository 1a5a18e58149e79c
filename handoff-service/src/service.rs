use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    Router,
    body::Body,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post},
};
use handoff_flow::Context;
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    clients::{
        ChatModel, HostedSimilaritySearch, HostedTranscriber, Transcriber, UpstageChatModel,
        build_http_client,
    },
    config::{ChatStrategy, ServiceConfig},
    models::{
        BriefRequest, BriefResponse, ChatErrorResponse, ChatRequest, ChatResponse,
        HospitalSendResponse, TranscriptionResponse,
    },
    tasks::session_keys,
    workflow::Workflows,
};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
const AUDIO_FIELD: &str = "audio";
const DEFAULT_AUDIO_SUFFIX: &str = "webm";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);
type ChatResult = Result<Json<ChatResponse>, Json<ChatErrorResponse>>;

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub workflows: Arc<Workflows>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

impl AppState {
    pub fn new(workflows: Workflows, transcriber: Option<Arc<dyn Transcriber>>) -> Self {
        Self {
            workflows: Arc::new(workflows),
            transcriber,
        }
    }

    /// Wire the hosted clients described by `config` into the workflows
    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let http = build_http_client(config.http_timeout)?;
        let model: Arc<dyn ChatModel> = Arc::new(UpstageChatModel::new(
            http.clone(),
            &config.upstage_api_base,
            &config.upstage_api_key,
            &config.chat_model,
        ));

        let workflows = match config.chat_strategy {
            ChatStrategy::TurnGated => Workflows::turn_gated(model),
            ChatStrategy::Retrieval => {
                let index = config
                    .retrieval
                    .index
                    .clone()
                    .ok_or_else(|| anyhow!("retrieval strategy requires a vector index"))?;
                if !config.retrieval.reference_dir.is_dir() {
                    warn!(
                        dir = %config.retrieval.reference_dir.display(),
                        "reference directory does not exist, every hit will be skipped"
                    );
                }
                let search = Arc::new(HostedSimilaritySearch::new(
                    http.clone(),
                    &config.upstage_api_base,
                    &config.upstage_api_key,
                    &config.retrieval.embedding_model,
                    index,
                ));
                Workflows::retrieval(model, search, &config.retrieval)
            }
        };

        let transcriber = config.transcription.clone().map(|transcription| {
            Arc::new(HostedTranscriber::new(http.clone(), transcription)) as Arc<dyn Transcriber>
        });
        if transcriber.is_none() {
            warn!("OPENAI_API_KEY not set, /transcribe will report an error");
        }

        Ok(Self::new(workflows, transcriber))
    }
}

/// HTTP-level knobs that are not part of the shared state
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// `None` allows any origin
    pub cors_allowed_origins: Option<Vec<String>>,
    pub max_upload_bytes: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            cors_allowed_origins: None,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

impl RouterSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            cors_allowed_origins: config.cors_allowed_origins.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let state = AppState::from_config(config)?;
    Ok(build_router(state, &RouterSettings::from_config(config)))
}

pub fn build_router(state: AppState, settings: &RouterSettings) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/transcribe", post(transcribe))
        .route("/chat", post(chat))
        .route("/generate_medical_brief", post(generate_medical_brief))
        .route("/send_to_hospital", post(send_to_hospital))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(cors_layer(settings.cors_allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(state)
}

fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let allow_origin = match origins {
        None => AllowOrigin::any(),
        Some(origins) if origins.iter().any(|origin| origin.trim() == "*") => AllowOrigin::any(),
        Some(origins) => AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| warn!(origin = %origin, "ignoring invalid CORS origin"))
                .ok()
        })),
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Tag every request with a correlation id, reusing the caller's when present
async fn correlation_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let header = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .filter(|value| !value.is_empty())
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("unknown"));
    let correlation_id = header.to_str().unwrap_or("unknown").to_string();

    request
        .headers_mut()
        .insert(CORRELATION_ID_HEADER, header.clone());

    let span = info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;
    response.headers_mut().insert(CORRELATION_ID_HEADER, header);
    response
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "EmergencyAI Backend is running!" }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "chat_strategy": state.workflows.strategy.as_str(),
        "transcription": state.transcriber.is_some()
    }))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ChatResult {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "invalid chat request");
        Json(ChatErrorResponse::new(format!(
            "Invalid request: {}",
            rejection.body_text()
        )))
    })?;

    if request.messages.is_empty() {
        return Err(Json(ChatErrorResponse::new("Messages list is empty")));
    }

    info!(
        messages = request.messages.len(),
        strategy = state.workflows.strategy.as_str(),
        "processing chat request"
    );

    let context = Context::with_conversation(request.messages);
    match state.workflows.chat.execute(context.clone()).await {
        Ok(result) => {
            let should_end = context
                .get::<bool>(session_keys::SHOULD_END)
                .unwrap_or(false);
            info!(
                should_end,
                steps = result.visited.len(),
                status = result.status_message.as_deref().unwrap_or(""),
                "chat request completed"
            );

            Ok(Json(ChatResponse {
                response: result.response.unwrap_or_default(),
                should_end,
                conversation: context.conversation().await,
                medical_brief: None,
            }))
        }
        Err(e) => {
            error!(error = %e, "chat workflow failed");
            Err(Json(ChatErrorResponse::new(format!("An error occurred: {e}"))))
        }
    }
}

async fn generate_medical_brief(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<BriefResponse> {
    let Json(body) = payload.map_err(|rejection| bad_request_error(&rejection.body_text()))?;
    let request: BriefRequest = serde_json::from_value(body)
        .map_err(|e| bad_request_error(&format!("Invalid conversation: {e}")))?;

    if request.conversation.is_empty() {
        return Err(bad_request_error("Conversation is empty"));
    }

    info!(messages = request.conversation.len(), "generating medical brief");

    let context = Context::with_conversation(request.conversation);
    match state.workflows.brief.execute(context).await {
        Ok(result) => {
            info!(
                status = result.status_message.as_deref().unwrap_or(""),
                "medical brief completed"
            );
            Ok(Json(BriefResponse {
                content: result.response.unwrap_or_default(),
            }))
        }
        Err(e) => {
            error!(error = %e, "medical brief generation failed");
            Err(internal_error(&e.to_string()))
        }
    }
}

async fn send_to_hospital(payload: Result<Json<Value>, JsonRejection>) -> ApiResult<HospitalSendResponse> {
    let Json(body) = payload.map_err(|rejection| bad_request_error(&rejection.body_text()))?;

    // Nothing is transmitted yet; the payload is only acknowledged.
    let fields = body.as_object().map(|o| o.len()).unwrap_or(0);
    info!(fields, "hospital handoff payload received");

    Ok(Json(HospitalSendResponse {
        status: "success".to_string(),
        message: "병원으로 브리핑이 전송되었습니다.".to_string(),
    }))
}

async fn transcribe(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<TranscriptionResponse> {
    let transcriber = state
        .transcriber
        .clone()
        .ok_or_else(|| internal_error("speech transcription is not configured"))?;
    let mut multipart = multipart.map_err(|rejection| bad_request_error(&rejection.body_text()))?;

    let (audio, file_name) = read_audio_field(&mut multipart).await?;
    info!(bytes = audio.len(), "transcribing uploaded audio");

    let staged = stage_upload(&audio, file_name.as_deref()).await.map_err(|e| {
        error!(error = %e, "failed to stage audio upload");
        internal_error(&e.to_string())
    })?;

    let result = transcriber.transcribe(staged.path()).await;

    if let Err(e) = staged.close() {
        warn!(error = %e, "failed to remove staged audio file");
    }

    match result {
        Ok(text) => Ok(Json(TranscriptionResponse { text })),
        Err(e) => {
            error!(error = %e, "transcription failed");
            Err(internal_error(&e.to_string()))
        }
    }
}

async fn read_audio_field(multipart: &mut Multipart) -> Result<(Vec<u8>, Option<String>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request_error(&e.body_text()))?
    {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(String::from);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request_error(&e.body_text()))?;
        if bytes.is_empty() {
            return Err(bad_request_error("audio file is empty"));
        }
        return Ok((bytes.to_vec(), file_name));
    }
    Err(bad_request_error("multipart field 'audio' is required"))
}

/// Extension of the uploaded file name, when it looks like a real audio extension
fn audio_suffix(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_AUDIO_SUFFIX.to_string())
}

/// Write the upload to a temp file that is removed when the handle is closed or dropped
async fn stage_upload(audio: &[u8], file_name: Option<&str>) -> anyhow::Result<NamedTempFile> {
    let suffix = format!(".{}", audio_suffix(file_name));
    let staged = tempfile::Builder::new()
        .prefix("handoff-audio-")
        .suffix(&suffix)
        .tempfile()?;
    tokio::fs::write(staged.path(), audio).await?;
    Ok(staged)
}
