use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tracing::warn;

use crate::{service::SnippetError, AppState};

// ── Pages ─────────────────────────────────────────────────────────────────────

pub async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
}

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expiration_seconds: Option<i64>,
}

/// `expiration_seconds` as clients actually send it: an integer, a float
/// (truncated toward zero) or a string holding an integer.
#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Int(i64),
    Float(f64),
    Text(String),
}

fn lenient_seconds<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    use serde::de::Error;

    let Some(raw) = Option::<Seconds>::deserialize(d)? else {
        return Ok(None);
    };
    let secs = match raw {
        Seconds::Int(n) => n,
        Seconds::Float(f) if f.is_finite() => f.trunc() as i64,
        Seconds::Float(_) => return Err(D::Error::custom("expiration_seconds must be finite")),
        Seconds::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("expiration_seconds is not an integer: {s:?}")))?,
    };
    Ok(Some(secs))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: String,
    pub expiration_time: String,
    pub timezone: String,
}

pub async fn create_snippet(
    State(state): State<AppState>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejected create request body");
            return bad_request(format!("invalid JSON body: {}", rejection.body_text()));
        }
    };

    let text = body.text.as_deref().unwrap_or_default();
    let ttl_secs = body.expiration_seconds.unwrap_or(state.default_ttl_secs);

    match state.service.create(text, ttl_secs) {
        Ok(created) => Json(CreateResponse {
            expiration_time: state.display.render(created.expires_at),
            timezone: state.display.label.clone(),
            id: created.id,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

// ── Retrieve ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct SnippetResponse {
    pub text: String,
    pub expiration_time: String,
    pub timezone: String,
}

pub async fn get_snippet(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.get(&id) {
        Ok(snippet) => Json(SnippetResponse {
            expiration_time: state.display.render(snippet.expires_at),
            timezone: state.display.label.clone(),
            text: snippet.text,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Map a service error to a response. Validation messages go back to the
/// caller; internal failures are logged and answered with an opaque 500.
fn error_response(e: SnippetError) -> Response {
    match e {
        SnippetError::InvalidInput(_) | SnippetError::InvalidTtl { .. } => {
            bad_request(e.to_string())
        }
        SnippetError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "snippet not found"})),
        )
            .into_response(),
        e => internal_error(e),
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

fn internal_error(e: SnippetError) -> Response {
    tracing::error!(error = %e, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}
