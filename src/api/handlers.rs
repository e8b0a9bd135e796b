//! Demo application handlers behind the secure dispatcher.

use axum::{
    extract::{Path, State},
    http::header,
    response::{AppendHeaders, IntoResponse},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::ApiState;
use crate::authz::Principal;
use crate::crypto::parse_public_key;
use crate::http::error::GatewayError;
use crate::security::csrf::{csrf_cookie, issue_token};
use crate::session::{session_cookie, NewSession};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn server_key(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({ "publicKey": &*state.public_key_pem }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    pub public_key: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub server_public_key: String,
    pub csrf_token: String,
}

/// Store the client's public key in a fresh session and set the session
/// and CSRF cookies.
pub async fn handshake(
    State(state): State<ApiState>,
    Json(body): Json<HandshakeRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    parse_public_key(&body.public_key)
        .map_err(|e| GatewayError::InvalidInput(e.to_string()))?;

    let session = state
        .sessions
        .create(NewSession {
            public_key: Some(body.public_key),
            device_id: body.device_id,
            user_id: None,
            ttl: state.session_ttl,
        })
        .await?;
    tracing::info!(device_id = ?session.device_id, "Session established");

    let csrf_token = issue_token();
    let cookies = AppendHeaders([
        (header::SET_COOKIE, session_cookie(&session.token, state.environment)),
        (
            header::SET_COOKIE,
            csrf_cookie(&state.csrf_cookie_name, &csrf_token, state.environment),
        ),
    ]);

    Ok((
        cookies,
        Json(HandshakeResponse {
            expires_at: session.expires_at,
            server_public_key: state.public_key_pem.to_string(),
            csrf_token,
        }),
    ))
}

pub async fn echo(Json(body): Json<Value>) -> Json<Value> {
    Json(body)
}

pub async fn update_manual(
    Path(id): Path<u64>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<Value>,
) -> Json<Value> {
    tracing::info!(manual_id = id, user_id = principal.user_id, "Manual updated");
    Json(json!({
        "id": id,
        "updatedBy": principal.user_id,
        "manual": body,
    }))
}
