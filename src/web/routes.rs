use super::{Result, WebError};
use crate::auth::AuthService;
use crate::connection::ManageConnection;
use crate::core::{is_valid_key, sanitize_name};
use crate::lookup::LookupService;
use crate::storage::StoreConnection;
use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

pub struct AppState<M: ManageConnection> {
    pub lookups: Arc<LookupService<M>>,
    pub auth: Arc<AuthService<M>>,
}

impl<M: ManageConnection> AppState<M> {
    pub fn new(lookups: Arc<LookupService<M>>, auth: Arc<AuthService<M>>) -> Self {
        Self { lookups, auth }
    }
}

impl<M: ManageConnection> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            lookups: Arc::clone(&self.lookups),
            auth: Arc::clone(&self.auth),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FlagResponse {
    pub nation: String,
    pub flag: String,
}

#[derive(Debug, Serialize)]
pub struct VerifiedResponse {
    pub nation: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyForm {
    pub nation: Option<String>,
    #[serde(rename = "auth-token")]
    pub auth_token: Option<String>,
    pub auth: Option<String>,
}

pub fn build_router<M>(state: AppState<M>) -> Router
where
    M: ManageConnection,
    M::Connection: StoreConnection,
{
    let auth_header = HeaderName::from_static(AUTH_TOKEN_HEADER);

    Router::new()
        .route("/api/health", get(healthcheck))
        .route("/api/nation/:name/flag", get(nation_flag::<M>))
        .route("/api/auth/verify", post(verify_auth::<M>))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .expose_headers([auth_header]),
        )
        .with_state(state)
}

async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn nation_flag<M>(
    State(state): State<AppState<M>>,
    Path(name): Path<String>,
) -> Result<Response>
where
    M: ManageConnection,
    M::Connection: StoreConnection,
{
    let key = sanitize_name(&name);
    if !is_valid_key(&key) {
        return Err(WebError::Input(format!("invalid nation name '{}'", name)));
    }

    let flag = state.lookups.nation_flag(&key).await?;
    Ok((
        [(header::CACHE_CONTROL, "public, max-age=60")],
        Json(FlagResponse { nation: key, flag }),
    )
        .into_response())
}

async fn verify_auth<M>(
    State(state): State<AppState<M>>,
    Form(form): Form<VerifyForm>,
) -> Response
where
    M: ManageConnection,
    M::Connection: StoreConnection,
{
    let outcome = state
        .auth
        .validate(
            form.nation.as_deref(),
            form.auth_token.as_deref(),
            form.auth.as_deref(),
        )
        .await;

    match outcome {
        Ok(token) => {
            let Ok(token_value) = HeaderValue::from_str(&token) else {
                return (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN REASON").into_response();
            };
            let nation = form
                .nation
                .as_deref()
                .map(sanitize_name)
                .unwrap_or_default();
            (
                [
                    (HeaderName::from_static(AUTH_TOKEN_HEADER), token_value),
                    (
                        header::ACCESS_CONTROL_EXPOSE_HEADERS,
                        HeaderValue::from_static("X-Auth-Token"),
                    ),
                ],
                Json(VerifiedResponse { nation }),
            )
                .into_response()
        }
        Err(rejection) => (StatusCode::UNAUTHORIZED, rejection.reason()).into_response(),
    }
}
