use crate::domain::{self, NotificationPayload, Subscription};
use crate::service::ServiceError;
use crate::state::AppState;

use std::net::SocketAddr;

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/subscribe", post(subscribe))
        .route("/api/unsubscribe", post(unsubscribe))
        .route("/api/subscriptions/me", get(subscriptions_me))
        .route("/api/trigger-self", post(trigger_self))
        .route(
            "/api/trigger",
            post(trigger).layer(middleware::from_fn_with_state(
                state.clone(),
                hub_secret_auth,
            )),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    error: &'static str,
}

fn error_response(status: StatusCode, error: &'static str) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error }))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SubscriptionKeys {
    #[serde(default)]
    p256dh: String,
    #[serde(default)]
    auth: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PushSubscriptionBody {
    #[serde(default)]
    endpoint: String,
    #[serde(default)]
    keys: SubscriptionKeys,
}

/// Accepts both the nested browser `PushSubscription` shape and a flat form;
/// the nested object wins when both are supplied.
#[derive(Debug, Deserialize)]
pub(crate) struct SubscribeRequest {
    subscription: Option<PushSubscriptionBody>,
    topic: Option<String>,
    #[serde(default)]
    ui_code: String,

    #[serde(default)]
    endpoint: String,
    #[serde(default)]
    p256dh: String,
    #[serde(default)]
    auth: String,
    #[serde(default)]
    keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UnsubscribeRequest {
    #[serde(default)]
    endpoint: String,
    subscription: Option<PushSubscriptionBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TriggerRequest {
    title: Option<String>,
    body: Option<String>,
    url: Option<String>,
    topic: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TriggerSelfRequest {
    ui_code: Option<String>,
    endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeQuery {
    endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TriggerQuery {
    dry_run: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct SubscriptionStatusResponse {
    status: &'static str,
    topics: Vec<String>,
}

#[derive(Serialize)]
pub(crate) struct UnsubscribeResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub(crate) struct TriggerResponse {
    status: &'static str,
    topic: String,
    targets: usize,
}

#[derive(Serialize)]
pub(crate) struct DryRunResponse {
    dry_run: bool,
    topic: String,
    targets: usize,
}

#[derive(Serialize)]
pub(crate) struct TriggerSelfResponse {
    status: &'static str,
    targets: usize,
}

async fn hub_secret_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let secret = request
        .headers()
        .get("x-hub-secret")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if !state.service.validate_hub_secret(secret) {
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    next.run(request).await
}

pub(crate) async fn healthz() -> &'static str {
    "ok"
}

pub(crate) async fn subscribe(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubscriptionStatusResponse>), (StatusCode, Json<ErrorResponse>)> {
    let ip = client_ip(&headers, remote);
    if !state.service.allow_subscribe(&ip) {
        return Err(error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
        ));
    }

    let Ok(Json(request)) = body else {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_subscription",
        ));
    };

    if !state.service.validate_ui_code(&request.ui_code) {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_access_code",
        ));
    }

    let Some(subscription) = build_subscription(&request) else {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_subscription",
        ));
    };

    match state.service.subscribe(subscription).await {
        Ok((created, topics)) => {
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            Ok((
                status,
                Json(SubscriptionStatusResponse {
                    status: "active",
                    topics,
                }),
            ))
        }
        Err(ServiceError::EmptyTopics) => Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_subscription",
        )),
        Err(err) => {
            error!("subscribe upsert failed: {err}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ))
        }
    }
}

pub(crate) async fn unsubscribe(
    State(state): State<AppState>,
    body: Result<Json<UnsubscribeRequest>, JsonRejection>,
) -> Result<Json<UnsubscribeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Ok(Json(request)) = body else {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "missing_endpoint",
        ));
    };

    // Nested wins over the flat field when both are supplied, matching
    // `build_subscription`.
    let mut endpoint = "";
    if let Some(nested) = &request.subscription {
        endpoint = nested.endpoint.trim();
    }
    if endpoint.is_empty() {
        endpoint = request.endpoint.trim();
    }
    if endpoint.is_empty() {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "missing_endpoint",
        ));
    }

    if let Err(err) = state.service.unsubscribe(endpoint).await {
        error!("unsubscribe delete failed: {err}");
        return Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
        ));
    }

    Ok(Json(UnsubscribeResponse { status: "inactive" }))
}

pub(crate) async fn subscriptions_me(
    State(state): State<AppState>,
    Query(query): Query<MeQuery>,
) -> Result<Json<SubscriptionStatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let endpoint = query.endpoint.as_deref().unwrap_or("").trim();
    if endpoint.is_empty() {
        return Ok(Json(SubscriptionStatusResponse {
            status: "inactive",
            topics: Vec::new(),
        }));
    }

    match state.service.subscriptions_me(endpoint).await {
        Ok((status, topics)) => Ok(Json(SubscriptionStatusResponse { status, topics })),
        Err(err) => {
            error!("subscriptions/me query failed: {err}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ))
        }
    }
}

pub(crate) async fn trigger(
    State(state): State<AppState>,
    Query(query): Query<TriggerQuery>,
    body: Result<Json<TriggerRequest>, JsonRejection>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let Ok(Json(request)) = body else {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_payload",
        ));
    };

    let (Some(title), Some(body), Some(url)) = (request.title, request.body, request.url) else {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_payload",
        ));
    };

    let topic = domain::normalize_topic(request.topic.as_deref().unwrap_or("")).to_string();
    let payload =
        serde_json::to_vec(&NotificationPayload { title, body, url }).map_err(|err| {
            error!("trigger payload marshal failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        })?;

    let dry_run = is_dry_run(query.dry_run.as_deref());
    let targets = state
        .service
        .trigger_topic(&topic, payload, dry_run)
        .await
        .map_err(|err| {
            error!("trigger failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        })?;

    if dry_run {
        return Ok(Json(DryRunResponse {
            dry_run: true,
            topic,
            targets,
        })
        .into_response());
    }

    Ok(Json(TriggerResponse {
        status: "queued",
        topic,
        targets,
    })
    .into_response())
}

pub(crate) async fn trigger_self(
    State(state): State<AppState>,
    body: Result<Json<TriggerSelfRequest>, JsonRejection>,
) -> Result<Json<TriggerSelfResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Ok(Json(request)) = body else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_access_code",
        ));
    };

    let (Some(ui_code), Some(endpoint)) = (request.ui_code, request.endpoint) else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_access_code",
        ));
    };

    if !state.service.validate_ui_code(&ui_code) {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_access_code",
        ));
    }

    match state.service.trigger_self(&endpoint).await {
        Ok(targets) => Ok(Json(TriggerSelfResponse {
            status: "queued",
            targets,
        })),
        Err(err) => {
            error!("trigger-self failed: {err}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ))
        }
    }
}

fn build_subscription(request: &SubscribeRequest) -> Option<Subscription> {
    let mut endpoint = String::new();
    let mut p256dh = String::new();
    let mut auth = String::new();

    if let Some(nested) = &request.subscription {
        endpoint = nested.endpoint.trim().to_string();
        p256dh = nested.keys.p256dh.trim().to_string();
        auth = nested.keys.auth.trim().to_string();
    }

    if endpoint.is_empty() {
        endpoint = request.endpoint.trim().to_string();
    }
    if p256dh.is_empty() {
        p256dh = first_non_empty(&[&request.p256dh, &request.keys.p256dh]);
    }
    if auth.is_empty() {
        auth = first_non_empty(&[&request.auth, &request.keys.auth]);
    }

    if endpoint.is_empty() || p256dh.is_empty() || auth.is_empty() {
        return None;
    }

    let topics = match request.topic.as_deref() {
        None | Some("") => Vec::new(),
        Some(topic) => vec![topic.to_string()],
    };

    Some(Subscription {
        endpoint,
        p256dh,
        auth,
        topics,
    })
}

fn first_non_empty(values: &[&str]) -> String {
    for value in values {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    String::new()
}

fn is_dry_run(value: Option<&str>) -> bool {
    matches!(
        value.unwrap_or("").trim().to_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// Client IP for rate limiting: first `X-Forwarded-For` entry, else
/// `X-Real-IP`, else the transport-layer remote address.
fn client_ip(headers: &HeaderMap, remote: SocketAddr) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
    {
        let trimmed = real_ip.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    remote.ip().to_string()
}
