use std::{collections::HashMap, sync::Arc};

use {
    axum::{
        Router,
        body::Bytes,
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::get,
    },
    tower_http::cors::{Any, CorsLayer},
    tracing::{debug, error, info, warn},
};

use {
    palaver_common::InboundEvent,
    palaver_config::GatewayConfig,
    palaver_dispatch::Dispatcher,
    palaver_outbound::MessageGateway,
    palaver_sessions::SessionStore,
    palaver_webhook::{route_payload, verify_signature, verify_subscription},
};

/// Notice sent to the user when a dispatch loop fails (default policy,
/// replaceable by registering different handlers).
const FAILURE_NOTICE: &str = "Oops! Something went wrong on our side, please try again.";

/// Reply for attachment-only messages, which the NLU engine cannot
/// interpret.
const ATTACHMENT_NOTICE: &str = "Sorry, I can only process text messages for now.";

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<SessionStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub outbound: Arc<MessageGateway>,
}

/// Build the webhook router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", get(verify_handler).post(receive_handler))
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Subscription handshake: echo the challenge on a verify-token match.
async fn verify_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match verify_subscription(
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
        &state.config.verify_token,
    ) {
        Some(challenge) => {
            info!("webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        },
        None => {
            warn!("webhook subscription verification failed");
            StatusCode::FORBIDDEN.into_response()
        },
    }
}

/// Inbound events. Acknowledges with 200 unconditionally — platform
/// delivery semantics require it regardless of whether dispatch succeeds.
async fn receive_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref app_secret) = state.config.app_secret {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(&body, signature, app_secret) {
            warn!("webhook signature verification failed");
            return StatusCode::FORBIDDEN;
        }
    }

    let events = route_payload(&body, &state.config.page_id);
    debug!(event_count = events.len(), "webhook payload routed");

    for event in events {
        let session_id = state.store.resolve_or_create(&event.external_user_id).await;
        let state = state.clone();
        tokio::spawn(async move {
            run_dispatch(state, session_id, event).await;
        });
    }

    StatusCode::OK
}

/// Run one dispatch loop for a routed event and apply the default failure
/// policy.
async fn run_dispatch(state: AppState, session_id: String, event: InboundEvent) {
    if event.attachment_only {
        if let Err(e) = state
            .outbound
            .send_text(&event.external_user_id, ATTACHMENT_NOTICE)
            .await
        {
            warn!(session_id, error = %e, "attachment notice send failed");
        }
        return;
    }

    match state
        .dispatcher
        .dispatch(&session_id, event.utterance.as_deref())
        .await
    {
        Ok(context) => {
            debug!(session_id, context_keys = context.len(), "dispatch finished");
        },
        Err(e) => {
            error!(session_id, error = %e, "dispatch failed");
            if let Err(notice_err) = state
                .outbound
                .send_text(&event.external_user_id, FAILURE_NOTICE)
                .await
            {
                warn!(session_id, error = %notice_err, "failure notice send failed");
            }
        },
    }
}
