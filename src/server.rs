//! HTTP surface
//!
//! - `POST /api/sms/send-notification` creates a ride and texts the driver
//! - `POST /api/sms/webhook` takes the driver's reply; always `200`
//! - `GET  /api/sms/ride-status/{ride_id}` reads a ride
//! - `GET  /api/health`

use crate::dispatch::DispatchService;
use crate::error::{Error, Result};
use crate::inbound::{InboundHandler, InboundSms};
use crate::ride::{NewRide, RideRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Empty TwiML document; tells the provider not to send an automatic reply
pub const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

const MAX_WEBHOOK_BODY: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<String>,
    #[serde(flatten)]
    pub ride: NewRide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default)]
    pub simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendNotificationResponse {
    fn failure(error: &Error) -> Self {
        Self {
            success: false,
            ride_id: None,
            message: "Failed to create ride request".to_string(),
            sid: None,
            simulated: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideStatusResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride: Option<RideRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub rides: Option<usize>,
    pub channel: String,
}

#[derive(Clone)]
pub struct AppState {
    dispatch: Arc<DispatchService>,
    inbound: Arc<InboundHandler>,
}

impl AppState {
    pub fn new(dispatch: Arc<DispatchService>) -> Self {
        let inbound = Arc::new(dispatch.inbound_handler());
        Self { dispatch, inbound }
    }
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::DuplicateId(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn router(dispatch: Arc<DispatchService>) -> Router {
    Router::new()
        .route("/api/sms/send-notification", post(send_notification))
        .route("/api/sms/webhook", post(webhook))
        .route("/api/sms/ride-status/{ride_id}", get(ride_status))
        .route("/api/health", get(health))
        .with_state(AppState::new(dispatch))
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, dispatch: Arc<DispatchService>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = ?listener.local_addr().ok(), "HTTP server listening");
    axum::serve(listener, router(dispatch))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn send_notification(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SendNotificationRequest>, JsonRejection>,
) -> (StatusCode, Json<SendNotificationResponse>) {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            let error = Error::InvalidRequest(rejection.body_text());
            warn!(error = %error, "Rejected send-notification body");
            return (StatusCode::BAD_REQUEST, Json(SendNotificationResponse::failure(&error)));
        }
    };

    let result = match request.ride_id.as_deref() {
        Some(ride_id) => state.dispatch.send_notification_with_id(ride_id, request.ride).await,
        None => state.dispatch.send_notification(request.ride).await,
    };

    match result {
        Ok(outcome) => {
            let message = match (&outcome.delivery_error, outcome.simulated()) {
                (Some(_), _) => "Ride request created; SMS delivery failed",
                (None, true) => "Ride request created; SMS simulated",
                (None, false) => "Ride request sent to driver",
            };
            let response = SendNotificationResponse {
                success: true,
                ride_id: Some(outcome.ride.id.clone()),
                message: message.to_string(),
                sid: outcome.delivery.sid().map(str::to_string),
                simulated: outcome.simulated(),
                error: outcome.delivery_error,
            };
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!(error = %e, "send-notification failed");
            } else {
                warn!(error = %e, "send-notification rejected");
            }
            (status, Json(SendNotificationResponse::failure(&e)))
        }
    }
}

/// Always acknowledges; outcomes go back to the driver by SMS
pub async fn webhook(State(state): State<AppState>, request: Request) -> impl IntoResponse {
    match decode_inbound(request).await {
        Ok(sms) => {
            let outcome = state.inbound.handle(&sms).await;
            info!(outcome = ?outcome, "Webhook handled");
        }
        Err(e) => {
            warn!(error = %e, "Unparseable webhook body, acknowledging anyway");
        }
    }

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], EMPTY_TWIML)
}

/// JSON when the content type says so, urlencoded form otherwise
async fn decode_inbound(request: Request) -> Result<InboundSms> {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        let bytes = axum::body::to_bytes(request.into_body(), MAX_WEBHOOK_BODY)
            .await
            .map_err(|e| Error::InvalidRequest(format!("webhook body: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    } else {
        let Form(sms) = Form::<InboundSms>::from_request(request, &())
            .await
            .map_err(|rejection| Error::InvalidRequest(rejection.body_text()))?;
        Ok(sms)
    }
}

pub async fn ride_status(
    State(state): State<AppState>,
    Path(ride_id): Path<String>,
) -> (StatusCode, Json<RideStatusResponse>) {
    match state.dispatch.get_status(&ride_id) {
        Ok(ride) => (
            StatusCode::OK,
            Json(RideStatusResponse {
                success: true,
                ride: Some(ride),
                error: None,
            }),
        ),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!(ride_id = %ride_id, error = %e, "ride-status read failed");
            }
            let message = match e {
                Error::NotFound(_) => "Ride not found".to_string(),
                other => other.to_string(),
            };
            (
                status,
                Json(RideStatusResponse {
                    success: false,
                    ride: None,
                    error: Some(message),
                }),
            )
        }
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let rides = match state.dispatch.ride_count() {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(error = %e, "Could not count rides");
            None
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        rides,
        channel: state.dispatch.channel_name().to_string(),
    })
}
