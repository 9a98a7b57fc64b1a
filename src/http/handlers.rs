//! HTTP endpoint handlers.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::request::request_id;
use crate::http::server::AppState;

/// Body of `POST /publish`. Missing fields read as empty strings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PublishRequest {
    pub channel: String,
    pub data: String,
}

#[derive(Serialize)]
pub struct PublishAccepted {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub topics: usize,
    pub subscribers: usize,
}

/// Accept a message for delivery.
///
/// Delivery runs in the background; the response never waits on a subscriber.
pub async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: PublishRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(request_id = %request_id(&headers), error = %e, "Rejected publish body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    tracing::info!(
        request_id = %request_id(&headers),
        channel = %request.channel,
        bytes = request.data.len(),
        "Publishing"
    );

    let registry = state.registry.clone();
    tokio::spawn(async move {
        registry.publish(&request.channel, &request.data).await;
    });

    (StatusCode::OK, Json(PublishAccepted { status: "ok" })).into_response()
}

/// Registry snapshot.
pub async fn status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        topics: state.registry.topic_count(),
        subscribers: state.registry.total_subscribers(),
    })
}
