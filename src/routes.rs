//! HTTP surface — the click-tracking redirect endpoint.
//!
//! `GET /track/{lead_id}/{campaign_id}?url=<encoded>&eqid=<id>` records a
//! click event and 302-redirects to the decoded original URL. Identifiers
//! that fail to parse are recorded as absent; only a missing `url` is a
//! client error. The redirect must not depend on the telemetry write.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::model::ClickEvent;
use crate::store::Database;

/// Shared state for the tracking routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Database>,
}

/// Build the Axum router for tracking redirects.
pub fn track_routes(store: Arc<dyn Database>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/track/{lead_id}/{campaign_id}", get(track_click))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { store })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dripmail"
    }))
}

#[derive(Debug, Deserialize)]
struct TrackParams {
    url: Option<String>,
    eqid: Option<String>,
}

async fn track_click(
    Path((lead_id, campaign_id)): Path<(String, String)>,
    Query(params): Query<TrackParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(url) = params.url else {
        return (StatusCode::BAD_REQUEST, "URL parameter missing").into_response();
    };

    let click = ClickEvent {
        lead_id: lead_id.parse().ok(),
        campaign_id: campaign_id.parse().ok(),
        queue_item_id: params.eqid.as_deref().and_then(|s| s.parse().ok()),
        url: url.clone(),
    };

    if let Err(e) = state.store.record_click(&click).await {
        warn!(error = %e, "Failed to record click, redirecting anyway");
    } else {
        debug!(lead = ?click.lead_id, campaign = ?click.campaign_id, "Click recorded");
    }

    (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::store::LibSqlBackend;

    async fn router() -> Router {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        track_routes(store)
    }

    #[tokio::test]
    async fn health_responds_ok() {
        let response = router()
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn track_redirects_to_decoded_url() {
        let response = router()
            .await
            .oneshot(
                Request::builder()
                    .uri("/track/1/2?url=https%3A%2F%2Fexample.com%2Fx%3Fa%3D1&eqid=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers().get(header::LOCATION).unwrap();
        assert_eq!(location, "https://example.com/x?a=1");
    }

    #[tokio::test]
    async fn missing_url_is_client_error() {
        let response = router()
            .await
            .oneshot(
                Request::builder()
                    .uri("/track/1/2?eqid=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unparsable_ids_still_redirect() {
        let response = router()
            .await
            .oneshot(
                Request::builder()
                    .uri("/track/abc/def?url=https%3A%2F%2Fexample.com&eqid=xyz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
    }
}
