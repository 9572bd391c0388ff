//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    middleware::geo_gate,
    models::{ErrorResponse, HealthResponse, TopicSummary},
    state::AppState,
    ws::ws_handler,
};

use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health_keys,
        handlers::list_topics,
        handlers::get_topic,
    ),
    components(
        schemas(HealthResponse, TopicSummary, ErrorResponse)
    ),
    tags(
        (name = "Parley API", description = "Role-play topics and service health for the spoken dialogue trainer")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/api/health/keys", get(handlers::health_keys))
        .route("/api/topics", get(handlers::list_topics))
        .route("/api/topics/{id}", get(handlers::get_topic))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .layer(middleware::from_fn(geo_gate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{test_config, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn make_app() -> Router {
        create_router(test_state(test_config(), None))
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_ok_when_nothing_required() {
        let resp = make_app()
            .oneshot(Request::get("/api/health/keys").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let health: HealthResponse = serde_json::from_value(body_json(resp).await).unwrap();
        assert_eq!(health.status, "ok");
        assert!(health.missing.is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_missing_key() {
        let config = crate::config::Config {
            health_required_keys: vec!["PARLEY_TEST_UNSET_CREDENTIAL".to_string()],
            ..test_config()
        };
        let resp = create_router(test_state(config, None))
            .oneshot(Request::get("/api/health/keys").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "missing");
        assert_eq!(json["missing"][0], "PARLEY_TEST_UNSET_CREDENTIAL");
    }

    #[tokio::test]
    async fn test_list_topics_in_catalog_order() {
        let resp = make_app()
            .oneshot(Request::get("/api/topics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let topics: Vec<TopicSummary> = serde_json::from_value(body_json(resp).await).unwrap();
        let ids: Vec<&str> = topics.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["market", "friend", "restaurant", "cinema", "street", "hotel", "doctor", "clothing"]
        );
    }

    #[tokio::test]
    async fn test_get_topic_found_and_missing() {
        let resp = make_app()
            .oneshot(Request::get("/api/topics/cinema").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["emoji"], "🎬");

        let resp = make_app()
            .oneshot(Request::get("/api/topics/moon").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(resp).await["message"],
            "Topic with id 'moon' not found"
        );
    }

    #[tokio::test]
    async fn test_geo_gate_passes_requests_through() {
        let resp = make_app()
            .oneshot(
                Request::get("/api/topics")
                    .header("x-vercel-ip-country", "IL")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/api/health/keys"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/topics/{id}"));
    }
}
