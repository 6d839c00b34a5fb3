use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState, websocket::websocket_handler};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_handler))
        // WebSocket endpoint
        .route("/ws", get(websocket_handler))
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{CannedTextGenerator, PaperGateway, SyntheticMarketData};
    use crate::bus::MessageBus;
    use crate::config::AppConfig;
    use crate::coordinator::{Collaborators, TradingSystem};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_lists_every_agent() {
        let config = AppConfig::default();
        let collaborators = Collaborators {
            market_data: Arc::new(SyntheticMarketData::new(1)),
            execution: Arc::new(PaperGateway::new()),
            text: Arc::new(CannedTextGenerator::default()),
        };
        let bus = Arc::new(MessageBus::new(config.bus.clone()));
        let system = TradingSystem::new(&config, bus, collaborators).await;
        let app = create_router(AppState::new(Arc::new(system)));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["running"], false);
        let agents: Vec<&str> = health["agents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["channel"].as_str().unwrap())
            .collect();
        assert_eq!(agents, vec!["ingest", "analyze", "risk", "decide"]);
        assert_eq!(health["agents"][0]["state"], "idle");
        assert_eq!(health["bus"]["published"], 0);
    }
}
