use axum::{extract::State, Json};
use tracing::info;

use crate::api::{
    state::AppState,
    types::{ClientAction, ControlAction, HealthResponse},
};
use crate::bus::{ChatRequest, Payload, USER_SENDER};
use crate::error::Result;

/// GET /health -- agent lifecycle states and bus counters
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        running: state.system.is_running(),
        uptime_secs: state.uptime_seconds(),
        agents: state.system.statuses(),
        bus: state.bus().stats(),
    })
}

/// Apply one inbound websocket frame
pub async fn handle_client_action(state: &AppState, action: ClientAction) -> Result<()> {
    match action {
        ClientAction::Command {
            action: ControlAction::Start,
        } => {
            info!("Client requested start");
            state.system.start_all().await?;
        }
        ClientAction::Command {
            action: ControlAction::Stop,
        } => {
            info!("Client requested stop");
            state.system.stop_all().await;
        }
        ClientAction::UserMessage { content } => {
            state
                .bus()
                .publish_raw(USER_SENDER, "user_message", content, false)?;
        }
        ClientAction::Chat { content, agent } => {
            state.bus().publish(
                USER_SENDER,
                Payload::Chat(ChatRequest {
                    text: content,
                    agent,
                }),
                false,
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{CannedTextGenerator, PaperGateway, SyntheticMarketData};
    use crate::bus::{subscriber_fn, Channel, Message, MessageBus};
    use crate::config::AppConfig;
    use crate::coordinator::{Collaborators, TradingSystem};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    async fn app_state() -> AppState {
        let config = AppConfig::default();
        let collaborators = Collaborators {
            market_data: Arc::new(SyntheticMarketData::new(7)),
            execution: Arc::new(PaperGateway::new()),
            text: Arc::new(CannedTextGenerator::default()),
        };
        let bus = Arc::new(MessageBus::new(config.bus.clone()));
        let system = TradingSystem::new(&config, bus, collaborators).await;
        AppState::new(Arc::new(system))
    }

    #[tokio::test]
    async fn test_user_message_is_public_from_user() {
        let state = app_state().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        state
            .bus()
            .subscribe_channel(
                Channel::Ingest,
                subscriber_fn("ingest-recorder", move |msg: Arc<Message>| {
                    let sink = Arc::clone(&sink);
                    async move {
                        sink.lock().unwrap().push(msg);
                        Ok(())
                    }
                }),
            )
            .await;
        let bus_task = state.bus().spawn().unwrap();

        handle_client_action(
            &state,
            ClientAction::UserMessage {
                content: json!({"ticker": "msft"}),
            },
        )
        .await
        .unwrap();
        state.bus().stop().await.unwrap();
        bus_task.await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].sender, USER_SENDER);
        assert!(!seen[0].private);
        assert_eq!(seen[0].kind(), "user_message");
    }

    #[tokio::test]
    async fn test_start_and_stop_commands() {
        let state = app_state().await;
        let bus_task = state.bus().spawn().unwrap();

        let start = ClientAction::Command {
            action: ControlAction::Start,
        };
        handle_client_action(&state, start).await.unwrap();
        assert!(state.system.is_running());
        assert!(state.system.statuses().iter().all(|s| s.state.is_active()));

        let stop = ClientAction::Command {
            action: ControlAction::Stop,
        };
        handle_client_action(&state, stop).await.unwrap();
        assert!(!state.system.is_running());
        assert!(state.system.statuses().iter().all(|s| s.state.is_stopped()));

        state.bus().stop().await.unwrap();
        bus_task.await.unwrap();
    }
}
