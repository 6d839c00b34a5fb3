use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::bus::{subscriber_fn, Channel, Message, MessageBus};
use crate::coordinator::TradingSystem;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Agents, executor and the shared bus
    pub system: Arc<TradingSystem>,

    /// Serialized bus messages fanned out to every websocket client
    pub ws_tx: broadcast::Sender<String>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(system: Arc<TradingSystem>) -> Self {
        let (ws_tx, _) = broadcast::channel(1000);
        Self {
            system,
            ws_tx,
            start_time: Utc::now(),
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        self.system.bus()
    }

    /// Subscribe on the `ui` channel and forward every delivery to clients
    pub async fn attach_ui_forwarder(&self) {
        let ws_tx = self.ws_tx.clone();
        self.bus()
            .subscribe_channel(
                Channel::Ui,
                subscriber_fn("ws-forwarder", move |msg: Arc<Message>| {
                    let ws_tx = ws_tx.clone();
                    async move {
                        let json = msg.to_json()?;
                        // No connected clients is not a delivery failure
                        if ws_tx.send(json).is_err() {
                            debug!("No websocket clients for {}", msg.kind());
                        }
                        Ok(())
                    }
                }),
            )
            .await;
    }

    /// Broadcast a frame to all connected clients
    pub fn broadcast(&self, frame: String) {
        let _ = self.ws_tx.send(frame);
    }

    /// Get system uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
