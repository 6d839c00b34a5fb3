//! Message Bus - 單消費者 FIFO 派發
//!
//! Producers enqueue without blocking. One delivery loop dequeues in FIFO
//! order, fans each message out to every callback of its recipient channels
//! concurrently, and waits for that fan-out before taking the next message.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::channel::Channel;
use super::message::{Message, Payload};
use super::subscriber::Subscriber;
use crate::config::BusConfig;
use crate::error::{HedgeflowError, Result};

/// Queue entry. `Drain` marks the point up to which `stop()` waits.
enum Envelope {
    Deliver(Arc<Message>),
    Drain(oneshot::Sender<()>),
}

/// 派發統計
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Messages accepted into the queue
    pub published: u64,
    /// Messages fully fanned out
    pub processed: u64,
    /// Successful callback invocations
    pub delivered: u64,
    /// Callback invocations that errored or panicked
    pub delivery_failures: u64,
    /// Messages refused after `stop()`
    pub dropped: u64,
}

impl BusStats {
    /// Messages still waiting in the queue
    pub fn pending(&self) -> u64 {
        self.published.saturating_sub(self.processed)
    }
}

impl std::fmt::Display for BusStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Bus[pub={}, done={}, ok={}, fail={}, drop={}]",
            self.published, self.processed, self.delivered, self.delivery_failures, self.dropped
        )
    }
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    processed: AtomicU64,
    delivered: AtomicU64,
    delivery_failures: AtomicU64,
    dropped: AtomicU64,
}

/// Publish/subscribe bus with privacy-scoped fan-out
pub struct MessageBus {
    config: BusConfig,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    subscribers: RwLock<HashMap<Channel, Vec<Arc<dyn Subscriber>>>>,
    /// Last stamped time. Held while enqueueing so queue order matches
    /// timestamp order, and by `stop()` so nothing lands behind the drain
    /// marker.
    clock: Mutex<DateTime<Utc>>,
    accepting: AtomicBool,
    running: AtomicBool,
    counters: Counters,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl MessageBus {
    pub fn new(config: BusConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            tx,
            rx: Mutex::new(Some(rx)),
            subscribers: RwLock::new(HashMap::new()),
            clock: Mutex::new(DateTime::<Utc>::MIN_UTC),
            accepting: AtomicBool::new(true),
            running: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Stamp, wrap and enqueue a message. Never blocks.
    pub fn publish(&self, sender: impl Into<String>, payload: Payload, private: bool) {
        let sender = sender.into();
        let mut last = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.accepting.load(Ordering::SeqCst) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(sender = %sender, kind = payload.kind(), "Bus stopped, dropping message");
            return;
        }

        let timestamp = Utc::now().max(*last);
        *last = timestamp;

        let message = Arc::new(Message::at(sender, payload, private, timestamp));
        match self.tx.send(Envelope::Deliver(message)) {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Bus queue closed, message dropped");
            }
        }
    }

    /// Validate an untyped `(type, content)` pair and publish it
    pub fn publish_raw(
        &self,
        sender: impl Into<String>,
        kind: &str,
        content: serde_json::Value,
        private: bool,
    ) -> Result<()> {
        let payload = Payload::from_parts(kind, content)?;
        self.publish(sender, payload, private);
        Ok(())
    }

    /// Register a callback on a channel given by name. Unknown names are
    /// logged and ignored.
    pub async fn subscribe(&self, channel: &str, subscriber: Arc<dyn Subscriber>) {
        match Channel::normalize(channel) {
            Some(ch) => self.subscribe_channel(ch, subscriber).await,
            None => {
                warn!(
                    "Unknown channel '{}', subscriber {} not registered",
                    channel,
                    subscriber.name()
                );
            }
        }
    }

    pub async fn subscribe_channel(&self, channel: Channel, subscriber: Arc<dyn Subscriber>) {
        debug!("Subscribing {} to {}", subscriber.name(), channel);
        self.subscribers
            .write()
            .await
            .entry(channel)
            .or_default()
            .push(subscriber);
    }

    pub async fn subscriber_count(&self, channel: Channel) -> usize {
        self.subscribers
            .read()
            .await
            .get(&channel)
            .map_or(0, Vec::len)
    }

    /// Recipient channels: `{ui, sender}` for private messages, every
    /// channel otherwise.
    pub fn recipients(message: &Message) -> Vec<Channel> {
        if message.private {
            let mut recipients = vec![Channel::Ui];
            if let Some(own) = Channel::normalize(&message.sender) {
                if own != Channel::Ui {
                    recipients.push(own);
                }
            }
            recipients
        } else {
            Channel::ALL.to_vec()
        }
    }

    /// Run the delivery loop on the current task until `stop()` drains it
    pub async fn run(&self) -> Result<()> {
        let rx = self.take_receiver()?;
        self.delivery_loop(rx).await;
        Ok(())
    }

    /// Spawn the delivery loop. The bus counts as running once this returns.
    pub fn spawn(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let rx = self.take_receiver()?;
        let bus = Arc::clone(self);
        Ok(tokio::spawn(async move { bus.delivery_loop(rx).await }))
    }

    /// Deliver everything enqueued so far, then stop the loop. Later
    /// publishes are dropped. Waits at most `drain_timeout_ms`.
    pub async fn stop(&self) -> Result<()> {
        let ack_rx = {
            let _order = self.clock.lock().unwrap_or_else(|e| e.into_inner());
            self.accepting.store(false, Ordering::SeqCst);
            if !self.running.load(Ordering::SeqCst) {
                return Ok(());
            }

            let (ack_tx, ack_rx) = oneshot::channel();
            if self.tx.send(Envelope::Drain(ack_tx)).is_err() {
                return Ok(());
            }
            ack_rx
        };

        let timeout = self.config.drain_timeout();
        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(_) => {
                info!("Message bus drained and stopped ({})", self.stats());
                Ok(())
            }
            Err(_) => {
                warn!(
                    "Message bus drain timed out after {}ms ({} pending)",
                    timeout.as_millis(),
                    self.stats().pending()
                );
                Err(HedgeflowError::Internal(format!(
                    "bus drain timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            delivery_failures: self.counters.delivery_failures.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    fn take_receiver(&self) -> Result<mpsc::UnboundedReceiver<Envelope>> {
        let mut slot = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        let rx = slot
            .take()
            .ok_or_else(|| HedgeflowError::Internal("message bus is already running".into()))?;
        self.accepting.store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn delivery_loop(&self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        info!("Message bus delivery loop started");

        while let Some(envelope) = rx.recv().await {
            match envelope {
                Envelope::Deliver(message) => {
                    self.dispatch(message).await;
                    self.counters.processed.fetch_add(1, Ordering::Relaxed);
                }
                Envelope::Drain(ack) => {
                    let _ = ack.send(());
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        *self.rx.lock().unwrap_or_else(|e| e.into_inner()) = Some(rx);
        info!("Message bus delivery loop stopped");
    }

    /// Fan one message out and wait for every callback to finish
    async fn dispatch(&self, message: Arc<Message>) {
        let targets: Vec<(Channel, Arc<dyn Subscriber>)> = {
            let subscribers = self.subscribers.read().await;
            Self::recipients(&message)
                .into_iter()
                .flat_map(|channel| {
                    subscribers
                        .get(&channel)
                        .into_iter()
                        .flatten()
                        .map(move |sub| (channel, Arc::clone(sub)))
                })
                .collect()
        };

        debug!(
            sender = %message.sender,
            kind = message.kind(),
            private = message.private,
            "Dispatching to {} callbacks",
            targets.len()
        );

        let deliveries = targets.into_iter().map(|(channel, sub)| {
            let msg = Arc::clone(&message);
            let name = sub.name().to_string();
            let handle = tokio::spawn(async move { sub.deliver(msg).await });
            async move { (channel, name, handle.await) }
        });

        for (channel, name, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(Ok(())) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    self.counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Subscriber {} on {} failed to handle {}: {}",
                        name,
                        channel,
                        message.kind(),
                        e
                    );
                }
                Err(join_err) => {
                    self.counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Subscriber {} on {} panicked handling {}: {}",
                        name,
                        channel,
                        message.kind(),
                        join_err
                    );
                }
            }
        }
    }
}
