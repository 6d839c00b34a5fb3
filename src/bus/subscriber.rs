//! Delivery callbacks

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use super::message::Message;
use crate::error::Result;

/// A callback registered on a channel. Invoked once per delivered message;
/// an `Err` (or a panic) is logged by the bus and never reaches other
/// subscribers.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Label used in delivery logs
    fn name(&self) -> &str {
        "subscriber"
    }

    async fn deliver(&self, message: Arc<Message>) -> Result<()>;
}

/// Closure-backed subscriber
pub struct FnSubscriber<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> Subscriber for FnSubscriber<F>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, message: Arc<Message>) -> Result<()> {
        (self.f)(message).await
    }
}

/// Wrap an async closure as a subscriber
pub fn subscriber_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Subscriber>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnSubscriber {
        name: name.into(),
        f,
    })
}
