//! Inbound handler registered on the agent's channel
//!
//! `chat` payloads addressed to this agent go to the chat hook; everything
//! else is handed to `Agent::handle_message`. Privacy is enforced by the
//! bus, so nothing is filtered here.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapters::{ChatTurn, TextGenerator};
use crate::agents::Agent;
use crate::bus::{AgentReply, Channel, ChatRequest, Message, MessageBus, Payload, Subscriber};
use crate::error::Result;

pub struct Inbox {
    agent: Arc<dyn Agent>,
    bus: Arc<MessageBus>,
    text: Arc<dyn TextGenerator>,
}

impl Inbox {
    pub fn new(agent: Arc<dyn Agent>, bus: Arc<MessageBus>, text: Arc<dyn TextGenerator>) -> Self {
        Self { agent, bus, text }
    }

    /// Unaddressed chat goes to every agent
    fn is_addressed_to_me(&self, request: &ChatRequest) -> bool {
        match request.agent.as_deref() {
            None => true,
            Some(target) => {
                Channel::normalize(target) == Some(self.agent.channel())
                    || target.trim().eq_ignore_ascii_case(self.agent.name())
            }
        }
    }

    fn system_prompt(&self, summary: &str) -> String {
        format!(
            "You are {}, an agent in an automated trading pipeline. Your job: {}.\n\
             Your current state:\n{}\n\
             Answer the user briefly and only from what you know.",
            self.agent.name(),
            self.agent.role(),
            summary
        )
    }

    fn fallback_reply(&self, summary: &str) -> String {
        format!(
            "{} here. I can't reach the language model right now. Current state:\n{}",
            self.agent.name(),
            summary
        )
    }

    /// Answer a chat request with a private `agent_message`
    pub async fn handle_chat(&self, request: &ChatRequest) -> Result<()> {
        let summary = self.agent.state_summary().await;
        let turns = vec![
            ChatTurn::system(self.system_prompt(&summary)),
            ChatTurn::user(request.text.clone()),
        ];

        let text = match self.text.generate(turns).await {
            Ok(text) => text,
            Err(e) => {
                warn!(agent = self.agent.name(), "Text generation failed: {}", e);
                self.fallback_reply(&summary)
            }
        };

        self.bus.publish(
            self.agent.channel().as_str(),
            Payload::AgentMessage(AgentReply {
                agent: self.agent.name().to_string(),
                text,
            }),
            true,
        );
        Ok(())
    }
}

#[async_trait]
impl Subscriber for Inbox {
    fn name(&self) -> &str {
        self.agent.name()
    }

    async fn deliver(&self, message: Arc<Message>) -> Result<()> {
        match &message.payload {
            Payload::Chat(request) if self.is_addressed_to_me(request) => {
                self.handle_chat(request).await
            }
            Payload::Chat(request) => {
                debug!(
                    agent = self.agent.name(),
                    "Ignoring chat for {:?}",
                    request.agent
                );
                Ok(())
            }
            _ => self.agent.handle_message(&message).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::MockTextGenerator;
    use crate::agents::{RiskStage, StagedAgent};
    use crate::bus::subscriber_fn;
    use crate::error::HedgeflowError;
    use std::sync::Mutex;
    use std::time::Duration;

    async fn replies(bus: &Arc<MessageBus>) -> Arc<Mutex<Vec<(String, AgentReply)>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        bus.subscribe_channel(
            Channel::Ui,
            subscriber_fn("replies", move |msg: Arc<Message>| {
                let sink = Arc::clone(&sink);
                async move {
                    if let Payload::AgentMessage(reply) = &msg.payload {
                        assert!(msg.private);
                        sink.lock().unwrap().push((msg.sender.clone(), reply.clone()));
                    }
                    Ok(())
                }
            }),
        )
        .await;
        log
    }

    fn risk_inbox(bus: &Arc<MessageBus>, text: MockTextGenerator) -> Inbox {
        let agent = StagedAgent::new(RiskStage::new(Duration::from_secs(300)), Arc::clone(bus));
        Inbox::new(Arc::new(agent), Arc::clone(bus), Arc::new(text))
    }

    fn chat(text: &str, agent: Option<&str>) -> Arc<Message> {
        Arc::new(Message::new(
            "user",
            Payload::Chat(ChatRequest {
                text: text.to_string(),
                agent: agent.map(str::to_string),
            }),
            false,
        ))
    }

    #[tokio::test]
    async fn test_chat_reply_uses_generator() {
        let bus = Arc::new(MessageBus::default());
        let log = replies(&bus).await;
        let mut text = MockTextGenerator::new();
        text.expect_generate()
            .withf(|turns| turns.len() == 2 && turns[0].content.contains("Risk"))
            .times(1)
            .returning(|_| Ok("Risk is low.".to_string()));
        let inbox = risk_inbox(&bus, text);
        bus.spawn().unwrap();

        inbox.deliver(chat("how risky?", Some("risk_management"))).await.unwrap();
        bus.stop().await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "risk");
        assert_eq!(log[0].1.text, "Risk is low.");
    }

    #[tokio::test]
    async fn test_generator_failure_falls_back() {
        let bus = Arc::new(MessageBus::default());
        let log = replies(&bus).await;
        let mut text = MockTextGenerator::new();
        text.expect_generate()
            .returning(|_| Err(HedgeflowError::TextGeneration("offline".into())));
        let inbox = risk_inbox(&bus, text);
        bus.spawn().unwrap();

        inbox.deliver(chat("status?", None)).await.unwrap();
        bus.stop().await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].1.text.contains("can't reach the language model"));
        assert!(log[0].1.text.contains("no data yet"));
    }

    #[tokio::test]
    async fn test_chat_for_other_agent_is_ignored() {
        let bus = Arc::new(MessageBus::default());
        let mut text = MockTextGenerator::new();
        text.expect_generate().times(0);
        let inbox = risk_inbox(&bus, text);

        inbox.deliver(chat("hello", Some("decide"))).await.unwrap();
        assert_eq!(bus.stats().published, 0);
    }
}
