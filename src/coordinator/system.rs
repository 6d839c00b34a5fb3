//! Trading system assembly
//!
//! One bus instance is created by the caller and injected here; every
//! supervisor, agent and service receives it explicitly.

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::adapters::{
    AlpacaClient, CannedTextGenerator, ChatCompletionsClient, ExecutionGateway,
    MarketDataProvider, PaperGateway, SyntheticMarketData, TextGenerator,
};
use crate::agents::{Agent, AnalyzeStage, DecideStage, IngestStage, RiskStage, StagedAgent};
use crate::bus::{
    subscriber_fn, Channel, Message, MessageBus, Payload, SystemStatus, SYSTEM_SENDER,
};
use crate::config::AppConfig;
use crate::domain::{MarketSnapshot, RiskAssessment, TechnicalAnalysis, TradingDecision};
use crate::error::{HedgeflowError, Result};
use crate::services::TradeExecutor;
use crate::supervisor::{AgentSupervisor, SupervisorStats};

/// External collaborators the pipeline depends on
#[derive(Clone)]
pub struct Collaborators {
    pub market_data: Arc<dyn MarketDataProvider>,
    pub execution: Arc<dyn ExecutionGateway>,
    pub text: Arc<dyn TextGenerator>,
}

impl Collaborators {
    /// Build the collaborators selected by configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let alpaca = if config.market.provider == "alpaca" || !config.execution.paper {
            Some(Arc::new(AlpacaClient::new(&config.market, &config.execution)?))
        } else {
            None
        };

        let market_data: Arc<dyn MarketDataProvider> = match &alpaca {
            Some(client) if config.market.provider == "alpaca" => client.clone(),
            _ => Arc::new(SyntheticMarketData::new(config.market.seed)),
        };

        let execution: Arc<dyn ExecutionGateway> = match &alpaca {
            Some(client) if !config.execution.paper => client.clone(),
            _ => Arc::new(PaperGateway::new()),
        };

        let text: Arc<dyn TextGenerator> = if config.llm.enabled {
            Arc::new(ChatCompletionsClient::new(&config.llm)?)
        } else {
            Arc::new(CannedTextGenerator::default())
        };

        Ok(Self {
            market_data,
            execution,
            text,
        })
    }
}

pub struct TradingSystem {
    bus: Arc<MessageBus>,
    supervisors: Vec<AgentSupervisor>,
    executor: Arc<TradeExecutor>,
    running: AtomicBool,
}

impl TradingSystem {
    /// Wire the four pipeline agents and the trade executor onto `bus`
    pub async fn new(
        config: &AppConfig,
        bus: Arc<MessageBus>,
        collaborators: Collaborators,
    ) -> Self {
        let pipeline = &config.pipeline;
        let secs = Duration::from_secs;

        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(StagedAgent::new(
                IngestStage::new(collaborators.market_data.clone(), pipeline.clone()),
                Arc::clone(&bus),
            )),
            Arc::new(StagedAgent::new(
                AnalyzeStage::new(secs(pipeline.analyze_interval_secs)),
                Arc::clone(&bus),
            )),
            Arc::new(StagedAgent::new(
                RiskStage::new(secs(pipeline.risk_interval_secs)),
                Arc::clone(&bus),
            )),
            Arc::new(StagedAgent::new(
                DecideStage::new(secs(pipeline.decide_interval_secs)),
                Arc::clone(&bus),
            )),
        ];

        let supervisors = agents
            .into_iter()
            .map(|agent| {
                AgentSupervisor::new(
                    agent,
                    Arc::clone(&bus),
                    config.supervisor.clone(),
                    collaborators.text.clone(),
                )
            })
            .collect();

        let executor = Arc::new(TradeExecutor::new(
            collaborators.execution.clone(),
            Arc::clone(&bus),
            config.execution.clone(),
            pipeline.ticker.clone(),
        ));
        executor.attach().await;

        Self {
            bus,
            supervisors,
            executor,
            running: AtomicBool::new(false),
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn executor(&self) -> &Arc<TradeExecutor> {
        &self.executor
    }

    pub fn supervisor(&self, channel: Channel) -> Option<&AgentSupervisor> {
        self.supervisors.iter().find(|s| s.channel() == channel)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn start_all(&self) -> Result<()> {
        for supervisor in &self.supervisors {
            supervisor.start().await?;
        }
        self.running.store(true, Ordering::SeqCst);
        self.bus.publish(
            SYSTEM_SENDER,
            Payload::SystemStatus(SystemStatus { running: true }),
            false,
        );
        info!("Trading system started ({} agents)", self.supervisors.len());
        Ok(())
    }

    /// Stop every agent and wait for their tick loops to exit
    pub async fn stop_all(&self) {
        join_all(self.supervisors.iter().map(|s| s.shutdown())).await;
        self.running.store(false, Ordering::SeqCst);
        self.bus.publish(
            SYSTEM_SENDER,
            Payload::SystemStatus(SystemStatus { running: false }),
            false,
        );
        info!("Trading system stopped");
    }

    pub fn statuses(&self) -> Vec<SupervisorStats> {
        self.supervisors.iter().map(|s| s.stats()).collect()
    }
}

/// Artifacts produced by a single pass through the pipeline
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub market_data: Option<MarketSnapshot>,
    pub technical_analysis: Option<TechnicalAnalysis>,
    pub risk_assessment: Option<RiskAssessment>,
    pub decision: Option<TradingDecision>,
    pub thoughts: Vec<(String, String)>,
}

/// Run the pipeline until the first `trading_decision`, then shut down
pub async fn analyze_once(
    config: &AppConfig,
    collaborators: Collaborators,
) -> Result<AnalysisReport> {
    let bus = Arc::new(MessageBus::new(config.bus.clone()));
    let report = Arc::new(Mutex::new(AnalysisReport::default()));
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let done_tx = Arc::new(Mutex::new(Some(done_tx)));

    let sink = Arc::clone(&report);
    bus.subscribe_channel(
        Channel::Ui,
        subscriber_fn("analysis-report", move |msg: Arc<Message>| {
            let sink = Arc::clone(&sink);
            let done_tx = Arc::clone(&done_tx);
            async move {
                let mut report = sink.lock().unwrap_or_else(|e| e.into_inner());
                match &msg.payload {
                    Payload::MarketData(m) => report.market_data = Some(m.clone()),
                    Payload::TechnicalAnalysis(t) => {
                        report.technical_analysis = Some(t.clone())
                    }
                    Payload::RiskAssessment(r) => report.risk_assessment = Some(r.clone()),
                    Payload::AgentThought(t) => {
                        report.thoughts.push((msg.sender.clone(), t.clone()))
                    }
                    Payload::TradingDecision(d) if report.decision.is_none() => {
                        report.decision = Some(d.clone());
                        let tx = done_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
                        if let Some(tx) = tx {
                            let _ = tx.send(());
                        }
                    }
                    _ => {}
                }
                Ok(())
            }
        }),
    )
    .await;

    let system = TradingSystem::new(config, Arc::clone(&bus), collaborators).await;
    let bus_task = bus.spawn()?;
    system.start_all().await?;

    // Four stages, each a few scheduling units apart at worst
    let deadline = config.supervisor.scheduling_unit() * 30;
    let outcome = tokio::time::timeout(deadline, done_rx).await;

    system.stop_all().await;
    bus.stop().await?;
    if let Err(e) = bus_task.await {
        warn!("Bus task ended abnormally: {}", e);
    }

    if outcome.is_err() {
        let stopped: Vec<String> = system
            .statuses()
            .into_iter()
            .filter(|s| s.failures > 0)
            .map(|s| format!("{} ({} failures)", s.agent, s.failures))
            .collect();
        return Err(HedgeflowError::Processing(format!(
            "no trading decision within {}s; failing agents: [{}]",
            deadline.as_secs(),
            stopped.join(", ")
        )));
    }

    let report = report.lock().unwrap_or_else(|e| e.into_inner()).clone();
    Ok(report)
}
