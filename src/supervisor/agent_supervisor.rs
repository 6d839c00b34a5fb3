//! Agent Supervisor - tick loop, fault counting, backoff
//!
//! One supervisor per agent. The tick loop calls `process()`, sleeps one
//! scheduling unit after a success, and backs off `min(2^n, cap)` units after
//! the n-th consecutive failure. Reaching the error threshold stops the agent
//! until someone calls `start()` again.

use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::inbox::Inbox;
use super::lifecycle::{backoff_units, LifecycleState};
use crate::adapters::TextGenerator;
use crate::agents::{Agent, TickOutcome};
use crate::bus::{AgentStatusReport, Channel, Diagnostic, MessageBus, Payload, Severity};
use crate::config::SupervisorConfig;
use crate::error::{HedgeflowError, Result};

/// Point-in-time supervisor counters
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStats {
    pub agent: String,
    pub channel: Channel,
    pub state: LifecycleState,
    pub consecutive_errors: u32,
    pub ticks: u64,
    pub failures: u64,
}

/// State shared between the supervisor handle and its tick loop
struct Core {
    agent: Arc<dyn Agent>,
    bus: Arc<MessageBus>,
    config: SupervisorConfig,
    state_tx: watch::Sender<LifecycleState>,
    stop_tx: watch::Sender<bool>,
    consecutive_errors: AtomicU32,
    ticks: AtomicU64,
    failures: AtomicU64,
}

impl Core {
    fn name(&self) -> &str {
        self.agent.name()
    }

    fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    /// Move `from → to` only if currently in `from`
    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn broadcast_status(&self, status: &str) {
        self.bus.publish(
            self.agent.channel().as_str(),
            Payload::AgentStatus(AgentStatusReport {
                agent: self.name().to_string(),
                status: status.to_string(),
            }),
            false,
        );
    }

    fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    async fn tick_loop(self: Arc<Self>) {
        let mut stop_rx = self.stop_tx.subscribe();
        let unit = self.config.scheduling_unit();
        debug!(agent = self.name(), "Tick loop started");

        loop {
            if self.stop_requested() {
                break;
            }

            let result = AssertUnwindSafe(self.agent.process())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(HedgeflowError::from_panic(panic)));
            self.ticks.fetch_add(1, Ordering::Relaxed);

            let pause = match result {
                Ok(outcome) => {
                    self.on_success(&outcome);
                    unit
                }
                Err(e) => match self.on_failure(e) {
                    Some(units) => unit * units,
                    None => break,
                },
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = wait_for_stop(&mut stop_rx) => break,
            }
        }

        debug!(agent = self.name(), "Tick loop exited");
    }

    fn on_success(&self, outcome: &TickOutcome) {
        self.consecutive_errors.store(0, Ordering::SeqCst);
        if self.transition(LifecycleState::Degraded, LifecycleState::Running) {
            info!(agent = self.name(), "Recovered, back to Running");
        }
        if let TickOutcome::NotReady(missing) = outcome {
            debug!(agent = self.name(), "Waiting for {:?}", missing);
        }
    }

    /// Record a failed tick. Returns the backoff in scheduling units, or
    /// `None` when the agent has stopped itself.
    fn on_failure(&self, err: HedgeflowError) -> Option<u32> {
        let count = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
        self.failures.fetch_add(1, Ordering::Relaxed);
        let severity = Severity::for_consecutive_errors(count);

        match severity {
            Severity::Info => info!(agent = self.name(), "Tick failed ({}): {}", count, err),
            Severity::Warning => warn!(agent = self.name(), "Tick failed ({}): {}", count, err),
            Severity::Critical => error!(agent = self.name(), "Tick failed ({}): {}", count, err),
        }

        self.bus.publish(
            self.agent.channel().as_str(),
            Payload::Diagnostic(Diagnostic {
                agent: self.name().to_string(),
                severity,
                consecutive_errors: count,
                error: err.to_string(),
            }),
            true,
        );

        if count >= self.config.max_consecutive_errors {
            let stopped = self.transition(LifecycleState::Running, LifecycleState::Stopped)
                || self.transition(LifecycleState::Degraded, LifecycleState::Stopped);
            self.stop_tx.send_replace(true);
            if stopped {
                error!(
                    agent = self.name(),
                    "Stopping after {} consecutive failures", count
                );
                self.broadcast_status("Stopped");
            }
            return None;
        }

        self.transition(LifecycleState::Running, LifecycleState::Degraded);
        Some(backoff_units(count, self.config.max_backoff_units))
    }
}

/// Resolves once the stop flag is set
async fn wait_for_stop(rx: &mut watch::Receiver<bool>) {
    loop {
        let stopped = *rx.borrow_and_update();
        if stopped || rx.changed().await.is_err() {
            return;
        }
    }
}

/// Lifecycle driver for one agent
pub struct AgentSupervisor {
    core: Arc<Core>,
    text: Arc<dyn TextGenerator>,
    subscribed: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AgentSupervisor {
    pub fn new(
        agent: Arc<dyn Agent>,
        bus: Arc<MessageBus>,
        config: SupervisorConfig,
        text: Arc<dyn TextGenerator>,
    ) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Idle);
        let (stop_tx, _) = watch::channel(false);
        Self {
            core: Arc::new(Core {
                agent,
                bus,
                config,
                state_tx,
                stop_tx,
                consecutive_errors: AtomicU32::new(0),
                ticks: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
            text,
            subscribed: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn channel(&self) -> Channel {
        self.core.agent.channel()
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.core.agent
    }

    pub fn state(&self) -> LifecycleState {
        self.core.state()
    }

    /// Observe lifecycle transitions
    pub fn state_receiver(&self) -> watch::Receiver<LifecycleState> {
        self.core.state_tx.subscribe()
    }

    /// Idle/Stopped → Running. Subscribes on first start, waits for any
    /// previous tick loop to exit, then spawns a fresh one.
    pub async fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock().await;
        let state = self.state();
        if !state.can_start() {
            debug!(agent = self.name(), "Already {}", state);
            return Ok(());
        }

        if let Some(previous) = handle.take() {
            if let Err(e) = previous.await {
                warn!(agent = self.name(), "Previous tick loop ended abnormally: {}", e);
            }
        }

        if !self.subscribed.swap(true, Ordering::SeqCst) {
            let inbox = Inbox::new(
                Arc::clone(&self.core.agent),
                Arc::clone(&self.core.bus),
                Arc::clone(&self.text),
            );
            self.core
                .bus
                .subscribe_channel(self.channel(), Arc::new(inbox))
                .await;
        }

        self.core.consecutive_errors.store(0, Ordering::SeqCst);
        self.core.stop_tx.send_replace(false);
        self.core.state_tx.send_replace(LifecycleState::Running);
        *handle = Some(tokio::spawn(Arc::clone(&self.core).tick_loop()));

        info!(agent = self.name(), channel = %self.channel(), "Agent started");
        self.core.broadcast_status("Running");
        Ok(())
    }

    /// Running/Degraded → Stopped. The loop notices at its next boundary; a
    /// tick already in flight finishes.
    pub async fn stop(&self) {
        let stopped = self
            .core
            .transition(LifecycleState::Running, LifecycleState::Stopped)
            || self
                .core
                .transition(LifecycleState::Degraded, LifecycleState::Stopped);
        if !stopped {
            debug!(agent = self.name(), "Stop ignored in state {}", self.state());
            return;
        }

        self.core.stop_tx.send_replace(true);
        info!(agent = self.name(), "Agent stopped");
        self.core.broadcast_status("Stopped");
    }

    /// Stop and wait for the tick loop to exit
    pub async fn shutdown(&self) {
        self.stop().await;
        if let Some(previous) = self.handle.lock().await.take() {
            if let Err(e) = previous.await {
                warn!(agent = self.name(), "Tick loop ended abnormally: {}", e);
            }
        }
    }

    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            agent: self.name().to_string(),
            channel: self.channel(),
            state: self.state(),
            consecutive_errors: self.core.consecutive_errors.load(Ordering::SeqCst),
            ticks: self.core.ticks.load(Ordering::Relaxed),
            failures: self.core.failures.load(Ordering::Relaxed),
        }
    }

    /// Time until the next tick after `consecutive_errors` failures in a row
    pub fn backoff_delay(&self, consecutive_errors: u32) -> Duration {
        self.core.config.scheduling_unit()
            * backoff_units(consecutive_errors, self.core.config.max_backoff_units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CannedTextGenerator;
    use crate::bus::{subscriber_fn, Message};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    #[derive(Clone, Copy, Debug)]
    enum Step {
        Ok,
        Fail,
        Panic,
    }

    struct ScriptedAgent {
        script: std::sync::Mutex<VecDeque<Step>>,
        then: Step,
        ticks: std::sync::Mutex<Vec<Instant>>,
    }

    impl ScriptedAgent {
        fn new(script: &[Step], then: Step) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(script.iter().copied().collect()),
                then,
                ticks: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn tick_times(&self) -> Vec<Instant> {
            self.ticks.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn channel(&self) -> Channel {
            Channel::Risk
        }

        async fn process(&self) -> Result<TickOutcome> {
            self.ticks.lock().unwrap().push(Instant::now());
            let step = self.script.lock().unwrap().pop_front().unwrap_or(self.then);
            match step {
                Step::Ok => Ok(TickOutcome::UpToDate),
                Step::Fail => Err(HedgeflowError::Processing("scripted failure".into())),
                Step::Panic => panic!("scripted panic"),
            }
        }

        async fn handle_message(&self, _message: &Message) -> Result<()> {
            Ok(())
        }
    }

    type Seen = Arc<std::sync::Mutex<Vec<Payload>>>;

    async fn setup(agent: Arc<ScriptedAgent>) -> (Arc<MessageBus>, AgentSupervisor, Seen) {
        let bus = Arc::new(MessageBus::default());
        let seen: Seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_channel(
            Channel::Ui,
            subscriber_fn("ui", move |msg: Arc<Message>| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(msg.payload.clone());
                    Ok(())
                }
            }),
        )
        .await;
        bus.spawn().unwrap();

        let supervisor = AgentSupervisor::new(
            agent,
            Arc::clone(&bus),
            SupervisorConfig::default(),
            Arc::new(CannedTextGenerator::default()),
        );
        (bus, supervisor, seen)
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("condition not reached");
    }

    fn statuses(seen: &Seen) -> Vec<String> {
        seen.lock()
            .unwrap()
            .iter()
            .filter_map(|p| match p {
                Payload::AgentStatus(s) => Some(s.status.clone()),
                _ => None,
            })
            .collect()
    }

    fn diagnostics(seen: &Seen) -> Vec<Diagnostic> {
        seen.lock()
            .unwrap()
            .iter()
            .filter_map(|p| match p {
                Payload::Diagnostic(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_stop_the_agent() {
        let agent = ScriptedAgent::new(&[], Step::Fail);
        let (bus, supervisor, seen) = setup(Arc::clone(&agent)).await;

        supervisor.start().await.unwrap();
        let mut state_rx = supervisor.state_receiver();
        while !state_rx.borrow_and_update().is_stopped() {
            state_rx.changed().await.unwrap();
        }

        tokio::time::sleep(Duration::from_secs(120)).await;
        let ticks = agent.tick_times();
        assert_eq!(ticks.len(), 3);
        // Backoff of 2^1 then 2^2 scheduling units
        assert_eq!(ticks[1] - ticks[0], Duration::from_secs(2));
        assert_eq!(ticks[2] - ticks[1], Duration::from_secs(4));

        bus.stop().await.unwrap();
        let severities: Vec<Severity> = diagnostics(&seen).iter().map(|d| d.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Info, Severity::Warning, Severity::Critical]
        );
        assert_eq!(statuses(&seen), vec!["Running", "Stopped"]);

        let stats = supervisor.stats();
        assert_eq!(stats.state, LifecycleState::Stopped);
        assert_eq!(stats.consecutive_errors, 3);
        assert_eq!(stats.failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_counter_and_recovers() {
        let agent = ScriptedAgent::new(&[Step::Fail, Step::Fail, Step::Ok], Step::Ok);
        let (bus, supervisor, seen) = setup(Arc::clone(&agent)).await;

        let mut state_rx = supervisor.state_receiver();
        let history = tokio::spawn(async move {
            let mut states = Vec::new();
            while state_rx.changed().await.is_ok() {
                let state = *state_rx.borrow_and_update();
                states.push(state);
                if states.ends_with(&[LifecycleState::Degraded, LifecycleState::Running]) {
                    break;
                }
            }
            states
        });

        supervisor.start().await.unwrap();
        wait_until(|| agent.tick_times().len() >= 5).await;

        let states = history.await.unwrap();
        assert_eq!(states.last(), Some(&LifecycleState::Running));
        assert!(states.contains(&LifecycleState::Degraded));
        let stats = supervisor.stats();
        assert_eq!(stats.consecutive_errors, 0);
        assert_eq!(stats.failures, 2);

        // Successful ticks are one scheduling unit apart
        let ticks = agent.tick_times();
        assert_eq!(ticks[4] - ticks[3], Duration::from_secs(1));

        supervisor.shutdown().await;
        bus.stop().await.unwrap();
        assert_eq!(diagnostics(&seen).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_is_a_failure() {
        let agent = ScriptedAgent::new(&[Step::Panic], Step::Ok);
        let (bus, supervisor, seen) = setup(Arc::clone(&agent)).await;

        supervisor.start().await.unwrap();
        wait_until(|| agent.tick_times().len() >= 2).await;
        assert_eq!(supervisor.state(), LifecycleState::Running);

        supervisor.shutdown().await;
        bus.stop().await.unwrap();
        let diags = diagnostics(&seen);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].error.contains("scripted panic"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks_and_restart_resumes() {
        let agent = ScriptedAgent::new(&[], Step::Ok);
        let (bus, supervisor, seen) = setup(Arc::clone(&agent)).await;

        supervisor.start().await.unwrap();
        wait_until(|| agent.tick_times().len() >= 3).await;
        supervisor.stop().await;
        assert_eq!(supervisor.state(), LifecycleState::Stopped);

        let frozen = agent.tick_times().len();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(agent.tick_times().len() <= frozen + 1);
        let after_stop = agent.tick_times().len();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(agent.tick_times().len(), after_stop);

        supervisor.start().await.unwrap();
        wait_until(|| agent.tick_times().len() >= after_stop + 2).await;
        assert_eq!(supervisor.state(), LifecycleState::Running);
        assert_eq!(bus.subscriber_count(Channel::Risk).await, 1);

        supervisor.shutdown().await;
        bus.stop().await.unwrap();
        assert_eq!(
            statuses(&seen),
            vec!["Running", "Stopped", "Running", "Stopped"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stops_announce_once() {
        let agent = ScriptedAgent::new(&[], Step::Ok);
        let (bus, supervisor, seen) = setup(agent).await;
        let supervisor = Arc::new(supervisor);

        for _ in 0..20 {
            supervisor.start().await.unwrap();
            let stops: Vec<_> = (0..4)
                .map(|_| {
                    let supervisor = Arc::clone(&supervisor);
                    tokio::spawn(async move { supervisor.stop().await })
                })
                .collect();
            for stop in stops {
                stop.await.unwrap();
            }
            assert_eq!(supervisor.state(), LifecycleState::Stopped);
        }

        supervisor.shutdown().await;
        bus.stop().await.unwrap();
        let announced = statuses(&seen);
        assert_eq!(announced.iter().filter(|s| *s == "Running").count(), 20);
        assert_eq!(announced.iter().filter(|s| *s == "Stopped").count(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_self_stop_is_silent() {
        let agent = ScriptedAgent::new(&[], Step::Fail);
        let (bus, supervisor, seen) = setup(agent).await;

        supervisor.start().await.unwrap();
        let mut state_rx = supervisor.state_receiver();
        while !state_rx.borrow_and_update().is_stopped() {
            state_rx.changed().await.unwrap();
        }
        supervisor.shutdown().await;

        bus.stop().await.unwrap();
        assert_eq!(statuses(&seen), vec!["Running", "Stopped"]);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_ignored() {
        let agent = ScriptedAgent::new(&[], Step::Ok);
        let (bus, supervisor, _seen) = setup(agent).await;
        supervisor.stop().await;
        assert_eq!(supervisor.state(), LifecycleState::Idle);
        assert_eq!(supervisor.backoff_delay(3), Duration::from_secs(8));
        assert_eq!(supervisor.backoff_delay(10), Duration::from_secs(60));
        bus.stop().await.unwrap();
    }
}
