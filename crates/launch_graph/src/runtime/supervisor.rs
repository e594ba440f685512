//! Process supervisor - spawns enabled actions, applies the respawn policy
//! and tears everything down on cancellation

use crate::error::RuntimeProcessError;
use crate::runtime::launcher::{EventSender, ProcessLauncher, StopSignal};
use crate::runtime::plan::{PreparedLaunch, ResolvedAction};
use crate::runtime::process::{
    ProcessEvent, ProcessSnapshot, ProcessState, ProcessTable, StateChange,
};
use crate::config::Resolver;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time between SIGTERM and SIGKILL on shutdown
    pub grace_period: Duration,
    /// First respawn delay, doubled per consecutive crash
    pub respawn_delay: Duration,
    /// Upper bound for the doubled delay
    pub max_respawn_delay: Duration,
    /// Uptime after which a process no longer counts as crash-looping
    pub stable_after: Duration,
    /// Respawns allowed per action (None = unbounded)
    pub max_respawns: Option<u32>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            respawn_delay: Duration::from_secs(1),
            max_respawn_delay: Duration::from_secs(30),
            stable_after: Duration::from_secs(10),
            max_respawns: None,
        }
    }
}

impl SupervisorConfig {
    /// Delay before the respawn following the `streak`-th consecutive crash
    pub fn backoff(&self, streak: u32) -> Duration {
        let factor = 1u32.checked_shl(streak.saturating_sub(1)).unwrap_or(u32::MAX);
        self.respawn_delay
            .saturating_mul(factor)
            .min(self.max_respawn_delay)
    }
}

/// How one action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Condition was false
    NotRun,
    /// Enabled, but shutdown came before it was started
    NotStarted,
    /// Exited on its own and was not respawned
    Exited(Option<i32>),
    /// Stopped by shutdown
    Killed,
    /// Could not be started
    Failed(RuntimeProcessError),
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            ActionOutcome::NotRun | ActionOutcome::Killed => true,
            ActionOutcome::Exited(code) => *code == Some(0),
            ActionOutcome::NotStarted | ActionOutcome::Failed(_) => false,
        }
    }
}

/// Result of a supervised run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Outcome per action, enabled actions first in launch order
    pub outcomes: IndexMap<String, ActionOutcome>,
    /// First fatal problem observed during the run
    pub first_failure: Option<String>,
}

impl RunReport {
    pub fn outcome(&self, name: &str) -> Option<&ActionOutcome> {
        self.outcomes.get(name)
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(ActionOutcome::is_success)
    }

    /// Process exit status for the whole launch
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Cloneable control surface for a running supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    cancel: Arc<watch::Sender<bool>>,
    table: ProcessTable,
}

impl SupervisorHandle {
    /// Request shutdown. Returns `false` if it was already requested.
    pub fn cancel(&self) -> bool {
        self.cancel.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Current state of every started action
    pub async fn status(&self) -> Vec<ProcessSnapshot> {
        self.table.snapshot().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.table.subscribe()
    }
}

enum Step {
    Cancel,
    Event(String, ProcessEvent),
}

/// Drives every enabled action of a prepared launch
pub struct Supervisor {
    config: SupervisorConfig,
    launcher: Arc<dyn ProcessLauncher>,
    actions: IndexMap<String, ResolvedAction>,
    skipped: Vec<String>,
    resolver: Resolver,
    table: ProcessTable,
    cancel: Arc<watch::Sender<bool>>,
    event_tx: EventSender,
    event_rx: mpsc::UnboundedReceiver<(String, ProcessEvent)>,
    first_failure: Option<String>,
}

impl Supervisor {
    pub fn new(
        prepared: PreparedLaunch,
        launcher: Arc<dyn ProcessLauncher>,
        config: SupervisorConfig,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel, _) = watch::channel(false);
        Self {
            config,
            launcher,
            actions: prepared
                .actions
                .into_iter()
                .map(|a| (a.label.clone(), a))
                .collect(),
            skipped: prepared.skipped,
            resolver: prepared.resolver,
            table: ProcessTable::new(),
            cancel: Arc::new(cancel),
            event_tx,
            event_rx,
            first_failure: None,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            cancel: self.cancel.clone(),
            table: self.table.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.table.subscribe()
    }

    /// Launch everything and supervise until cancelled or until no process
    /// is left alive
    pub async fn run(mut self) -> RunReport {
        let mut cancel_rx = self.cancel.subscribe();
        let labels: Vec<String> = self.actions.keys().cloned().collect();

        log::info!("Launching {} nodes...", labels.len());
        for label in &labels {
            if *cancel_rx.borrow() {
                log::info!("Shutdown requested, aborting launch");
                break;
            }
            self.start(label).await;
        }

        loop {
            if *cancel_rx.borrow_and_update() {
                log::info!("Shutdown signal received");
                break;
            }
            if self.table.is_idle().await {
                log::info!("All processes have stopped");
                break;
            }

            let step = tokio::select! {
                _ = cancel_rx.changed() => Step::Cancel,
                event = self.event_rx.recv() => match event {
                    Some((name, event)) => Step::Event(name, event),
                    None => Step::Cancel,
                },
            };

            match step {
                Step::Cancel => continue,
                Step::Event(name, event) => self.on_event(&name, event).await,
            }
        }

        self.shutdown().await;
        self.report().await
    }

    async fn on_event(&mut self, name: &str, event: ProcessEvent) {
        match event {
            ProcessEvent::Output { line, is_stderr } => log_output(name, &line, is_stderr),
            ProcessEvent::Exited { generation, code } => self.on_exit(name, generation, code).await,
            ProcessEvent::RespawnDue { generation } => {
                let due = self
                    .table
                    .read(name, |e| {
                        e.state == ProcessState::Respawning && e.generation == generation
                    })
                    .await
                    .unwrap_or(false);
                if due {
                    self.table.update(name, |e| e.restarts += 1).await;
                    self.start(name).await;
                }
            }
        }
    }

    async fn on_exit(&mut self, name: &str, generation: u64, code: Option<i32>) {
        let current = self
            .table
            .read(name, |e| {
                (e.state == ProcessState::Running && e.generation == generation)
                    .then(|| (e.started_at.map(|t| t.elapsed()), e.restarts))
            })
            .await
            .flatten();
        let Some((uptime, restarts)) = current else {
            return;
        };
        log::info!("[{}] Process exited with code: {:?}", name, code);

        let Some(action) = self.actions.get(name) else {
            return;
        };

        if !action.respawn {
            self.table.transition(name, ProcessState::Exited(code)).await;
            if code != Some(0) {
                self.record_failure(format!(
                    "Node '{}' exited with code {}",
                    name,
                    describe_code(code)
                ));
            }
            return;
        }

        if let Some(max) = self.config.max_respawns {
            if restarts >= max {
                log::error!("[{}] Respawn limit of {} reached", name, max);
                self.table.transition(name, ProcessState::Exited(code)).await;
                self.record_failure(format!(
                    "Node '{}' exited with code {} after {} respawns",
                    name,
                    describe_code(code),
                    restarts
                ));
                return;
            }
        }

        let stable = uptime.is_some_and(|u| u >= self.config.stable_after);
        let streak = self
            .table
            .update(name, |e| {
                if stable {
                    e.crash_streak = 0;
                }
                e.crash_streak += 1;
                e.crash_streak
            })
            .await
            .unwrap_or(1);
        let delay = action
            .respawn_delay
            .unwrap_or_else(|| self.config.backoff(streak));

        log::warn!("[{}] Respawning in {:?}", name, delay);
        self.table.transition(name, ProcessState::Respawning).await;

        let tx = self.event_tx.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send((name, ProcessEvent::RespawnDue { generation }));
        });
    }

    /// Resolve the command and spawn one action
    async fn start(&mut self, name: &str) {
        let Some(action) = self.actions.get(name) else {
            return;
        };
        self.table.transition(name, ProcessState::Starting).await;

        // Parameters and executable are looked up again on every start
        let command = match action.command(&mut self.resolver) {
            Ok(command) => command,
            Err(e) => {
                self.fail(name, e).await;
                return;
            }
        };
        log::info!("[{}] Starting: {}", name, command.display_line());

        let handle = match self.launcher.spawn(&command, self.event_tx.clone()).await {
            Ok(handle) => handle,
            Err(e) => {
                let err = RuntimeProcessError::ProcessSpawn {
                    action: name.to_string(),
                    reason: e.to_string(),
                };
                self.fail(name, err).await;
                return;
            }
        };

        let pid = handle.id();
        let generation = self
            .table
            .update(name, |e| {
                e.generation += 1;
                e.pid = pid;
                e.handle = Some(handle.clone());
                e.started_at = Some(Instant::now());
                e.terminate_sent = false;
                e.generation
            })
            .await
            .unwrap_or_default();
        self.table.transition(name, ProcessState::Running).await;
        log::info!("[{}] Process started with PID: {:?}", name, pid);

        let tx = self.event_tx.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            let code = match handle.wait().await {
                Ok(code) => code,
                Err(e) => {
                    log::error!("[{}] Failed to wait for process: {}", name, e);
                    None
                }
            };
            let _ = tx.send((name, ProcessEvent::Exited { generation, code }));
        });
    }

    async fn fail(&mut self, name: &str, error: RuntimeProcessError) {
        log::error!("[{}] {}", name, error);
        self.record_failure(error.to_string());
        self.table.update(name, |e| e.error = Some(error)).await;
        self.table.transition(name, ProcessState::Failed).await;
    }

    fn record_failure(&mut self, message: String) {
        if self.first_failure.is_none() {
            self.first_failure = Some(message);
        }
    }

    /// Send the graceful stop signal unless this generation already got it
    async fn terminate_once(&self, name: &str) {
        let handle = self
            .table
            .update(name, |e| {
                if e.terminate_sent {
                    None
                } else {
                    e.terminate_sent = true;
                    e.handle.clone()
                }
            })
            .await
            .flatten();
        if let Some(handle) = handle {
            if let Err(e) = handle.signal(StopSignal::Terminate) {
                log::error!("[{}] Failed to send SIGTERM: {}", name, e);
            }
        }
    }

    /// Settle exits that happened before shutdown began, so a crash is not
    /// recorded as a supervisor stop
    async fn reap_exited(&mut self) {
        while let Ok((name, event)) = self.event_rx.try_recv() {
            if !matches!(event, ProcessEvent::RespawnDue { .. }) {
                self.on_event(&name, event).await;
            }
        }

        for name in self.table.names_in(ProcessState::Running).await {
            let exited = self
                .table
                .read(&name, |e| {
                    let code = e.handle.as_ref()?.exit_status()?;
                    Some((e.generation, code))
                })
                .await
                .flatten();
            if let Some((generation, code)) = exited {
                self.on_exit(&name, generation, code).await;
            }
        }
    }

    /// Stop everything still alive, in reverse launch order
    async fn shutdown(&mut self) {
        self.reap_exited().await;

        for name in self.table.names_in(ProcessState::Respawning).await {
            log::info!("[{}] Cancelling pending respawn", name);
            self.table.transition(&name, ProcessState::Killed).await;
        }

        let running = self.table.names_in(ProcessState::Running).await;
        if running.is_empty() {
            return;
        }

        log::info!("Shutting down all processes...");
        for name in running.iter().rev() {
            self.terminate_once(name).await;
        }

        let deadline = tokio::time::Instant::now() + self.config.grace_period;
        while !self.table.names_in(ProcessState::Running).await.is_empty() {
            let event = tokio::select! {
                event = self.event_rx.recv() => event,
                _ = tokio::time::sleep_until(deadline) => None,
            };
            match event {
                Some((name, ProcessEvent::Exited { generation, code })) => {
                    let current = self
                        .table
                        .read(&name, |e| {
                            e.state == ProcessState::Running && e.generation == generation
                        })
                        .await
                        .unwrap_or(false);
                    if current {
                        log::info!("[{}] Process exited with code: {:?}", name, code);
                        self.table.transition(&name, ProcessState::Killed).await;
                    }
                }
                Some((name, ProcessEvent::Output { line, is_stderr })) => {
                    log_output(&name, &line, is_stderr)
                }
                Some((_, ProcessEvent::RespawnDue { .. })) => {}
                None => break,
            }
        }

        for name in self.table.names_in(ProcessState::Running).await {
            log::warn!(
                "[{}] Process did not exit within {:?}, sending SIGKILL",
                name,
                self.config.grace_period
            );
            let handle = self.table.read(&name, |e| e.handle.clone()).await.flatten();
            if let Some(handle) = handle {
                if let Err(e) = handle.signal(StopSignal::Kill) {
                    log::error!("[{}] Failed to send SIGKILL: {}", name, e);
                }
            }
            self.table.transition(&name, ProcessState::Killed).await;
        }

        log::info!("All processes shut down");
    }

    async fn report(self) -> RunReport {
        let mut outcomes = IndexMap::new();
        for name in self.actions.keys() {
            let outcome = self
                .table
                .read(name, |e| match e.state {
                    ProcessState::Exited(code) => ActionOutcome::Exited(code),
                    ProcessState::Failed => match &e.error {
                        Some(error) => ActionOutcome::Failed(error.clone()),
                        None => ActionOutcome::Failed(RuntimeProcessError::ProcessSpawn {
                            action: name.clone(),
                            reason: "unknown".to_string(),
                        }),
                    },
                    _ => ActionOutcome::Killed,
                })
                .await
                .unwrap_or(ActionOutcome::NotStarted);
            outcomes.insert(name.clone(), outcome);
        }

        let mut first_failure = self.first_failure;
        if first_failure.is_none() {
            first_failure = outcomes
                .iter()
                .find(|(_, o)| **o == ActionOutcome::NotStarted)
                .map(|(name, _)| format!("Shutdown requested before node '{}' started", name));
        }
        for name in self.skipped {
            outcomes.insert(name, ActionOutcome::NotRun);
        }

        RunReport {
            outcomes,
            first_failure,
        }
    }
}

fn log_output(name: &str, line: &str, is_stderr: bool) {
    if is_stderr {
        log::warn!("[{}] {}", name, line);
    } else {
        log::info!("[{}] {}", name, line);
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (signal)".to_string(),
    }
}
