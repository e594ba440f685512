//! Supervised process state and the shared process table

use crate::error::RuntimeProcessError;
use crate::runtime::launcher::ProcessHandle;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};

/// Lifecycle of one supervised action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Resolving the command and spawning
    Starting,
    /// The OS confirmed the process start
    Running,
    /// Exited on its own with the given code (`None` when signalled)
    Exited(Option<i32>),
    /// Waiting out the backoff before the next start
    Respawning,
    /// Stopped by supervisor shutdown
    Killed,
    /// Could not be started; never retried
    Failed,
}

impl ProcessState {
    /// Check if a process is (or is about to be) alive
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Respawning
        )
    }

    /// Check if the state is final for this run
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Event emitted towards the supervisor loop
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// Process output line (stdout or stderr)
    Output { line: String, is_stderr: bool },
    /// Process exited; `generation` identifies which spawn it was
    Exited { generation: u64, code: Option<i32> },
    /// Backoff elapsed for the given generation
    RespawnDue { generation: u64 },
}

/// Broadcast to observers on every state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
}

/// Point-in-time view of a table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub uptime: Option<Duration>,
}

/// Table entry for one enabled action
pub struct ProcessEntry {
    pub state: ProcessState,
    pub pid: Option<u32>,
    /// Incremented on every successful spawn
    pub generation: u64,
    pub restarts: u32,
    /// Unexpected exits since the process last stayed up long enough
    pub crash_streak: u32,
    pub started_at: Option<Instant>,
    /// Whether the graceful stop signal went out for the current generation
    pub terminate_sent: bool,
    pub error: Option<RuntimeProcessError>,
    pub handle: Option<Arc<dyn ProcessHandle>>,
}

impl ProcessEntry {
    fn new() -> Self {
        Self {
            state: ProcessState::Starting,
            pid: None,
            generation: 0,
            restarts: 0,
            crash_streak: 0,
            started_at: None,
            terminate_sent: false,
            error: None,
            handle: None,
        }
    }

    pub fn uptime(&self) -> Option<Duration> {
        match self.state {
            ProcessState::Running => self.started_at.map(|t| t.elapsed()),
            _ => None,
        }
    }
}

/// Process table shared between the supervisor loop and status readers.
///
/// Only the supervisor loop writes; every write goes through the lock so
/// transitions of one entry are serialized.
#[derive(Clone)]
pub struct ProcessTable {
    entries: Arc<RwLock<IndexMap<String, ProcessEntry>>>,
    changes: broadcast::Sender<StateChange>,
}

impl ProcessTable {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            entries: Arc::new(RwLock::new(IndexMap::new())),
            changes,
        }
    }

    /// Subscribe to state transitions
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Move an entry to `state`, creating it on first use, and notify observers
    pub async fn transition(&self, name: &str, state: ProcessState) {
        let pid = {
            let mut entries = self.entries.write().await;
            let entry = entries
                .entry(name.to_string())
                .or_insert_with(ProcessEntry::new);
            entry.state = state;
            if state.is_terminal() || state == ProcessState::Respawning {
                entry.pid = None;
                entry.handle = None;
            }
            entry.pid
        };
        log::debug!("[{}] -> {:?}", name, state);
        // No subscribers is fine
        let _ = self.changes.send(StateChange {
            name: name.to_string(),
            state,
            pid,
        });
    }

    /// Run `f` on an entry under the write lock
    pub async fn update<R>(&self, name: &str, f: impl FnOnce(&mut ProcessEntry) -> R) -> Option<R> {
        let mut entries = self.entries.write().await;
        entries.get_mut(name).map(f)
    }

    /// Read a value out of an entry
    pub async fn read<R>(&self, name: &str, f: impl FnOnce(&ProcessEntry) -> R) -> Option<R> {
        let entries = self.entries.read().await;
        entries.get(name).map(f)
    }

    /// Names of entries currently in `state`
    pub async fn names_in(&self, state: ProcessState) -> Vec<String> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|(_, e)| e.state == state)
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// True when no entry is alive or waiting to respawn
    pub async fn is_idle(&self) -> bool {
        let entries = self.entries.read().await;
        entries.values().all(|e| e.state.is_terminal())
    }

    /// Status of every entry, in launch order
    pub async fn snapshot(&self) -> Vec<ProcessSnapshot> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(name, e)| ProcessSnapshot {
                name: name.clone(),
                state: e.state,
                pid: e.pid,
                restarts: e.restarts,
                uptime: e.uptime(),
            })
            .collect()
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
