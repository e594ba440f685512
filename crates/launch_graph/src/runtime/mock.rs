//! Scripted process launcher for exercising supervision without real children

use crate::runtime::launcher::{EventSender, ProcessHandle, ProcessLauncher, StopSignal};
use crate::runtime::plan::LaunchCommand;
use crate::runtime::process::ProcessEvent;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Fake child process; exits when told to or when signalled
pub struct MockProcess {
    pid: u32,
    ignore_terminate: bool,
    exit: watch::Sender<Option<Option<i32>>>,
    terminate_count: AtomicUsize,
    kill_count: AtomicUsize,
    events: EventSender,
    name: String,
}

impl MockProcess {
    /// Make the process exit. Only the first exit counts.
    pub fn exit(&self, code: Option<i32>) {
        self.exit.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(code);
            true
        });
    }

    /// Emit a captured output line
    pub fn print(&self, line: &str, is_stderr: bool) {
        let _ = self.events.send((
            self.name.clone(),
            ProcessEvent::Output {
                line: line.to_string(),
                is_stderr,
            },
        ));
    }

    pub fn has_exited(&self) -> bool {
        self.exit_status().is_some()
    }

    pub fn terminate_count(&self) -> usize {
        self.terminate_count.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> usize {
        self.kill_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessHandle for MockProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn signal(&self, signal: StopSignal) -> std::io::Result<()> {
        match signal {
            StopSignal::Terminate => {
                self.terminate_count.fetch_add(1, Ordering::SeqCst);
                if !self.ignore_terminate {
                    self.exit(None);
                }
            }
            StopSignal::Kill => {
                self.kill_count.fetch_add(1, Ordering::SeqCst);
                self.exit(None);
            }
        }
        Ok(())
    }

    fn exit_status(&self) -> Option<Option<i32>> {
        *self.exit.borrow()
    }

    async fn wait(&self) -> std::io::Result<Option<i32>> {
        let mut rx = self.exit.subscribe();
        let state = *rx
            .wait_for(Option::is_some)
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))?;
        Ok(state.flatten())
    }
}

/// Launcher that records every command and hands out [`MockProcess`]es
#[derive(Default)]
pub struct MockLauncher {
    failing: HashSet<String>,
    stubborn: HashSet<String>,
    next_pid: AtomicU32,
    spawned: Mutex<Vec<(LaunchCommand, Arc<MockProcess>)>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawning the named action fails like a missing executable
    pub fn with_failing(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// The named action ignores SIGTERM
    pub fn with_stubborn(mut self, name: impl Into<String>) -> Self {
        self.stubborn.insert(name.into());
        self
    }

    /// Number of successful spawns for `name`
    pub fn spawn_count(&self, name: &str) -> usize {
        self.lock().iter().filter(|(c, _)| c.name == name).count()
    }

    /// Every process started for `name`, oldest first
    pub fn processes(&self, name: &str) -> Vec<Arc<MockProcess>> {
        self.lock()
            .iter()
            .filter(|(c, _)| c.name == name)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// The most recent process started for `name`
    pub fn latest(&self, name: &str) -> Option<Arc<MockProcess>> {
        self.processes(name).pop()
    }

    /// Commands in spawn order
    pub fn commands(&self) -> Vec<LaunchCommand> {
        self.lock().iter().map(|(c, _)| c.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(LaunchCommand, Arc<MockProcess>)>> {
        // A poisoned lock only means a test panicked while holding it
        self.spawned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProcessLauncher for MockLauncher {
    async fn spawn(
        &self,
        command: &LaunchCommand,
        events: EventSender,
    ) -> std::io::Result<Arc<dyn ProcessHandle>> {
        if self.failing.contains(&command.name) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: No such file or directory", command.program.display()),
            ));
        }

        let (exit, _) = watch::channel(None);
        let process = Arc::new(MockProcess {
            pid: 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
            ignore_terminate: self.stubborn.contains(&command.name),
            exit,
            terminate_count: AtomicUsize::new(0),
            kill_count: AtomicUsize::new(0),
            events,
            name: command.name.clone(),
        });
        self.lock().push((command.clone(), process.clone()));
        Ok(process)
    }
}
