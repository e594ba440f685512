//! OS process creation behind a trait, so supervision can be driven by a
//! scripted launcher in tests

use crate::config::OutputMode;
use crate::runtime::plan::LaunchCommand;
use crate::runtime::process::ProcessEvent;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

/// Channel carrying `(action label, event)` pairs to the supervisor
pub type EventSender = mpsc::UnboundedSender<(String, ProcessEvent)>;

/// Signals the supervisor sends to children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Ask the process to exit (SIGTERM)
    Terminate,
    /// Force the process down (SIGKILL)
    Kill,
}

/// A started child process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    fn id(&self) -> Option<u32>;

    /// Deliver a signal. Signalling a process that already exited is a no-op.
    fn signal(&self, signal: StopSignal) -> std::io::Result<()>;

    /// Exit status if the process is already known to have exited
    fn exit_status(&self) -> Option<Option<i32>>;

    /// Wait for exit. `None` means the process was ended by a signal.
    async fn wait(&self) -> std::io::Result<Option<i32>>;
}

/// Starts child processes
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start `command`; captured output lines are forwarded on `events`
    async fn spawn(
        &self,
        command: &LaunchCommand,
        events: EventSender,
    ) -> std::io::Result<Arc<dyn ProcessHandle>>;
}

/// Launcher backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn spawn(
        &self,
        command: &LaunchCommand,
        events: EventSender,
    ) -> std::io::Result<Arc<dyn ProcessHandle>> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match command.output {
            OutputMode::Screen => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Log => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();

        // Spawn output readers
        if let Some(stdout) = child.stdout.take() {
            forward_lines(command.name.clone(), stdout, false, events.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(command.name.clone(), stderr, true, events);
        }

        Ok(Arc::new(TokioProcess {
            pid,
            child: Mutex::new(child),
            status: OnceLock::new(),
        }))
    }
}

fn forward_lines<R>(name: String, stream: R, is_stderr: bool, tx: EventSender)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx
                .send((name.clone(), ProcessEvent::Output { line, is_stderr }))
                .is_err()
            {
                break;
            }
        }
    });
}

struct TokioProcess {
    pid: Option<u32>,
    child: Mutex<Child>,
    /// Set once reaped, so a recycled pid is never signalled
    status: OnceLock<Option<i32>>,
}

#[async_trait]
impl ProcessHandle for TokioProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn signal(&self, signal: StopSignal) -> std::io::Result<()> {
        if self.status.get().is_some() {
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let sig = match signal {
                StopSignal::Terminate => Signal::SIGTERM,
                StopSignal::Kill => Signal::SIGKILL,
            };
            match kill(Pid::from_raw(pid as i32), sig) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(std::io::Error::from_raw_os_error(e as i32)),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = (pid, signal);
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "signals are only supported on unix",
            ))
        }
    }

    async fn wait(&self) -> std::io::Result<Option<i32>> {
        let code = self.child.lock().await.wait().await?.code();
        let _ = self.status.set(code);
        Ok(code)
    }

    fn exit_status(&self) -> Option<Option<i32>> {
        self.status.get().copied()
    }
}
