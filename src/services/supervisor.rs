//! Inference server process supervision
//!
//! Each generation job owns one supervisor, which spawns the server,
//! watches its merged stdout/stderr for the readiness marker, enforces
//! the startup deadline and the hard processing ceiling, and tears the
//! process down (including any descendants it spawned) when the job
//! settles or is cancelled.

use crate::error::{GeneratorError, Result};
use crate::services::inference_client::InferenceClient;
use crate::services::line_splitter::LineSplitter;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maximum time the server may take to print its readiness marker
pub const STARTUP_DEADLINE: Duration = Duration::from_secs(30);
/// Hard ceiling on one server's total lifetime
pub const PROCESSING_CEILING: Duration = Duration::from_secs(450);
/// Time granted between the termination signal and the forced kill
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Log-line prefix the server prints once it can accept requests
const READY_MARKER: &str = "Running on http://127.0.0.1:";

/// Recent output lines kept for crash diagnostics
const RECENT_LINES: usize = 5;

/// Extract the bound port from a readiness line
///
/// The marker contract requires the trailing slash, so a line that cuts
/// off mid-port never matches.
fn parse_ready_port(line: &str) -> Option<u16> {
    let start = line.find(READY_MARKER)? + READY_MARKER.len();
    let rest = &line[start..];
    let end = rest.find('/')?;
    rest[..end].parse().ok()
}

/// Lifecycle manager for one inference server process
pub struct ProcessSupervisor {
    command: Vec<String>,
    job_id: Uuid,
    startup_deadline: Duration,
    hard_ceiling: Duration,
    /// External cancel signal (job or batch level)
    cancel: CancellationToken,
    /// Internal signal quenching watchdog tasks once stop() runs
    shutdown: CancellationToken,
    child: Option<Child>,
    pid: Option<u32>,
    client: Option<InferenceClient>,
}

enum StartOutcome {
    Ready(u16),
    Crashed(Option<std::process::ExitStatus>),
    StreamsClosed,
    TimedOut,
    Cancelled,
}

impl ProcessSupervisor {
    pub fn new(command: Vec<String>, job_id: Uuid, cancel: CancellationToken) -> Self {
        Self {
            command,
            job_id,
            startup_deadline: STARTUP_DEADLINE,
            hard_ceiling: PROCESSING_CEILING,
            cancel,
            shutdown: CancellationToken::new(),
            child: None,
            pid: None,
            client: None,
        }
    }

    /// Override the startup deadline and hard ceiling
    pub fn with_deadlines(mut self, startup_deadline: Duration, hard_ceiling: Duration) -> Self {
        self.startup_deadline = startup_deadline;
        self.hard_ceiling = hard_ceiling;
        self
    }

    /// Spawn the server and wait for it to become ready
    ///
    /// Resolves to an RPC client bound to the port the server actually
    /// took. Every failure path reaps the child before returning, so a
    /// startup timeout or crash never leaks a process.
    pub async fn start(&mut self) -> Result<InferenceClient> {
        if self.cancel.is_cancelled() {
            return Err(GeneratorError::Cancelled);
        }

        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| GeneratorError::SpawnFailed("server command is empty".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GeneratorError::SpawnFailed(format!("{}: {}", program, e)))?;

        let pid = child
            .id()
            .ok_or_else(|| GeneratorError::SpawnFailed("child pid unavailable".to_string()))?;
        debug!(job_id = %self.job_id, pid, "Spawned inference server");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GeneratorError::SpawnFailed("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| GeneratorError::SpawnFailed("stderr not captured".to_string()))?;

        // Merge both streams into one line channel for the readiness scan.
        let (line_tx, line_rx) = mpsc::channel::<String>(64);
        spawn_output_pump(stdout, line_tx.clone());
        spawn_output_pump(stderr, line_tx);

        let (ready_tx, mut ready_rx) = oneshot::channel::<u16>();
        let recent = Arc::new(Mutex::new(VecDeque::with_capacity(RECENT_LINES)));
        self.spawn_line_consumer(line_rx, ready_tx, Arc::clone(&recent));

        self.spawn_hard_ceiling_watchdog(pid);
        self.spawn_cancel_watcher(pid);

        let outcome = tokio::select! {
            result = &mut ready_rx => match result {
                Ok(port) => StartOutcome::Ready(port),
                Err(_) => StartOutcome::StreamsClosed,
            },
            status = child.wait() => StartOutcome::Crashed(status.ok()),
            _ = tokio::time::sleep(self.startup_deadline) => StartOutcome::TimedOut,
            _ = self.cancel.cancelled() => StartOutcome::Cancelled,
        };

        match outcome {
            StartOutcome::Ready(port) => {
                info!(job_id = %self.job_id, port, "Inference server ready");
                let client = InferenceClient::new(
                    format!("http://127.0.0.1:{}", port),
                    self.hard_ceiling,
                )?;
                self.child = Some(child);
                self.pid = Some(pid);
                self.client = Some(client.clone());
                Ok(client)
            }
            StartOutcome::Crashed(status) => {
                self.shutdown.cancel();
                Err(GeneratorError::CrashedBeforeReady(crash_detail(
                    status, &recent,
                )))
            }
            StartOutcome::StreamsClosed => {
                self.shutdown.cancel();
                force_kill(&mut child, pid).await;
                Err(GeneratorError::CrashedBeforeReady(crash_detail(
                    None, &recent,
                )))
            }
            StartOutcome::TimedOut => {
                warn!(
                    job_id = %self.job_id,
                    "Inference server not ready within {:?}, killing it",
                    self.startup_deadline
                );
                self.shutdown.cancel();
                force_kill(&mut child, pid).await;
                Err(GeneratorError::StartupTimeout(self.startup_deadline))
            }
            StartOutcome::Cancelled => {
                self.shutdown.cancel();
                force_kill(&mut child, pid).await;
                Err(GeneratorError::Cancelled)
            }
        }
    }

    /// Stop the server: graceful RPC close, then a termination signal,
    /// then a forced kill of the whole process tree
    ///
    /// Safe to call any number of times; only the first call acts.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                debug!(job_id = %self.job_id, "Close request failed: {}", e);
            }
        }

        if let Ok(Some(status)) = child.try_wait() {
            debug!(job_id = %self.job_id, %status, "Inference server already exited");
            return;
        }

        if let Some(pid) = self.pid {
            signal_terminate(pid).await;
        }

        match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(job_id = %self.job_id, %status, "Inference server terminated");
            }
            _ => {
                warn!(job_id = %self.job_id, "Inference server ignored termination, killing tree");
                if let Some(pid) = self.pid {
                    force_kill(&mut child, pid).await;
                }
            }
        }
    }

    /// Whether start() has succeeded and stop() has not yet run
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    fn spawn_line_consumer(
        &self,
        mut line_rx: mpsc::Receiver<String>,
        ready_tx: oneshot::Sender<u16>,
        recent: Arc<Mutex<VecDeque<String>>>,
    ) {
        let job_id = self.job_id;
        let mut ready_tx = Some(ready_tx);
        tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                debug!(job_id = %job_id, "server: {}", line);
                if let Ok(mut buffer) = recent.lock() {
                    if buffer.len() == RECENT_LINES {
                        buffer.pop_front();
                    }
                    buffer.push_back(line.clone());
                }
                if ready_tx.is_some() {
                    if let Some(port) = parse_ready_port(&line) {
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(port);
                        }
                    }
                }
            }
        });
    }

    fn spawn_hard_ceiling_watchdog(&self, pid: u32) {
        let shutdown = self.shutdown.clone();
        let ceiling = self.hard_ceiling;
        let job_id = self.job_id;
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(ceiling) => {
                    warn!(
                        job_id = %job_id,
                        "Inference server exceeded the {:?} ceiling, killing process tree",
                        ceiling
                    );
                    kill_process_tree(pid).await;
                }
            }
        });
    }

    fn spawn_cancel_watcher(&self, pid: u32) {
        let shutdown = self.shutdown.clone();
        let cancel = self.cancel.clone();
        let job_id = self.job_id;
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = cancel.cancelled() => {
                    info!(job_id = %job_id, "Cancel requested, stopping inference server");
                    signal_terminate(pid).await;
                    tokio::time::sleep(TERMINATE_GRACE).await;
                    kill_process_tree(pid).await;
                }
            }
        });
    }
}

/// Read one child output stream to EOF, feeding completed lines into
/// the shared channel
fn spawn_output_pump<R>(stream: R, line_tx: mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut stream = stream;
        let mut splitter = LineSplitter::new();
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    for line in splitter.feed(&buf[..n]) {
                        if line_tx.send(line).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
        if let Some(rest) = splitter.finish() {
            let _ = line_tx.send(rest).await;
        }
    });
}

fn crash_detail(
    status: Option<std::process::ExitStatus>,
    recent: &Arc<Mutex<VecDeque<String>>>,
) -> String {
    let status = match status {
        Some(s) => s.to_string(),
        None => "output closed".to_string(),
    };
    let lines = recent
        .lock()
        .map(|buffer| buffer.iter().cloned().collect::<Vec<_>>().join(" | "))
        .unwrap_or_default();
    if lines.is_empty() {
        status
    } else {
        format!("{}; last output: {}", status, lines)
    }
}

/// Kill the direct child and anything it spawned, then reap it
async fn force_kill(child: &mut Child, pid: u32) {
    kill_process_tree(pid).await;
    let _ = child.kill().await;
    let _ = child.wait().await;
}

/// Ask the process to exit (SIGTERM equivalent)
async fn signal_terminate(pid: u32) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .status()
            .await;
    }

    #[cfg(windows)]
    {
        let _ = Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .status()
            .await;
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
    }
}

/// Forcibly kill the process and its descendants
///
/// The inference server forks model workers; killing only the direct
/// child would orphan them.
async fn kill_process_tree(pid: u32) {
    #[cfg(unix)]
    {
        let _ = Command::new("pkill")
            .args(["-KILL", "-P", &pid.to_string()])
            .status()
            .await;
        let _ = Command::new("kill")
            .args(["-KILL", &pid.to_string()])
            .status()
            .await;
    }

    #[cfg(windows)]
    {
        let _ = Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .status()
            .await;
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ready_port_from_marker_line() {
        assert_eq!(
            parse_ready_port(" * Running on http://127.0.0.1:5000/ (Press CTRL+C to quit)"),
            Some(5000)
        );
        assert_eq!(
            parse_ready_port("Running on http://127.0.0.1:18443/"),
            Some(18443)
        );
    }

    #[test]
    fn test_parse_ready_port_requires_trailing_slash() {
        assert_eq!(parse_ready_port("Running on http://127.0.0.1:5000"), None);
    }

    #[test]
    fn test_parse_ready_port_ignores_unrelated_lines() {
        assert_eq!(parse_ready_port("loading model weights"), None);
        assert_eq!(parse_ready_port("Running on http://0.0.0.0:5000/"), None);
        assert_eq!(parse_ready_port(""), None);
    }

    #[test]
    fn test_parse_ready_port_rejects_garbage_port() {
        assert_eq!(parse_ready_port("Running on http://127.0.0.1:none/"), None);
        assert_eq!(parse_ready_port("Running on http://127.0.0.1:99999999/"), None);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_a_no_op() {
        let mut supervisor = ProcessSupervisor::new(
            vec!["true".to_string()],
            Uuid::new_v4(),
            CancellationToken::new(),
        );
        supervisor.stop().await;
        supervisor.stop().await;
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_start_with_empty_command_is_spawn_failed() {
        let mut supervisor =
            ProcessSupervisor::new(Vec::new(), Uuid::new_v4(), CancellationToken::new());
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, GeneratorError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn test_start_with_missing_program_is_spawn_failed() {
        let mut supervisor = ProcessSupervisor::new(
            vec!["definitely-not-a-real-program-mapsynth".to_string()],
            Uuid::new_v4(),
            CancellationToken::new(),
        );
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, GeneratorError::SpawnFailed(_)));
    }
}
