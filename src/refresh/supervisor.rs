//! Exit-versus-timeout supervision of one script run.
//!
//! The watcher task waits for the child to exit and for both output streams
//! to reach EOF. The timer task sleeps for the configured limit. Both report
//! through a shared [`Settlement`]; the timer only kills the child if it won.

use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::launcher::{Launcher, ScriptChild, ScriptCommand, ScriptExit};
use super::run::{capture, OutputBuffer, RefreshRun};
use super::settle::Settlement;
use super::{RefreshError, RefreshOutcome, RefreshReport};

/// Spawn `command` and supervise it until exactly one outcome is known.
///
/// Errors are only returned when the process could not be started at all.
pub async fn supervise(
    launcher: &dyn Launcher,
    command: &ScriptCommand,
    timeout: Duration,
) -> Result<RefreshReport, RefreshError> {
    let run = RefreshRun::new();
    let run_id = run.id.to_string();

    let mut child = launcher
        .launch(command)
        .map_err(|source| RefreshError::Spawn {
            program: command.program.clone(),
            source,
        })?;
    let spawned = Instant::now();

    info!(
        run_id = run_id.as_str(),
        pid = child.id(),
        program = command.program.as_str(),
        args = ?command.args,
        working_dir = %command.working_dir.display(),
        timeout_sec = timeout.as_secs(),
        "started data refresh script"
    );

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.take_stdout() {
        readers.push(capture(stdout, run.stdout.clone(), "stdout"));
    }
    if let Some(stderr) = child.take_stderr() {
        readers.push(capture(stderr, run.stderr.clone(), "stderr"));
    }
    let reader_aborts: Vec<_> = readers.iter().map(|r| r.abort_handle()).collect();

    let (gate, settled) = Settlement::<RefreshOutcome>::new();
    let kill = CancellationToken::new();

    let watcher = {
        let gate = gate.clone();
        let kill = kill.clone();
        let stdout = run.stdout.clone();
        let stderr = run.stderr.clone();
        let run_id = run_id.clone();
        tokio::spawn(async move {
            let exit = tokio::select! {
                biased;
                _ = kill.cancelled() => {
                    terminate(child.as_mut(), &run_id).await;
                    return;
                }
                exit = child.wait() => exit,
            };

            // Exit only counts once both pipes are closed.
            tokio::select! {
                biased;
                _ = kill.cancelled() => {
                    debug!(run_id = run_id.as_str(), "deadline passed while output was draining");
                    terminate(child.as_mut(), &run_id).await;
                    return;
                }
                _ = join_all(readers) => {}
            }

            let outcome = exit_outcome(exit, &stdout, &stderr);
            if !gate.settle(outcome) {
                debug!(run_id = run_id.as_str(), "exit lost the race to the timer");
            }
        })
    };

    let timer = {
        let gate = gate.clone();
        let kill = kill.clone();
        let stdout = run.stdout.clone();
        let stderr = run.stderr.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let outcome = RefreshOutcome::TimedOut {
                after_secs: timeout.as_secs(),
                partial_stdout: stdout.text(),
                partial_stderr: stderr.text(),
            };
            if gate.settle(outcome) {
                kill.cancel();
            }
        })
    };

    let outcome = settled.await.map_err(|_| RefreshError::Abandoned);
    timer.abort();
    // Let the watcher finish its kill before reporting.
    if let Err(e) = watcher.await {
        if !e.is_cancelled() {
            warn!(run_id = run_id.as_str(), error = %e, "refresh watcher task failed");
        }
    }
    if kill.is_cancelled() {
        // Grandchildren may still hold the pipes open.
        for abort in reader_aborts {
            abort.abort();
        }
    }
    let outcome = outcome?;

    let elapsed_ms = spawned.elapsed().as_millis() as u64;
    match &outcome {
        RefreshOutcome::Succeeded { stdout } => info!(
            run_id = run_id.as_str(),
            elapsed_ms,
            stdout_bytes = stdout.len(),
            "data refresh succeeded"
        ),
        RefreshOutcome::Failed { code, stderr, .. } => warn!(
            run_id = run_id.as_str(),
            elapsed_ms,
            exit_code = ?code,
            stderr = stderr.as_str(),
            "data refresh failed"
        ),
        RefreshOutcome::TimedOut {
            partial_stdout,
            partial_stderr,
            ..
        } => warn!(
            run_id = run_id.as_str(),
            elapsed_ms,
            partial_stdout_bytes = partial_stdout.len(),
            partial_stderr_bytes = partial_stderr.len(),
            partial_stderr = partial_stderr.as_str(),
            "data refresh timed out, script killed"
        ),
    }

    Ok(RefreshReport {
        run_id: run.id,
        started_at: run.started_at,
        finished_at: Utc::now(),
        outcome,
    })
}

fn exit_outcome(
    exit: std::io::Result<ScriptExit>,
    stdout: &OutputBuffer,
    stderr: &OutputBuffer,
) -> RefreshOutcome {
    match exit {
        Ok(exit) if exit.success() => RefreshOutcome::Succeeded {
            stdout: stdout.text(),
        },
        Ok(exit) => RefreshOutcome::Failed {
            code: exit.code,
            stdout: stdout.text(),
            stderr: stderr.text(),
        },
        Err(e) => {
            let mut stderr = stderr.text();
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("failed to wait for script: {e}"));
            RefreshOutcome::Failed {
                code: None,
                stdout: stdout.text(),
                stderr,
            }
        }
    }
}

/// Force-kill a child that overran its deadline.
async fn terminate(child: &mut dyn ScriptChild, run_id: &str) {
    match child.kill().await {
        Ok(()) => debug!(run_id, "script killed"),
        Err(e) => warn!(run_id, error = %e, "failed to kill script"),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted stand-ins for real processes.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::super::launcher::OutputStream;
    use super::*;

    /// A child that exits with `code` after `exit_after` unless killed first.
    pub struct FakeChild {
        pub exit_after: Duration,
        pub code: Option<i32>,
        pub stdout: Option<OutputStream>,
        pub stderr: Option<OutputStream>,
        pub kills: Arc<AtomicUsize>,
        started: Instant,
    }

    impl FakeChild {
        pub fn new(exit_after: Duration, code: i32) -> Self {
            Self {
                exit_after,
                code: Some(code),
                stdout: None,
                stderr: None,
                kills: Arc::new(AtomicUsize::new(0)),
                started: Instant::now(),
            }
        }

        pub fn with_stdout(mut self, chunks: &[&[u8]]) -> Self {
            self.stdout = Some(mock_stream(chunks));
            self
        }

        pub fn with_stderr(mut self, chunks: &[&[u8]]) -> Self {
            self.stderr = Some(mock_stream(chunks));
            self
        }
    }

    pub fn mock_stream(chunks: &[&[u8]]) -> OutputStream {
        let mut builder = tokio_test::io::Builder::new();
        for chunk in chunks {
            builder.read(chunk);
        }
        Box::pin(builder.build())
    }

    #[async_trait]
    impl ScriptChild for FakeChild {
        fn id(&self) -> Option<u32> {
            None
        }

        fn take_stdout(&mut self) -> Option<OutputStream> {
            self.stdout.take()
        }

        fn take_stderr(&mut self) -> Option<OutputStream> {
            self.stderr.take()
        }

        async fn wait(&mut self) -> std::io::Result<ScriptExit> {
            tokio::time::sleep_until(self.started + self.exit_after).await;
            Ok(ScriptExit { code: self.code })
        }

        async fn kill(&mut self) -> std::io::Result<()> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Hands out queued fake children and counts launches.
    #[derive(Default)]
    pub struct FakeLauncher {
        children: Mutex<Vec<FakeChild>>,
        pub launches: AtomicUsize,
    }

    impl FakeLauncher {
        pub fn with_child(child: FakeChild) -> Self {
            Self {
                children: Mutex::new(vec![child]),
                launches: AtomicUsize::new(0),
            }
        }

        pub fn launches(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(&self, _command: &ScriptCommand) -> std::io::Result<Box<dyn ScriptChild>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            let mut children = self.children.lock().unwrap();
            if children.is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no fake child queued",
                ));
            }
            let mut child = children.remove(0);
            child.started = Instant::now();
            Ok(Box::new(child))
        }
    }

    pub fn command() -> ScriptCommand {
        ScriptCommand {
            program: "python3".to_string(),
            args: vec!["scripts/update_data.py".to_string()],
            working_dir: std::env::temp_dir(),
        }
    }
}
