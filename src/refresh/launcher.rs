//! Process spawning seam for the refresh supervisor.
//!
//! [`ProcessLauncher`] is the production implementation on top of
//! `tokio::process`. Tests provide their own [`Launcher`] to count spawns and
//! kills without touching the OS.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use super::RefreshError;

/// One captured output stream of a child.
pub type OutputStream = Pin<Box<dyn AsyncRead + Send>>;

/// Fully resolved invocation of the external script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl ScriptCommand {
    /// Resolve `script` against `working_dir`, or against the process
    /// working directory when none is configured.
    pub fn resolve(
        interpreter: &str,
        script: &Path,
        working_dir: Option<&Path>,
    ) -> Result<Self, RefreshError> {
        let cwd = match working_dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir().map_err(RefreshError::WorkingDir)?,
        };
        let script_path = if script.is_absolute() {
            script.to_path_buf()
        } else {
            cwd.join(script)
        };

        Ok(Self {
            program: interpreter.to_string(),
            args: vec![script_path.to_string_lossy().into_owned()],
            working_dir: cwd,
        })
    }
}

/// Exit status of a script, reduced to what the supervisor needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptExit {
    /// `None` when the process was ended by a signal.
    pub code: Option<i32>,
}

impl ScriptExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A running script as seen by the supervisor.
#[async_trait]
pub trait ScriptChild: Send {
    /// OS process id, if there is one.
    fn id(&self) -> Option<u32>;

    /// Take the stdout pipe. Returns `None` on the second call.
    fn take_stdout(&mut self) -> Option<OutputStream>;

    /// Take the stderr pipe. Returns `None` on the second call.
    fn take_stderr(&mut self) -> Option<OutputStream>;

    /// Wait for the process to exit.
    async fn wait(&mut self) -> std::io::Result<ScriptExit>;

    /// Force-kill the process and reap it. Already-exited processes are left
    /// alone.
    async fn kill(&mut self) -> std::io::Result<()>;
}

/// Starts script processes.
pub trait Launcher: Send + Sync {
    fn launch(&self, command: &ScriptCommand) -> std::io::Result<Box<dyn ScriptChild>>;
}

/// Spawns real OS processes with piped stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, command: &ScriptCommand) -> std::io::Result<Box<dyn ScriptChild>> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        Ok(Box::new(ProcessChild { child }))
    }
}

struct ProcessChild {
    child: Child,
}

#[async_trait]
impl ScriptChild for ProcessChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_stdout(&mut self) -> Option<OutputStream> {
        self.child
            .stdout
            .take()
            .map(|pipe| Box::pin(pipe) as OutputStream)
    }

    fn take_stderr(&mut self) -> Option<OutputStream> {
        self.child
            .stderr
            .take()
            .map(|pipe| Box::pin(pipe) as OutputStream)
    }

    async fn wait(&mut self) -> std::io::Result<ScriptExit> {
        let status = self.child.wait().await?;
        Ok(ScriptExit {
            code: status.code(),
        })
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        // SIGKILL on unix; the child gets no chance to clean up.
        self.child.kill().await
    }
}
