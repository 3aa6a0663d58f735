use std::{path::PathBuf, process::Stdio};

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::{error::ExecError, util::cmd_program};

mod table;
pub use table::ProcessTable;

/// One external program invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Task id owning the process; registered in the process table while it runs.
    pub owner: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `flag value`.
    pub fn opt(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Append `flag value` only when `value` is present.
    pub fn opt_if<V: Into<String>>(self, flag: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.opt(flag, v),
            None => self,
        }
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn owned_by(mut self, task_id: impl Into<String>) -> Self {
        self.owner = Some(task_id.into());
        self
    }

    /// The second positional token, e.g. `merge` in `mir merge --root ..`.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a successful run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs to completion.
///
/// Non-zero exits are errors. Implementations block (asynchronously) until the process exits;
/// there is no timeout.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(&self, inv: &Invocation) -> Result<ToolOutput, ExecError>;

    /// Processes currently running on behalf of `owner`.
    fn table(&self) -> &ProcessTable;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Clone, Default)]
pub struct ProcRunner {
    table: ProcessTable,
}

impl ProcRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: ProcessTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl CommandRunner for ProcRunner {
    async fn run(&self, inv: &Invocation) -> Result<ToolOutput, ExecError> {
        if inv.program.trim().is_empty() {
            return Err(ExecError::MissingProgram(inv.program.clone()));
        }

        let mut cmd = cmd_program(&inv.program, &inv.args);
        if let Some(cwd) = &inv.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &inv.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        trace!(target: "mirctl.exec.proc", cmd = %inv.command_line(), "spawn");
        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExecError::MissingProgram(inv.program.clone()),
            _ => ExecError::Spawn {
                program: inv.program.clone(),
                reason: e.to_string(),
            },
        })?;

        let registered = match (&inv.owner, child.id()) {
            (Some(owner), Some(pid)) => {
                self.table.register(owner, pid);
                Some((owner.as_str(), pid))
            }
            _ => None,
        };

        let waited = child.wait_with_output().await;
        if let Some((owner, pid)) = registered {
            self.table.unregister(owner, pid);
        }
        let output = waited?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            debug!(target: "mirctl.exec.proc", cmd = %inv.program, sub = ?inv.subcommand(), "exit success");
            return Ok(ToolOutput { stdout, stderr });
        }
        match output.status.code() {
            Some(code) => {
                warn!(target: "mirctl.exec.proc", cmd = %inv.program, sub = ?inv.subcommand(), code, "exit non-zero");
                Err(ExecError::NonZeroExit {
                    code,
                    stderr: stderr.trim().to_string(),
                })
            }
            None => {
                warn!(target: "mirctl.exec.proc", cmd = %inv.program, sub = ?inv.subcommand(), "terminated by signal");
                Err(ExecError::KilledBySignal {
                    stderr: stderr.trim().to_string(),
                })
            }
        }
    }

    fn table(&self) -> &ProcessTable {
        &self.table
    }
}
