//! Command execution inside containers.

use crate::container::{Container, abbreviate};
use crate::engine::{ConsoleSize, EngineClient, ExecSpec};
use crate::poll;
use crate::stream::{BoxedReader, Completion, OutputSinks, PumpIo, pump};
use dockling_shared::constants::poll::DEFAULT_SLEEP;
use dockling_shared::{DocklingError, DocklingResult};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Command
// ============================================================================

/// Command to execute, with its arguments.
///
/// ```rust,no_run
/// # use dockling::Command;
/// let cmd = Command::new("/bin/sh").args(["-c", "echo hello"]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
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

    /// Program followed by its arguments.
    pub fn to_argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

// ============================================================================
// Exec Options
// ============================================================================

/// How to execute a command.
#[derive(Default)]
pub struct ExecOptions {
    spec: ExecSpec,
    input: Option<BoxedReader>,
    output: OutputSinks,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the command's stdin from `input`, closing stdin on EOF.
    ///
    /// The reader must reach EOF at some point, otherwise the task copying it
    /// never finishes.
    pub fn input<R>(mut self, input: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.input = Some(Box::new(input));
        self
    }

    /// Send stdout and stderr to the same writer.
    pub fn combined_output<W>(mut self, out: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.output = OutputSinks::Combined(Box::new(out));
        self
    }

    /// Send stdout and stderr to separate writers; switches off the TTY.
    pub fn demuxed_output<O, E>(mut self, stdout: O, stderr: E) -> Self
    where
        O: AsyncWrite + Send + Unpin + 'static,
        E: AsyncWrite + Send + Unpin + 'static,
    {
        self.output = OutputSinks::Demuxed {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        };
        self.spec.tty = false;
        self
    }

    /// Allocate a pseudo TTY; all output then arrives as stdout.
    pub fn tty(mut self) -> Self {
        self.spec.tty = true;
        self
    }

    /// Environment variables in "NAME=VALUE" form.
    pub fn env<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.env.extend(vars.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.spec.working_dir = Some(dir.into());
        self
    }

    /// User name or ID to execute the command as.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.spec.user = Some(user.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.spec.privileged = true;
        self
    }

    pub fn console_size(mut self, width: u16, height: u16) -> Self {
        self.spec.console_size = Some(ConsoleSize { width, height });
        self
    }

    fn into_parts(self, cmd: &Command) -> DocklingResult<(ExecSpec, PumpIo)> {
        if cmd.program.is_empty() {
            return Err(DocklingError::Config("command must not be empty".to_string()));
        }
        let mut spec = self.spec;
        spec.cmd = cmd.to_argv();
        spec.attach_stdin = self.input.is_some();
        spec.attach_stdout = true;
        spec.attach_stderr = true;
        Ok((
            spec,
            PumpIo {
                input: self.input,
                output: self.output,
            },
        ))
    }
}

impl std::fmt::Debug for ExecOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecOptions")
            .field("spec", &self.spec)
            .field("input", &self.input.is_some())
            .field("output", &self.output)
            .finish()
    }
}

// ============================================================================
// Exec Session
// ============================================================================

impl Container {
    /// Execute a command inside this container.
    ///
    /// Returns as soon as the command has been started; use
    /// [`ExecSession::wait`] to wait for it to finish. There is nothing to
    /// clean up on failure, as the engine cannot delete command executions.
    pub async fn exec(&self, cmd: Command, options: ExecOptions) -> DocklingResult<ExecSession> {
        let (spec, io) = options.into_parts(&cmd)?;
        let engine = self.engine();
        let container = format!("{:?}/{}", self.name(), self.abbreviated_id());

        engine
            .inspect_container(self.id())
            .await
            .map_err(|source| DocklingError::Precondition {
                container: container.clone(),
                source,
            })?;

        let exec_id = engine.create_exec(self.id(), &spec).await.map_err(|e| {
            DocklingError::engine(format!("cannot execute into container {}", container), e)
        })?;
        tracing::debug!(
            container_id = %self.abbreviated_id(),
            exec_id = %abbreviate(&exec_id),
            cmd = ?spec.cmd,
            "Created command execution"
        );

        // Attaching starts the command.
        let conn = engine
            .attach_exec(&exec_id, spec.tty_options())
            .await
            .map_err(|e| {
                DocklingError::engine(
                    format!("cannot attach to command execution in container {}", container),
                    e,
                )
            })?;
        tracing::debug!(exec_id = %abbreviate(&exec_id), tty = spec.tty, "Attached to command execution");

        let done = pump::spawn(conn, io, spec.tty, abbreviate(&exec_id));

        Ok(ExecSession {
            id: exec_id,
            container: self.clone(),
            engine: engine.clone(),
            done,
        })
    }
}

/// A command executing inside a container.
#[derive(Clone)]
pub struct ExecSession {
    id: String,
    container: Container,
    engine: Arc<dyn EngineClient>,
    done: Completion,
}

impl ExecSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The container the command executes in.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Signal firing once the command's output has been fully copied and the
    /// attach connection released.
    pub fn done(&self) -> Completion {
        self.done.clone()
    }

    /// PID of the executing command, waiting for it to show up.
    ///
    /// Fails with [`DocklingError::AlreadyTerminated`] once the command has
    /// finished, as there won't be any PID anymore.
    pub async fn pid(&self, cancel: &CancellationToken) -> DocklingResult<i64> {
        loop {
            let details = self.engine.inspect_exec(&self.id).await.map_err(|e| {
                DocklingError::engine("cannot determine the PID of the executing command", e)
            })?;
            if details.running && details.pid != 0 {
                return Ok(details.pid);
            }
            if self.done.is_done() {
                return Err(DocklingError::AlreadyTerminated);
            }
            tracing::trace!(exec_id = %abbreviate(&self.id), "No PID yet");
            poll::sleep(cancel, DEFAULT_SLEEP).await?;
        }
    }

    /// Wait for the command to finish, returning its exit code.
    ///
    /// All output has been written to the sinks by the time this returns.
    pub async fn wait(&self, cancel: &CancellationToken) -> DocklingResult<i64> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DocklingError::Cancelled),
            _ = self.done.wait() => {}
        }

        let details = self.engine.inspect_exec(&self.id).await.map_err(|e| {
            DocklingError::engine("error fetching result code of executed command", e)
        })?;
        if details.running {
            return Err(DocklingError::StillRunning {
                exec: abbreviate(&self.id).to_string(),
            });
        }
        Ok(details.exit_code.unwrap_or_default())
    }
}

impl std::fmt::Debug for ExecSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecSession")
            .field("id", &self.id)
            .field("container", &self.container.id())
            .field("done", &self.done.is_done())
            .finish_non_exhaustive()
    }
}
