//! Command session: one interactive channel, one drain task, one script.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use super::outcome::{SessionOutcome, SessionState, classify};
use super::script::CommandScript;
use crate::channel::{CommandSink, DrainHandle, SharedOutput, ShellMode, spawn_drain};
use crate::error::{Error, Result, SessionError};
use crate::transport::Connection;

/// How long a stopped drain task may take to hand over queued output
/// before it is aborted.
const DRAIN_STOP_GRACE: Duration = Duration::from_secs(1);

/// Per-operation session settings.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Overall budget for open + script + termination. When it runs out the
    /// drain task is stopped, the connection is dropped, and the operation
    /// fails with the output gathered so far.
    pub deadline: Option<Duration>,
}

impl SessionConfig {
    /// Set the overall deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// A live command-execution context over one connection.
///
/// The session exclusively owns its connection. It writes script steps from
/// the calling task while a spawned drain task reads both output streams
/// into a shared buffer. The buffer is only read for a verdict after the
/// drain task has been joined.
///
/// # Example
///
/// ```rust,no_run
/// use fabric_shell::channel::ShellMode;
/// use fabric_shell::session::{CommandScript, CommandSession, SessionConfig};
/// use fabric_shell::transport::{Connector, EndpointBuilder, SshConnector};
///
/// # async fn example() -> Result<(), fabric_shell::Error> {
/// let endpoint = EndpointBuilder::new().build()?;
/// let connection = SshConnector::default().connect(&endpoint).await?;
/// let script = CommandScript::set_hostname("LAB-VOSS01")?;
/// let outcome = CommandSession::execute(
///     connection,
///     &ShellMode::Interactive,
///     &script,
///     &SessionConfig::default(),
/// )
/// .await?;
/// println!("{}", outcome.output);
/// # Ok(())
/// # }
/// ```
pub struct CommandSession<C: Connection> {
    connection: Option<C>,
    sink: Option<C::Sink>,
    drain: Option<DrainHandle>,
    output: SharedOutput,
    state: SessionState,
    deadline: Option<(Duration, Instant)>,
    opened_at: Instant,
    steps_sent: usize,
}

impl<C: Connection> CommandSession<C> {
    /// Open, run `script`, and close, releasing the connection on every path.
    pub async fn execute(
        connection: C,
        mode: &ShellMode,
        script: &CommandScript,
        config: &SessionConfig,
    ) -> Result<SessionOutcome> {
        let mut session = Self::open(connection, mode, config).await?;
        let result = session.run_script(script).await;
        if let Err(e) = session.close().await {
            debug!("closing session after '{}': {}", script.name(), e);
        }
        result
    }

    /// Open a channel on `connection`, start `mode`, and start draining.
    ///
    /// On failure the connection is closed before returning.
    pub async fn open(mut connection: C, mode: &ShellMode, config: &SessionConfig) -> Result<Self> {
        let opened_at = Instant::now();
        let deadline = config.deadline.map(|d| (d, opened_at + d));
        let mut state = SessionState::Opening;

        let opened = within(deadline.map(|(_, at)| at), connection.open_shell(mode)).await;
        let (sink, reader) = match opened {
            Some(Ok(halves)) => halves,
            Some(Err(e)) => {
                close_quietly(connection).await;
                return Err(e);
            }
            None => {
                drop(connection);
                return Err(SessionError::DeadlineExceeded {
                    deadline: config.deadline.unwrap_or_default(),
                    stage: "opening the channel",
                    output: String::new(),
                }
                .into());
            }
        };
        state = state.transition(SessionState::ShellStarting)?;

        let output = SharedOutput::new();
        let drain = spawn_drain(reader, output.clone());
        state = state.transition(SessionState::Executing)?;
        debug!("session open ({:?})", mode);

        Ok(Self {
            connection: Some(connection),
            sink: Some(sink),
            drain: Some(drain),
            output,
            state,
            deadline,
            opened_at,
            steps_sent: 0,
        })
    }

    /// Write one command line to the remote shell.
    pub async fn send(&mut self, command: &str) -> Result<()> {
        self.state.transition(SessionState::Executing)?;
        let at = self.deadline_at();
        let Some(sink) = self.sink.as_mut() else {
            return Err(SessionError::IllegalTransition {
                from: self.state.name(),
                to: SessionState::Executing.name(),
            }
            .into());
        };

        match within(at, sink.write_line(command)).await {
            Some(Ok(())) => {
                self.steps_sent += 1;
                Ok(())
            }
            Some(Err(source)) => {
                self.state = SessionState::Failed;
                Err(SessionError::WriteFailed {
                    command: command.to_string(),
                    source,
                }
                .into())
            }
            None => Err(self.deadline_exceeded("sending commands").await),
        }
    }

    /// Send every step in order, then wait for the remote to terminate.
    ///
    /// Stops at the first step that cannot be written; later steps are
    /// never sent. The error carries everything the remote printed up to
    /// then, including an unterminated prompt.
    pub async fn run_script(&mut self, script: &CommandScript) -> Result<SessionOutcome> {
        debug!("running '{}' ({} steps)", script.name(), script.len());

        for step in script.steps() {
            debug!("sending '{}'", step.command);
            match self.send(&step.command).await {
                Ok(()) => {}
                Err(Error::Session(SessionError::WriteFailed { source, .. })) => {
                    let output = self.halt_drain().await;
                    return Err(SessionError::ScriptStepFailed {
                        label: step.label.clone(),
                        source,
                        output,
                    }
                    .into());
                }
                Err(e) => return Err(e),
            }
        }

        self.await_termination().await
    }

    /// Wait for the remote to end and for the drain task to finish, then
    /// classify the result.
    pub async fn await_termination(&mut self) -> Result<SessionOutcome> {
        self.state = self.state.transition(SessionState::AwaitingTermination)?;
        let at = self.deadline_at();

        // a finish that outlives the deadline is caught by the join below
        if let Some(sink) = self.sink.as_mut() {
            if let Some(Err(e)) = within(at, sink.finish()).await {
                debug!("closing remote input: {}", e);
            }
        }

        let Some(drain) = self.drain.as_mut() else {
            return Err(SessionError::IllegalTransition {
                from: self.state.name(),
                to: SessionState::Succeeded.name(),
            }
            .into());
        };

        let Some(termination) = within(at, drain.join()).await else {
            return Err(self.deadline_exceeded("awaiting termination").await);
        };
        self.drain = None;

        let output = self.output.snapshot();
        match classify(
            termination,
            output,
            self.steps_sent,
            self.opened_at.elapsed(),
        ) {
            Ok(outcome) => {
                debug!(
                    "session succeeded after {} steps ({})",
                    outcome.steps_sent, outcome.termination
                );
                self.state = SessionState::Succeeded;
                Ok(outcome)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e.into())
            }
        }
    }

    /// Release the channel and the connection.
    pub async fn close(mut self) -> Result<()> {
        if let Some(mut drain) = self.drain.take() {
            drain.abort_and_join().await;
        }
        self.sink = None;
        match self.connection.take() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of commands written so far.
    pub fn steps_sent(&self) -> usize {
        self.steps_sent
    }

    /// Accumulated output, available only once the drain task has stopped.
    pub fn output(&self) -> Option<String> {
        match self.drain {
            None => Some(self.output.snapshot()),
            Some(_) => None,
        }
    }

    fn deadline_at(&self) -> Option<Instant> {
        self.deadline.map(|(_, at)| at)
    }

    /// Stop the drain task, let it collect what the remote already sent,
    /// and return everything it appended.
    async fn halt_drain(&mut self) -> String {
        if let Some(mut drain) = self.drain.take() {
            drain.stop(DRAIN_STOP_GRACE).await;
        }
        self.state = SessionState::Failed;
        self.output.snapshot()
    }

    /// Fail the session for an expired deadline. The connection is dropped
    /// rather than closed politely, so nothing else can block.
    async fn deadline_exceeded(&mut self, stage: &'static str) -> Error {
        let output = self.halt_drain().await;
        self.sink = None;
        self.connection = None;
        warn!("session deadline exceeded while {}", stage);
        SessionError::DeadlineExceeded {
            deadline: self.deadline.map(|(d, _)| d).unwrap_or_default(),
            stage,
            output,
        }
        .into()
    }
}

impl<C: Connection> Drop for CommandSession<C> {
    fn drop(&mut self) {
        if self.connection.is_some() {
            warn!("CommandSession dropped without close(); connection released on drop");
        }
    }
}

async fn close_quietly<C: Connection>(connection: C) {
    if let Err(e) = connection.close().await {
        debug!("closing connection after failed open: {}", e);
    }
}

/// Run `fut` to completion, or give up at `deadline`.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}
