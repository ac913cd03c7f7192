//! The drain task: the single producer of a session's output buffer.

use std::fmt;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::buffer::{LineAssembler, SharedOutput};
use super::{ShellEvent, ShellReader};

/// How the remote side of a channel ended, as observed by the drain task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The remote reported an exit status.
    ExitStatus(u32),

    /// The remote process was killed by a signal.
    ExitSignal { signal: String, message: String },

    /// The channel closed without an exit status or signal.
    NoExitStatus,

    /// The drain task did not run to completion (aborted or panicked).
    Interrupted(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::ExitStatus(code) => write!(f, "exit status {}", code),
            Termination::ExitSignal { signal, message } if message.is_empty() => {
                write!(f, "killed by signal {}", signal)
            }
            Termination::ExitSignal { signal, message } => {
                write!(f, "killed by signal {} ({})", signal, message)
            }
            Termination::NoExitStatus => write!(f, "exited without exit status"),
            Termination::Interrupted(reason) => write!(f, "output drain interrupted: {}", reason),
        }
    }
}

/// Handle on a running drain task.
///
/// The buffer must not be read for a verdict until [`join`](Self::join),
/// [`stop`](Self::stop) or [`abort_and_join`](Self::abort_and_join) has
/// returned: only then is the producer guaranteed to append nothing further.
pub struct DrainHandle {
    task: Option<JoinHandle<Termination>>,
    stop: Option<oneshot::Sender<()>>,
}

/// Start draining `reader` into `buffer`.
pub fn spawn_drain<R: ShellReader>(reader: R, buffer: SharedOutput) -> DrainHandle {
    let (stop, stop_rx) = oneshot::channel();
    let task = tokio::spawn(drain(reader, buffer, stop_rx));
    DrainHandle {
        task: Some(task),
        stop: Some(stop),
    }
}

impl DrainHandle {
    /// Wait for end-of-stream and return how the channel ended.
    ///
    /// Cancel-safe: if this future is dropped the task keeps running and
    /// can still be joined or stopped.
    pub async fn join(&mut self) -> Termination {
        let Some(task) = self.task.as_mut() else {
            return Termination::Interrupted("already joined".to_string());
        };
        let result = task.await;
        self.task = None;
        joined(result)
    }

    /// Ask the producer to finish early and wait for it.
    ///
    /// The task appends every event the reader already holds and flushes
    /// both partial lines before it exits. If that takes longer than
    /// `grace` the task is aborted instead.
    pub async fn stop(&mut self, grace: Duration) -> Termination {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let Some(task) = self.task.as_mut() else {
            return Termination::Interrupted("already joined".to_string());
        };
        match tokio::time::timeout(grace, task).await {
            Ok(result) => {
                self.task = None;
                joined(result)
            }
            Err(_) => {
                warn!("drain task did not stop within {:?}, aborting", grace);
                self.abort_and_join().await
            }
        }
    }

    /// Stop the producer immediately and wait until it has exited.
    /// Queued events and partial lines are discarded.
    pub async fn abort_and_join(&mut self) -> Termination {
        let Some(task) = self.task.as_mut() else {
            return Termination::Interrupted("already joined".to_string());
        };
        task.abort();
        let result = task.await;
        self.task = None;
        joined(result)
    }
}

impl Drop for DrainHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn joined(result: Result<Termination, tokio::task::JoinError>) -> Termination {
    match result {
        Ok(termination) => termination,
        Err(e) if e.is_cancelled() => Termination::Interrupted("aborted".to_string()),
        Err(e) => {
            warn!("drain task panicked: {}", e);
            Termination::Interrupted(e.to_string())
        }
    }
}

/// Per-stream line state plus the exit reports seen so far.
#[derive(Default)]
struct Collector {
    stdout: LineAssembler,
    stderr: LineAssembler,
    exit_status: Option<u32>,
    exit_signal: Option<(String, String)>,
}

impl Collector {
    /// Apply one event. Returns `false` once the channel has closed.
    fn record(&mut self, event: ShellEvent, buffer: &SharedOutput) -> bool {
        match event {
            ShellEvent::Stdout(data) => {
                trace!("drain: {} bytes on stdout", data.len());
                buffer.append_lines(self.stdout.push(&data));
            }
            ShellEvent::Stderr(data) => {
                trace!("drain: {} bytes on stderr", data.len());
                buffer.append_lines(self.stderr.push(&data));
            }
            ShellEvent::ExitStatus(code) => {
                debug!("drain: remote exit status {}", code);
                self.exit_status = Some(code);
            }
            ShellEvent::ExitSignal { signal, message } => {
                debug!("drain: remote killed by signal {}", signal);
                self.exit_signal = Some((signal, message));
            }
            ShellEvent::Eof => trace!("drain: eof"),
            ShellEvent::Closed => return false,
        }
        true
    }

    /// Flush partial lines and report how the channel ended.
    fn finish(mut self, buffer: &SharedOutput) -> Termination {
        buffer.append_lines(self.stdout.finish().into_iter().chain(self.stderr.finish()));

        match (self.exit_status, self.exit_signal) {
            (_, Some((signal, message))) => Termination::ExitSignal { signal, message },
            (Some(code), None) => Termination::ExitStatus(code),
            (None, None) => Termination::NoExitStatus,
        }
    }
}

async fn drain<R: ShellReader>(
    mut reader: R,
    buffer: SharedOutput,
    mut stop: oneshot::Receiver<()>,
) -> Termination {
    let mut collector = Collector::default();

    loop {
        tokio::select! {
            event = reader.next_event() => match event {
                Some(event) => {
                    if !collector.record(event, &buffer) {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut stop => {
                debug!("drain: stop requested, collecting queued output");
                while let Some(event) = reader.try_next_event().await {
                    if !collector.record(event, &buffer) {
                        break;
                    }
                }
                break;
            }
        }
    }

    collector.finish(&buffer)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::Bytes;

    use super::*;

    struct Scripted(VecDeque<ShellEvent>);

    impl ShellReader for Scripted {
        async fn next_event(&mut self) -> Option<ShellEvent> {
            tokio::task::yield_now().await;
            self.0.pop_front()
        }

        async fn try_next_event(&mut self) -> Option<ShellEvent> {
            self.0.pop_front()
        }
    }

    fn scripted(events: Vec<ShellEvent>) -> Scripted {
        Scripted(events.into())
    }

    /// Holds delivered events but never hands them out through
    /// `next_event`, like a drain that has fallen behind the remote.
    struct Backlogged(VecDeque<ShellEvent>);

    impl ShellReader for Backlogged {
        async fn next_event(&mut self) -> Option<ShellEvent> {
            std::future::pending().await
        }

        async fn try_next_event(&mut self) -> Option<ShellEvent> {
            self.0.pop_front()
        }
    }

    struct Endless;

    impl ShellReader for Endless {
        async fn next_event(&mut self) -> Option<ShellEvent> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Some(ShellEvent::Stdout(Bytes::from_static(b"tick\n")))
        }

        async fn try_next_event(&mut self) -> Option<ShellEvent> {
            self.next_event().await
        }
    }

    #[tokio::test]
    async fn test_interleaved_streams_keep_lines_whole() {
        let buffer = SharedOutput::new();
        let mut handle = spawn_drain(
            scripted(vec![
                ShellEvent::Stdout(Bytes::from_static(b"SysName  ")),
                ShellEvent::Stderr(Bytes::from_static(b"% warning\n")),
                ShellEvent::Stdout(Bytes::from_static(b": LAB-VOSS01\n")),
                ShellEvent::ExitStatus(0),
                ShellEvent::Eof,
                ShellEvent::Closed,
            ]),
            buffer.clone(),
        );

        assert_eq!(handle.join().await, Termination::ExitStatus(0));
        assert_eq!(buffer.snapshot(), "% warning\nSysName  : LAB-VOSS01\n");
    }

    #[tokio::test]
    async fn test_missing_exit_status() {
        let buffer = SharedOutput::new();
        let mut handle = spawn_drain(
            scripted(vec![ShellEvent::Stdout(Bytes::from_static(b"VSP:1#"))]),
            buffer.clone(),
        );

        assert_eq!(handle.join().await, Termination::NoExitStatus);
        // trailing partial line is flushed at end of stream
        assert_eq!(buffer.snapshot(), "VSP:1#\n");
    }

    #[tokio::test]
    async fn test_signal_wins_over_status() {
        let mut handle = spawn_drain(
            scripted(vec![
                ShellEvent::ExitStatus(0),
                ShellEvent::ExitSignal {
                    signal: "KILL".into(),
                    message: String::new(),
                },
                ShellEvent::Closed,
            ]),
            SharedOutput::new(),
        );

        let termination = handle.join().await;
        assert_eq!(termination.to_string(), "killed by signal KILL");
    }

    #[tokio::test]
    async fn test_stop_keeps_backlog_and_partial_prompt() {
        let buffer = SharedOutput::new();
        let mut handle = spawn_drain(
            Backlogged(
                vec![
                    ShellEvent::Stdout(Bytes::from_static(b"LAB-VOSS01:1>enable\r\n")),
                    ShellEvent::Stderr(Bytes::from_static(b"% Invalid input")),
                    ShellEvent::Stdout(Bytes::from_static(b"LAB-VOSS01:1#")),
                ]
                .into(),
            ),
            buffer.clone(),
        );

        let termination = handle.stop(Duration::from_secs(1)).await;
        assert_eq!(termination, Termination::NoExitStatus);
        assert_eq!(
            buffer.snapshot(),
            "LAB-VOSS01:1>enable\nLAB-VOSS01:1#\n% Invalid input\n"
        );
    }

    #[tokio::test]
    async fn test_stop_after_close_is_noop() {
        let buffer = SharedOutput::new();
        let mut handle = spawn_drain(
            scripted(vec![
                ShellEvent::Stdout(Bytes::from_static(b"bye\n")),
                ShellEvent::Closed,
            ]),
            buffer.clone(),
        );

        assert_eq!(handle.join().await, Termination::NoExitStatus);
        assert!(matches!(
            handle.stop(Duration::from_secs(1)).await,
            Termination::Interrupted(_)
        ));
        assert_eq!(buffer.snapshot(), "bye\n");
    }

    #[tokio::test]
    async fn test_stop_falls_back_to_abort() {
        let buffer = SharedOutput::new();
        let mut handle = spawn_drain(Endless, buffer.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;

        let termination = handle.stop(Duration::from_millis(20)).await;
        assert!(matches!(termination, Termination::Interrupted(_)));
    }

    #[tokio::test]
    async fn test_abort_and_join_stops_producer() {
        let buffer = SharedOutput::new();
        let mut handle = spawn_drain(Endless, buffer.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let termination = handle.abort_and_join().await;
        assert!(matches!(termination, Termination::Interrupted(_)));

        let settled = buffer.snapshot();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(buffer.snapshot(), settled);
    }
}
