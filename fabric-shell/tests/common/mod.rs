//! Simulated Fabric Engine device implementing the connector traits.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use fabric_shell::channel::{CommandSink, ShellEvent, ShellMode, ShellReader};
use fabric_shell::error::{SessionError, TransportError};
use fabric_shell::transport::{Connection, Connector, Endpoint};
use tokio::sync::mpsc;

/// How the simulated shell reports its end after the final `exit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReport {
    Status(u32),
    Missing,
    Signal,
}

/// Knobs and observations shared by every connection to the device.
#[derive(Debug)]
pub struct DeviceState {
    pub hostname: String,
    pub saved_hostname: String,
    pub exit_report: ExitReport,
    pub refuse_connect: bool,
    pub refuse_shell: bool,
    /// Zero-based index of the write that fails, counted per connection.
    pub fail_write_at: Option<usize>,
    pub omit_sys_name: bool,
    /// Extra filler lines printed by `show sys-info`.
    pub filler_lines: usize,
    /// Delay before each event reaches the reader.
    pub event_delay: Option<Duration>,
    pub received: Vec<String>,
    /// Transcript of every stdout/stderr byte emitted.
    pub emitted: String,
    pub connects: usize,
    pub closes: usize,
}

impl DeviceState {
    fn prompt(&self, mode: Mode) -> String {
        match mode {
            Mode::User => format!("{}:1>", self.hostname),
            Mode::Privileged => format!("{}:1#", self.hostname),
            Mode::Config => format!("{}:1(config)#", self.hostname),
        }
    }

    fn sys_info(&self) -> String {
        let mut out = String::from("\r\n        General Info :\r\n\r\n");
        out.push_str("                SysDescr     : VSP-8284XSQ (8.10.0.0)\r\n");
        if !self.omit_sys_name {
            out.push_str(&format!(
                "                SysName      : {}\r\n",
                self.hostname
            ));
        }
        for i in 0..self.filler_lines {
            out.push_str(&format!("                Filler{:05}  : value-{}\r\n", i, i));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    User,
    Privileged,
    Config,
}

#[derive(Clone)]
pub struct SimDevice(pub Arc<Mutex<DeviceState>>);

impl SimDevice {
    pub fn new(hostname: &str) -> Self {
        Self(Arc::new(Mutex::new(DeviceState {
            hostname: hostname.to_string(),
            saved_hostname: hostname.to_string(),
            exit_report: ExitReport::Missing,
            refuse_connect: false,
            refuse_shell: false,
            fail_write_at: None,
            omit_sys_name: false,
            filler_lines: 0,
            event_delay: None,
            received: Vec::new(),
            emitted: String::new(),
            connects: 0,
            closes: 0,
        })))
    }

    pub fn configure(&self, f: impl FnOnce(&mut DeviceState)) -> &Self {
        f(&mut self.0.lock().unwrap());
        self
    }

    pub fn state<T>(&self, f: impl FnOnce(&DeviceState) -> T) -> T {
        f(&self.0.lock().unwrap())
    }

    pub fn connector(&self) -> SimConnector {
        SimConnector {
            device: self.clone(),
        }
    }
}

pub fn endpoint() -> Endpoint {
    Endpoint::new("192.0.2.10", 22, "rwa", "rwa").unwrap()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct SimConnector {
    device: SimDevice,
}

impl Connector for SimConnector {
    type Connection = SimConnection;

    async fn connect(&self, endpoint: &Endpoint) -> fabric_shell::Result<SimConnection> {
        let mut state = self.device.0.lock().unwrap();
        if state.refuse_connect {
            return Err(TransportError::ConnectionFailed {
                host: endpoint.host().to_string(),
                port: endpoint.port(),
                message: "connection refused".to_string(),
            }
            .into());
        }
        state.connects += 1;
        Ok(SimConnection {
            device: self.device.clone(),
        })
    }
}

pub struct SimConnection {
    device: SimDevice,
}

impl Connection for SimConnection {
    type Sink = SimSink;
    type Reader = SimReader;

    async fn open_shell(&mut self, mode: &ShellMode) -> fabric_shell::Result<(SimSink, SimReader)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.device.0.lock().unwrap();
        if state.refuse_shell {
            return Err(SessionError::OpenFailed {
                message: "remote refused shell request".to_string(),
            }
            .into());
        }

        let reader = SimReader {
            rx,
            delay: state.event_delay,
        };
        let mut sink = SimSink {
            device: self.device.clone(),
            tx,
            mode: Mode::User,
            writes: 0,
        };

        match mode {
            ShellMode::Interactive => {
                let banner = format!(
                    "\r\nWelcome to the VSP Operating System\r\n\r\n{}",
                    state.prompt(Mode::User)
                );
                sink.emit(&mut state, &banner);
            }
            ShellMode::Exec(command) => {
                state.received.push(command.clone());
                if command == "show sys-info" {
                    let info = state.sys_info();
                    sink.emit(&mut state, &info);
                    sink.terminate(&state);
                } else {
                    sink.emit_stderr(&mut state, "% Invalid input detected\r\n");
                    let _ = sink.tx.send(ShellEvent::ExitStatus(1));
                    let _ = sink.tx.send(ShellEvent::Closed);
                }
            }
        }
        drop(state);
        Ok((sink, reader))
    }

    async fn close(self) -> fabric_shell::Result<()> {
        self.device.0.lock().unwrap().closes += 1;
        Ok(())
    }
}

pub struct SimReader {
    rx: mpsc::UnboundedReceiver<ShellEvent>,
    delay: Option<Duration>,
}

impl ShellReader for SimReader {
    async fn next_event(&mut self) -> Option<ShellEvent> {
        // delay first so a cancelled call never holds a received event
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.rx.recv().await
    }

    async fn try_next_event(&mut self) -> Option<ShellEvent> {
        let event = self.rx.try_recv().ok()?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Some(event)
    }
}

pub struct SimSink {
    device: SimDevice,
    tx: mpsc::UnboundedSender<ShellEvent>,
    mode: Mode,
    writes: usize,
}

impl SimSink {
    fn emit(&self, state: &mut DeviceState, text: &str) {
        state.emitted.push_str(text);
        // split into small chunks so lines straddle reads
        for chunk in text.as_bytes().chunks(7) {
            let _ = self
                .tx
                .send(ShellEvent::Stdout(Bytes::copy_from_slice(chunk)));
        }
    }

    fn emit_stderr(&self, state: &mut DeviceState, text: &str) {
        state.emitted.push_str(text);
        let _ = self
            .tx
            .send(ShellEvent::Stderr(Bytes::copy_from_slice(text.as_bytes())));
    }

    fn terminate(&self, state: &DeviceState) {
        match state.exit_report {
            ExitReport::Status(code) => {
                let _ = self.tx.send(ShellEvent::ExitStatus(code));
            }
            ExitReport::Signal => {
                let _ = self.tx.send(ShellEvent::ExitSignal {
                    signal: "TERM".to_string(),
                    message: String::new(),
                });
            }
            ExitReport::Missing => {}
        }
        let _ = self.tx.send(ShellEvent::Eof);
        let _ = self.tx.send(ShellEvent::Closed);
    }

    fn handle(&mut self, state: &mut DeviceState, line: &str) {
        let echo = format!("{}\r\n", line);
        self.emit(state, &echo);

        match (self.mode, line) {
            (Mode::User, "enable") => self.mode = Mode::Privileged,
            (Mode::Privileged, "configure terminal") => {
                self.emit(
                    state,
                    "Enter configuration commands, one per line.  End with CNTL/Z.\r\n",
                );
                self.mode = Mode::Config;
            }
            (Mode::Config, cmd) if cmd.starts_with("sys name ") => {
                state.hostname = cmd["sys name ".len()..].to_string();
            }
            (Mode::Config, "exit") => self.mode = Mode::Privileged,
            (Mode::Privileged, "save config") => {
                state.saved_hostname = state.hostname.clone();
            }
            (Mode::User | Mode::Privileged, "show sys-info") => {
                let info = state.sys_info();
                self.emit(state, &info);
            }
            (Mode::User | Mode::Privileged, "exit") => {
                self.terminate(state);
                return;
            }
            _ => self.emit_stderr(state, "% Invalid input detected at '^' marker.\r\n"),
        }

        let prompt = state.prompt(self.mode);
        self.emit(state, &prompt);
    }
}

impl CommandSink for SimSink {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        {
            let device = self.device.clone();
            let mut state = device.0.lock().unwrap();
            if state.fail_write_at == Some(self.writes) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "channel closed"));
            }
            self.writes += 1;
            state.received.push(line.to_string());
            self.handle(&mut state, line);
        }
        // let the drain task observe what the device just printed
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}
