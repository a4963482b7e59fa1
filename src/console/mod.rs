//! Interactive console
//!
//! The console runs on the foreground thread. It owns the [`Runner`], reads
//! one command per line and touches the shared session state only for the
//! duration of each command.
//!
//! Command failures are printed and the session continues; only `quit` (or
//! the end of input) stops the loop.

pub mod commands;
pub mod dump;

pub use commands::{split_line, Command, CommandLine};

use crate::backend::Runner;
use crate::config::{AppState, ConnectionConfig};
use crate::plot::{ControlMessage, PlotHandle, PlotSpawner};
use crate::state::{lock, SharedState};
use crate::store::TransferMode;
use crate::types::{ConnectOptions, Payload, PayloadType, TopicSource};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Prompt printed before each command
pub const PROMPT: &str = ":> ";

/// Whether the loop should keep reading commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Continue,
    Quit,
}

/// Command interpreter bound to one session
pub struct Console<S: PlotSpawner, W: Write> {
    runner: Runner,
    state: SharedState,
    spawner: S,
    writer: W,
    defaults: ConnectionConfig,
    app_state: AppState,
    /// Where `app_state` is saved after each successful connect
    app_state_path: Option<PathBuf>,
    /// Port and baudrate of the current link
    connection: Option<ConnectOptions>,
}

impl<S: PlotSpawner, W: Write> Console<S, W> {
    pub fn new(runner: Runner, state: SharedState, spawner: S, writer: W) -> Self {
        Self {
            runner,
            state,
            spawner,
            writer,
            defaults: ConnectionConfig::default(),
            app_state: AppState::default(),
            app_state_path: None,
            connection: None,
        }
    }

    /// Port and baudrate used when neither the command nor the app state
    /// name one
    pub fn with_defaults(mut self, defaults: ConnectionConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Remembered connections, saved back to `path` when given
    pub fn with_app_state(mut self, app_state: AppState, path: Option<PathBuf>) -> Self {
        self.app_state = app_state;
        self.app_state_path = path;
        self
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn app_state(&self) -> &AppState {
        &self.app_state
    }

    pub fn spawner_mut(&mut self) -> &mut S {
        &mut self.spawner
    }

    /// Write a line directly to the console output
    pub fn write_line(&mut self, message: &str) -> Result<()> {
        writeln!(self.writer, "{message}")?;
        Ok(())
    }

    /// Read commands from `reader` until EOF or `quit`.
    ///
    /// The session is shut down on the way out either way.
    pub fn run<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        let mut line = String::new();
        loop {
            write!(self.writer, "{PROMPT}")?;
            self.writer.flush()?;
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                writeln!(self.writer)?;
                break;
            }
            match self.execute(&line) {
                Ok(CommandStatus::Quit) => return Ok(()),
                Ok(CommandStatus::Continue) => {}
                Err(e) => {
                    tracing::debug!("Command failed: {:#}", e);
                    writeln!(self.writer, "Error: {e:#}")?;
                }
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Execute a single command line
    pub fn execute(&mut self, line: &str) -> Result<CommandStatus> {
        let words = split_line(line).map_err(|e| anyhow!(e))?;
        if words.is_empty() {
            return Ok(CommandStatus::Continue);
        }

        let command = match CommandLine::try_parse_from(&words) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                // Help output and usage errors alike are shown as clap renders them
                write!(self.writer, "{}", e.render())?;
                return Ok(CommandStatus::Continue);
            }
        };

        match command {
            Command::Ls { cli } => self.ls(cli)?,
            Command::Serial { port, bauds } => self.serial(port, bauds)?,
            Command::Disconnect => {
                self.runner.disconnect();
                self.connection = None;
                writeln!(self.writer, "Disconnected.")?;
            }
            Command::Print { topic, limit } => self.print(&topic, limit)?,
            Command::Count { topic } => self.count(&topic)?,
            Command::Pub {
                topic,
                value,
                payload_type,
            } => self.publish(&topic, &value, payload_type)?,
            Command::Plot { topic } => self.plot(&topic)?,
            Command::Dump { topic, file } => self.dump(&topic, &file)?,
            Command::Stats => self.stats()?,
            Command::Info => self.info()?,
            Command::Quit => {
                self.shutdown();
                writeln!(self.writer, "Closing session.")?;
                return Ok(CommandStatus::Quit);
            }
        }
        Ok(CommandStatus::Continue)
    }

    fn ls(&mut self, cli: bool) -> Result<()> {
        let source = if cli {
            TopicSource::Cli
        } else {
            TopicSource::Remote
        };
        let names = lock(&self.state).topics.ls(source);
        for name in names {
            writeln!(self.writer, "{name}")?;
        }
        Ok(())
    }

    /// Connect, falling back to the last used port/baudrate
    pub fn serial(&mut self, port: Option<String>, bauds: Option<u32>) -> Result<()> {
        let (last_port, last_bauds) = self.app_state.connection_or(&self.defaults);
        let options = ConnectOptions::new(
            port.unwrap_or(last_port),
            bauds.unwrap_or(last_bauds),
        );

        self.runner.connect(&options).with_context(|| {
            format!(
                "Failed to connect to {} at {} (bauds)",
                options.port, options.baudrate
            )
        })?;
        writeln!(
            self.writer,
            "Connected to {} at {} (bauds)",
            options.port, options.baudrate
        )?;

        self.app_state
            .record_connection(&options.port, options.baudrate);
        if let Some(path) = &self.app_state_path {
            if let Err(e) = self.app_state.save_to(path) {
                tracing::warn!("Failed to save app state: {}", e);
            }
        }
        self.connection = Some(options);
        Ok(())
    }

    fn print(&mut self, topic: &str, limit: usize) -> Result<()> {
        let samples = lock(&self.state).topics.samples(topic, limit);
        let Some(samples) = samples else {
            bail!("Topic '{topic}' unknown");
        };
        for sample in samples {
            writeln!(self.writer, "{sample}")?;
        }
        Ok(())
    }

    fn count(&mut self, topic: &str) -> Result<()> {
        let count = {
            let state = lock(&self.state);
            state.topics.topic(topic).map(|t| t.len())
        };
        let Some(count) = count else {
            bail!("Topic '{topic}' unknown");
        };
        writeln!(self.writer, "{count}")?;
        Ok(())
    }

    fn publish(&mut self, topic: &str, value: &str, payload_type: Option<PayloadType>) -> Result<()> {
        let payload_type = payload_type.unwrap_or_else(|| infer_type(value));
        let payload = payload_type.coerce(&Payload::Text(value.to_string()))?;
        self.runner.publish(topic, &payload, payload_type)?;
        writeln!(
            self.writer,
            "Published {} on '{}' ({})",
            payload, topic, payload_type
        )?;
        Ok(())
    }

    /// Open a plot window for `topic`, unless one is already open
    pub fn plot(&mut self, topic: &str) -> Result<()> {
        let mode = {
            let mut state = lock(&self.state);
            while state.reap_closed_plot().is_some() {}
            if state.plot_for(topic).is_some() {
                bail!("Topic '{topic}' is already plotted");
            }
            let kind = state
                .topics
                .kind(topic)
                .ok_or_else(|| anyhow!("Topic '{topic}' unknown"))?;
            TransferMode::from(kind)
        };

        let link = self.spawner.spawn(topic, mode)?;

        let mut state = lock(&self.state);
        state.topics.transfer(topic, link.queue.clone(), mode);
        state
            .plots
            .push(PlotHandle::new(topic, mode, link.queue, link.control));
        drop(state);

        writeln!(self.writer, "Plotting '{topic}'.")?;
        Ok(())
    }

    fn dump(&mut self, topic: &str, file: &Path) -> Result<()> {
        let rows = {
            let state = lock(&self.state);
            let topic_ref = state
                .topics
                .topic(topic)
                .ok_or_else(|| anyhow!("Topic '{topic}' unknown"))?;
            dump::dump_topic(topic_ref, file)
                .with_context(|| format!("Failed to write {}", file.display()))?
        };
        writeln!(
            self.writer,
            "Wrote {} rows of '{}' to {}",
            rows,
            topic,
            file.display()
        )?;
        Ok(())
    }

    fn stats(&mut self) -> Result<()> {
        let speed = self.runner.stats();
        let report = self.runner.link_stats();
        let transport = report.transport;
        let protocol = report.protocol;

        writeln!(self.writer, "Transport")?;
        writeln!(
            self.writer,
            "  rx: {} bytes in {} chunks",
            transport.rx_bytes, transport.rx_chunks
        )?;
        writeln!(
            self.writer,
            "  tx: {} bytes in {} chunks",
            transport.tx_bytes, transport.tx_chunks
        )?;
        writeln!(self.writer, "Speed")?;
        writeln!(
            self.writer,
            "  instant: {:.1} B/s ({:.1}% of link)",
            speed.speed,
            speed.ratio * 100.0
        )?;
        writeln!(
            self.writer,
            "  average: {:.1} B/s ({:.1}% of link)",
            speed.average_speed,
            speed.average_ratio * 100.0
        )?;
        writeln!(self.writer, "Protocol")?;
        writeln!(
            self.writer,
            "  frames: {} received, {} sent, {} rejected",
            protocol.rx_frames, protocol.tx_frames, protocol.tx_rejected
        )?;
        writeln!(self.writer, "  corrupted: {}", protocol.total_corrupted())?;
        for kind in crate::backend::Corruption::ALL {
            let count = protocol.corrupted(kind);
            if count > 0 {
                writeln!(self.writer, "    {}: {}", kind, count)?;
            }
        }
        Ok(())
    }

    fn info(&mut self) -> Result<()> {
        let (remote, cli, plots) = {
            let state = lock(&self.state);
            (
                state.topics.ls(TopicSource::Remote).len(),
                state.topics.ls(TopicSource::Cli).len(),
                state
                    .plots
                    .iter()
                    .map(|p| p.topic.clone())
                    .collect::<Vec<_>>(),
            )
        };

        writeln!(self.writer, "Status: {}", self.runner.status())?;
        if let Some(connection) = &self.connection {
            writeln!(
                self.writer,
                "Port: {} at {} (bauds)",
                connection.port, connection.baudrate
            )?;
        }
        writeln!(self.writer, "Topics: {} remote, {} cli", remote, cli)?;
        if plots.is_empty() {
            writeln!(self.writer, "Plots: none")?;
        } else {
            writeln!(self.writer, "Plots: {}", plots.join(", "))?;
        }
        writeln!(self.writer, "Ticks: {}", self.runner.ticks())?;
        if let Some(error) = self.runner.last_error() {
            writeln!(self.writer, "Last error: {}", error)?;
        }
        Ok(())
    }

    /// Ask every plot to close and stop the runner
    pub fn shutdown(&mut self) {
        {
            let mut state = lock(&self.state);
            for mut plot in std::mem::take(&mut state.plots) {
                let _ = plot.control.send(ControlMessage::Exit);
                plot.control.close();
                state.topics.untransfer(&plot.topic);
            }
        }
        self.runner.terminate();
        self.connection = None;
    }

    /// Consume the console and return the writer
    pub fn into_writer(self) -> W {
        self.writer
    }
}

/// Wire type for a value given without `--type`
fn infer_type(value: &str) -> PayloadType {
    match Payload::parse_lexical(value) {
        Payload::Int(_) => PayloadType::Int32,
        Payload::Float(_) => PayloadType::Float32,
        Payload::Text(_) => PayloadType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LineCodec, Link, MemoryPeer, MemoryTransport};
    use crate::config::RunnerConfig;
    use crate::plot::{ChannelSpawner, PlotLink};
    use crate::state::SessionState;
    use crate::types::SampleMetadata;

    type TestConsole = Console<ChannelSpawner, Vec<u8>>;

    fn console() -> (TestConsole, MemoryPeer, SharedState) {
        let (transport, peer) = MemoryTransport::pair();
        let link = Link::new(transport, LineCodec::new()).shared();
        let state = SessionState::default().shared();
        let runner = Runner::new(link, state.clone(), &RunnerConfig::default());
        let console = Console::new(runner, state.clone(), ChannelSpawner::new(), Vec::new());
        (console, peer, state)
    }

    fn output(console: &mut TestConsole) -> String {
        String::from_utf8(std::mem::take(&mut console.writer)).unwrap()
    }

    fn run(console: &mut TestConsole, line: &str) -> String {
        console.execute(line).unwrap();
        output(console)
    }

    fn record(state: &SharedState, topic: &str, values: &[i64]) {
        let mut state = lock(state);
        for v in values {
            state
                .topics
                .process(topic, Payload::Int(*v), SampleMetadata::None);
        }
    }

    #[test]
    fn test_serial_uses_defaults_then_remembers() {
        let (mut console, peer, _state) = console();
        let out = run(&mut console, "serial");
        assert_eq!(out, "Connected to sim at 9600 (bauds)\n");
        assert_eq!(peer.connects(), 1);

        run(&mut console, "serial tcp://10.0.0.2:7000 -b 115200");
        assert_eq!(
            console.app_state().connection_or(&ConnectionConfig::default()),
            ("tcp://10.0.0.2:7000".to_string(), 115200)
        );
        assert_eq!(
            console.app_state().recent_ports,
            vec!["tcp://10.0.0.2:7000", "sim"]
        );
        console.shutdown();
    }

    #[test]
    fn test_failed_connect_is_reported() {
        let (mut console, peer, _state) = console();
        peer.refuse_connections(Some("busy"));
        let err = console.execute("serial COM9").unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Failed to connect to COM9 at 9600 (bauds)"));
        assert!(message.contains("busy"));
        assert!(console.app_state().last_port.is_none());
    }

    #[test]
    fn test_print_and_count() {
        let (mut console, _peer, state) = console();
        record(&state, "foo", &[2, 3, 4]);

        assert_eq!(run(&mut console, "print foo"), "4\n");
        assert_eq!(run(&mut console, "print foo -l 2"), "3\n4\n");
        assert_eq!(run(&mut console, "print foo --limit 0"), "2\n3\n4\n");
        assert_eq!(run(&mut console, "count foo"), "3\n");

        let err = console.execute("print bar").unwrap_err();
        assert_eq!(err.to_string(), "Topic 'bar' unknown");
        assert!(console.execute("count bar").is_err());
    }

    #[test]
    fn test_ls_filters_by_source() {
        let (mut console, _peer, state) = console();
        record(&state, "b", &[1]);
        record(&state, "a", &[1]);
        lock(&state).topics.create("baudspeed", TopicSource::Cli);

        assert_eq!(run(&mut console, "ls"), "b\na\n");
        assert_eq!(run(&mut console, "ls --cli"), "baudspeed\n");
    }

    #[test]
    fn test_pub_requires_connection() {
        let (mut console, _peer, _state) = console();
        let err = console.execute("pub gain 3 --type uint8").unwrap_err();
        assert!(err.to_string().contains("Not connected"));
    }

    #[test]
    fn test_pub_writes_to_link() {
        let (mut console, peer, _state) = console();
        run(&mut console, "serial");

        let out = run(&mut console, "pub gain 3 --type uint8");
        assert_eq!(out, "Published 3 on 'gain' (uint8)\n");
        assert_eq!(peer.take_written(), b"gain 3\n");

        assert!(console.execute("pub gain 300 --type uint8").is_err());
        assert!(peer.take_written().is_empty());
        console.shutdown();
    }

    #[test]
    fn test_infer_type() {
        assert_eq!(infer_type("12"), PayloadType::Int32);
        assert_eq!(infer_type("1.5"), PayloadType::Float32);
        assert_eq!(infer_type("on"), PayloadType::String);
    }

    #[test]
    fn test_plot_registers_transfer_and_refuses_duplicates() {
        let (mut console, _peer, state) = console();
        record(&state, "sine", &[5, 6]);

        assert_eq!(run(&mut console, "plot sine"), "Plotting 'sine'.\n");
        assert!(lock(&state).topics.intransfer("sine"));

        let spawned = console.spawner.take_spawned();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].mode, TransferMode::Linear);
        let replayed: Vec<u64> = spawned[0].points.try_iter().map(|p| p.x).collect();
        assert_eq!(replayed, vec![0, 1]);

        let err = console.execute("plot sine").unwrap_err();
        assert!(err.to_string().contains("already plotted"));
        assert!(console.execute("plot nothing").is_err());
    }

    #[test]
    fn test_plot_mode_follows_topic_kind() {
        let (mut console, _peer, state) = console();
        lock(&state)
            .topics
            .process("spectrum", Payload::Int(1), SampleMetadata::Indexed(3));

        run(&mut console, "plot spectrum");
        let spawned = console.spawner.take_spawned();
        assert_eq!(spawned[0].mode, TransferMode::Indexed);
        assert_eq!(spawned[0].points.try_recv().unwrap().x, 3);
    }

    #[test]
    fn test_closed_plot_can_be_reopened() {
        let (mut console, _peer, state) = console();
        record(&state, "sine", &[1]);
        run(&mut console, "plot sine");
        let first = console.spawner.take_spawned().remove(0);

        first.control.send(ControlMessage::Closing).unwrap();
        run(&mut console, "plot sine");
        assert_eq!(lock(&state).plots.len(), 1);
        assert_eq!(console.spawner.take_spawned().len(), 1);
    }

    #[test]
    fn test_plot_keeps_streaming_after_reconnect() {
        let (mut console, peer, state) = console();
        run(&mut console, "serial");
        record(&state, "sine", &[1, 2]);
        run(&mut console, "plot sine");
        let plot = console.spawner.take_spawned().remove(0);
        assert_eq!(plot.points.try_iter().count(), 2);

        run(&mut console, "serial");
        assert_eq!(plot.control.poll(), Some(ControlMessage::Clear));
        assert!(lock(&state).topics.intransfer("sine"));
        let err = console.execute("plot sine").unwrap_err();
        assert!(err.to_string().contains("already plotted"));

        peer.push_line("sine 9");
        let point = plot
            .points
            .recv_timeout(std::time::Duration::from_secs(2))
            .unwrap();
        assert_eq!((point.x, point.y), (0, Payload::Int(9)));
        console.shutdown();
    }

    struct FailingSpawner;

    impl PlotSpawner for FailingSpawner {
        fn spawn(&mut self, _topic: &str, _mode: TransferMode) -> crate::error::Result<PlotLink> {
            Err(crate::error::TelemetryError::Plot("no display".to_string()))
        }
    }

    #[test]
    fn test_failed_spawn_leaves_no_transfer() {
        let (transport, _peer) = MemoryTransport::pair();
        let link = Link::new(transport, LineCodec::new()).shared();
        let state = SessionState::default().shared();
        let runner = Runner::new(link, state.clone(), &RunnerConfig::default());
        let mut console = Console::new(runner, state.clone(), FailingSpawner, Vec::new());
        record(&state, "sine", &[1]);

        let err = console.execute("plot sine").unwrap_err();
        assert!(err.to_string().contains("no display"));
        assert!(!lock(&state).topics.intransfer("sine"));
        assert!(lock(&state).plots.is_empty());
    }

    #[test]
    fn test_dump_command() {
        let (mut console, _peer, state) = console();
        record(&state, "foo", &[7, 8]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.csv");

        let out = run(&mut console, &format!("dump foo {}", path.display()));
        assert!(out.starts_with("Wrote 2 rows of 'foo'"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "sample,value\n0,7\n1,8\n"
        );
        assert!(console.execute("dump bar out.csv").is_err());
    }

    #[test]
    fn test_parse_errors_do_not_fail() {
        let (mut console, _peer, _state) = console();
        assert_eq!(console.execute("frobnicate").unwrap(), CommandStatus::Continue);
        assert!(!output(&mut console).is_empty());
        assert_eq!(console.execute("   ").unwrap(), CommandStatus::Continue);
        assert!(console.execute("pub a \"open").is_err());
    }

    #[test]
    fn test_quit_closes_plots() {
        let (mut console, _peer, state) = console();
        record(&state, "sine", &[1]);
        run(&mut console, "serial");
        run(&mut console, "plot sine");
        let plot = console.spawner.take_spawned().remove(0);

        assert_eq!(console.execute("quit").unwrap(), CommandStatus::Quit);
        assert_eq!(plot.control.poll(), Some(ControlMessage::Exit));
        assert!(lock(&state).plots.is_empty());
        assert!(!lock(&state).topics.intransfer("sine"));
        assert_eq!(
            console.runner().status(),
            crate::types::ConnectionStatus::Terminated
        );
    }

    #[test]
    fn test_run_loop_survives_errors() {
        let (mut console, _peer, _state) = console();
        let input = "print nope\ncount nope\nquit\nls\n";
        console.run(std::io::Cursor::new(input)).unwrap();

        let out = output(&mut console);
        assert_eq!(out.matches(PROMPT).count(), 3);
        assert!(out.contains("Error: Topic 'nope' unknown"));
        assert!(out.contains("Closing session."));
    }

    #[test]
    fn test_info_and_stats() {
        let (mut console, _peer, _state) = console();
        run(&mut console, "serial sim -b 115200");

        let info = run(&mut console, "info");
        assert!(info.contains("Status: Connected"));
        assert!(info.contains("Port: sim at 115200 (bauds)"));
        assert!(info.contains("Topics: 0 remote, 2 cli"));

        let stats = run(&mut console, "stats");
        assert!(stats.contains("Transport"));
        assert!(stats.contains("corrupted: 0"));
        console.shutdown();
    }
}
