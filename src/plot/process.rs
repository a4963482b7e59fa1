//! Plot windows as child processes
//!
//! Each plot re-executes the current binary with the hidden `plot-window`
//! subcommand. Two threads per plot bridge the in-process channels to the
//! child's pipes:
//!
//! - the pump writes transfer points and `clear`/`exit` to the child's stdin
//! - the watcher waits for `closing` (or EOF) on the child's stdout and
//!   reports it on the control channel

use super::window::{WindowArgs, CLOSING_LINE};
use super::{ControlChannel, ControlMessage, PlotLink, PlotSpawner, WindowMessage};
use crate::config::PlotConfig;
use crate::error::{Result, TelemetryError};
use crate::store::{TransferMode, TransferPoint};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// Name of the hidden subcommand running a plot window
pub const PLOT_WINDOW_COMMAND: &str = "plot-window";

/// Spawns one plot window process per plot
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    /// Arguments placed before the subcommand name
    prefix: Vec<OsString>,
    plot: PlotConfig,
}

impl ProcessSpawner {
    /// Spawner re-running the current executable
    pub fn new(plot: PlotConfig) -> Result<Self> {
        let program = std::env::current_exe().map_err(|e| {
            TelemetryError::Plot(format!("Cannot locate the current executable: {}", e))
        })?;
        Ok(Self::with_command(program, Vec::<OsString>::new(), plot))
    }

    /// Spawner running `program prefix... plot-window <window args>`
    pub fn with_command<I, S>(program: impl Into<PathBuf>, prefix: I, plot: PlotConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            prefix: prefix.into_iter().map(Into::into).collect(),
            plot,
        }
    }

    fn command(&self, args: &WindowArgs) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix)
            .arg(PLOT_WINDOW_COMMAND)
            .args(args.to_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl PlotSpawner for ProcessSpawner {
    fn spawn(&mut self, topic: &str, mode: TransferMode) -> Result<PlotLink> {
        let args = WindowArgs::from_config(topic, mode == TransferMode::Indexed, &self.plot);
        let mut child = self.command(&args).spawn().map_err(|e| {
            TelemetryError::Plot(format!(
                "Failed to start plot window {:?}: {}",
                self.program, e
            ))
        })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TelemetryError::Plot(
                    "Plot window pipes are unavailable".to_string(),
                ));
            }
        };

        let (queue, points) = unbounded();
        let (core_end, renderer_end) = ControlChannel::pair();
        let (closing_tx, control_rx) = renderer_end.into_parts();

        spawn_thread(format!("plot-pump-{}", topic), move || {
            pump(BufWriter::new(stdin), points, control_rx)
        })?;

        let watched = topic.to_string();
        spawn_thread(format!("plot-watch-{}", topic), move || {
            watch(stdout, child, closing_tx, &watched)
        })?;

        tracing::info!(target: "topics", topic, ?mode, "plot window started");
        Ok(PlotLink {
            queue,
            control: core_end,
        })
    }
}

fn spawn_thread(name: String, f: impl FnOnce() + Send + 'static) -> Result<()> {
    std::thread::Builder::new()
        .name(name)
        .spawn(f)
        .map(|_| ())
        .map_err(|e| TelemetryError::Plot(format!("Failed to start plot thread: {}", e)))
}

fn write_message(out: &mut impl Write, message: &WindowMessage) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, message)?;
    out.write_all(b"\n")
}

/// What the pump does after a control message
enum Flow {
    Continue,
    Stop,
}

fn forward_control(
    stdin: &mut BufWriter<ChildStdin>,
    message: ControlMessage,
) -> std::io::Result<Flow> {
    match message {
        ControlMessage::Clear => {
            write_message(stdin, &WindowMessage::Clear)?;
            stdin.flush()?;
            Ok(Flow::Continue)
        }
        ControlMessage::Exit => {
            let _ = write_message(stdin, &WindowMessage::Exit).and_then(|_| stdin.flush());
            Ok(Flow::Stop)
        }
        ControlMessage::Closing => Ok(Flow::Continue),
    }
}

/// Write every control message already queued
fn drain_control(
    stdin: &mut BufWriter<ChildStdin>,
    control: &Receiver<ControlMessage>,
) -> std::io::Result<Flow> {
    for message in control.try_iter() {
        if let Flow::Stop = forward_control(stdin, message)? {
            return Ok(Flow::Stop);
        }
    }
    Ok(Flow::Continue)
}

/// Forward points and control messages to the child until either side goes away.
///
/// Pending control messages are written before the next point, so a `clear`
/// sent ahead of a session's first point reaches the window first.
fn pump(
    mut stdin: BufWriter<ChildStdin>,
    points: Receiver<TransferPoint>,
    control: Receiver<ControlMessage>,
) {
    loop {
        let flow = select! {
            recv(points) -> point => match point {
                Ok(point) => drain_control(&mut stdin, &control).and_then(|flow| match flow {
                    Flow::Continue => {
                        write_message(&mut stdin, &WindowMessage::Point(point))?;
                        if points.is_empty() {
                            stdin.flush()?;
                        }
                        Ok(Flow::Continue)
                    }
                    Flow::Stop => Ok(Flow::Stop),
                }),
                Err(_) => break,
            },
            recv(control) -> message => match message {
                Ok(message) => forward_control(&mut stdin, message),
                Err(_) => break,
            },
        };
        match flow {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(e) => {
                tracing::debug!("Plot window input closed: {}", e);
                break;
            }
        }
    }
}

/// Wait for the child to announce it is closing, then report it
fn watch(stdout: ChildStdout, mut child: Child, closing: Option<Sender<ControlMessage>>, topic: &str) {
    for line in BufReader::new(stdout).lines() {
        match line {
            Ok(line) if line.trim() == CLOSING_LINE => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }
    if let Some(closing) = closing {
        let _ = closing.send(ControlMessage::Closing);
    }
    match child.wait() {
        Ok(status) => tracing::debug!(target: "topics", topic, %status, "plot window exited"),
        Err(e) => tracing::warn!("Failed to reap plot window for {}: {}", topic, e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::types::Payload;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// A stand-in window: echoes its input to `log` and quits on `"exit"`
    fn echo_spawner(log: &std::path::Path) -> ProcessSpawner {
        let script = format!(
            r#"echo "$@" > '{log}.args'
while IFS= read -r line; do
  echo "$line" >> '{log}'
  [ "$line" = '"exit"' ] && break
done
echo closing"#,
            log = log.display()
        );
        ProcessSpawner::with_command("/bin/sh", ["-c", script.as_str()], PlotConfig::default())
    }

    fn wait_closing(control: &ControlChannel) {
        let message = control.receiver().recv_timeout(TIMEOUT).unwrap();
        assert_eq!(message, ControlMessage::Closing);
    }

    #[test]
    fn test_points_and_exit_reach_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("window.log");
        let mut spawner = echo_spawner(&log);

        let link = spawner.spawn("sine", TransferMode::Linear).unwrap();
        link.queue
            .send(TransferPoint::new(0, Payload::Float(0.5)))
            .unwrap();
        link.queue
            .send(TransferPoint::new(1, Payload::Int(2)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        link.control.send(ControlMessage::Clear).unwrap();
        link.control.send(ControlMessage::Exit).unwrap();
        wait_closing(&link.control);

        let written = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"point":{"x":0,"y":0.5}}"#,
                r#"{"point":{"x":1,"y":2}}"#,
                r#""clear""#,
                r#""exit""#,
            ]
        );
    }

    fn wait_lines(log: &std::path::Path, count: usize) -> Vec<String> {
        let deadline = std::time::Instant::now() + TIMEOUT;
        loop {
            let lines: Vec<String> = std::fs::read_to_string(log)
                .map(|text| text.lines().map(str::to_string).collect())
                .unwrap_or_default();
            if lines.len() >= count || std::time::Instant::now() > deadline {
                return lines;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_clear_goes_out_before_later_points() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("window.log");
        let mut spawner = echo_spawner(&log);

        let link = spawner.spawn("v", TransferMode::Linear).unwrap();
        link.queue.send(TransferPoint::new(0, Payload::Int(1))).unwrap();
        assert_eq!(wait_lines(&log, 1).len(), 1);

        // A new session: clear, then points numbered from zero again
        link.control.send(ControlMessage::Clear).unwrap();
        link.queue.send(TransferPoint::new(0, Payload::Int(5))).unwrap();
        link.queue.send(TransferPoint::new(1, Payload::Int(6))).unwrap();
        assert_eq!(wait_lines(&log, 4).len(), 4);

        link.control.send(ControlMessage::Exit).unwrap();
        wait_closing(&link.control);
        assert_eq!(
            wait_lines(&log, 5),
            vec![
                r#"{"point":{"x":0,"y":1}}"#,
                r#""clear""#,
                r#"{"point":{"x":0,"y":5}}"#,
                r#"{"point":{"x":1,"y":6}}"#,
                r#""exit""#,
            ]
        );
    }

    #[test]
    fn test_window_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("window.log");
        let mut spawner = echo_spawner(&log);

        let mut link = spawner.spawn("spectrum", TransferMode::Indexed).unwrap();
        link.control.close();
        wait_closing(&link.control);

        let args = std::fs::read_to_string(dir.path().join("window.log.args")).unwrap();
        assert!(args.starts_with("--topic spectrum --indexed --max-points 10000"));
    }

    #[test]
    fn test_child_exiting_on_its_own_reports_closing() {
        let mut spawner =
            ProcessSpawner::with_command("/bin/sh", ["-c", "echo closing"], PlotConfig::default());
        let link = spawner.spawn("t", TransferMode::Linear).unwrap();
        wait_closing(&link.control);
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        let mut spawner = ProcessSpawner::with_command(
            "/nonexistent/telemetry-plot",
            Vec::<OsString>::new(),
            PlotConfig::default(),
        );
        assert!(matches!(
            spawner.spawn("t", TransferMode::Linear),
            Err(TelemetryError::Plot(_))
        ));
    }
}
