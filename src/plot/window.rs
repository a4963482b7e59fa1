//! Plot window process
//!
//! Runs as `telemetry-cli plot-window --topic <name>`. Points arrive as
//! [`WindowMessage`] JSON lines on stdin. When the window closes, for any
//! reason, the process prints `closing` on stdout and exits.

use super::WindowMessage;
use crate::config::PlotConfig;
use crate::error::{Result, TelemetryError};
use crate::store::TransferPoint;
use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use egui_plot::{Corner, Legend, Line, Plot, PlotPoints};
use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, Write};
use std::time::Duration;

/// Line written on stdout when the window goes away
pub const CLOSING_LINE: &str = "closing";

const REPAINT_INTERVAL: Duration = Duration::from_millis(50);

/// Arguments of the hidden `plot-window` subcommand
#[derive(Debug, Clone, clap::Args)]
pub struct WindowArgs {
    /// Topic shown in the title and legend
    #[arg(long)]
    pub topic: String,

    /// Points are addressed by index instead of arrival order
    #[arg(long)]
    pub indexed: bool,

    /// Linear plots keep only this many most recent points
    #[arg(long, default_value_t = 10_000)]
    pub max_points: usize,

    #[arg(long, default_value_t = 1000)]
    pub width: u32,

    #[arg(long, default_value_t = 600)]
    pub height: u32,
}

impl WindowArgs {
    /// Command-line arguments that reproduce these settings
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["--topic".to_string(), self.topic.clone()];
        if self.indexed {
            args.push("--indexed".to_string());
        }
        args.extend([
            "--max-points".to_string(),
            self.max_points.to_string(),
            "--width".to_string(),
            self.width.to_string(),
            "--height".to_string(),
            self.height.to_string(),
        ]);
        args
    }

    pub fn from_config(topic: &str, indexed: bool, plot: &PlotConfig) -> Self {
        Self {
            topic: topic.to_string(),
            indexed,
            max_points: plot.max_points,
            width: plot.width,
            height: plot.height,
        }
    }
}

/// Points held by a plot window
#[derive(Debug)]
pub enum PlotBuffer {
    /// Most recent points in arrival order
    Linear {
        points: VecDeque<[f64; 2]>,
        max_points: usize,
        skipped: u64,
    },
    /// One value per index, last write wins
    Indexed {
        points: BTreeMap<u64, f64>,
        skipped: u64,
    },
}

impl PlotBuffer {
    pub fn linear(max_points: usize) -> Self {
        PlotBuffer::Linear {
            points: VecDeque::new(),
            max_points: max_points.max(1),
            skipped: 0,
        }
    }

    pub fn indexed() -> Self {
        PlotBuffer::Indexed {
            points: BTreeMap::new(),
            skipped: 0,
        }
    }

    /// Apply one message. Returns `true` when the window should close.
    pub fn apply(&mut self, message: WindowMessage) -> bool {
        match message {
            WindowMessage::Point(point) => {
                self.push(point);
                false
            }
            WindowMessage::Clear => {
                self.clear();
                false
            }
            WindowMessage::Exit => true,
        }
    }

    fn push(&mut self, point: TransferPoint) {
        let y = point.y.as_f64();
        match self {
            PlotBuffer::Linear {
                points,
                max_points,
                skipped,
            } => match y {
                Some(y) => {
                    if points.len() == *max_points {
                        points.pop_front();
                    }
                    points.push_back([point.x as f64, y]);
                }
                None => *skipped += 1,
            },
            PlotBuffer::Indexed { points, skipped } => match y {
                Some(y) => {
                    points.insert(point.x, y);
                }
                None => *skipped += 1,
            },
        }
    }

    pub fn clear(&mut self) {
        match self {
            PlotBuffer::Linear { points, .. } => points.clear(),
            PlotBuffer::Indexed { points, .. } => points.clear(),
        }
    }

    /// Text payloads that could not be drawn
    pub fn skipped(&self) -> u64 {
        match self {
            PlotBuffer::Linear { skipped, .. } | PlotBuffer::Indexed { skipped, .. } => *skipped,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PlotBuffer::Linear { points, .. } => points.len(),
            PlotBuffer::Indexed { points, .. } => points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Points in drawing order
    pub fn points(&self) -> Vec<[f64; 2]> {
        match self {
            PlotBuffer::Linear { points, .. } => points.iter().copied().collect(),
            PlotBuffer::Indexed { points, .. } => {
                points.iter().map(|(x, y)| [*x as f64, *y]).collect()
            }
        }
    }
}

/// Read messages from `input` until EOF, forwarding them to a channel.
///
/// Lines that do not parse are logged and skipped. The channel disconnects
/// when the input ends.
pub fn spawn_reader<R>(input: R) -> Receiver<WindowMessage>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = unbounded();
    let spawned = std::thread::Builder::new()
        .name("plot-stdin".to_string())
        .spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WindowMessage>(&line) {
                    Ok(message) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring malformed plot message: {}", e),
                }
            }
        });
    if let Err(e) = spawned {
        tracing::error!("Failed to start plot reader: {}", e);
    }
    rx
}

/// The eframe application drawing one topic
pub struct PlotWindow {
    topic: String,
    buffer: PlotBuffer,
    messages: Receiver<WindowMessage>,
    closing: bool,
}

impl PlotWindow {
    pub fn new(args: &WindowArgs, messages: Receiver<WindowMessage>) -> Self {
        let buffer = if args.indexed {
            PlotBuffer::indexed()
        } else {
            PlotBuffer::linear(args.max_points)
        };
        Self {
            topic: args.topic.clone(),
            buffer,
            messages,
            closing: false,
        }
    }

    /// Drain pending messages. Returns `true` once the window should close.
    fn process_messages(&mut self) -> bool {
        loop {
            match self.messages.try_recv() {
                Ok(message) => {
                    if self.buffer.apply(message) {
                        return true;
                    }
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }
}

impl eframe::App for PlotWindow {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.closing && self.process_messages() {
            self.closing = true;
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        egui::TopBottomPanel::bottom("plot_status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(format!("{} points", self.buffer.len()));
                if self.buffer.skipped() > 0 {
                    ui.separator();
                    ui.label(format!("{} text values skipped", self.buffer.skipped()));
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let plot = Plot::new("topic_plot")
                .allow_zoom(true)
                .allow_drag(true)
                .show_axes(true)
                .legend(Legend::default().position(Corner::RightTop));

            plot.show(ui, |plot_ui| {
                if self.buffer.is_empty() {
                    return;
                }
                let points = PlotPoints::from(self.buffer.points());
                plot_ui.line(Line::new(&self.topic, points));
            });
        });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}

/// Entry point of the `plot-window` subcommand
pub fn run_plot_window(args: WindowArgs) -> Result<()> {
    let messages = spawn_reader(std::io::BufReader::new(std::io::stdin()));
    let title = format!("{} - telemetry-cli", args.topic);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([args.width as f32, args.height as f32])
            .with_title(&title),
        ..Default::default()
    };

    let result = eframe::run_native(
        &title,
        native_options,
        Box::new(move |_cc| Ok(Box::new(PlotWindow::new(&args, messages)))),
    );

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", CLOSING_LINE)?;
    stdout.flush()?;

    result.map_err(|e| TelemetryError::Plot(format!("Plot window failed: {}", e)))
}
