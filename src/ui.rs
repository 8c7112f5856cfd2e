//! Terminal output: the spinner shown while `ask` waits on the model, and a
//! log writer that pauses it so log lines don't tear.

use std::{
    io::{self, Write as _},
    time::Duration,
};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressFinish, ProgressStyle};

/// Shared terminal state. Cheap to clone.
#[derive(Clone, Default)]
pub struct Ui {
    bars: MultiProgress,
}

impl Ui {
    pub fn init() -> Ui {
        Ui::default()
    }

    /// Never draw spinners. Used when stdout carries real output, or when
    /// we're a server with nobody watching the terminal.
    pub fn hide_progress_bars(&self) {
        self.bars.set_draw_target(ProgressDrawTarget::hidden());
    }

    /// A `tracing` writer for stderr.
    pub fn get_stderr_writer(&self) -> SafeStderrWriter {
        SafeStderrWriter {
            bars: self.bars.clone(),
        }
    }

    /// Start a spinner. It keeps ticking until finished or dropped.
    pub fn new_spinner(&self, config: &ProgressConfig<'_>) -> ProgressBar {
        let style = ProgressStyle::with_template("{spinner} {prefix:3}{msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let spinner = ProgressBar::new_spinner()
            .with_style(style)
            .with_prefix(config.emoji.to_owned())
            .with_message(config.msg.to_owned())
            .with_finish(ProgressFinish::WithMessage(config.done_msg.to_owned().into()));
        let spinner = self.bars.add(spinner);
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }
}

/// How a spinner describes itself.
pub struct ProgressConfig<'a> {
    pub emoji: &'a str,
    /// Shown while running.
    pub msg: &'a str,
    /// Shown once finished.
    pub done_msg: &'a str,
}

/// Writes to stderr with any visible spinner suspended.
#[derive(Clone)]
pub struct SafeStderrWriter {
    bars: MultiProgress,
}

impl io::Write for SafeStderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bars.suspend(|| io::stderr().write(buf))
    }

    // `tracing` writes a whole event at once, so one suspend per log line.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.bars.suspend(|| io::stderr().write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.bars.suspend(|| io::stderr().flush())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SafeStderrWriter {
    type Writer = SafeStderrWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
