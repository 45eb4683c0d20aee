use std::env;
use std::io::{self, IsTerminal};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

pub(crate) fn progress_enabled() -> bool {
    match env::var("VEENDOR_PROGRESS") {
        Ok(value) => value != "0",
        Err(_) => io::stderr().is_terminal(),
    }
}

/// Progress rendering capability handed to the orchestrator and backends.
///
/// Cloning shares the same set of rendered lines.
#[derive(Clone, Debug)]
pub struct Progress {
    multi: Option<MultiProgress>,
}

impl Progress {
    /// Renders to stderr unless `VEENDOR_PROGRESS=0` or stderr is not a terminal.
    pub fn from_env() -> Self {
        if progress_enabled() {
            Self {
                multi: Some(MultiProgress::with_draw_target(ProgressDrawTarget::stderr())),
            }
        } else {
            Self::silent()
        }
    }

    pub fn silent() -> Self {
        Self { multi: None }
    }

    pub fn spinner(&self, label: impl Into<String>) -> ProgressReporter {
        let Some(multi) = &self.multi else {
            return ProgressReporter { bar: None };
        };
        let bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::with_template("veendor ▸ {msg} {spinner}") {
            bar.set_style(style);
        }
        bar.set_message(label.into());
        bar.enable_steady_tick(Duration::from_millis(80));
        ProgressReporter { bar: Some(bar) }
    }

    /// Byte-oriented bar; falls back to a spinner when the size is unknown.
    pub fn bytes(&self, label: impl Into<String>, total: Option<u64>) -> ProgressReporter {
        let Some(total) = total.filter(|total| *total > 0) else {
            return self.spinner(label);
        };
        let Some(multi) = &self.multi else {
            return ProgressReporter { bar: None };
        };
        let bar = multi.add(ProgressBar::new(total));
        if let Ok(style) =
            ProgressStyle::with_template("veendor ▸ {msg} [{bytes}/{total_bytes}] {bar:30}")
        {
            bar.set_style(style);
        }
        bar.set_message(label.into());
        ProgressReporter { bar: Some(bar) }
    }
}

pub struct ProgressReporter {
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub fn increment(&self, delta: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(delta);
        }
    }

    pub fn finish(mut self, message: impl Into<String>) {
        if let Some(bar) = self.bar.take() {
            let message = message.into();
            bar.println(format!("veendor ▸ {message}"));
            bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
