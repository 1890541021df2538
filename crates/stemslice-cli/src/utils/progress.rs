use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stemslice::engine::progress::{Progress, ProgressCallback};
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

/// One stderr bar shared by every phase of a run. The prefix names the
/// frozen-phonon configuration when more than one is propagated.
#[derive(Clone)]
pub struct CliProgressHandler {
    state: Arc<Mutex<RunBar>>,
}

struct RunBar {
    bar: ProgressBar,
    phase: &'static str,
}

impl RunBar {
    fn on_event(&mut self, event: Progress) {
        match event {
            Progress::PhaseStart { name } => {
                self.phase = name;
                self.bar.reset();
                self.bar.set_length(0);
                self.bar.set_style(spinner_style());
                self.bar
                    .enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                self.bar.set_message(name);
            }
            Progress::PhaseFinish => {
                self.bar.disable_steady_tick();
                self.bar.finish_with_message(format!("✓ {}", self.phase));
            }
            Progress::TaskStart { total } => {
                self.bar.disable_steady_tick();
                self.bar.reset();
                self.bar.set_length(total);
                self.bar.set_style(probe_bar_style());
            }
            Progress::TaskIncrement { amount } => self.bar.inc(amount),
            Progress::TaskFinish => {
                if let Some(length) = self.bar.length() {
                    self.bar.set_position(length);
                }
                self.bar.finish();
            }
            Progress::StatusUpdate { text } => self.bar.set_message(text),
            Progress::Message(msg) if self.bar.is_finished() => self.bar.set_message(msg),
            Progress::Message(msg) => self.bar.println(format!("  {msg}")),
        }
    }
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr())
            .with_style(spinner_style());
        bar.finish_and_clear();
        Self {
            state: Arc::new(Mutex::new(RunBar { bar, phase: "" })),
        }
    }

    /// Labels the bar with the configuration about to be propagated.
    pub fn begin_configuration(&self, index: usize, total: usize) {
        let Ok(state) = self.state.lock() else {
            warn!("Progress bar mutex was poisoned. Cannot relabel configuration.");
            return;
        };
        if total > 1 {
            state.bar.set_prefix(format!("[fp {}/{}]", index + 1, total));
        } else {
            state.bar.set_prefix("");
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let state = Arc::clone(&self.state);
        Box::new(move |event: Progress| match state.lock() {
            Ok(mut bar) => bar.on_event(event),
            Err(_) => warn!("Progress bar mutex was poisoned. Cannot update progress."),
        })
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} {spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn probe_bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix} {msg:<36} [{bar:40.cyan/blue}] {pos}/{len} probes ({throughput}, {eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .with_key(
        "throughput",
        |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{:.0} probes/s", state.per_sec());
        },
    )
    .with_key(
        "eta",
        |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
        },
    )
    .progress_chars("##-")
}
