//! Progress indicators for long-running CLI operations
//!
//! Plugin downloads and template clones can take a while; the CLI shows a
//! spinner for them. Spinners are hidden when progress is disabled
//! (`--no-progress`) so output stays clean in CI logs.
//!
//! ```rust,no_run
//! use iacpm_cli::utils::progress::ProgressBar;
//!
//! let spinner = ProgressBar::new_spinner(true);
//! spinner.set_message("Downloading resource-aws v6.0.0");
//! // ... work ...
//! spinner.finish_with_message("Installed resource-aws v6.0.0");
//! ```

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

/// Spinner with consistent styling.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Creates a spinner; `enabled = false` yields a hidden one.
    #[must_use]
    pub fn new_spinner(enabled: bool) -> Self {
        let bar = if enabled {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            IndicatifBar::hidden()
        };
        Self {
            inner: bar,
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
