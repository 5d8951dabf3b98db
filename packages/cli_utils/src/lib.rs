#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the monarch map binary.
//!
//! [`init_logger`] routes `log` output through `indicatif-log-bridge` so
//! log lines do not tear the progress bars, and [`IndicatifProgress`]
//! renders pipeline progress.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use monarch_map_pipeline::ProgressCallback;

pub use indicatif::MultiProgress;

const SPINNER_TEMPLATE: &str = "{spinner:.yellow} {msg}";
const BAR_TEMPLATE: &str =
    "  {msg} {wide_bar:.yellow/dim} {pos}/{len} observations {percent}% [{eta}]";

/// Pipeline progress rendered as a terminal bar.
///
/// Spins until the run announces its total, then switches to a bar with
/// position and ETA.
pub struct IndicatifProgress {
    bar: ProgressBar,
    counting: ProgressStyle,
}

impl IndicatifProgress {
    /// Adds a spinner to `multi` labelled `message`.
    #[must_use]
    pub fn observations_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(template_or(SPINNER_TEMPLATE, ProgressStyle::default_spinner));
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));

        let counting = template_or(BAR_TEMPLATE, ProgressStyle::default_bar).progress_chars("=>-");

        Arc::new(Self { bar, counting })
    }
}

fn template_or(template: &str, fallback: fn() -> ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| fallback())
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_style(self.counting.clone());
        self.bar.set_length(total);
        self.bar.reset();
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs `pretty_env_logger` behind an `indicatif` bridge.
///
/// The level comes from `RUST_LOG` and defaults to `info`. Bars must be
/// added to the returned [`MultiProgress`] for log lines to stay clear of
/// them.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .build();
    let max_level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(max_level);
    }

    multi
}
