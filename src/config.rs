//! Process-wide settings.
//!
//! The only knob is where finalization alerts run. The default follows the
//! enabled cargo features: `futures-scheduler` picks the shared thread pool,
//! otherwise `tokio-scheduler` picks the tokio blocking pool, otherwise alerts
//! run inline on the thread that released the last owner.
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::scheduler::AlertScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
  pub alert_scheduler: AlertScheduler,
}

impl Config {
  #[inline]
  pub fn with_alert_scheduler(mut self, scheduler: AlertScheduler) -> Self {
    self.alert_scheduler = scheduler;
    self
  }
}

static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

/// Snapshot of the active configuration.
#[inline]
pub fn current() -> Config { *CONFIG.read() }

/// Replace the active configuration.
///
/// Alerts already handed to a scheduler are not moved; only dispatches that
/// start after this call observe the new settings.
pub fn set(config: Config) {
  tracing::debug!(?config, "weak delegate config updated");
  *CONFIG.write() = config;
}
