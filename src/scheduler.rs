//! Where finalization alerts run.
//!
//! An alert fires from the `Drop` of the last owner of a tracked instance,
//! which may happen anywhere: inside a listener, inside a lock held by user
//! code, on any thread. Handing the alert to a pool keeps compaction off that
//! path. `Inline` exists for hosts without a pool and for deterministic tests.
#[cfg(feature = "futures-scheduler")]
use futures::executor::ThreadPool;
#[cfg(feature = "futures-scheduler")]
use once_cell::sync::Lazy;

use crate::config;

/// A unit of work produced by a fired alert.
pub type AlertTask = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertScheduler {
  /// Run on the thread that dropped the last owner.
  Inline,
  /// Run on the process-wide futures thread pool.
  #[cfg(feature = "futures-scheduler")]
  ThreadPool,
  /// Run on the blocking pool of the current tokio runtime, or on a fresh
  /// thread when no runtime is entered.
  #[cfg(feature = "tokio-scheduler")]
  Tokio,
}

impl Default for AlertScheduler {
  #[allow(unreachable_code)]
  fn default() -> Self {
    #[cfg(feature = "futures-scheduler")]
    return AlertScheduler::ThreadPool;
    #[cfg(feature = "tokio-scheduler")]
    return AlertScheduler::Tokio;
    AlertScheduler::Inline
  }
}

#[cfg(feature = "futures-scheduler")]
static DEFAULT_RUNTIME: Lazy<Option<ThreadPool>> = Lazy::new(|| {
  match ThreadPool::builder()
    .name_prefix("weak-delegate-alert-")
    .create()
  {
    Ok(pool) => Some(pool),
    Err(err) => {
      tracing::warn!(%err, "cannot build alert thread pool, alerts will run inline");
      None
    }
  }
});

impl AlertScheduler {
  /// Run `task` according to this scheduler.
  pub fn schedule(self, task: AlertTask) {
    match self {
      AlertScheduler::Inline => task(),
      #[cfg(feature = "futures-scheduler")]
      AlertScheduler::ThreadPool => match DEFAULT_RUNTIME.as_ref() {
        Some(pool) => pool.spawn_ok(async move { task() }),
        None => task(),
      },
      #[cfg(feature = "tokio-scheduler")]
      AlertScheduler::Tokio => match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
          handle.spawn_blocking(task);
        }
        Err(_) => {
          std::thread::spawn(task);
        }
      },
    }
  }
}

/// Dispatch `task` through the configured scheduler.
#[inline]
pub(crate) fn dispatch(task: AlertTask) {
  let scheduler = config::current().alert_scheduler;
  tracing::trace!(?scheduler, "dispatching finalization alert");
  scheduler.schedule(task);
}
