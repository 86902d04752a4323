use smallvec::SmallVec;

use crate::scheduler::{self, AlertTask};

/// Companion object carrying a one-shot callback for the moment its tracked
/// instance loses its last owner.
///
/// Firing consumes the alert, so the callback runs at most once. An alert
/// that is dropped without firing (because the entry holding it was disposed
/// first) never runs.
pub struct FinalizationAlert {
  on_alert: AlertTask,
}

impl FinalizationAlert {
  pub fn new(on_alert: impl FnOnce() + Send + 'static) -> Self {
    Self { on_alert: Box::new(on_alert) }
  }

  /// Hand the callback to the configured alert scheduler.
  #[inline]
  pub(crate) fn fire(self) { scheduler::dispatch(self.on_alert); }
}

impl std::fmt::Debug for FinalizationAlert {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("FinalizationAlert")
  }
}

/// Alerts attached to one tracked instance, addressable by id so a disposed
/// entry can take its alert back.
///
/// Most instances subscribe to a handful of events, so the list stays inline
/// for up to two alerts.
#[derive(Default)]
pub(crate) struct AlertList {
  next_id: usize,
  items: SmallVec<[(usize, FinalizationAlert); 2]>,
}

impl AlertList {
  /// Add an alert and return its id.
  #[inline]
  pub(crate) fn add(&mut self, alert: FinalizationAlert) -> usize {
    let id = self.next_id;
    self.next_id += 1;
    self.items.push((id, alert));
    id
  }

  /// Remove an alert by id without firing it.
  pub(crate) fn remove(&mut self, id: usize) -> Option<FinalizationAlert> {
    self
      .items
      .iter()
      .position(|(i, _)| *i == id)
      .map(|pos| self.items.remove(pos).1)
  }

  #[inline]
  pub(crate) fn len(&self) -> usize { self.items.len() }

  /// Fire every alert in attach order, leaving the list empty.
  pub(crate) fn fire_all(&mut self) {
    for (_, alert) in self.items.drain(..) {
      alert.fire();
    }
  }
}
