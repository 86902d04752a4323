//! Tracked instances and weak handles with finalization notification.
//!
//! Rust cannot observe the end of an arbitrary `Arc<T>`, so subscriber
//! instances that bind methods into a weak callback live inside a
//! [`Tracked`]. When the last `Tracked` owner drops, every alert attached to
//! the instance fires once, after which weak handles to it stop resolving.
use std::{
  any::Any,
  fmt,
  ops::Deref,
  sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::alert::{AlertList, FinalizationAlert};

/// A shared owner of a subscriber instance.
///
/// Cloning is cheap and shares the instance, like `Arc`. Methods bound
/// through [`Callback::bound`](crate::Callback::bound) hold the instance only
/// weakly once combined into a weak callback.
pub struct Tracked<T>(Arc<Slot<T>>);

/// Non-owning counterpart of [`Tracked`].
pub struct WeakTracked<T>(Weak<Slot<T>>);

pub(crate) struct Slot<T> {
  value: T,
  alerts: Mutex<AlertList>,
}

impl<T> Drop for Slot<T> {
  fn drop(&mut self) { self.alerts.get_mut().fire_all(); }
}

impl<T> Tracked<T> {
  pub fn new(value: T) -> Self {
    Self(Arc::new(Slot { value, alerts: Mutex::new(AlertList::default()) }))
  }

  #[inline]
  pub fn downgrade(this: &Self) -> WeakTracked<T> { WeakTracked(Arc::downgrade(&this.0)) }

  #[inline]
  pub fn ptr_eq(this: &Self, other: &Self) -> bool { Arc::ptr_eq(&this.0, &other.0) }

  #[inline]
  pub fn strong_count(this: &Self) -> usize { Arc::strong_count(&this.0) }

  /// Number of alerts currently waiting on this instance.
  pub fn alert_count(this: &Self) -> usize { this.0.alerts.lock().len() }
}

impl<T: Send + Sync + 'static> Tracked<T> {
  #[inline]
  pub(crate) fn anchor(&self) -> AnchorRef { self.0.clone() }
}

impl<T> Clone for Tracked<T> {
  #[inline]
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> Deref for Tracked<T> {
  type Target = T;
  #[inline]
  fn deref(&self) -> &T { &self.0.value }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Tracked").field(&self.0.value).finish()
  }
}

impl<T> WeakTracked<T> {
  #[inline]
  pub fn upgrade(&self) -> Option<Tracked<T>> { self.0.upgrade().map(Tracked) }

  #[inline]
  pub fn is_alive(&self) -> bool { self.0.strong_count() > 0 }
}

impl<T> Clone for WeakTracked<T> {
  #[inline]
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

/// Type-erased view of a tracked instance.
pub(crate) trait Anchor: Send + Sync {
  fn attach(&self, alert: FinalizationAlert) -> usize;
  fn detach(&self, id: usize) -> Option<FinalizationAlert>;
  fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) type AnchorRef = Arc<dyn Anchor>;
pub(crate) type WeakAnchor = Weak<dyn Anchor>;

impl<T: Send + Sync + 'static> Anchor for Slot<T> {
  #[inline]
  fn attach(&self, alert: FinalizationAlert) -> usize { self.alerts.lock().add(alert) }

  #[inline]
  fn detach(&self, id: usize) -> Option<FinalizationAlert> { self.alerts.lock().remove(id) }

  #[inline]
  fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> { self }
}

/// Recover the concrete instance behind an erased anchor.
pub(crate) fn downcast_slot<T: Send + Sync + 'static>(anchor: AnchorRef) -> Option<Tracked<T>> {
  anchor.into_any().downcast::<Slot<T>>().ok().map(Tracked)
}

/// Identity of the instance behind a weak anchor, stable while the weak
/// handle exists.
#[inline]
pub(crate) fn anchor_key(anchor: &WeakAnchor) -> usize { anchor.as_ptr() as *const () as usize }

/// A weak handle to a tracked instance, optionally paired with a companion
/// alert that fires once the instance loses its last owner.
pub(crate) struct DependentHandle {
  primary: WeakAnchor,
  alert: Mutex<Option<usize>>,
}

impl DependentHandle {
  pub(crate) fn new(primary: &AnchorRef, companion: Option<FinalizationAlert>) -> Self {
    let alert = companion.map(|alert| primary.attach(alert));
    Self { primary: Arc::downgrade(primary), alert: Mutex::new(alert) }
  }

  #[inline]
  pub(crate) fn try_primary(&self) -> Option<AnchorRef> { self.primary.upgrade() }

  /// Liveness check that never takes a temporary strong reference, so it
  /// cannot end up being the one that drops the instance.
  #[inline]
  pub(crate) fn is_alive(&self) -> bool { self.primary.strong_count() > 0 }

  /// Detach the companion alert. Idempotent.
  pub(crate) fn free(&self) {
    let Some(id) = self.alert.lock().take() else { return };
    if let Some(primary) = self.primary.upgrade() {
      let alert = primary.detach(id);
      // The instance may lose its last owner right here; drop the detached
      // alert and the upgraded reference in that order so the alert cannot
      // fire.
      drop(alert);
      drop(primary);
    }
  }
}

impl Drop for DependentHandle {
  fn drop(&mut self) { self.free(); }
}
