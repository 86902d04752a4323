//! Process-wide side tables.
//!
//! Two maps with different lifetime rules:
//!
//! - composite identity → weak handle to the surrogate behind it. Rows whose
//!   surrogate is gone are swept once the table has doubled since the last
//!   sweep.
//! - subscriber instance → surrogates it takes part in, held strongly for as
//!   long as the instance lives. The instance is keyed weakly; a finalization
//!   alert drops the whole row once the instance loses its last owner.
//!   Surrogates held by nothing but pin rows can no longer be reached and are
//!   pruned whenever their row gains a new surrogate.
//!
//! Both maps are sharded, so resolving one composite never waits on work
//! done for an unrelated one.
use std::{
  any::Any,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Weak,
  },
};

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::{
  alert::FinalizationAlert,
  callback::{same_allocation, CallbackId},
  handle::{anchor_key, AnchorRef, DependentHandle},
  surrogate::WeakCallbackSurrogate,
};

const MIN_SWEEP: usize = 64;

/// A surrogate as the pin rows see it.
pub(crate) trait Pinned: Send + Sync {
  /// Number of pin rows holding this surrogate.
  fn pins(&self) -> &AtomicUsize;
}

impl<A: 'static, R: 'static> Pinned for WeakCallbackSurrogate<A, R> {
  #[inline]
  fn pins(&self) -> &AtomicUsize { &self.pins }
}

type PinnedRef = Arc<dyn Pinned>;

/// Held by pin rows only, so no composite can resolve it any more.
#[inline]
fn is_orphan(pinned: &PinnedRef) -> bool {
  Arc::strong_count(pinned) <= pinned.pins().load(Ordering::Acquire)
}

struct Pin {
  // Keeps the key's allocation (and thus the key) from being reused while
  // the row exists.
  _handle: DependentHandle,
  surrogates: Vec<PinnedRef>,
}

impl Pin {
  /// Take the orphaned surrogates out of the row. The caller drops them once
  /// it no longer holds the row.
  fn prune(&mut self) -> Vec<PinnedRef> {
    let (kept, orphans): (Vec<_>, Vec<_>) =
      self.surrogates.drain(..).partition(|pinned| !is_orphan(pinned));
    self.surrogates = kept;
    for orphan in &orphans {
      orphan.pins().fetch_sub(1, Ordering::AcqRel);
    }
    orphans
  }
}

impl Drop for Pin {
  fn drop(&mut self) {
    for pinned in &self.surrogates {
      pinned.pins().fetch_sub(1, Ordering::AcqRel);
    }
  }
}

pub(crate) struct SurrogateRegistry {
  by_identity: DashMap<CallbackId, Weak<dyn Any + Send + Sync>>,
  sweep_at: AtomicUsize,
  pinning: DashMap<usize, Pin>,
}

pub(crate) static REGISTRY: Lazy<SurrogateRegistry> = Lazy::new(|| SurrogateRegistry {
  by_identity: DashMap::new(),
  sweep_at: AtomicUsize::new(MIN_SWEEP),
  pinning: DashMap::new(),
});

impl SurrogateRegistry {
  /// The surrogate registered for `id`, if it is still alive and has the
  /// requested call shape.
  pub(crate) fn lookup<A: 'static, R: 'static>(
    &self,
    id: CallbackId,
  ) -> Option<Arc<WeakCallbackSurrogate<A, R>>> {
    let weak = self.by_identity.get(&id)?.value().clone();
    weak.upgrade()?.downcast::<WeakCallbackSurrogate<A, R>>().ok()
  }

  pub(crate) fn register<A: 'static, R: 'static>(
    &self,
    id: CallbackId,
    surrogate: &Arc<WeakCallbackSurrogate<A, R>>,
  ) {
    let erased: Arc<dyn Any + Send + Sync> = surrogate.clone();
    self.by_identity.insert(id, Arc::downgrade(&erased));
    let rows = self.by_identity.len();
    tracing::trace!(%id, rows, "registered weak callback surrogate");
    if rows >= self.sweep_at.load(Ordering::Relaxed) {
      self.sweep();
    }
  }

  /// Drop identity rows whose surrogate is gone and schedule the next sweep
  /// for when the table has doubled.
  fn sweep(&self) {
    self.by_identity.retain(|_, weak| weak.strong_count() > 0);
    let live = self.by_identity.len();
    self.sweep_at.store((live * 2).max(MIN_SWEEP), Ordering::Relaxed);
    tracing::trace!(live, "swept weak callback identities");
  }

  /// Keep `surrogate` reachable for as long as `target` is.
  pub(crate) fn pin<A: 'static, R: 'static>(
    &self,
    target: &AnchorRef,
    surrogate: &Arc<WeakCallbackSurrogate<A, R>>,
  ) {
    let candidate: PinnedRef = surrogate.clone();
    let key = anchor_key(&Arc::downgrade(target));
    let orphans = {
      let mut row = self.pinning.entry(key).or_insert_with(|| {
        let alert = FinalizationAlert::new(move || REGISTRY.release(key));
        Pin { _handle: DependentHandle::new(target, Some(alert)), surrogates: Vec::new() }
      });
      let orphans = row.prune();
      if !row.surrogates.iter().any(|pinned| same_allocation(pinned, &candidate)) {
        candidate.pins().fetch_add(1, Ordering::AcqRel);
        row.surrogates.push(candidate);
      }
      orphans
    };
    // Dropping orphans releases their entries, which may end other
    // instances; the row must not be held by then.
    if !orphans.is_empty() {
      tracing::trace!(pruned = orphans.len(), "pruned unreachable pinned surrogates");
    }
  }

  /// Drop the row of an instance that lost its last owner.
  fn release(&self, key: usize) {
    // The row is dropped after the shard is unlocked: dropping surrogates
    // may end other instances and fire their alerts.
    let released = self.pinning.remove(&key);
    if let Some((_, pin)) = &released {
      tracing::debug!(surrogates = pin.surrogates.len(), "released pinned weak callbacks");
    }
  }

  #[cfg(test)]
  pub(crate) fn pinned_for(&self, target: &AnchorRef) -> usize {
    let key = anchor_key(&Arc::downgrade(target));
    self.pinning.get(&key).map_or(0, |pin| pin.surrogates.len())
  }
}
