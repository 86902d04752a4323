use std::{
  fmt,
  sync::{atomic::AtomicUsize, Arc, Weak},
};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
  callback::{Callback, InvocationList, Member, Signature},
  entry::{CallbackEntry, Trigger},
};

pub type Entries<A, R> = Vec<Arc<CallbackEntry<A, R>>>;

/// The backing object of a weak composite: an ordered, copy-on-write list of
/// weak entries.
///
/// # Design
///
/// - **Copy-on-write**: `entries` is only ever replaced as a whole. Readers
///   take a lock-free snapshot, so an invocation sees either the list from
///   before a compaction or the one after, never a half-edited one.
/// - **Single writer**: compaction is the only in-place writer and it
///   serializes on `compaction`. Every other operation builds a new
///   surrogate.
/// - **Triggers**: an entry compacts the surrogate it was created for. Entries
///   shared with a derived surrogate keep compacting their origin, so every
///   derived surrogate starts from the live entries only.
pub struct WeakCallbackSurrogate<A, R> {
  signature: Signature,
  entries: ArcSwap<Entries<A, R>>,
  compaction: Mutex<()>,
  /// Pin rows currently holding this surrogate.
  pub(crate) pins: AtomicUsize,
}

impl<A: 'static, R: 'static> WeakCallbackSurrogate<A, R> {
  /// Build a surrogate whose new entries get a trigger bound to itself.
  fn assemble(build: impl FnOnce(&Trigger) -> Entries<A, R>) -> Arc<Self> {
    Arc::new_cyclic(|this: &Weak<Self>| {
      let this = this.clone();
      let trigger: Trigger = Arc::new(move || {
        if let Some(surrogate) = this.upgrade() {
          surrogate.compact();
        }
      });
      WeakCallbackSurrogate {
        signature: Signature::of::<A, R>(),
        entries: ArcSwap::from_pointee(build(&trigger)),
        compaction: Mutex::new(()),
        pins: AtomicUsize::new(0),
      }
    })
  }

  fn from_entries(entries: Entries<A, R>) -> Arc<Self> { Self::assemble(|_| entries) }

  /// Live entries of the published list, in order.
  fn live_entries(&self) -> Entries<A, R> {
    self.entries.load().iter().filter(|entry| entry.is_alive()).cloned().collect()
  }

  fn break_out(members: &[Member<A, R>], trigger: &Trigger) -> Entries<A, R> {
    members
      .iter()
      .map(|member| Arc::new(CallbackEntry::new(member, Some(trigger))))
      .collect()
  }

  /// A fresh surrogate over one raw callback.
  pub(crate) fn create(callback: &Callback<A, R>) -> Arc<Self> {
    Self::assemble(|trigger| Self::break_out(&callback.members, trigger))
  }

  /// A fresh surrogate over two raw callbacks, `a` first.
  pub(crate) fn create_pair(a: &Callback<A, R>, b: &Callback<A, R>) -> Arc<Self> {
    Self::assemble(|trigger| {
      let mut entries = Self::break_out(&a.members, trigger);
      entries.extend(Self::break_out(&b.members, trigger));
      entries
    })
  }

  /// `self`'s live entries followed by new entries for `callback`.
  pub(crate) fn with_appended(&self, callback: &Callback<A, R>) -> Arc<Self> {
    let mut entries = self.live_entries();
    Self::assemble(|trigger| {
      entries.extend(Self::break_out(&callback.members, trigger));
      entries
    })
  }

  /// New entries for `callback` followed by `self`'s live entries.
  pub(crate) fn with_prepended(&self, callback: &Callback<A, R>) -> Arc<Self> {
    let inherited = self.live_entries();
    Self::assemble(|trigger| {
      let mut entries = Self::break_out(&callback.members, trigger);
      entries.extend(inherited);
      entries
    })
  }

  /// `self`'s live entries followed by `other`'s; no entry changes its trigger.
  pub(crate) fn concatenated(&self, other: &Self) -> Arc<Self> {
    let mut entries = self.live_entries();
    entries.extend(other.live_entries());
    Self::from_entries(entries)
  }

  pub(crate) fn clone_surrogate(&self) -> Arc<Self> { Self::from_entries(self.live_entries()) }

  /// Live entries of `self` that match none of `callback`'s members.
  ///
  /// Every matching entry goes, not only the last occurrence.
  pub(crate) fn remove(&self, callback: &Callback<A, R>) -> Arc<Self> {
    let probes: SmallVec<[CallbackEntry<A, R>; 1]> =
      callback.members.iter().map(|member| CallbackEntry::new(member, None)).collect();
    self.retain_unmatched(|entry| probes.iter().any(|probe| probe == entry))
  }

  /// Live entries of `self` that match no entry of `other`.
  pub(crate) fn remove_surrogate(&self, other: &Self) -> Arc<Self> {
    let others = other.entries.load_full();
    self.retain_unmatched(|entry| others.iter().any(|o| **o == *entry))
  }

  fn retain_unmatched(&self, is_match: impl Fn(&CallbackEntry<A, R>) -> bool) -> Arc<Self> {
    let entries = self
      .entries
      .load()
      .iter()
      .filter(|entry| entry.is_alive() && !is_match(&***entry))
      .cloned()
      .collect();
    Self::from_entries(entries)
  }
}

impl<A, R> WeakCallbackSurrogate<A, R> {
  /// Drop dead entries.
  ///
  /// Publishes a new list only when something died, so running it again
  /// with no new deaths leaves the published list untouched.
  pub fn compact(&self) {
    let _guard = self.compaction.lock();
    let current = self.entries.load_full();
    let (alive, dead): (Entries<A, R>, Entries<A, R>) =
      current.iter().cloned().partition(|entry| entry.is_alive());
    for entry in &dead {
      entry.dispose();
    }
    if alive.len() != current.len() {
      tracing::debug!(
        signature = %self.signature,
        before = current.len(),
        after = alive.len(),
        "compacted weak callback"
      );
      self.entries.store(Arc::new(alive));
    }
  }

  /// Resolve every entry in order into a single invocation list.
  ///
  /// Dead entries are skipped even if compaction has not removed them yet.
  /// `None` when nothing resolves.
  pub fn live_invocation_list(&self) -> Option<InvocationList<A, R>> {
    let current = self.entries.load();
    let handlers = current.iter().filter_map(|entry| entry.try_resolve()).collect();
    InvocationList::from_handlers(handlers)
  }

  #[inline]
  pub fn signature(&self) -> Signature { self.signature }

  /// Entries currently published, dead or alive.
  #[inline]
  pub fn len(&self) -> usize { self.entries.load().len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.entries.load().is_empty() }

  pub fn live_len(&self) -> usize { self.entries.load().iter().filter(|e| e.is_alive()).count() }

  /// Snapshot of the published entries.
  #[inline]
  pub fn entries(&self) -> Arc<Entries<A, R>> { self.entries.load_full() }
}

impl<A, R> fmt::Debug for WeakCallbackSurrogate<A, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WeakCallbackSurrogate")
      .field("signature", &self.signature)
      .field("entries", &*self.entries.load_full())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex as StdMutex;

  use super::*;
  use crate::Tracked;

  struct Listener {
    name: &'static str,
    log: Arc<StdMutex<Vec<String>>>,
  }

  impl Listener {
    fn on_event(&self, v: i32) -> i32 {
      self.log.lock().unwrap().push(format!("{}:{v}", self.name));
      v
    }
  }

  struct Fixture {
    log: Arc<StdMutex<Vec<String>>>,
  }

  impl Fixture {
    fn new() -> Self { Fixture { log: Arc::new(StdMutex::new(Vec::new())) } }

    fn listener(&self, name: &'static str) -> (Tracked<Listener>, Callback<i32, i32>) {
      let listener = Tracked::new(Listener { name, log: self.log.clone() });
      let cb = Callback::bound(&listener, "Listener::on_event", Listener::on_event);
      (listener, cb)
    }

    fn calls(&self) -> Vec<String> { std::mem::take(&mut *self.log.lock().unwrap()) }
  }

  fn run(surrogate: &WeakCallbackSurrogate<i32, i32>, v: i32) -> Option<i32> {
    surrogate.live_invocation_list().and_then(|list| list.invoke(v))
  }

  #[test]
  fn preserves_call_order() {
    let fx = Fixture::new();
    let (_a, ca) = fx.listener("a");
    let (_b, cb) = fx.listener("b");
    let (_c, cc) = fx.listener("c");

    let ab = WeakCallbackSurrogate::create_pair(&ca, &cb);
    let abc = ab.with_appended(&cc);
    assert_eq!(run(&abc, 1), Some(1));
    assert_eq!(fx.calls(), vec!["a:1", "b:1", "c:1"]);

    // Extending builds a new surrogate; the old one keeps its snapshot.
    assert_eq!(ab.len(), 2);
    run(&ab, 2);
    assert_eq!(fx.calls(), vec!["a:2", "b:2"]);

    let cab = ab.with_prepended(&cc);
    run(&cab, 3);
    assert_eq!(fx.calls(), vec!["c:3", "a:3", "b:3"]);
  }

  #[test]
  fn dead_entries_skipped_before_compaction() {
    let fx = Fixture::new();
    let (a, ca) = fx.listener("a");
    let (b, cb) = fx.listener("b");
    let (c, cc) = fx.listener("c");
    let abc = WeakCallbackSurrogate::create_pair(&ca, &cb).with_appended(&cc);
    drop((ca, cb, cc));

    drop(b);
    run(&abc, 1);
    assert_eq!(fx.calls(), vec!["a:1", "c:1"]);
    assert_eq!(abc.live_len(), 2);

    abc.compact();
    assert_eq!(abc.len(), 2);
    run(&abc, 2);
    assert_eq!(fx.calls(), vec!["a:2", "c:2"]);

    drop((a, c));
    assert!(abc.live_invocation_list().is_none());
  }

  #[test]
  fn compaction_is_idempotent() {
    let fx = Fixture::new();
    let (a, ca) = fx.listener("a");
    let (_b, cb) = fx.listener("b");
    let s = WeakCallbackSurrogate::create_pair(&ca, &cb);
    drop(ca);

    let untouched = s.entries();
    s.compact();
    assert!(Arc::ptr_eq(&untouched, &s.entries()));

    drop(a);
    s.compact();
    let first = s.entries();
    assert_eq!(first.len(), 1);
    s.compact();
    assert!(Arc::ptr_eq(&first, &s.entries()));
  }

  #[test]
  fn concatenation_keeps_both_orders() {
    let fx = Fixture::new();
    let (_a, ca) = fx.listener("a");
    let (_b, cb) = fx.listener("b");
    let (_c, cc) = fx.listener("c");
    let x = WeakCallbackSurrogate::create_pair(&ca, &cb);
    let y = WeakCallbackSurrogate::create(&cc);
    let xy = x.concatenated(&y);
    run(&xy, 0);
    assert_eq!(fx.calls(), vec!["a:0", "b:0", "c:0"]);

    // Shared entries, not copies.
    assert!(Arc::ptr_eq(&xy.entries()[2], &y.entries()[0]));
  }

  #[test]
  fn remove_strips_every_match() {
    let fx = Fixture::new();
    let (_a, ca) = fx.listener("a");
    let (_b, cb) = fx.listener("b");
    let adder = Callback::from_fn(|v: i32| v + 100);
    let s = WeakCallbackSurrogate::create_pair(&ca, &adder)
      .with_appended(&cb)
      .with_appended(&adder);
    assert_eq!(s.len(), 4);

    let without_adder = s.remove(&adder);
    assert_eq!(without_adder.len(), 2);
    assert_eq!(run(&without_adder, 1), Some(1));
    fx.calls();

    // Bound entries match by method name, so both listeners go.
    let without_listeners = s.remove(&ca);
    assert_eq!(without_listeners.len(), 2);
    assert_eq!(run(&without_listeners, 1), Some(101));
    assert!(fx.calls().is_empty());
  }

  #[test]
  fn remove_without_match_is_equivalent() {
    let fx = Fixture::new();
    let (_a, ca) = fx.listener("a");
    let (_b, cb) = fx.listener("b");
    let s = WeakCallbackSurrogate::create_pair(&ca, &cb);
    let unrelated = Callback::from_closure(|v: i32| v);
    let same = s.remove(&unrelated);
    run(&same, 4);
    assert_eq!(fx.calls(), vec!["a:4", "b:4"]);
  }

  #[test]
  fn remove_drops_dead_entries() {
    let fx = Fixture::new();
    let (a, ca) = fx.listener("a");
    let (_b, cb) = fx.listener("b");
    let s = WeakCallbackSurrogate::create_pair(&ca, &cb);
    drop((a, ca));
    let unrelated = Callback::from_fn(|v: i32| v);
    assert_eq!(s.remove(&unrelated).len(), 1);
  }

  #[test]
  fn remove_surrogate_uses_entry_equality() {
    let closure = Callback::from_closure(|v: i32| v * 10);
    let fx = Fixture::new();
    let (_a, ca) = fx.listener("a");
    let s = WeakCallbackSurrogate::create_pair(&ca, &closure);
    let other = WeakCallbackSurrogate::create(&closure);
    let left = s.remove_surrogate(&other);
    assert_eq!(left.len(), 1);
    run(&left, 1);
    assert_eq!(fx.calls(), vec!["a:1"]);
  }

  #[test]
  fn derived_surrogates_leave_dead_entries_behind() {
    let fx = Fixture::new();
    let (a, ca) = fx.listener("a");
    let (_b, cb) = fx.listener("b");
    let (_c, cc) = fx.listener("c");
    let ab = WeakCallbackSurrogate::create_pair(&ca, &cb);
    drop((a, ca));
    // The dead entry keeps compacting `ab` only; derived lists skip it.
    assert_eq!(ab.with_appended(&cc).len(), 2);
    assert_eq!(ab.with_prepended(&cc).len(), 2);
    assert_eq!(ab.clone_surrogate().len(), 1);
    assert_eq!(ab.concatenated(&WeakCallbackSurrogate::create(&cc)).len(), 2);

    let cab = ab.with_prepended(&cc);
    run(&cab, 5);
    assert_eq!(fx.calls(), vec!["c:5", "b:5"]);
  }

  #[test]
  fn clone_shares_entries() {
    let fx = Fixture::new();
    let (_a, ca) = fx.listener("a");
    let s = WeakCallbackSurrogate::create(&ca);
    let copy = s.clone_surrogate();
    assert!(Arc::ptr_eq(&s.entries()[0], &copy.entries()[0]));
    assert_eq!(copy.signature(), Signature::of::<i32, i32>());
  }

  #[test]
  fn death_compacts_origin_surrogate() {
    let fx = Fixture::new();
    let (a, ca) = fx.listener("a");
    let (_b, cb) = fx.listener("b");
    let s = WeakCallbackSurrogate::create_pair(&ca, &cb);
    drop((a, ca));

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while s.len() != 1 && std::time::Instant::now() < deadline {
      std::thread::yield_now();
    }
    assert_eq!(s.len(), 1);
  }

  #[test]
  fn concurrent_compaction_and_invocation() {
    let fx = Fixture::new();
    let mut owners = Vec::new();
    let mut surrogate: Option<Arc<WeakCallbackSurrogate<i32, i32>>> = None;
    let names = ["l0", "l1", "l2", "l3", "l4", "l5", "l6", "l7"];
    for name in names {
      let (owner, cb) = fx.listener(name);
      owners.push(owner);
      surrogate = Some(match surrogate {
        None => WeakCallbackSurrogate::create(&cb),
        Some(s) => s.with_appended(&cb),
      });
    }
    let surrogate = surrogate.unwrap();

    let readers: Vec<_> = (0..4)
      .map(|_| {
        let s = surrogate.clone();
        std::thread::spawn(move || {
          for i in 0..200 {
            run(&s, i);
          }
        })
      })
      .collect();
    let compactors: Vec<_> = (0..2)
      .map(|_| {
        let s = surrogate.clone();
        std::thread::spawn(move || {
          for _ in 0..200 {
            s.compact();
          }
        })
      })
      .collect();
    // Kill the odd listeners while everything runs.
    let survivors: Vec<_> =
      owners.into_iter().enumerate().filter(|(i, _)| i % 2 == 0).map(|(_, o)| o).collect();
    for handle in readers.into_iter().chain(compactors) {
      handle.join().unwrap();
    }

    surrogate.compact();
    assert_eq!(surrogate.len(), 4);
    fx.calls();
    run(&surrogate, 9);
    assert_eq!(fx.calls(), vec!["l0:9", "l2:9", "l4:9", "l6:9"]);
    drop(survivors);
  }
}
