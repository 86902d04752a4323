use std::{
  fmt,
  sync::{Arc, Weak},
};

use crate::{
  alert::FinalizationAlert,
  callback::{same_allocation, Binder, Invoke, Member, MethodId},
  handle::DependentHandle,
};

/// Zero-argument hook that compacts the surrogate an entry was created for.
pub(crate) type Trigger = Arc<dyn Fn() + Send + Sync>;

enum Descriptor<A, R> {
  /// An instance method; the instance is held through a weak handle whose
  /// companion alert runs the compaction trigger.
  Bound { method: MethodId, handle: DependentHandle, bind: Binder<A, R> },
  /// A plain function has no instance to outlive.
  Static { f: fn(A) -> R, call: Invoke<A, R> },
  /// A closure or nested composite, held weakly with no companion. These
  /// never schedule compaction themselves and are swept when another entry
  /// of the same surrogate dies.
  Unbound(Weak<dyn Fn(A) -> Option<R> + Send + Sync>),
}

/// One member of a weak invocation list.
///
/// Never holds a strong reference to a bound instance or to a wrapped
/// closure. Once its handle stops resolving the entry is dead for good.
pub struct CallbackEntry<A, R> {
  descriptor: Descriptor<A, R>,
}

impl<A: 'static, R: 'static> CallbackEntry<A, R> {
  /// Break `member` out into a weak entry.
  ///
  /// A bound member attaches a finalization alert running `trigger` to its
  /// instance. Passing no trigger builds a probe that only serves for
  /// equality, as removal does.
  pub(crate) fn new(member: &Member<A, R>, trigger: Option<&Trigger>) -> Self {
    let descriptor = match member {
      Member::Bound(b) => {
        let companion = trigger.map(|trigger| {
          let trigger = trigger.clone();
          FinalizationAlert::new(move || trigger())
        });
        Descriptor::Bound {
          method: b.method.clone(),
          handle: DependentHandle::new(&b.target, companion),
          bind: b.bind.clone(),
        }
      }
      Member::Static(f) => {
        let f = *f;
        Descriptor::Static { f, call: Arc::new(move |args| Some(f(args))) }
      }
      Member::Closure(c) => Descriptor::Unbound(Arc::downgrade(c)),
      Member::Composite(c) => Descriptor::Unbound(Arc::downgrade(&c.call)),
    };
    CallbackEntry { descriptor }
  }
}

impl<A, R> CallbackEntry<A, R> {
  /// Whether the weak handle still resolves. Does not take a strong
  /// reference.
  pub fn is_alive(&self) -> bool {
    match &self.descriptor {
      Descriptor::Bound { handle, .. } => handle.is_alive(),
      Descriptor::Static { .. } => true,
      Descriptor::Unbound(weak) => weak.strong_count() > 0,
    }
  }

  /// The current callable, or `None` once the entry is dead.
  pub fn try_resolve(&self) -> Option<Invoke<A, R>> {
    match &self.descriptor {
      Descriptor::Bound { handle, bind, .. } => bind(handle.try_primary()?),
      Descriptor::Static { call, .. } => Some(call.clone()),
      Descriptor::Unbound(weak) => weak.upgrade(),
    }
  }

  #[inline]
  pub fn method(&self) -> Option<&MethodId> {
    match &self.descriptor {
      Descriptor::Bound { method, .. } => Some(method),
      _ => None,
    }
  }

  #[inline]
  pub(crate) fn handle(&self) -> Option<&DependentHandle> {
    match &self.descriptor {
      Descriptor::Bound { handle, .. } => Some(handle),
      _ => None,
    }
  }

  /// Release the companion alert. Idempotent.
  pub(crate) fn dispose(&self) {
    if let Descriptor::Bound { handle, .. } = &self.descriptor {
      handle.free();
    }
  }
}

/// Removal matching.
///
/// Bound entries match on method text alone, whatever instance they are
/// bound to. Unbound entries match when both still resolve to the very same
/// function value.
impl<A, R> PartialEq for CallbackEntry<A, R> {
  fn eq(&self, other: &Self) -> bool {
    match (&self.descriptor, &other.descriptor) {
      (Descriptor::Bound { method: a, .. }, Descriptor::Bound { method: b, .. }) => {
        a.as_str() == b.as_str()
      }
      (Descriptor::Static { f: a, .. }, Descriptor::Static { f: b, .. }) => {
        *a as usize == *b as usize
      }
      (Descriptor::Unbound(a), Descriptor::Unbound(b)) => match (a.upgrade(), b.upgrade()) {
        (Some(a), Some(b)) => same_allocation(&a, &b),
        _ => false,
      },
      _ => false,
    }
  }
}

impl<A, R> fmt::Debug for CallbackEntry<A, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let kind = match &self.descriptor {
      Descriptor::Bound { method, .. } => method.as_str(),
      Descriptor::Static { .. } => "<fn>",
      Descriptor::Unbound(_) => "<closure>",
    };
    f.debug_struct("CallbackEntry")
      .field("kind", &kind)
      .field("alive", &self.is_alive())
      .finish()
  }
}
