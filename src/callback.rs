//! Callable values and strong multicast semantics.
//!
//! A [`Callback`] is an immutable, ordered list of members. Cloning shares the
//! members; combining or removing builds a new list. Invoking a callback calls
//! every member in order and returns what the last one returned.
use std::{
  any::type_name,
  borrow::Cow,
  fmt,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
};

use smallvec::SmallVec;

use crate::{
  handle::{downcast_slot, AnchorRef, Tracked},
  surrogate::WeakCallbackSurrogate,
};

/// A resolved, directly invocable member.
pub type Invoke<A, R> = Arc<dyn Fn(A) -> Option<R> + Send + Sync>;

/// Rebuilds a bound member's callable from its (type-erased) instance.
pub(crate) type Binder<A, R> = Arc<dyn Fn(AnchorRef) -> Option<Invoke<A, R>> + Send + Sync>;

/// Text identity of a bound method. Two bound members with the same text are
/// the same method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(Cow<'static, str>);

impl MethodId {
  #[inline]
  pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&'static str> for MethodId {
  #[inline]
  fn from(name: &'static str) -> Self { MethodId(Cow::Borrowed(name)) }
}

impl From<String> for MethodId {
  #[inline]
  fn from(name: String) -> Self { MethodId(Cow::Owned(name)) }
}

impl fmt::Display for MethodId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Identity of a composite produced by weak combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
  pub(crate) fn fresh() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    CallbackId(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Display for CallbackId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// Call shape shared by every member of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
  pub args: &'static str,
  pub output: &'static str,
}

impl Signature {
  #[inline]
  pub fn of<A, R>() -> Self { Signature { args: type_name::<A>(), output: type_name::<R>() } }
}

impl fmt::Display for Signature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "fn({}) -> {}", self.args, self.output)
  }
}

pub(crate) struct Bound<A, R> {
  pub(crate) method: MethodId,
  pub(crate) target: AnchorRef,
  pub(crate) bind: Binder<A, R>,
}

pub(crate) struct Composite<A, R> {
  pub(crate) id: CallbackId,
  pub(crate) call: Invoke<A, R>,
  pub(crate) surrogate: Arc<WeakCallbackSurrogate<A, R>>,
}

pub(crate) enum Member<A, R> {
  /// An instance method bound to a tracked subscriber.
  Bound(Bound<A, R>),
  /// A plain function, which has no instance and never dies.
  Static(fn(A) -> R),
  /// A closure with no tracked instance; its allocation is its identity.
  Closure(Invoke<A, R>),
  Composite(Composite<A, R>),
}

impl<A, R> Clone for Member<A, R> {
  fn clone(&self) -> Self {
    match self {
      Member::Bound(b) => Member::Bound(Bound {
        method: b.method.clone(),
        target: b.target.clone(),
        bind: b.bind.clone(),
      }),
      Member::Static(f) => Member::Static(*f),
      Member::Closure(c) => Member::Closure(c.clone()),
      Member::Composite(c) => Member::Composite(Composite {
        id: c.id,
        call: c.call.clone(),
        surrogate: c.surrogate.clone(),
      }),
    }
  }
}

#[inline]
pub(crate) fn same_allocation<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
  Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl<A, R> Member<A, R> {
  pub(crate) fn call(&self, args: A) -> Option<R> {
    match self {
      Member::Bound(b) => (b.bind)(b.target.clone()).and_then(|f| f(args)),
      Member::Static(f) => Some(f(args)),
      Member::Closure(c) => c(args),
      Member::Composite(c) => (c.call)(args),
    }
  }

  /// Strong member equality: the same method on the same instance, or the
  /// very same function value.
  fn strong_eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Member::Bound(a), Member::Bound(b)) => {
        a.method == b.method && same_allocation(&a.target, &b.target)
      }
      (Member::Static(a), Member::Static(b)) => *a as usize == *b as usize,
      (Member::Closure(a), Member::Closure(b)) => same_allocation(a, b),
      (Member::Composite(a), Member::Composite(b)) => a.id == b.id,
      _ => false,
    }
  }

  fn describe(&self) -> Cow<'_, str> {
    match self {
      Member::Bound(b) => Cow::Borrowed(b.method.as_str()),
      Member::Static(_) => Cow::Borrowed("<fn>"),
      Member::Closure(_) => Cow::Borrowed("<closure>"),
      Member::Composite(c) => Cow::Owned(format!("<composite {}>", c.id)),
    }
  }
}

type Members<A, R> = SmallVec<[Member<A, R>; 1]>;

/// A multicast callable value.
///
/// # Type Parameters
///
/// - `A`: the argument passed to every member. Members after the first get a
///   clone, the last one receives the moved value.
/// - `R`: the member return type; the callback returns the last member's.
pub struct Callback<A, R = ()> {
  pub(crate) members: Members<A, R>,
}

impl<A, R> Clone for Callback<A, R> {
  #[inline]
  fn clone(&self) -> Self { Callback { members: self.members.clone() } }
}

impl<A: 'static, R: 'static> Callback<A, R> {
  /// Wrap a plain function.
  pub fn from_fn(f: fn(A) -> R) -> Self { Self::single(Member::Static(f)) }

  /// Wrap a closure that captures no tracked instance.
  ///
  /// The returned callback (and its clones) is the only owner of the
  /// closure. A weak combination refers to it weakly, so dropping every
  /// clone removes it from the chain.
  pub fn from_closure(f: impl Fn(A) -> R + Send + Sync + 'static) -> Self {
    Self::single(Member::Closure(Arc::new(move |args| Some(f(args)))))
  }

  /// Bind `method` to the subscriber instance `target`.
  ///
  /// `method` names the method; weak removal matches bound members by this
  /// text alone.
  pub fn bound<T, F>(target: &Tracked<T>, method: impl Into<MethodId>, f: F) -> Self
  where
    T: Send + Sync + 'static,
    F: Fn(&T, A) -> R + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    let bind: Binder<A, R> = Arc::new(move |anchor| {
      let instance = downcast_slot::<T>(anchor)?;
      let f = f.clone();
      let call: Invoke<A, R> = Arc::new(move |args| Some(f(&*instance, args)));
      Some(call)
    });
    Self::single(Member::Bound(Bound { method: method.into(), target: target.anchor(), bind }))
  }

  pub(crate) fn composite(composite: Composite<A, R>) -> Self {
    Self::single(Member::Composite(composite))
  }

  fn single(member: Member<A, R>) -> Self {
    let mut members = Members::new();
    members.push(member);
    Callback { members }
  }

  /// Ordinary strong combination: `a`'s members followed by `b`'s.
  pub fn combine(a: Option<&Self>, b: Option<&Self>) -> Option<Self> {
    match (a, b) {
      (None, None) => None,
      (Some(a), None) => Some(a.clone()),
      (None, Some(b)) => Some(b.clone()),
      (Some(a), Some(b)) => {
        let mut members = a.members.clone();
        members.extend(b.members.iter().cloned());
        Some(Callback { members })
      }
    }
  }

  /// Ordinary strong removal.
  ///
  /// Removes the last contiguous run of `source` equal to `value`'s member
  /// list. Returns `source` unchanged when there is no such run and `None`
  /// when nothing is left.
  pub fn remove(source: Option<&Self>, value: Option<&Self>) -> Option<Self> {
    let source = source?;
    let Some(value) = value else { return Some(source.clone()) };
    let needle = &value.members;
    let haystack = &source.members;
    if needle.len() > haystack.len() {
      return Some(source.clone());
    }
    let start = (0..=haystack.len() - needle.len()).rev().find(|&start| {
      haystack[start..start + needle.len()]
        .iter()
        .zip(needle.iter())
        .all(|(a, b)| a.strong_eq(b))
    });
    let Some(start) = start else { return Some(source.clone()) };
    let members: Members<A, R> = haystack[..start]
      .iter()
      .chain(haystack[start + needle.len()..].iter())
      .cloned()
      .collect();
    (!members.is_empty()).then_some(Callback { members })
  }
}

impl<A, R> Callback<A, R> {
  /// Number of members in the strong list. A weak composite counts as one.
  #[inline]
  pub fn len(&self) -> usize { self.members.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.members.is_empty() }

  /// The composite identity, when this callback is a single weak composite.
  pub fn composite_id(&self) -> Option<CallbackId> {
    match self.members.as_slice() {
      [Member::Composite(c)] => Some(c.id),
      _ => None,
    }
  }

  #[inline]
  pub fn is_composite(&self) -> bool { self.composite_id().is_some() }
}

impl<A: Clone, R> Callback<A, R> {
  /// Invoke every member in order.
  ///
  /// Returns the last member's result; `None` when that member is a weak
  /// composite with no live members.
  pub fn call(&self, args: A) -> Option<R> {
    let mut iter = self.members.iter().peekable();
    let mut result = None;
    while let Some(member) = iter.next() {
      if iter.peek().is_some() {
        result = member.call(args.clone());
      } else {
        result = member.call(args);
        break;
      }
    }
    result
  }
}

impl<A, R> fmt::Debug for Callback<A, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.members.iter().map(|m| m.describe())).finish()
  }
}

/// The resolved live members of a weak callback, in call order.
pub struct InvocationList<A, R> {
  handlers: SmallVec<[Invoke<A, R>; 2]>,
}

impl<A, R> InvocationList<A, R> {
  pub(crate) fn from_handlers(handlers: SmallVec<[Invoke<A, R>; 2]>) -> Option<Self> {
    (!handlers.is_empty()).then_some(InvocationList { handlers })
  }

  #[inline]
  pub fn len(&self) -> usize { self.handlers.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.handlers.is_empty() }
}

impl<A: Clone, R> InvocationList<A, R> {
  /// Call every handler in order; the last handler's result wins.
  ///
  /// `args` is cloned for all handlers except the last one, which receives
  /// the moved value.
  pub fn invoke(&self, args: A) -> Option<R> {
    let mut iter = self.handlers.iter().peekable();
    let mut result = None;
    while let Some(handler) = iter.next() {
      if iter.peek().is_some() {
        result = handler(args.clone());
      } else {
        result = handler(args);
        break;
      }
    }
    result
  }
}

/// Bind an instance method, naming it after its path.
///
/// ```rust
/// use weak_delegate::{bind_method, Callback, Tracked};
///
/// struct Counter;
/// impl Counter {
///   fn on_tick(&self, n: u32) -> u32 { n + 1 }
/// }
///
/// let counter = Tracked::new(Counter);
/// let callback: Callback<u32, u32> = bind_method!(counter, Counter::on_tick);
/// assert_eq!(callback.call(1), Some(2));
/// ```
#[macro_export]
macro_rules! bind_method {
  ($target: expr, $($method: ident)::+) => {
    $crate::Callback::bound(
      &$target,
      concat!(module_path!(), "::", stringify!($($method)::+)),
      |this, args| $($method)::+(this, args),
    )
  };
}
