//! Weak combination and removal.
//!
//! [`combine`] returns a composite [`Callback`] whose members hold their
//! subscribers weakly. Each call of the composite asks the registry for its
//! surrogate and runs the members alive at that moment.
use std::sync::Arc;

use crate::{
  callback::{Callback, CallbackId, Composite},
  error::{Error, Result},
  event::EventFields,
  registry::REGISTRY,
  surrogate::WeakCallbackSurrogate,
  trampoline,
};

enum Operand<'a, A, R> {
  /// A composite we built earlier; contributes its surrogate's entries.
  Tracked(Arc<WeakCallbackSurrogate<A, R>>),
  /// Anything else; contributes one new entry per member.
  Raw(&'a Callback<A, R>),
}

fn operand<A: 'static, R: 'static>(callback: &Callback<A, R>) -> Operand<'_, A, R> {
  match surrogate_of(callback) {
    Some(surrogate) => Operand::Tracked(surrogate),
    None => Operand::Raw(callback),
  }
}

/// The surrogate behind a weak composite, if `callback` is one.
pub fn surrogate_of<A: 'static, R: 'static>(
  callback: &Callback<A, R>,
) -> Option<Arc<WeakCallbackSurrogate<A, R>>> {
  REGISTRY.lookup(callback.composite_id()?)
}

/// Combine two callbacks into a weak composite, `first` running before
/// `last`.
///
/// Fails with [`Error::BothAbsent`] when neither is given; see
/// [`combine_event`] for the lenient form.
pub fn combine<A, R>(first: Option<&Callback<A, R>>, last: Option<&Callback<A, R>>) -> Result<Callback<A, R>>
where
  A: Clone + 'static,
  R: 'static,
{
  combine_event(first, last).ok_or(Error::BothAbsent)
}

/// Event-style [`combine`]: two absent callbacks combine into `None`.
///
/// ```rust
/// use weak_delegate::{combine_event, Callback, Tracked};
///
/// struct Window;
/// impl Window {
///   fn on_resize(&self, (w, h): (u32, u32)) -> u32 { w * h }
/// }
///
/// let window = Tracked::new(Window);
/// let handler = Callback::bound(&window, "Window::on_resize", Window::on_resize);
/// let resized = combine_event(None, Some(&handler)).unwrap();
/// drop(handler);
/// assert_eq!(resized.call((4, 3)), Some(12));
///
/// drop(window);
/// assert_eq!(resized.call((4, 3)), None);
/// ```
pub fn combine_event<A, R>(
  first: Option<&Callback<A, R>>,
  last: Option<&Callback<A, R>>,
) -> Option<Callback<A, R>>
where
  A: Clone + 'static,
  R: 'static,
{
  use Operand::{Raw, Tracked};
  let surrogate = match (first.map(operand), last.map(operand)) {
    (None, None) => return None,
    (Some(Tracked(a)), Some(Tracked(b))) => a.concatenated(&b),
    (Some(Tracked(a)), Some(Raw(b))) => a.with_appended(b),
    (Some(Raw(a)), Some(Tracked(b))) => b.with_prepended(a),
    (Some(Raw(a)), Some(Raw(b))) => WeakCallbackSurrogate::create_pair(a, b),
    (Some(Tracked(s)), None) | (None, Some(Tracked(s))) => s.clone_surrogate(),
    (Some(Raw(c)), None) | (None, Some(Raw(c))) => WeakCallbackSurrogate::create(c),
  };
  let composite = publish(surrogate);
  tracing::debug!(id = ?composite.composite_id(), "combined weak callback");
  Some(composite)
}

/// Remove `value` from `source`.
///
/// A weak composite `source` yields a new composite without any live entry
/// matching `value` (every match goes, not just the last). Any other
/// `source` falls back to [`Callback::remove`]. `None` when nothing is left.
pub fn remove<A, R>(source: Option<&Callback<A, R>>, value: Option<&Callback<A, R>>) -> Option<Callback<A, R>>
where
  A: Clone + 'static,
  R: 'static,
{
  let source = source?;
  let Some(surrogate) = surrogate_of(source) else {
    return Callback::remove(Some(source), value);
  };
  let Some(value) = value else { return Some(source.clone()) };
  let reduced = match operand(value) {
    Operand::Tracked(other) => surrogate.remove_surrogate(&other),
    Operand::Raw(value) => surrogate.remove(value),
  };
  tracing::debug!(
    source = ?source.composite_id(),
    before = surrogate.len(),
    after = reduced.len(),
    "removed from weak callback"
  );
  (!reduced.is_empty()).then(|| publish(reduced))
}

/// Remove `value` from the event slot `name` of `container`, writing the
/// result back.
pub fn remove_from_event<A, R, C>(
  container: Option<&mut C>,
  name: &str,
  value: Option<&Callback<A, R>>,
) -> Result<()>
where
  A: Clone + 'static,
  R: 'static,
  C: EventFields<A, R> + ?Sized,
{
  let container = container.ok_or(Error::MissingContainer)?;
  if name.trim().is_empty() {
    return Err(Error::BlankEventName);
  }
  let slot = container
    .event_slot(name)
    .ok_or_else(|| Error::UnknownEvent(name.to_string()))?;
  *slot = remove(slot.as_ref(), value);
  Ok(())
}

/// Register `surrogate` under a fresh identity, pin it to its subscribers and
/// wrap it into a composite callback.
fn publish<A, R>(surrogate: Arc<WeakCallbackSurrogate<A, R>>) -> Callback<A, R>
where
  A: Clone + 'static,
  R: 'static,
{
  let id = CallbackId::fresh();
  REGISTRY.register(id, &surrogate);
  for entry in surrogate.entries().iter() {
    if let Some(target) = entry.handle().and_then(|handle| handle.try_primary()) {
      REGISTRY.pin(&target, &surrogate);
    }
  }
  let call = trampoline::build(surrogate.signature(), move || {
    REGISTRY.lookup::<A, R>(id)?.live_invocation_list()
  });
  Callback::composite(Composite { id, call, surrogate })
}
