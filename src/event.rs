//! Named event slots.
//!
//! An event is a slot holding an optional weak composite. Subscribing
//! combines into the slot, unsubscribing removes from it, raising calls it.
use std::{collections::BTreeMap, fmt};

use crate::{
  callback::Callback,
  error::Result,
  weak::{combine_event, remove, remove_from_event},
};

/// A container exposing event slots by name.
///
/// This is how [`remove_from_event`] finds the backing slot of a named event.
/// Implement it by matching on the name:
///
/// ```rust
/// use weak_delegate::{Callback, EventFields};
///
/// struct Collection {
///   changed: Option<Callback<usize>>,
/// }
///
/// impl EventFields<usize, ()> for Collection {
///   fn event_slot(&mut self, name: &str) -> Option<&mut Option<Callback<usize>>> {
///     match name {
///       "changed" => Some(&mut self.changed),
///       _ => None,
///     }
///   }
/// }
/// ```
pub trait EventFields<A, R> {
  fn event_slot(&mut self, name: &str) -> Option<&mut Option<Callback<A, R>>>;
}

/// A single event whose handlers hold their subscribers weakly.
pub struct Event<A, R = ()> {
  handlers: Option<Callback<A, R>>,
}

impl<A, R> Default for Event<A, R> {
  fn default() -> Self { Event { handlers: None } }
}

impl<A: Clone + 'static, R: 'static> Event<A, R> {
  #[inline]
  pub fn new() -> Self { Self::default() }

  /// Append `handler` to the end of the chain.
  pub fn subscribe(&mut self, handler: &Callback<A, R>) {
    self.handlers = combine_event(self.handlers.as_ref(), Some(handler));
  }

  /// Remove every handler matching `handler`.
  pub fn unsubscribe(&mut self, handler: &Callback<A, R>) {
    self.handlers = remove(self.handlers.as_ref(), Some(handler));
  }

  /// Call every live handler; `None` when none ran.
  pub fn raise(&self, args: A) -> Option<R> { self.handlers.as_ref()?.call(args) }

  #[inline]
  pub fn is_empty(&self) -> bool { self.handlers.is_none() }

  #[inline]
  pub fn handlers(&self) -> Option<&Callback<A, R>> { self.handlers.as_ref() }
}

impl<A, R> fmt::Debug for Event<A, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Event").field("handlers", &self.handlers).finish()
  }
}

/// Events of one call shape, addressed by name.
pub struct EventSet<A, R = ()> {
  events: BTreeMap<String, Option<Callback<A, R>>>,
}

impl<A, R> Default for EventSet<A, R> {
  fn default() -> Self { EventSet { events: BTreeMap::new() } }
}

impl<A: Clone + 'static, R: 'static> EventSet<A, R> {
  #[inline]
  pub fn new() -> Self { Self::default() }

  /// Declare an event. Declaring an existing name keeps its handlers.
  pub fn declare(&mut self, name: impl Into<String>) -> &mut Self {
    self.events.entry(name.into()).or_insert(None);
    self
  }

  /// Subscribe `handler` to the event `name`, declaring it when needed.
  pub fn subscribe(&mut self, name: &str, handler: &Callback<A, R>) {
    let slot = self.events.entry(name.to_string()).or_insert(None);
    *slot = combine_event(slot.as_ref(), Some(handler));
  }

  pub fn unsubscribe(&mut self, name: &str, handler: &Callback<A, R>) -> Result<()> {
    remove_from_event(Some(self), name, Some(handler))
  }

  /// Raise the event `name`; `None` when it has no live handler or does not
  /// exist.
  pub fn raise(&self, name: &str, args: A) -> Option<R> {
    self.events.get(name)?.as_ref()?.call(args)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> { self.events.keys().map(String::as_str) }
}

impl<A, R> EventFields<A, R> for EventSet<A, R> {
  fn event_slot(&mut self, name: &str) -> Option<&mut Option<Callback<A, R>>> {
    self.events.get_mut(name)
  }
}
