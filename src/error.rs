//! Argument validation failures.
//!
//! A weak handle that no longer resolves is not an error: it shows up as
//! `None` and the member is skipped. Everything here is a precondition
//! violation reported synchronously to the caller.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// `combine` was asked to merge two absent callbacks.
  #[error("both callbacks passed to combine are absent")]
  BothAbsent,
  /// `remove_from_event` was called without a container.
  #[error("the event container is absent")]
  MissingContainer,
  #[error("event name must not be empty or blank")]
  BlankEventName,
  /// The container exposes no event slot with this name.
  #[error("no event named `{0}` exists on the container")]
  UnknownEvent(String),
}

pub type Result<T> = std::result::Result<T, Error>;
