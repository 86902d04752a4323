//! Prelude module for convenient imports

pub use crate::{
  alert::FinalizationAlert,
  bind_method,
  callback::{Callback, CallbackId, InvocationList, Invoke, MethodId, Signature},
  config::Config,
  entry::CallbackEntry,
  error::{Error, Result},
  event::{Event, EventFields, EventSet},
  handle::{Tracked, WeakTracked},
  scheduler::AlertScheduler,
  surrogate::WeakCallbackSurrogate,
  weak::{combine, combine_event, remove, remove_from_event, surrogate_of},
};
