//! Turns a resolver into a callable of the composite's call shape.
//!
//! The resolver is asked afresh on every call, so a composite always runs
//! whatever is alive at that moment. When it resolves nothing the call is a
//! no-op returning `None`.
use std::sync::Arc;

use crate::callback::{InvocationList, Invoke, Signature};

pub fn build<A, R, F>(signature: Signature, resolver: F) -> Invoke<A, R>
where
  A: Clone + 'static,
  R: 'static,
  F: Fn() -> Option<InvocationList<A, R>> + Send + Sync + 'static,
{
  tracing::trace!(%signature, "building trampoline");
  Arc::new(move |args| resolver()?.invoke(args))
}
