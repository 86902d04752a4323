//! # weak_delegate: multicast callbacks with weak subscribers
//!
//! Subscribing an instance method to a weak composite does not keep the
//! instance alive. Once the last owner of the instance goes away its member
//! silently drops out of the chain.
//!
//! ## Quick Start
//!
//! ```rust
//! use weak_delegate::prelude::*;
//!
//! struct Logger;
//! impl Logger {
//!   fn on_message(&self, msg: &'static str) { println!("{msg}"); }
//! }
//!
//! let logger = Tracked::new(Logger);
//! let mut messages = Event::new();
//! messages.subscribe(&bind_method!(logger, Logger::on_message));
//! assert_eq!(messages.raise("hello"), Some(()));
//!
//! drop(logger);
//! assert_eq!(messages.raise("nobody listens"), None);
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Tracked`] | Shared owner of a subscriber instance |
//! | [`Callback`] | Multicast callable value, strong or weak composite |
//! | [`combine`] / [`remove`] | Weak combination and removal |
//! | [`WeakCallbackSurrogate`] | Copy-on-write entry list behind a composite |
//! | [`Event`] / [`EventSet`] | Event slots built on weak composites |
//!
//! ## Feature Flags
//!
//! - **`futures-scheduler`** (default): finalization alerts run on a shared
//!   futures thread pool
//! - **`tokio-scheduler`**: alerts may run on the tokio blocking pool
pub mod alert;
pub mod callback;
pub mod config;
pub mod entry;
pub mod error;
pub mod event;
pub mod handle;
pub mod prelude;
mod registry;
pub mod scheduler;
pub mod surrogate;
pub mod trampoline;
pub mod weak;

pub use prelude::*;
