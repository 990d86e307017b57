#![forbid(unsafe_code)]

//! Pull-based UI primitives.
//!
//! - [`Scope`]: explicit owner for teardown, context and per-scope memos.
//! - [`create_signal`]: a cell split into [`Accessor`] and [`Signal`].
//! - [`Resource`]: an asynchronously settled value with a loading state.
//! - [`create_effect`]: rerun a callback whenever an accessor changes.
//! - [`TaskQueue`]: deterministic deferred work.
//!
//! All types are single-threaded.

pub mod effect;
pub mod resource;
pub mod scope;
pub mod signal;
pub mod task;

pub use effect::create_effect;
pub use resource::{Resolver, Resource, ResourceSnapshot};
pub use scope::{Scope, ScopeId};
pub use signal::{Accessor, Signal, Watch, create_signal};
pub use task::{Task, TaskQueue};
