#![forbid(unsafe_code)]

//! Bridge between a push-based node [`Registry`](rxb_registry::Registry) and
//! pull-based UI scopes.
//!
//! Every bridge call takes the owning [`Scope`](rxb_reactive::Scope),
//! resolves the registry from its context (see [`context`]), and ties its
//! subscriptions and mounts to that scope: disposing the scope stops all
//! delivery.
//!
//! | Call | Result |
//! |------|--------|
//! | [`bridge_read`], [`bridge_read_map`], [`bridge_read_map_keyed`] | accessor following a node |
//! | [`bridge_read_write`] | accessor plus [`Setter`] |
//! | [`bridge_set`], [`bridge_mount`], [`bridge_refresh`] | mount only |
//! | [`bridge_suspense`], [`bridge_suspense_success`] | resource over an async node |
//! | [`bridge_resource_set`] | resource driven by writes |
//! | [`bridge_ref`], [`bridge_ref_prop`] | accessor / focused ref over an [`RxRef`](rxb_registry::RxRef) |
//! | [`extract_state`], [`apply_hydration`] | state transfer |
//!
//! # Example
//!
//! ```
//! use rxb_bridge::{bridge_read_write, provide_registry};
//! use rxb_reactive::Scope;
//! use rxb_registry::{Atom, Registry};
//!
//! let scope = Scope::root();
//! provide_registry(&scope, Registry::default());
//!
//! let count = Atom::make(0);
//! let (read, write) = bridge_read_write(&scope, &count).unwrap();
//! for _ in 0..3 {
//!     write.update(|n| n + 1).unwrap();
//! }
//! assert_eq!(read.get(), 3);
//! ```

pub mod context;
pub mod error;
pub mod hydration;
pub mod mount;
pub mod reference;
pub mod suspense;
pub mod value;

pub use context::{
    BridgeRuntime, global_runtime, provide_registry, provide_state, resolve_registry,
    resolve_registry_strict,
};
pub use error::{BridgeError, Result};
pub use hydration::{
    HydrationRecord, HydrationReport, StateExtractor, apply_hydration, bridge_hydrate,
    extract_state, state_extractor,
};
pub use mount::{Refresher, bridge_mount, bridge_refresh, bridge_set};
pub use reference::{bridge_ref, bridge_ref_prop, bridge_ref_prop_value};
pub use suspense::{
    ResourceSet, SuccessResource, SuspenseOptions, bridge_resource_set, bridge_suspense,
    bridge_suspense_success,
};
pub use value::{
    Setter, WriteRequest, bridge_effect, bridge_read, bridge_read_map, bridge_read_map_keyed,
    bridge_read_write, bridge_subscribe,
};
