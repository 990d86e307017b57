#![forbid(unsafe_code)]

//! Reactive registry bridge.
//!
//! Keeps UI scopes, signals and resources in sync with an external node
//! registry. This crate re-exports the three layers:
//!
//! - [`registry`]: nodes, async results, the registry itself, refs.
//! - [`reactive`]: scopes, signals, resources, effects, task queue.
//! - [`bridge`]: the operations connecting the two.
//!
//! Most applications only need the [`prelude`].
//!
//! # Example
//!
//! ```
//! use rxb::prelude::*;
//!
//! let app = Scope::root();
//! provide_registry(&app, Registry::default());
//!
//! let todos: Writable<AsyncResult<Vec<&str>, String>> =
//!     Atom::make(AsyncResult::initial().into_waiting());
//! let list = bridge_suspense(&app, &todos, SuspenseOptions::default()).unwrap();
//! assert!(list.loading());
//!
//! resolve_registry(&app)
//!     .set(&todos, AsyncResult::success(vec!["ship it"]))
//!     .unwrap();
//! assert_eq!(list.read().and_then(|s| s.value().cloned()), Some(vec!["ship it"]));
//! ```

pub use rxb_bridge as bridge;
pub use rxb_reactive as reactive;
pub use rxb_registry as registry;

pub use rxb_bridge::{BridgeError, Result};

/// Everything needed to bridge nodes into a UI tree.
pub mod prelude {
    pub use rxb_bridge::{
        BridgeRuntime, HydrationRecord, Refresher, ResourceSet, Setter, SuccessResource,
        SuspenseOptions, WriteRequest, apply_hydration, bridge_effect, bridge_hydrate,
        bridge_mount, bridge_read, bridge_read_map, bridge_read_map_keyed, bridge_read_write,
        bridge_ref, bridge_ref_prop, bridge_ref_prop_value, bridge_refresh, bridge_resource_set,
        bridge_set, bridge_subscribe, bridge_suspense, bridge_suspense_success, extract_state,
        provide_registry, provide_state, resolve_registry, resolve_registry_strict,
        state_extractor,
    };
    pub use rxb_reactive::{Accessor, Resource, Scope, TaskQueue, create_effect, create_signal};
    pub use rxb_registry::{
        AsyncResult, Atom, Cause, Exit, Lens, Registry, RegistryConfig, RxRef, Settled,
        SubscribeOptions, Writable,
    };
}
