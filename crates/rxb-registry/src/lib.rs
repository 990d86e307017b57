#![forbid(unsafe_code)]

//! Push-based reactive registry.
//!
//! Nodes ([`Atom`], [`Writable`]) are identities plus recipes; values live in
//! a [`Registry`], which notifies subscribers on every write and disposes
//! unobserved nodes after an idle TTL. Asynchronous nodes carry an
//! [`AsyncResult`]. [`RxRef`] is a standalone observable reference with
//! field focusing through [`Lens`].
//!
//! Everything here is single-threaded (`Rc`/`RefCell`); a registry and its
//! nodes must stay on the thread that created them.
//!
//! # Example
//!
//! ```
//! use rxb_registry::{Atom, Registry, SubscribeOptions};
//!
//! let registry = Registry::default();
//! let count = Atom::make(1);
//! let doubled = count.map(|n| n * 2);
//!
//! let _sub = registry
//!     .subscribe(&doubled, |v| println!("doubled = {v}"), SubscribeOptions::immediate())
//!     .unwrap();
//! registry.set(&count, 4).unwrap();
//! assert_eq!(registry.get(&doubled).unwrap(), 8);
//! ```

pub mod atom;
pub mod registry;
pub mod result;
pub mod rx_ref;

pub use atom::{AnyAtom, Atom, NodeId, NodeKind, Value, Writable, WriteContext};
pub use registry::{
    Getter, IDLE_TTL_ENV, MountGuard, NodeHandle, NodeSnapshot, NodeStats, Registry,
    RegistryConfig, RegistryError, RegistryId, Scheduler, SubscribeOptions, Subscription, Task,
};
pub use result::{AsyncResult, Cause, Exit, Settled, Squashed};
pub use rx_ref::{Lens, RefId, RefSubscription, RxRef};
