#![forbid(unsafe_code)]

//! Asynchronous resources.
//!
//! A [`Resource<T>`] wraps a fetcher that settles at some later point by
//! consuming a [`Resolver<T>`]. While a fetch is outstanding the resource is
//! *loading* and [`Resource::read`] returns `None`; readers that cannot
//! render without the value treat that as "suspend".
//!
//! ```text
//!   new / refetch / mark_pending          resolve / mutate
//!   ─────────────────────────────▶ loading ───────────────▶ ready
//!                                    ▲                        │
//!                                    └──── refetch ───────────┘
//! ```
//!
//! # Invariants
//!
//! 1. A resolver settles the resource at most once (it is consumed).
//! 2. Each `refetch` and `mutate` starts a new generation; resolvers from
//!    older generations are ignored.
//! 3. After the owning scope is disposed, resolutions and mutations are
//!    ignored.
//! 4. `latest()` keeps the last value through a reload.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::scope::Scope;
use crate::signal::{Accessor, Signal, Watch, create_signal};

/// Observable state of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot<T> {
    pub loading: bool,
    pub value: Option<T>,
}

type Fetcher<T> = Box<dyn Fn(Resolver<T>)>;

struct ResourceCore<T> {
    snapshot: Accessor<ResourceSnapshot<T>>,
    writer: Signal<ResourceSnapshot<T>>,
    fetcher: Fetcher<T>,
    generation: Cell<u64>,
    resolutions: Cell<u64>,
    disposed: Cell<bool>,
}

impl<T: Clone + 'static> ResourceCore<T> {
    fn fetch(self: &Rc<Self>) {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.writer.update(|s| s.loading = true);
        trace!(generation, "resource fetch started");
        (self.fetcher)(Resolver {
            core: Rc::downgrade(self),
            generation,
        });
    }

    fn settle(&self, value: T) {
        self.resolutions.set(self.resolutions.get() + 1);
        self.writer.set(ResourceSnapshot {
            loading: false,
            value: Some(value),
        });
    }
}

/// An asynchronously fetched value owned by a scope.
pub struct Resource<T> {
    core: Rc<ResourceCore<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: fmt::Debug + Clone + 'static> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("snapshot", &self.core.snapshot.get())
            .field("generation", &self.core.generation.get())
            .finish()
    }
}

impl<T: Clone + 'static> Resource<T> {
    /// Create a resource and start the first fetch immediately.
    pub fn new(scope: &Scope, fetcher: impl Fn(Resolver<T>) + 'static) -> Self {
        let (snapshot, writer) = create_signal(ResourceSnapshot {
            loading: true,
            value: None,
        });
        let core = Rc::new(ResourceCore {
            snapshot,
            writer,
            fetcher: Box::new(fetcher),
            generation: Cell::new(0),
            resolutions: Cell::new(0),
            disposed: Cell::new(false),
        });
        let weak = Rc::downgrade(&core);
        scope.on_cleanup(move || {
            if let Some(core) = weak.upgrade() {
                core.disposed.set(true);
            }
        });
        core.fetch();
        Self { core }
    }

    /// The value, or `None` while loading.
    #[must_use]
    pub fn read(&self) -> Option<T> {
        self.core
            .snapshot
            .with(|s| if s.loading { None } else { s.value.clone() })
    }

    /// The most recent value, even while loading.
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        self.core.snapshot.with(|s| s.value.clone())
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.core.snapshot.with(|s| s.loading)
    }

    #[must_use]
    pub fn snapshot(&self) -> ResourceSnapshot<T> {
        self.core.snapshot.get()
    }

    /// Number of accepted resolutions (mutations excluded).
    #[must_use]
    pub fn resolutions(&self) -> u64 {
        self.core.resolutions.get()
    }

    /// Number of state changes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.core.snapshot.version()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.core.disposed.get()
    }

    /// Set the value directly and leave the loading state.
    ///
    /// Supersedes any outstanding fetch.
    pub fn mutate(&self, value: T) {
        if self.core.disposed.get() {
            return;
        }
        self.core.generation.set(self.core.generation.get() + 1);
        self.core.writer.set(ResourceSnapshot {
            loading: false,
            value: Some(value),
        });
    }

    /// Run the fetcher again.
    pub fn refetch(&self) {
        if self.core.disposed.get() {
            return;
        }
        self.core.fetch();
    }

    /// Enter the loading state without starting a fetch. No-op if already
    /// loading.
    pub fn mark_pending(&self) {
        if self.core.disposed.get() || self.loading() {
            return;
        }
        self.core.writer.update(|s| s.loading = true);
    }

    /// Call `f` on every state change until the guard is dropped.
    pub fn watch(&self, f: impl Fn(&ResourceSnapshot<T>) + 'static) -> Watch {
        self.core.snapshot.subscribe(f)
    }
}

/// Settles one fetch of a [`Resource`].
pub struct Resolver<T> {
    core: Weak<ResourceCore<T>>,
    generation: u64,
}

impl<T: Clone + 'static> Resolver<T> {
    /// Settle the fetch with `value`.
    ///
    /// Returns `false` if the resource is gone, disposed, or has started a
    /// newer fetch since this resolver was issued.
    pub fn resolve(self, value: T) -> bool {
        let Some(core) = self.core.upgrade() else {
            return false;
        };
        if core.disposed.get() || core.generation.get() != self.generation {
            trace!(
                generation = self.generation,
                current = core.generation.get(),
                "stale resolution ignored"
            );
            return false;
        }
        core.settle(value);
        true
    }

    /// Whether resolving now would be accepted.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.core
            .upgrade()
            .is_some_and(|core| !core.disposed.get() && core.generation.get() == self.generation)
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    type Slot<T> = Rc<RefCell<Option<Resolver<T>>>>;

    fn deferred(scope: &Scope) -> (Resource<u32>, Slot<u32>) {
        let slot: Slot<u32> = Rc::new(RefCell::new(None));
        let s = Rc::clone(&slot);
        let resource = Resource::new(scope, move |resolver| *s.borrow_mut() = Some(resolver));
        (resource, slot)
    }

    fn take<T>(slot: &Slot<T>) -> Resolver<T> {
        slot.borrow_mut().take().expect("fetch in flight")
    }

    #[test]
    fn starts_loading_then_resolves() {
        let scope = Scope::root();
        let (resource, slot) = deferred(&scope);
        assert!(resource.loading());
        assert_eq!(resource.read(), None);
        assert!(take(&slot).resolve(4));
        assert_eq!(resource.read(), Some(4));
        assert_eq!(resource.resolutions(), 1);
    }

    #[test]
    fn synchronous_fetcher() {
        let scope = Scope::root();
        let resource = Resource::new(&scope, |resolver| {
            resolver.resolve("ready");
        });
        assert_eq!(resource.read(), Some("ready"));
    }

    #[test]
    fn refetch_supersedes_old_resolver() {
        let scope = Scope::root();
        let (resource, slot) = deferred(&scope);
        let first = take(&slot);
        resource.refetch();
        let second = take(&slot);
        assert!(!first.is_current());
        assert!(!first.resolve(1));
        assert!(resource.loading());
        assert!(second.resolve(2));
        assert_eq!(resource.read(), Some(2));
    }

    #[test]
    fn latest_survives_reload() {
        let scope = Scope::root();
        let (resource, slot) = deferred(&scope);
        take(&slot).resolve(1);
        resource.refetch();
        assert_eq!(resource.read(), None);
        assert_eq!(resource.latest(), Some(1));
    }

    #[test]
    fn mutate_does_not_reenter_loading() {
        let scope = Scope::root();
        let (resource, slot) = deferred(&scope);
        take(&slot).resolve(1);
        let loads = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&loads);
        let _watch = resource.watch(move |s| l.borrow_mut().push(s.loading));
        resource.mutate(2);
        resource.mutate(3);
        assert_eq!(*loads.borrow(), vec![false, false]);
        assert_eq!(resource.read(), Some(3));
    }

    #[test]
    fn mark_pending_is_idempotent() {
        let scope = Scope::root();
        let (resource, slot) = deferred(&scope);
        take(&slot).resolve(1);
        let before = resource.version();
        resource.mark_pending();
        resource.mark_pending();
        assert!(resource.loading());
        assert_eq!(resource.version(), before + 1);
    }

    #[test]
    fn disposed_scope_ignores_resolution() {
        let scope = Scope::root();
        let (resource, slot) = deferred(&scope);
        let resolver = take(&slot);
        scope.dispose();
        assert!(resource.is_disposed());
        assert!(!resolver.resolve(9));
        resource.mutate(9);
        assert_eq!(resource.latest(), None);
    }
}
