#![forbid(unsafe_code)]

//! Suspense bridge: asynchronous registry nodes → [`Resource`].
//!
//! # Design
//!
//! A registry node pushes a continuous stream of [`AsyncResult`]s, while a
//! resource wants one settlement per fetch plus a separate mutation channel.
//! Two subscriptions bridge the models:
//!
//! 1. **One-shot fetcher.** Each fetch subscribes with immediate delivery,
//!    resolves the resource the first time the value qualifies, then drops
//!    its own subscription from inside the listener.
//! 2. **Continuous listener.** One subscription per scope. Qualifying values
//!    are pushed through [`Resource::mutate`], so later settles update the
//!    resource without re-entering loading. A value that stops qualifying
//!    (back to `Initial`, or `waiting` with `suspend_on_waiting`) marks the
//!    resource pending again without refetching.
//!
//! ```text
//!            Initial / (waiting && suspend)
//!   ┌─────────┐ ◀──────────────────────────── ┌─────────┐
//!   │ Pending │                               │ Settled │
//!   └─────────┘ ────────────────────────────▶ └─────────┘
//!            Success / Failure (qualifying)
//! ```
//!
//! # Invariants
//!
//! 1. A one-shot fetcher resolves at most once and never outlives its
//!    settlement or its scope.
//! 2. Failures stay data (`Settled::Failure`) unless read through
//!    [`SuccessResource`].
//! 3. After scope disposal neither subscription delivers anything.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rxb_reactive::{Resolver, Resource, Scope};
use rxb_registry::{
    AsyncResult, Atom, Exit, MountGuard, Registry, RegistryError, Settled, Squashed,
    SubscribeOptions, Subscription, Writable,
};
use tracing::{trace, warn};

use crate::context::resolve_registry;
use crate::error::Result;

/// Per-call-site suspense behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuspenseOptions {
    /// Treat a `waiting` value as pending even if it carries a previous
    /// result. When false, the stale result is shown while waiting.
    pub suspend_on_waiting: bool,
}

impl SuspenseOptions {
    /// Options that suspend while a recomputation is in flight.
    #[must_use]
    pub const fn suspend_on_waiting() -> Self {
        Self {
            suspend_on_waiting: true,
        }
    }

    fn qualifies<A, E>(self, result: &AsyncResult<A, E>) -> bool {
        result.is_not_initial() && !(self.suspend_on_waiting && result.is_waiting())
    }
}

type InFlight = Rc<RefCell<Option<Subscription>>>;
type Settle<T> = Box<dyn FnOnce(&T)>;

/// Subscribe until `accept` first holds, run `on_settle` once, and drop the
/// subscription. Any one-shot already held in `in_flight` is cancelled.
///
/// Returns whether the value settled during the call (immediate delivery).
fn settle_once<T: 'static>(
    registry: &Registry,
    node: &Atom<T>,
    in_flight: &InFlight,
    immediate: bool,
    accept: impl Fn(&T) -> bool + 'static,
    on_settle: impl FnOnce(&T) + 'static,
) -> std::result::Result<bool, RegistryError> {
    let previous = in_flight.borrow_mut().take();
    drop(previous);

    let on_settle: Settle<T> = Box::new(on_settle);
    let pending = Rc::new(RefCell::new(Some(on_settle)));
    let slot = Rc::downgrade(in_flight);
    let callback = Rc::clone(&pending);
    let node_id = node.id();
    let subscription = registry.subscribe(
        node,
        move |value: &T| {
            if !accept(value) {
                return;
            }
            let Some(settle) = callback.borrow_mut().take() else {
                return;
            };
            settle(value);
            if let Some(slot) = slot.upgrade() {
                let fired = slot.borrow_mut().take();
                drop(fired);
            }
            trace!(node = %node_id, "one-shot subscription settled");
        },
        SubscribeOptions { immediate },
    )?;

    let settled = pending.borrow().is_none();
    if !settled {
        *in_flight.borrow_mut() = Some(subscription);
    }
    Ok(settled)
}

fn cancel_on_cleanup(scope: &Scope, in_flight: &InFlight) {
    let slot = Rc::clone(in_flight);
    scope.on_cleanup(move || {
        let cancelled = slot.borrow_mut().take();
        drop(cancelled);
    });
}

/// A resource following an asynchronous node.
///
/// The resource is loading until the node holds a qualifying result (see
/// [`SuspenseOptions`]), then holds the latest qualifying result as
/// [`Settled`].
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_suspense<A, E>(
    scope: &Scope,
    node: &Atom<AsyncResult<A, E>>,
    options: SuspenseOptions,
) -> Result<Resource<Settled<A, E>>>
where
    A: Clone + 'static,
    E: Clone + 'static,
{
    let registry = resolve_registry(scope);
    registry.check_live()?;

    let in_flight: InFlight = Rc::new(RefCell::new(None));
    let fetcher = {
        let registry = registry.clone();
        let node = node.clone();
        let in_flight = Rc::clone(&in_flight);
        move |resolver: Resolver<Settled<A, E>>| {
            let resolve = move |result: &AsyncResult<A, E>| {
                if let Some(settled) = result.clone().into_settled() {
                    resolver.resolve(settled);
                }
            };
            let accept = move |result: &AsyncResult<A, E>| options.qualifies(result);
            if let Err(err) = settle_once(&registry, &node, &in_flight, true, accept, resolve) {
                warn!(%err, node = %node.id(), "suspense fetch could not subscribe");
            }
        }
    };
    let resource = Resource::new(scope, fetcher);
    cancel_on_cleanup(scope, &in_flight);

    let sink = resource.clone();
    let continuous = registry.subscribe(
        node,
        move |result: &AsyncResult<A, E>| {
            if options.qualifies(result) {
                if let Some(settled) = result.clone().into_settled() {
                    sink.mutate(settled);
                }
            } else {
                sink.mark_pending();
            }
        },
        SubscribeOptions::default(),
    )?;
    scope.own(continuous);
    Ok(resource)
}

/// A suspense resource that surfaces failures as errors.
pub struct SuccessResource<A, E> {
    resource: Resource<Settled<A, E>>,
}

impl<A, E> Clone for SuccessResource<A, E> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

impl<A, E> fmt::Debug for SuccessResource<A, E>
where
    A: fmt::Debug + Clone + 'static,
    E: fmt::Debug + Clone + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SuccessResource").field(&self.resource).finish()
    }
}

impl<A: Clone + 'static, E: Clone + 'static> SuccessResource<A, E> {
    /// `Ok(None)` while loading, `Ok(Some(value))` on success, and the
    /// squashed cause on failure.
    ///
    /// # Errors
    ///
    /// Returns the squashed [`Cause`](rxb_registry::Cause) when the node
    /// settled with a failure.
    pub fn read(&self) -> std::result::Result<Option<A>, Squashed<E>> {
        match self.resource.read() {
            None => Ok(None),
            Some(Settled::Success { value, .. }) => Ok(Some(value)),
            Some(Settled::Failure { cause, .. }) => Err(cause.squash()),
        }
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.resource.loading()
    }

    /// Whether the shown value is stale while a recomputation runs.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.resource
            .latest()
            .is_some_and(|settled| settled.is_waiting())
    }

    /// The underlying resource.
    #[must_use]
    pub fn resource(&self) -> &Resource<Settled<A, E>> {
        &self.resource
    }
}

/// [`bridge_suspense`] with failures converted to errors on read.
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_suspense_success<A, E>(
    scope: &Scope,
    node: &Atom<AsyncResult<A, E>>,
    options: SuspenseOptions,
) -> Result<SuccessResource<A, E>>
where
    A: Clone + 'static,
    E: Clone + 'static,
{
    Ok(SuccessResource {
        resource: bridge_suspense(scope, node, options)?,
    })
}

enum FetchRequest<W> {
    /// Wait for the node's current computation.
    Current,
    /// Write a value, then wait.
    Write(W),
    /// Recompute the node, then wait.
    Refresh,
}

/// A resource driven by writes to an asynchronous node.
///
/// Each [`submit`](Self::submit) writes to the node and resolves the
/// resource with the node's [`Exit`] once the result is neither `Initial`
/// nor `waiting`.
pub struct ResourceSet<A, E, W> {
    resource: Resource<Exit<A, E>>,
    request: Rc<RefCell<FetchRequest<W>>>,
}

impl<A, E, W> fmt::Debug for ResourceSet<A, E, W>
where
    A: fmt::Debug + Clone + 'static,
    E: fmt::Debug + Clone + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSet")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl<A: Clone + 'static, E: Clone + 'static, W: 'static> ResourceSet<A, E, W> {
    /// Write `value` to the node and reload until it settles.
    pub fn submit(&self, value: W) {
        *self.request.borrow_mut() = FetchRequest::Write(value);
        self.resource.refetch();
    }

    /// Recompute the node and reload until it settles.
    ///
    /// This goes through [`Registry::refresh`], which reruns the node's read
    /// function: a node made with [`Atom::make`] goes back to its initial
    /// value. The current value is not written back through the write
    /// function, since the write type `W` need not match the value type;
    /// use [`submit`](Self::submit) to write a value explicitly.
    pub fn refetch(&self) {
        *self.request.borrow_mut() = FetchRequest::Refresh;
        self.resource.refetch();
    }

    /// The settled exit, or `None` while loading.
    #[must_use]
    pub fn read(&self) -> Option<Exit<A, E>> {
        self.resource.read()
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.resource.loading()
    }

    #[must_use]
    pub fn resource(&self) -> &Resource<Exit<A, E>> {
        &self.resource
    }
}

/// A write-driven resource over `node`, mounted for the lifetime of `scope`.
///
/// The first fetch waits for the node's current computation.
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_resource_set<A, E, W>(
    scope: &Scope,
    node: &Writable<AsyncResult<A, E>, W>,
) -> Result<ResourceSet<A, E, W>>
where
    A: Clone + 'static,
    E: Clone + 'static,
    W: 'static,
{
    let registry = resolve_registry(scope);
    let mount: MountGuard = registry.mount(node)?;
    scope.own(mount);

    let request = Rc::new(RefCell::new(FetchRequest::Current));
    let in_flight: InFlight = Rc::new(RefCell::new(None));
    let fetcher = {
        let registry = registry.clone();
        let node = node.clone();
        let request = Rc::clone(&request);
        let in_flight = Rc::clone(&in_flight);
        move |resolver: Resolver<Exit<A, E>>| {
            let request = std::mem::replace(&mut *request.borrow_mut(), FetchRequest::Current);
            let immediate = matches!(request, FetchRequest::Current);
            let resolve = move |result: &AsyncResult<A, E>| {
                if let Some(exit) = result.to_exit() {
                    resolver.resolve(exit);
                }
            };
            let accept = |result: &AsyncResult<A, E>| result.is_not_initial() && !result.is_waiting();
            let outcome = settle_once(&registry, &node, &in_flight, immediate, accept, resolve)
                .and_then(|settled| match request {
                    _ if settled => Ok(()),
                    FetchRequest::Current => Ok(()),
                    FetchRequest::Write(value) => registry.set(&node, value),
                    FetchRequest::Refresh => registry.refresh(&node),
                });
            if let Err(err) = outcome {
                warn!(%err, node = %node.id(), "resource fetch failed");
            }
        }
    };
    let resource = Resource::new(scope, fetcher);
    cancel_on_cleanup(scope, &in_flight);

    Ok(ResourceSet { resource, request })
}
