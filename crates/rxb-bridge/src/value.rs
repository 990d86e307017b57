#![forbid(unsafe_code)]

//! Value bridge: registry node → signal.
//!
//! # Design
//!
//! [`bridge_read`] seeds a signal with the node's current value, subscribes
//! to the node with a listener that writes every new value into that signal,
//! and hands the subscription to the scope. The signal has exactly one
//! writer (that listener); callers only see the [`Accessor`].
//!
//! Writes go the other way through a [`Setter`], which always targets the
//! registry. Updaters are applied to the registry's current value, never to
//! the accessor's cached copy.
//!
//! # Invariants
//!
//! 1. Right after the call, the accessor equals `registry.get(node)`.
//! 2. After scope disposal the listener never runs again.
//! 3. `bridge_read_map` with the same capture-free closure, or
//!    `bridge_read_map_keyed` with the same key, creates one derived node per
//!    (registry, source node) and one subscription per scope.
//! 4. The subscription exists before the seed read, so idle collection can
//!    not drop the node between the two.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::mem;
use std::rc::Rc;

use rxb_reactive::{Accessor, Scope, Signal, create_effect, create_signal};
use rxb_registry::{Atom, NodeId, Registry, RegistryId, SubscribeOptions, Writable};
use tracing::trace;

use crate::context::resolve_registry;
use crate::error::Result;

/// A write aimed at a node whose write type is `W`.
pub enum WriteRequest<R, W> {
    /// Write this value.
    Direct(W),
    /// Compute the value from the node's current registry value.
    Updater(Box<dyn FnOnce(&R) -> W>),
}

impl<R, W> WriteRequest<R, W> {
    /// An updater request.
    pub fn updater(f: impl FnOnce(&R) -> W + 'static) -> Self {
        Self::Updater(Box::new(f))
    }
}

impl<R, W: fmt::Debug> fmt::Debug for WriteRequest<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(value) => f.debug_tuple("Direct").field(value).finish(),
            Self::Updater(_) => f.write_str("Updater(..)"),
        }
    }
}

/// Writes to a registry node.
pub struct Setter<R, W = R> {
    registry: Registry,
    node: Writable<R, W>,
}

impl<R, W> Clone for Setter<R, W> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            node: self.node.clone(),
        }
    }
}

impl<R, W> fmt::Debug for Setter<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("registry", &self.registry.id())
            .field("node", &self.node)
            .finish()
    }
}

impl<R: Clone + 'static, W: 'static> Setter<R, W> {
    pub(crate) fn new(registry: Registry, node: Writable<R, W>) -> Self {
        Self { registry, node }
    }

    /// Write `value` to the node.
    ///
    /// # Errors
    ///
    /// Propagates registry errors (e.g. a disposed registry).
    pub fn set(&self, value: W) -> Result<()> {
        self.write(WriteRequest::Direct(value))
    }

    /// Write `f(current)`, where `current` is read from the registry.
    ///
    /// # Errors
    ///
    /// Propagates registry errors (e.g. a disposed registry).
    pub fn update(&self, f: impl FnOnce(&R) -> W + 'static) -> Result<()> {
        self.write(WriteRequest::updater(f))
    }

    /// Apply a [`WriteRequest`].
    ///
    /// # Errors
    ///
    /// Propagates registry errors (e.g. a disposed registry).
    pub fn write(&self, request: WriteRequest<R, W>) -> Result<()> {
        let value = match request {
            WriteRequest::Direct(value) => value,
            WriteRequest::Updater(f) => f(&self.registry.get(&self.node)?),
        };
        self.registry.set(&self.node, value)?;
        Ok(())
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

pub(crate) fn subscribe_signal<R: Clone + 'static>(
    scope: &Scope,
    registry: &Registry,
    node: &Atom<R>,
) -> Result<Accessor<R>> {
    // Subscribe before the seed read: an unobserved node past its idle TTL
    // would otherwise be collected by the read and rebuilt by the subscribe.
    let slot: Rc<RefCell<Option<Signal<R>>>> = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&slot);
    let subscription = registry.subscribe(
        node,
        move |value: &R| {
            if let Some(write) = sink.borrow().as_ref() {
                write.set(value.clone());
            }
        },
        SubscribeOptions::default(),
    )?;
    let (read, write) = create_signal(registry.get(node)?);
    *slot.borrow_mut() = Some(write);
    trace!(registry = %registry.id(), node = %node.id(), scope = %scope.id(), "signal bridged");
    scope.own(subscription);
    Ok(read)
}

/// An accessor that follows `node` for the lifetime of `scope`.
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_read<R: Clone + 'static>(scope: &Scope, node: &Atom<R>) -> Result<Accessor<R>> {
    let registry = resolve_registry(scope);
    subscribe_signal(scope, &registry, node)
}

/// Derived nodes created by [`bridge_read_map`], per registry.
///
/// Slots are keyed by source node and `(K, B)`; each slot holds a
/// `HashMap<K, Atom<B>>`.
#[derive(Default)]
struct DerivedCache {
    nodes: RefCell<HashMap<(NodeId, TypeId), Box<dyn Any>>>,
}

/// Identity of a capture-free closure or fn item: its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MapperType(TypeId);

fn derived_node<R, B, K>(
    registry: &Registry,
    node: &Atom<R>,
    key: K,
    make: impl FnOnce() -> Atom<B>,
) -> Atom<B>
where
    R: 'static,
    B: 'static,
    K: Hash + Eq + 'static,
{
    let cache = registry.extension::<DerivedCache>();
    let slot = (node.id(), TypeId::of::<(K, B)>());
    let hit = cache
        .nodes
        .borrow()
        .get(&slot)
        .and_then(|entries| entries.downcast_ref::<HashMap<K, Atom<B>>>())
        .and_then(|entries| entries.get(&key))
        .cloned();
    if let Some(derived) = hit {
        return derived;
    }
    let derived = make();
    trace!(source = %node.id(), derived = %derived.id(), "derived node created");
    let mut nodes = cache.nodes.borrow_mut();
    let entries = nodes
        .entry(slot)
        .or_insert_with(|| Box::new(HashMap::<K, Atom<B>>::new()));
    if let Some(entries) = entries.downcast_mut::<HashMap<K, Atom<B>>>() {
        entries.insert(key, derived.clone());
    }
    derived
}

fn subscribe_derived<B: Clone + 'static>(
    scope: &Scope,
    registry: &Registry,
    derived: &Atom<B>,
) -> Result<Accessor<B>> {
    let key: (RegistryId, NodeId) = (registry.id(), derived.id());
    scope.try_cached(key, || subscribe_signal(scope, registry, derived))
}

/// An accessor that follows `f(node)`.
///
/// A zero-sized `f` (a closure that captures nothing, or a fn item) is
/// identified by its type: evaluating the same expression again reuses the
/// derived node and, within one scope, the same accessor. Any other `f`
/// (fn pointers, closures with captures) gets a derived node of its own on
/// every call; use [`bridge_read_map_keyed`] to share those.
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_read_map<R, B, F>(scope: &Scope, node: &Atom<R>, f: F) -> Result<Accessor<B>>
where
    R: Clone + 'static,
    B: Clone + 'static,
    F: Fn(&R) -> B + 'static,
{
    let registry = resolve_registry(scope);
    if mem::size_of::<F>() == 0 {
        let key = MapperType(TypeId::of::<F>());
        let derived = derived_node(&registry, node, key, || node.map(f));
        subscribe_derived(scope, &registry, &derived)
    } else {
        subscribe_signal(scope, &registry, &node.map(f))
    }
}

/// An accessor that follows `f(node)`, where `key` names the mapping.
///
/// Calls with the same source node, key and output type share one derived
/// node per registry and one accessor per scope; `f` is only used the first
/// time. The caller is responsible for giving different mappings different
/// keys.
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_read_map_keyed<R, B, K>(
    scope: &Scope,
    node: &Atom<R>,
    key: K,
    f: impl Fn(&R) -> B + 'static,
) -> Result<Accessor<B>>
where
    R: Clone + 'static,
    B: Clone + 'static,
    K: Hash + Eq + 'static,
{
    let registry = resolve_registry(scope);
    let derived = derived_node(&registry, node, key, || node.map(f));
    subscribe_derived(scope, &registry, &derived)
}

/// An accessor plus a setter for a writable node.
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_read_write<R, W>(
    scope: &Scope,
    node: &Writable<R, W>,
) -> Result<(Accessor<R>, Setter<R, W>)>
where
    R: Clone + 'static,
    W: 'static,
{
    let registry = resolve_registry(scope);
    let read = subscribe_signal(scope, &registry, node)?;
    Ok((read, Setter::new(registry, node.clone())))
}

/// Call `f` on every change of `node` for the lifetime of `scope`.
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_subscribe<R: 'static>(
    scope: &Scope,
    node: &Atom<R>,
    f: impl Fn(&R) + 'static,
    options: SubscribeOptions,
) -> Result<()> {
    let registry = resolve_registry(scope);
    let subscription = registry.subscribe(node, f, options)?;
    scope.own(subscription);
    Ok(())
}

/// Run `f` with the current value of `node`, then on every change, for the
/// lifetime of `scope`.
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_effect<R: Clone + 'static>(
    scope: &Scope,
    node: &Atom<R>,
    f: impl Fn(&R) + 'static,
) -> Result<()> {
    let value = bridge_read(scope, node)?;
    create_effect(scope, &value, f);
    Ok(())
}
