#![forbid(unsafe_code)]

//! Mount-only bridges: keep a node alive without observing it.

use std::fmt;

use rxb_reactive::Scope;
use rxb_registry::{Atom, Registry, Writable};

use crate::context::resolve_registry;
use crate::error::Result;
use crate::value::Setter;

fn mount_in<R: 'static>(scope: &Scope, registry: &Registry, node: &Atom<R>) -> Result<()> {
    let guard = registry.mount(node)?;
    scope.own(guard);
    Ok(())
}

/// Keep `node` mounted for the lifetime of `scope`.
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_mount<R: 'static>(scope: &Scope, node: &Atom<R>) -> Result<()> {
    let registry = resolve_registry(scope);
    mount_in(scope, &registry, node)
}

/// Mount `node` and return a setter for it. No signal is created, so changes
/// to the node trigger nothing in the caller.
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_set<R, W>(scope: &Scope, node: &Writable<R, W>) -> Result<Setter<R, W>>
where
    R: Clone + 'static,
    W: 'static,
{
    let registry = resolve_registry(scope);
    mount_in(scope, &registry, node.atom())?;
    Ok(Setter::new(registry, node.clone()))
}

/// Forces a node to recompute.
pub struct Refresher<R> {
    registry: Registry,
    node: Atom<R>,
}

impl<R> Clone for Refresher<R> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            node: self.node.clone(),
        }
    }
}

impl<R> fmt::Debug for Refresher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refresher")
            .field("registry", &self.registry.id())
            .field("node", &self.node)
            .finish()
    }
}

impl<R: 'static> Refresher<R> {
    /// Recompute the node from its read function.
    ///
    /// # Errors
    ///
    /// Propagates registry errors (e.g. a disposed registry).
    pub fn refresh(&self) -> Result<()> {
        self.registry.refresh(&self.node)?;
        Ok(())
    }
}

/// Mount `node` and return a handle that refreshes it.
///
/// # Errors
///
/// Propagates registry errors (e.g. a disposed registry).
pub fn bridge_refresh<R: 'static>(scope: &Scope, node: &Atom<R>) -> Result<Refresher<R>> {
    let registry = resolve_registry(scope);
    mount_in(scope, &registry, node)?;
    Ok(Refresher {
        registry,
        node: node.clone(),
    })
}
