#![forbid(unsafe_code)]

//! State transfer between registries.
//!
//! [`extract_state`] snapshots every materialized state node of a registry;
//! [`apply_hydration`] primes another registry from such a snapshot.
//! Records stay in-process: encoding them for transport is up to the host.
//!
//! # Invariants
//!
//! 1. Derived nodes are never extracted.
//! 2. A node is seeded from hydration at most once per registry. Later
//!    batches skip it even if the live value has changed since.
//! 3. Seeding writes the node's value directly; the node's write function
//!    is not involved.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use rxb_reactive::Scope;
use rxb_registry::{AnyAtom, Atom, NodeId, Registry, Value};
use tracing::{debug, debug_span, trace};

use crate::context::resolve_registry;
use crate::error::Result;

/// One `(node, value)` pair of transferred state.
#[derive(Clone)]
pub struct HydrationRecord {
    node: AnyAtom,
    value: Value,
}

impl HydrationRecord {
    pub fn new<R: 'static>(node: &Atom<R>, value: R) -> Self {
        Self {
            node: node.erase(),
            value: Rc::new(value),
        }
    }

    /// A record from an already type-erased value.
    #[must_use]
    pub fn from_parts(node: AnyAtom, value: Value) -> Self {
        Self { node, value }
    }

    #[must_use]
    pub fn node(&self) -> &AnyAtom {
        &self.node
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The value, if it has type `T`.
    #[must_use]
    pub fn value_as<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    #[must_use]
    pub fn into_parts(self) -> (AnyAtom, Value) {
        (self.node, self.value)
    }
}

impl fmt::Debug for HydrationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HydrationRecord")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

/// Every materialized state node of `registry` with its current value.
#[must_use]
pub fn extract_state(registry: &Registry) -> Vec<HydrationRecord> {
    registry
        .nodes()
        .into_iter()
        .filter(|snapshot| !snapshot.atom.is_derived())
        .map(|snapshot| HydrationRecord::from_parts(snapshot.atom, snapshot.value))
        .collect()
}

/// Nodes already seeded by hydration, per registry.
#[derive(Default)]
struct SeededNodes {
    nodes: RefCell<HashSet<NodeId>>,
}

/// Outcome of [`apply_hydration`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrationReport {
    pub applied: usize,
    pub skipped: usize,
}

/// Seed each record's node in `registry`, unless hydration already seeded
/// it.
///
/// # Errors
///
/// Propagates registry errors: a disposed registry, or a record whose value
/// does not match its node's type. A record that fails is not marked as
/// seeded.
pub fn apply_hydration(
    registry: &Registry,
    records: impl IntoIterator<Item = HydrationRecord>,
) -> Result<HydrationReport> {
    let span = debug_span!("apply_hydration", registry = %registry.id());
    let _guard = span.enter();

    registry.check_live()?;
    let seeded = registry.extension::<SeededNodes>();
    let mut report = HydrationReport::default();
    for record in records {
        let id = record.node.id();
        // Check and mark in one step.
        if !seeded.nodes.borrow_mut().insert(id) {
            trace!(node = %id, "already seeded");
            report.skipped += 1;
            continue;
        }
        let seeded_ok = registry
            .ensure_node(&record.node)
            .and_then(|handle| handle.set_value(record.value));
        if let Err(err) = seeded_ok {
            seeded.nodes.borrow_mut().remove(&id);
            return Err(err.into());
        }
        report.applied += 1;
    }
    debug!(applied = report.applied, skipped = report.skipped, "hydration applied");
    Ok(report)
}

/// [`apply_hydration`] against the registry active for `scope`.
///
/// # Errors
///
/// See [`apply_hydration`].
pub fn bridge_hydrate(
    scope: &Scope,
    records: impl IntoIterator<Item = HydrationRecord>,
) -> Result<HydrationReport> {
    apply_hydration(&resolve_registry(scope), records)
}

/// Extracts state from the registry that was active when it was created.
#[derive(Debug, Clone)]
pub struct StateExtractor {
    registry: Registry,
}

impl StateExtractor {
    #[must_use]
    pub fn extract(&self) -> Vec<HydrationRecord> {
        extract_state(&self.registry)
    }
}

/// A [`StateExtractor`] bound to the registry active for `scope`.
#[must_use]
pub fn state_extractor(scope: &Scope) -> StateExtractor {
    StateExtractor {
        registry: resolve_registry(scope),
    }
}
