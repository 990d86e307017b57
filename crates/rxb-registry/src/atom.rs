#![forbid(unsafe_code)]

//! Node handles.
//!
//! An [`Atom<R>`] is an identity plus a recipe for computing a value of
//! type `R`. It holds no value itself: values live in a
//! [`Registry`](crate::Registry), keyed by [`NodeId`], so the same atom can
//! have independent state in several registries.
//!
//! A [`Writable<R, W>`] additionally knows how to accept a write of type
//! `W`, which may differ from the read type (a trigger taking `()`, a
//! command taking a request, ...).
//!
//! # Invariants
//!
//! 1. Cloning an atom never creates a new identity; `id()` is stable for
//!    the lifetime of every clone.
//! 2. [`NodeKind::Derived`] nodes are recomputed from other nodes and are
//!    never treated as serializable state.

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::registry::{Getter, Registry};

/// Type-erased node value as stored by a registry.
pub type Value = Rc<dyn Any>;

/// Process-unique node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// What a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Owned state (cells, writable nodes).
    State,
    /// Recomputed from other nodes (`map`, `computed`).
    Derived,
}

/// Type-erased view of an atom definition, used by the registry.
pub(crate) trait ErasedNode {
    fn id(&self) -> NodeId;
    fn kind(&self) -> NodeKind;
    fn label(&self) -> Option<&'static str>;
    fn keep_alive(&self) -> bool;
    fn value_type(&self) -> TypeId;
    fn value_type_name(&self) -> &'static str;
    fn compute(&self, getter: &Getter<'_>) -> Value;
}

struct AtomDef<R> {
    id: NodeId,
    kind: NodeKind,
    label: Cell<Option<&'static str>>,
    keep_alive: Cell<bool>,
    read: Box<dyn Fn(&Getter<'_>) -> R>,
}

impl<R: 'static> ErasedNode for AtomDef<R> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn label(&self) -> Option<&'static str> {
        self.label.get()
    }

    fn keep_alive(&self) -> bool {
        self.keep_alive.get()
    }

    fn value_type(&self) -> TypeId {
        TypeId::of::<R>()
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<R>()
    }

    fn compute(&self, getter: &Getter<'_>) -> Value {
        Rc::new((self.read)(getter))
    }
}

/// A readable node.
pub struct Atom<R> {
    def: Rc<AtomDef<R>>,
}

impl<R> Clone for Atom<R> {
    fn clone(&self) -> Self {
        Self {
            def: Rc::clone(&self.def),
        }
    }
}

impl<R> fmt::Debug for Atom<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.def.id)
            .field("kind", &self.def.kind)
            .field("label", &self.def.label.get())
            .finish()
    }
}

impl<R: 'static> Atom<R> {
    fn from_read(kind: NodeKind, read: impl Fn(&Getter<'_>) -> R + 'static) -> Self {
        Self {
            def: Rc::new(AtomDef {
                id: NodeId::next(),
                kind,
                label: Cell::new(None),
                keep_alive: Cell::new(false),
                read: Box::new(read),
            }),
        }
    }

    /// A writable cell holding `initial` until written.
    pub fn make(initial: R) -> Writable<R>
    where
        R: Clone,
    {
        let atom = Self::from_read(NodeKind::State, move |_| initial.clone());
        Writable::from_atom(atom, |ctx: &WriteContext<'_, R>, value: R| ctx.set_self(value))
    }

    /// A derived node computed from other nodes read through the getter.
    ///
    /// Every node read via [`Getter::get`] becomes a dependency: when it
    /// changes, this node is recomputed.
    pub fn computed(read: impl Fn(&Getter<'_>) -> R + 'static) -> Self {
        Self::from_read(NodeKind::Derived, read)
    }

    /// A state node with a custom write behavior.
    pub fn writable<W: 'static>(
        read: impl Fn(&Getter<'_>) -> R + 'static,
        write: impl Fn(&WriteContext<'_, R>, W) + 'static,
    ) -> Writable<R, W> {
        Writable::from_atom(Self::from_read(NodeKind::State, read), write)
    }

    /// A derived node applying `f` to this node's value.
    ///
    /// Each call creates a new node identity; callers that map repeatedly
    /// should cache the result.
    pub fn map<B: 'static>(&self, f: impl Fn(&R) -> B + 'static) -> Atom<B>
    where
        R: Clone,
    {
        let source = self.clone();
        Atom::computed(move |get| f(&get.get(&source)))
    }

    /// Attach a human-readable label, shown in logs and debug output.
    #[must_use]
    pub fn with_label(self, label: &'static str) -> Self {
        self.def.label.set(Some(label));
        self
    }

    /// Keep the node materialized even when nothing observes it.
    #[must_use]
    pub fn keep_alive(self) -> Self {
        self.def.keep_alive.set(true);
        self
    }

    /// Node identity.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.def.id
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.def.kind
    }

    #[must_use]
    pub fn label(&self) -> Option<&'static str> {
        self.def.label.get()
    }

    /// Type-erased handle with the same identity.
    #[must_use]
    pub fn erase(&self) -> AnyAtom {
        let node: Rc<dyn ErasedNode> = self.def.clone();
        AnyAtom { node }
    }

    pub(crate) fn read_with(&self, getter: &Getter<'_>) -> R {
        (self.def.read)(getter)
    }
}

impl<R> PartialEq for Atom<R> {
    fn eq(&self, other: &Self) -> bool {
        self.def.id == other.def.id
    }
}

impl<R> Eq for Atom<R> {}

/// Type-erased atom handle. Equality and hashing use the node identity.
#[derive(Clone)]
pub struct AnyAtom {
    node: Rc<dyn ErasedNode>,
}

impl AnyAtom {
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.node.kind()
    }

    #[must_use]
    pub fn label(&self) -> Option<&'static str> {
        self.node.label()
    }

    /// Whether this node is recomputed rather than owned state.
    #[must_use]
    pub fn is_derived(&self) -> bool {
        self.kind() == NodeKind::Derived
    }

    pub(crate) fn keep_alive(&self) -> bool {
        self.node.keep_alive()
    }

    pub(crate) fn value_type(&self) -> TypeId {
        self.node.value_type()
    }

    pub(crate) fn value_type_name(&self) -> &'static str {
        self.node.value_type_name()
    }

    pub(crate) fn compute(&self, getter: &Getter<'_>) -> Value {
        self.node.compute(getter)
    }
}

impl fmt::Debug for AnyAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyAtom")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("label", &self.label())
            .finish()
    }
}

impl PartialEq for AnyAtom {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for AnyAtom {}

impl Hash for AnyAtom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl<R: 'static> From<&Atom<R>> for AnyAtom {
    fn from(atom: &Atom<R>) -> Self {
        atom.erase()
    }
}

type WriteFn<R, W> = Rc<dyn Fn(&WriteContext<'_, R>, W)>;

/// A node that accepts writes of type `W`.
///
/// Dereferences to the underlying [`Atom<R>`], so a `&Writable` can be
/// passed anywhere a readable node is expected.
pub struct Writable<R, W = R> {
    atom: Atom<R>,
    write: WriteFn<R, W>,
}

impl<R, W> Clone for Writable<R, W> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
            write: Rc::clone(&self.write),
        }
    }
}

impl<R, W> fmt::Debug for Writable<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Writable").field(&self.atom).finish()
    }
}

impl<R: 'static, W: 'static> Writable<R, W> {
    fn from_atom(atom: Atom<R>, write: impl Fn(&WriteContext<'_, R>, W) + 'static) -> Self {
        Self {
            atom,
            write: Rc::new(write),
        }
    }

    /// See [`Atom::with_label`].
    #[must_use]
    pub fn with_label(self, label: &'static str) -> Self {
        self.atom.def.label.set(Some(label));
        self
    }

    /// See [`Atom::keep_alive`].
    #[must_use]
    pub fn keep_alive(self) -> Self {
        self.atom.def.keep_alive.set(true);
        self
    }

    /// The readable side of this node.
    #[must_use]
    pub fn atom(&self) -> &Atom<R> {
        &self.atom
    }

    pub(crate) fn apply(&self, ctx: &WriteContext<'_, R>, value: W) {
        (self.write)(ctx, value);
    }
}

impl<R, W> Deref for Writable<R, W> {
    type Target = Atom<R>;

    fn deref(&self) -> &Atom<R> {
        &self.atom
    }
}

impl<R, W> AsRef<Atom<R>> for Writable<R, W> {
    fn as_ref(&self) -> &Atom<R> {
        &self.atom
    }
}

/// Handed to a node's write function.
pub struct WriteContext<'a, R> {
    pub(crate) registry: &'a Registry,
    pub(crate) node: &'a Atom<R>,
}

impl<R: Clone + 'static> WriteContext<'_, R> {
    /// The node's current value.
    #[must_use]
    pub fn get_self(&self) -> R {
        self.registry.read_value(self.node)
    }

    /// Replace the node's value and notify its listeners.
    pub fn set_self(&self, value: R) {
        self.registry.replace_value(self.node.id(), Rc::new(value));
    }

    /// Recompute the node from its read function.
    pub fn refresh_self(&self) {
        self.registry.recompute(self.node.id());
    }

    /// Read another node.
    #[must_use]
    pub fn get<T: Clone + 'static>(&self, atom: &Atom<T>) -> T {
        self.registry.read_value(atom)
    }

    /// Write another node.
    pub fn set<T: 'static, V: 'static>(&self, node: &Writable<T, V>, value: V) {
        self.registry.write_value(node, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn clones_share_identity() {
        let a = Atom::make(1);
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.erase(), b.atom().erase());
    }

    #[test]
    fn distinct_atoms_have_distinct_ids() {
        let ids: HashSet<NodeId> = (0..64).map(|i| Atom::make(i).id()).collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn map_creates_derived_node() {
        let count = Atom::make(2);
        let doubled = count.map(|n| n * 2);
        assert_eq!(count.kind(), NodeKind::State);
        assert_eq!(doubled.kind(), NodeKind::Derived);
        assert!(doubled.erase().is_derived());
        assert_ne!(doubled.id(), count.id());
    }

    #[test]
    fn label_is_visible_on_erased_handle() {
        let count = Atom::make(0).with_label("count");
        assert_eq!(count.erase().label(), Some("count"));
        assert!(format!("{:?}", count).contains("count"));
    }
}
