#![forbid(unsafe_code)]

//! Scoped table of node values with subscriptions and idle disposal.
//!
//! # Design
//!
//! A [`Registry`] maps [`NodeId`]s to materialized node state: the current
//! value, the listeners, the mount count and the subscriptions the node
//! holds on the nodes it was computed from. Two registries never share node
//! state, so a registry doubles as a scoping key.
//!
//! Nodes are materialized lazily by the first read, subscription or mount.
//! A node with no listeners and no mounts is *idle*; once its idle TTL has
//! elapsed it is removed by a task handed to the configured scheduler (or by
//! [`Registry::sweep_idle`]), and the next access recomputes it from scratch.
//!
//! # Invariants
//!
//! 1. Listeners are invoked in registration order, outside of any internal
//!    borrow, so a listener may read, write or unsubscribe freely.
//! 2. A listener removed while a notification pass is running is not
//!    invoked for the rest of that pass.
//! 3. Every [`Subscription`] and [`MountGuard`] releases its registration
//!    exactly once, on drop.
//! 4. Writes always notify; values are type-erased and not compared.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Use after dispose | Any public call after [`Registry::dispose`] | `RegistryError::Disposed` |
//! | Wrong value type | Hydration or initial value of another type | `RegistryError::TypeMismatch` / dropped with a warning |
//! | Dependency cycle | A read function reading itself | Recursion; not detected |

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::atom::{AnyAtom, Atom, NodeId, Value, Writable, WriteContext};

/// Unit of deferred work handed to the scheduler.
pub type Task = Box<dyn FnOnce()>;

/// Callback that runs (or queues) a [`Task`].
pub type Scheduler = Rc<dyn Fn(Task)>;

/// Environment variable overriding [`RegistryConfig::default_idle_ttl`].
pub const IDLE_TTL_ENV: &str = "RXB_IDLE_TTL_MS";

const DEFAULT_IDLE_TTL: Duration = Duration::from_millis(400);

/// Construction parameters for a [`Registry`].
#[derive(Clone)]
pub struct RegistryConfig {
    /// Runs deferred registry work such as idle-node collection.
    pub schedule_task: Scheduler,
    /// How long an unobserved node survives. `None` keeps idle nodes forever.
    pub default_idle_ttl: Option<Duration>,
    /// Values used instead of a node's read function on first materialization.
    pub initial_values: Vec<(AnyAtom, Value)>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            schedule_task: Rc::new(|task: Task| task()),
            default_idle_ttl: Some(DEFAULT_IDLE_TTL),
            initial_values: Vec::new(),
        }
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("default_idle_ttl", &self.default_idle_ttl)
            .field("initial_values", &self.initial_values.len())
            .finish_non_exhaustive()
    }
}

impl RegistryConfig {
    /// Default configuration: inline scheduling, 400 ms idle TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with the idle TTL taken from [`IDLE_TTL_ENV`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom environment lookup.
    ///
    /// Accepts a millisecond count, or `off` / `none` / `never` to disable
    /// idle disposal. Unparseable values keep the default.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::default();
        let Some(raw) = get_env(IDLE_TTL_ENV) else {
            return config;
        };
        match parse_idle_ttl(&raw) {
            Some(ttl) => config.with_idle_ttl(ttl),
            None => {
                warn!(value = %raw, "ignoring unparseable {IDLE_TTL_ENV}");
                config
            }
        }
    }

    /// Set the task scheduler.
    #[must_use]
    pub fn with_scheduler(mut self, schedule: impl Fn(Task) + 'static) -> Self {
        self.schedule_task = Rc::new(schedule);
        self
    }

    /// Set the idle TTL.
    #[must_use]
    pub fn with_idle_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_idle_ttl = ttl;
        self
    }

    /// Preset the value a node starts with.
    #[must_use]
    pub fn with_initial_value<R: 'static>(mut self, atom: &Atom<R>, value: R) -> Self {
        self.initial_values.push((atom.erase(), Rc::new(value)));
        self
    }

    /// Preset several type-erased values.
    #[must_use]
    pub fn with_initial_values(mut self, values: impl IntoIterator<Item = (AnyAtom, Value)>) -> Self {
        self.initial_values.extend(values);
        self
    }
}

fn parse_idle_ttl(raw: &str) -> Option<Option<Duration>> {
    let value = raw.trim().to_ascii_lowercase();
    match value.as_str() {
        "off" | "none" | "never" => Some(None),
        _ => value.parse::<u64>().ok().map(|ms| Some(Duration::from_millis(ms))),
    }
}

/// Registry identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryId(u64);

impl RegistryId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry#{}", self.0)
    }
}

/// Errors raised by registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry was disposed.
    Disposed { registry: RegistryId },
    /// A type-erased value did not match the node's value type.
    TypeMismatch { node: NodeId, expected: &'static str },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disposed { registry } => write!(f, "{registry} is disposed"),
            Self::TypeMismatch { node, expected } => {
                write!(f, "value for {node} is not a `{expected}`")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Options for [`Registry::subscribe`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Deliver the current value synchronously before `subscribe` returns.
    pub immediate: bool,
}

impl SubscribeOptions {
    /// Options with immediate delivery.
    #[must_use]
    pub const fn immediate() -> Self {
        Self { immediate: true }
    }
}

struct Listener {
    id: u64,
    active: Cell<bool>,
    callback: Box<dyn Fn(&Value)>,
}

struct NodeState {
    atom: AnyAtom,
    value: Value,
    listeners: Vec<Rc<Listener>>,
    mounts: usize,
    /// Subscriptions on the nodes this value was computed from.
    upstream: Vec<Subscription>,
    idle_since: Option<Instant>,
}

impl NodeState {
    fn is_idle(&self) -> bool {
        self.listeners.is_empty() && self.mounts == 0
    }
}

struct RegistryInner {
    id: RegistryId,
    schedule_task: Scheduler,
    idle_ttl: Option<Duration>,
    nodes: RefCell<BTreeMap<NodeId, NodeState>>,
    preset: RefCell<HashMap<NodeId, Value>>,
    extensions: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    next_listener: Cell<u64>,
    disposed: Cell<bool>,
}

/// Listener and mount counts for one materialized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    pub listeners: usize,
    pub mounts: usize,
}

/// A materialized node and its current value, as returned by [`Registry::nodes`].
#[derive(Clone)]
pub struct NodeSnapshot {
    pub atom: AnyAtom,
    pub value: Value,
}

impl NodeSnapshot {
    /// The value, if it has type `T`.
    #[must_use]
    pub fn value_as<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSnapshot")
            .field("atom", &self.atom)
            .finish_non_exhaustive()
    }
}

/// Shared handle to a node table.
///
/// Cloning a `Registry` creates a new handle to the **same** table.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RegistryInner>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("id", &self.inner.id)
            .field("nodes", &self.inner.nodes.borrow().len())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl PartialEq for Registry {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Registry {}

impl Registry {
    /// Create a registry.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        let id = RegistryId::next();
        let mut preset = HashMap::new();
        for (atom, value) in config.initial_values {
            if (*value).type_id() == atom.value_type() {
                preset.insert(atom.id(), value);
            } else {
                warn!(
                    registry = %id,
                    node = %atom.id(),
                    expected = atom.value_type_name(),
                    "dropping initial value of the wrong type"
                );
            }
        }
        debug!(registry = %id, presets = preset.len(), "registry created");
        Self {
            inner: Rc::new(RegistryInner {
                id,
                schedule_task: config.schedule_task,
                idle_ttl: config.default_idle_ttl,
                nodes: RefCell::new(BTreeMap::new()),
                preset: RefCell::new(preset),
                extensions: RefCell::new(HashMap::new()),
                next_listener: Cell::new(0),
                disposed: Cell::new(false),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> RegistryId {
        self.inner.id
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Fail with [`RegistryError::Disposed`] if the registry was disposed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Disposed`] after [`dispose`](Self::dispose).
    pub fn check_live(&self) -> Result<(), RegistryError> {
        if self.inner.disposed.get() {
            return Err(RegistryError::Disposed {
                registry: self.inner.id,
            });
        }
        Ok(())
    }

    /// Current value of a node, materializing it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Disposed`] after [`dispose`](Self::dispose).
    pub fn get<R: Clone + 'static>(&self, atom: &Atom<R>) -> Result<R, RegistryError> {
        self.check_live()?;
        let value = self.read_value(atom);
        self.release_if_idle(atom.id());
        Ok(value)
    }

    /// Write a node through its write function.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Disposed`] after [`dispose`](Self::dispose).
    pub fn set<R: 'static, W: 'static>(
        &self,
        node: &Writable<R, W>,
        value: W,
    ) -> Result<(), RegistryError> {
        self.check_live()?;
        self.write_value(node, value);
        self.release_if_idle(node.id());
        Ok(())
    }

    /// Listen to a node's value changes.
    ///
    /// The returned guard unsubscribes on drop.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Disposed`] after [`dispose`](Self::dispose).
    pub fn subscribe<R: 'static>(
        &self,
        atom: &Atom<R>,
        f: impl Fn(&R) + 'static,
        options: SubscribeOptions,
    ) -> Result<Subscription, RegistryError> {
        self.check_live()?;
        let node = atom.id();
        let typed = move |value: &Value| match value.downcast_ref::<R>() {
            Some(value) => f(value),
            None => warn!(%node, "listener skipped a value of unexpected type"),
        };
        let subscription = self.attach(&atom.erase(), Box::new(typed));
        trace!(registry = %self.inner.id, %node, immediate = options.immediate, "subscribed");
        if options.immediate {
            if let Some(value) = self.current(node) {
                if subscription.listener.active.get() {
                    (subscription.listener.callback)(&value);
                }
            }
        }
        Ok(subscription)
    }

    /// Keep a node materialized without listening to it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Disposed`] after [`dispose`](Self::dispose).
    pub fn mount<R: 'static>(&self, atom: &Atom<R>) -> Result<MountGuard, RegistryError> {
        self.check_live()?;
        let node = atom.id();
        self.ensure(&atom.erase());
        if let Some(state) = self.inner.nodes.borrow_mut().get_mut(&node) {
            state.mounts += 1;
            state.idle_since = None;
        }
        trace!(registry = %self.inner.id, %node, "mounted");
        Ok(MountGuard {
            registry: Rc::downgrade(&self.inner),
            node,
        })
    }

    /// Recompute a materialized node from its read function.
    ///
    /// Unmaterialized nodes are left alone; their next read computes them.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Disposed`] after [`dispose`](Self::dispose).
    pub fn refresh<R: 'static>(&self, atom: &Atom<R>) -> Result<(), RegistryError> {
        self.check_live()?;
        self.recompute(atom.id());
        Ok(())
    }

    /// Snapshot of every materialized node, in node creation order.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeSnapshot> {
        self.inner
            .nodes
            .borrow()
            .values()
            .map(|state| NodeSnapshot {
                atom: state.atom.clone(),
                value: Rc::clone(&state.value),
            })
            .collect()
    }

    /// Materialize a node and return a handle to its internal state.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Disposed`] after [`dispose`](Self::dispose).
    pub fn ensure_node(&self, atom: &AnyAtom) -> Result<NodeHandle<'_>, RegistryError> {
        self.check_live()?;
        self.ensure(atom);
        Ok(NodeHandle {
            registry: self,
            atom: atom.clone(),
        })
    }

    /// Whether the node is currently materialized.
    #[must_use]
    pub fn contains(&self, atom: &AnyAtom) -> bool {
        self.inner.nodes.borrow().contains_key(&atom.id())
    }

    /// Listener and mount counts, if the node is materialized.
    #[must_use]
    pub fn node_stats(&self, atom: &AnyAtom) -> Option<NodeStats> {
        self.inner.nodes.borrow().get(&atom.id()).map(|state| NodeStats {
            listeners: state.listeners.len(),
            mounts: state.mounts,
        })
    }

    /// Remove every idle node whose TTL has elapsed. Returns how many were removed.
    pub fn sweep_idle(&self) -> usize {
        let idle: Vec<NodeId> = self
            .inner
            .nodes
            .borrow()
            .iter()
            .filter(|(_, state)| state.is_idle())
            .map(|(id, _)| *id)
            .collect();
        idle.into_iter().filter(|id| self.collect_if_idle(*id)).count()
    }

    /// Typed side table owned by this registry.
    ///
    /// The slot is created on first use and dropped with the registry's
    /// state on [`dispose`](Self::dispose).
    pub fn extension<T: Default + 'static>(&self) -> Rc<T> {
        let key = TypeId::of::<T>();
        let existing = self.inner.extensions.borrow().get(&key).cloned();
        if let Some(slot) = existing.and_then(|slot| slot.downcast::<T>().ok()) {
            return slot;
        }
        let slot = Rc::new(T::default());
        let erased: Rc<dyn Any> = slot.clone();
        self.inner.extensions.borrow_mut().insert(key, erased);
        slot
    }

    /// Drop all node state. Later calls fail with [`RegistryError::Disposed`].
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let nodes = std::mem::take(&mut *self.inner.nodes.borrow_mut());
        let count = nodes.len();
        for state in nodes.values() {
            for listener in &state.listeners {
                listener.active.set(false);
            }
        }
        drop(nodes);
        self.inner.preset.borrow_mut().clear();
        let extensions = std::mem::take(&mut *self.inner.extensions.borrow_mut());
        drop(extensions);
        debug!(registry = %self.inner.id, nodes = count, "registry disposed");
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn current(&self, node: NodeId) -> Option<Value> {
        self.inner
            .nodes
            .borrow()
            .get(&node)
            .map(|state| Rc::clone(&state.value))
    }

    /// Materialize `atom` if needed and return its value.
    fn ensure(&self, atom: &AnyAtom) -> Value {
        if let Some(value) = self.current(atom.id()) {
            return value;
        }
        let preset = self.inner.preset.borrow_mut().remove(&atom.id());
        let (value, deps) = match preset {
            Some(value) => (value, Vec::new()),
            None => self.evaluate(atom),
        };
        let upstream = self.wire(atom.id(), &deps);
        self.inner.nodes.borrow_mut().insert(
            atom.id(),
            NodeState {
                atom: atom.clone(),
                value: Rc::clone(&value),
                listeners: Vec::new(),
                mounts: 0,
                upstream,
                idle_since: Some(Instant::now()),
            },
        );
        trace!(
            registry = %self.inner.id,
            node = %atom.id(),
            label = ?atom.label(),
            deps = deps.len(),
            "node materialized"
        );
        value
    }

    fn evaluate(&self, atom: &AnyAtom) -> (Value, Vec<AnyAtom>) {
        let getter = Getter::new(self);
        let value = atom.compute(&getter);
        (value, getter.deps.into_inner())
    }

    /// Subscribe `node` to each dependency so it recomputes on change.
    fn wire(&self, node: NodeId, deps: &[AnyAtom]) -> Vec<Subscription> {
        deps.iter()
            .map(|dep| {
                let weak = Rc::downgrade(&self.inner);
                self.attach(
                    dep,
                    Box::new(move |_: &Value| {
                        if let Some(inner) = weak.upgrade() {
                            Registry { inner }.recompute(node);
                        }
                    }),
                )
            })
            .collect()
    }

    fn attach(&self, atom: &AnyAtom, callback: Box<dyn Fn(&Value)>) -> Subscription {
        self.ensure(atom);
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        let listener = Rc::new(Listener {
            id,
            active: Cell::new(true),
            callback,
        });
        if let Some(state) = self.inner.nodes.borrow_mut().get_mut(&atom.id()) {
            state.listeners.push(Rc::clone(&listener));
            state.idle_since = None;
        }
        Subscription {
            registry: Rc::downgrade(&self.inner),
            node: atom.id(),
            listener,
        }
    }

    pub(crate) fn read_value<T: Clone + 'static>(&self, atom: &Atom<T>) -> T {
        let value = self.ensure(&atom.erase());
        match value.downcast_ref::<T>() {
            Some(value) => value.clone(),
            None => {
                warn!(
                    node = %atom.id(),
                    expected = std::any::type_name::<T>(),
                    "stored value has an unexpected type; recomputing"
                );
                atom.read_with(&Getter::new(self))
            }
        }
    }

    pub(crate) fn write_value<R: 'static, W: 'static>(&self, node: &Writable<R, W>, value: W) {
        self.ensure(&node.erase());
        let ctx = WriteContext {
            registry: self,
            node: node.atom(),
        };
        node.apply(&ctx, value);
    }

    pub(crate) fn replace_value(&self, node: NodeId, value: Value) {
        let replaced = match self.inner.nodes.borrow_mut().get_mut(&node) {
            Some(state) => {
                state.value = value;
                true
            }
            None => false,
        };
        if replaced {
            self.notify(node);
        }
    }

    pub(crate) fn recompute(&self, node: NodeId) {
        let Some(atom) = self
            .inner
            .nodes
            .borrow()
            .get(&node)
            .map(|state| state.atom.clone())
        else {
            return;
        };
        let (value, deps) = self.evaluate(&atom);
        let upstream = self.wire(node, &deps);
        let stale = match self.inner.nodes.borrow_mut().get_mut(&node) {
            Some(state) => {
                state.value = value;
                std::mem::replace(&mut state.upstream, upstream)
            }
            None => upstream,
        };
        drop(stale);
        trace!(registry = %self.inner.id, %node, "node recomputed");
        self.notify(node);
    }

    fn notify(&self, node: NodeId) {
        let (value, listeners) = {
            let nodes = self.inner.nodes.borrow();
            let Some(state) = nodes.get(&node) else {
                return;
            };
            (Rc::clone(&state.value), state.listeners.clone())
        };
        for listener in listeners {
            if listener.active.get() {
                (listener.callback)(&value);
            }
        }
    }

    fn remove_listener(&self, node: NodeId, listener: u64) {
        let now_idle = match self.inner.nodes.borrow_mut().get_mut(&node) {
            Some(state) => {
                state.listeners.retain(|l| l.id != listener);
                Self::mark_idle(state)
            }
            None => false,
        };
        if now_idle {
            self.schedule_idle_check(node);
        }
    }

    fn unmount(&self, node: NodeId) {
        let now_idle = match self.inner.nodes.borrow_mut().get_mut(&node) {
            Some(state) => {
                state.mounts = state.mounts.saturating_sub(1);
                Self::mark_idle(state)
            }
            None => false,
        };
        if now_idle {
            self.schedule_idle_check(node);
        }
    }

    fn mark_idle(state: &mut NodeState) -> bool {
        if state.is_idle() {
            state.idle_since.get_or_insert_with(Instant::now);
            true
        } else {
            false
        }
    }

    fn release_if_idle(&self, node: NodeId) {
        let idle = self
            .inner
            .nodes
            .borrow()
            .get(&node)
            .is_some_and(NodeState::is_idle);
        if idle {
            self.schedule_idle_check(node);
        }
    }

    fn schedule_idle_check(&self, node: NodeId) {
        if self.inner.idle_ttl.is_none() || self.inner.disposed.get() {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        (self.inner.schedule_task)(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Registry { inner }.collect_if_idle(node);
            }
        }));
    }

    fn collect_if_idle(&self, node: NodeId) -> bool {
        let Some(ttl) = self.inner.idle_ttl else {
            return false;
        };
        let removed = {
            let mut nodes = self.inner.nodes.borrow_mut();
            let expired = nodes.get(&node).is_some_and(|state| {
                state.is_idle()
                    && !state.atom.keep_alive()
                    && state.idle_since.is_some_and(|since| since.elapsed() >= ttl)
            });
            if expired { nodes.remove(&node) } else { None }
        };
        match removed {
            Some(state) => {
                trace!(registry = %self.inner.id, %node, "idle node disposed");
                drop(state);
                true
            }
            None => false,
        }
    }
}

/// Records the nodes a read function depends on.
pub struct Getter<'a> {
    registry: &'a Registry,
    deps: RefCell<Vec<AnyAtom>>,
}

impl<'a> Getter<'a> {
    fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            deps: RefCell::new(Vec::new()),
        }
    }

    /// Read a node and record it as a dependency.
    pub fn get<T: Clone + 'static>(&self, atom: &Atom<T>) -> T {
        let value = self.registry.read_value(atom);
        let mut deps = self.deps.borrow_mut();
        if !deps.iter().any(|dep| dep.id() == atom.id()) {
            deps.push(atom.erase());
        }
        value
    }
}

impl fmt::Debug for Getter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Getter")
            .field("registry", &self.registry.id())
            .field("deps", &self.deps.borrow().len())
            .finish()
    }
}

/// Handle to a materialized node's internal state.
pub struct NodeHandle<'a> {
    registry: &'a Registry,
    atom: AnyAtom,
}

impl NodeHandle<'_> {
    /// Current type-erased value.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.registry.current(self.atom.id())
    }

    /// Overwrite the value directly, bypassing the node's write function,
    /// and notify listeners.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::TypeMismatch`] when `value` is not of the
    /// node's value type.
    pub fn set_value(&self, value: Value) -> Result<(), RegistryError> {
        if (*value).type_id() != self.atom.value_type() {
            return Err(RegistryError::TypeMismatch {
                node: self.atom.id(),
                expected: self.atom.value_type_name(),
            });
        }
        self.registry.replace_value(self.atom.id(), value);
        self.registry.release_if_idle(self.atom.id());
        Ok(())
    }
}

impl fmt::Debug for NodeHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("registry", &self.registry.id())
            .field("atom", &self.atom)
            .finish()
    }
}

/// RAII guard for a registry listener.
///
/// Dropping the guard deactivates the listener and removes it from the node.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    node: NodeId,
    listener: Rc<Listener>,
}

impl Subscription {
    /// The node being listened to.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Unsubscribe now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listener.active.set(false);
        if let Some(inner) = self.registry.upgrade() {
            Registry { inner }.remove_listener(self.node, self.listener.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("node", &self.node)
            .field("active", &self.listener.active.get())
            .finish()
    }
}

/// RAII guard for a mount. Dropping it unmounts the node.
#[must_use = "dropping a MountGuard unmounts immediately"]
pub struct MountGuard {
    registry: Weak<RegistryInner>,
    node: NodeId,
}

impl MountGuard {
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            Registry { inner }.unmount(self.node);
        }
    }
}

impl fmt::Debug for MountGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountGuard").field("node", &self.node).finish()
    }
}
