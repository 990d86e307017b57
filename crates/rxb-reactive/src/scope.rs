#![forbid(unsafe_code)]

//! Ownership scopes.
//!
//! A [`Scope`] is the explicit owner threaded through every reactive
//! constructor. It collects teardown callbacks, carries context values down
//! to child scopes, and memoizes per-scope values by key.
//!
//! # Design
//!
//! Scopes form a tree. A child holds its parent strongly (so context lookups
//! always reach the root); a parent holds its children weakly (so dropping a
//! child handle tears the child down without waiting for the parent).
//!
//! # Invariants
//!
//! 1. Teardown runs at most once per scope: children first (most recent
//!    first), then cleanups in reverse registration order.
//! 2. A cleanup registered on an already-disposed scope runs immediately.
//! 3. Memoized values are dropped on dispose; a disposed scope never caches.
//!
//! # Failure Modes
//!
//! - **Panicking cleanup**: remaining cleanups of that scope are skipped.
//!   The scope is already marked disposed and will not retry them.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

/// Scope identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

type Cleanup = Box<dyn FnOnce()>;

struct ScopeInner {
    id: ScopeId,
    parent: Option<Rc<ScopeInner>>,
    children: RefCell<Vec<Weak<ScopeInner>>>,
    cleanups: RefCell<Vec<Cleanup>>,
    contexts: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    /// One `HashMap<K, T>` per `(K, T)` pair.
    memo: RefCell<HashMap<TypeId, Box<dyn Any>>>,
    disposed: Cell<bool>,
}

impl ScopeInner {
    fn new(parent: Option<Rc<ScopeInner>>) -> Rc<Self> {
        Rc::new(Self {
            id: ScopeId::next(),
            parent,
            children: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            contexts: RefCell::new(HashMap::new()),
            memo: RefCell::new(HashMap::new()),
            disposed: Cell::new(false),
        })
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children.iter().rev().filter_map(Weak::upgrade) {
            child.dispose();
        }
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        let count = cleanups.len();
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
        let memo = std::mem::take(&mut *self.memo.borrow_mut());
        drop(memo);
        let contexts = std::mem::take(&mut *self.contexts.borrow_mut());
        drop(contexts);
        trace!(scope = %self.id, cleanups = count, "scope disposed");
    }
}

/// Owner of teardown callbacks, context values and memoized values.
///
/// Dropping a `Scope` disposes it.
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    /// A scope with no parent.
    #[must_use]
    pub fn root() -> Self {
        Self {
            inner: ScopeInner::new(None),
        }
    }

    /// A child scope, disposed together with this one.
    ///
    /// A child created on a disposed scope starts out disposed.
    #[must_use]
    pub fn child(&self) -> Self {
        let inner = ScopeInner::new(Some(Rc::clone(&self.inner)));
        if self.inner.disposed.get() {
            inner.dispose();
        } else {
            let mut children = self.inner.children.borrow_mut();
            children.retain(|c| c.strong_count() > 0);
            children.push(Rc::downgrade(&inner));
        }
        Self { inner }
    }

    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Run `f` when this scope is disposed.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        if self.inner.disposed.get() {
            f();
            return;
        }
        self.inner.cleanups.borrow_mut().push(Box::new(f));
    }

    /// Keep `guard` alive until this scope is disposed, then drop it.
    pub fn own<G: 'static>(&self, guard: G) {
        self.on_cleanup(move || drop(guard));
    }

    /// Tear the scope down now. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Make `value` visible to this scope and its descendants.
    pub fn provide_context<T: 'static>(&self, value: T) {
        if self.inner.disposed.get() {
            return;
        }
        self.inner
            .contexts
            .borrow_mut()
            .insert(TypeId::of::<T>(), Rc::new(value));
    }

    /// Nearest context value of type `T`, searching up to the root.
    #[must_use]
    pub fn use_context<T: Clone + 'static>(&self) -> Option<T> {
        let mut current = Some(&self.inner);
        while let Some(scope) = current {
            let found = scope
                .contexts
                .borrow()
                .get(&TypeId::of::<T>())
                .and_then(|value| value.downcast_ref::<T>())
                .cloned();
            if found.is_some() {
                return found;
            }
            current = scope.parent.as_ref();
        }
        None
    }

    /// The value memoized under `key`, or the result of `init` stored there.
    ///
    /// `init` runs without any internal borrow held, so it may itself use
    /// this scope. If it stored a value under the same key, that value wins.
    pub fn cached<K, T>(&self, key: K, init: impl FnOnce() -> T) -> T
    where
        K: Hash + Eq + 'static,
        T: Clone + 'static,
    {
        match self.try_cached(key, || Ok::<T, Infallible>(init())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`cached`](Self::cached), but only successful results are stored.
    ///
    /// # Errors
    ///
    /// Returns whatever `init` returns; nothing is memoized in that case.
    pub fn try_cached<K, T, E>(&self, key: K, init: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        K: Hash + Eq + 'static,
        T: Clone + 'static,
    {
        let slot = TypeId::of::<(K, T)>();
        let hit = self
            .inner
            .memo
            .borrow()
            .get(&slot)
            .and_then(|table| table.downcast_ref::<HashMap<K, T>>())
            .and_then(|table| table.get(&key))
            .cloned();
        if let Some(value) = hit {
            return Ok(value);
        }

        let value = init()?;
        if self.inner.disposed.get() {
            return Ok(value);
        }
        let mut memo = self.inner.memo.borrow_mut();
        let table = memo
            .entry(slot)
            .or_insert_with(|| Box::new(HashMap::<K, T>::new()) as Box<dyn Any>);
        Ok(match table.downcast_mut::<HashMap<K, T>>() {
            Some(table) => table.entry(key).or_insert(value).clone(),
            None => value,
        })
    }

    /// Number of memoized entries of type `(K, T)`.
    #[must_use]
    pub fn cached_len<K, T>(&self) -> usize
    where
        K: Hash + Eq + 'static,
        T: 'static,
    {
        self.inner
            .memo
            .borrow()
            .get(&TypeId::of::<(K, T)>())
            .and_then(|table| table.downcast_ref::<HashMap<K, T>>())
            .map_or(0, HashMap::len)
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("disposed", &self.inner.disposed.get())
            .field("cleanups", &self.inner.cleanups.borrow().len())
            .finish()
    }
}
