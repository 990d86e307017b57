#![forbid(unsafe_code)]

//! Standalone observable references.
//!
//! An [`RxRef<A>`] is a lighter contract than a registry node: it owns its
//! value directly, exposes `value()`/`subscribe()`, and can be focused on a
//! single field with [`RxRef::prop`]. It is not scoped to a registry.
//!
//! # Invariants
//!
//! 1. `set(v)` where `v == current` is a no-op (no notification).
//! 2. A prop ref notifies only when its projected value changes.
//! 3. `prop(lens)` returns the same ref for the same lens key while any
//!    handle to that prop ref is alive.
//! 4. A dropped [`RefSubscription`] is never invoked again.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of an [`RxRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(u64);

impl RefId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A named projection from `A` to one of its parts `B`.
///
/// The key identifies the projection for memoization, so two lenses with
/// the same key on the same parent must project the same part.
pub struct Lens<A, B> {
    pub key: &'static str,
    pub get: fn(&A) -> B,
    pub set: fn(&mut A, B),
}

impl<A, B> Lens<A, B> {
    pub const fn new(key: &'static str, get: fn(&A) -> B, set: fn(&mut A, B)) -> Self {
        Self { key, get, set }
    }
}

impl<A, B> Clone for Lens<A, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, B> Copy for Lens<A, B> {}

impl<A, B> fmt::Debug for Lens<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lens").field("key", &self.key).finish()
    }
}

type CallbackRc<T> = Rc<dyn Fn(&T)>;
type CallbackWeak<T> = Weak<dyn Fn(&T)>;

struct Listeners<T> {
    entries: RefCell<Vec<CallbackWeak<T>>>,
}

impl<T: 'static> Listeners<T> {
    fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    fn add(&self, callback: impl Fn(&T) + 'static) -> RefSubscription {
        let strong: CallbackRc<T> = Rc::new(callback);
        self.entries.borrow_mut().push(Rc::downgrade(&strong));
        RefSubscription {
            _guard: Box::new(strong),
        }
    }

    fn notify(&self, value: &T) {
        let live: Vec<CallbackRc<T>> = {
            let mut entries = self.entries.borrow_mut();
            entries.retain(|w| w.strong_count() > 0);
            entries.iter().filter_map(Weak::upgrade).collect()
        };
        for callback in live {
            callback(value);
        }
    }

    fn len(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

enum Source<A> {
    Root(RefCell<A>),
    Focused {
        read: Box<dyn Fn() -> A>,
        write: Box<dyn Fn(A)>,
        // Keeps the parent listener alive as long as this ref.
        _upstream: RefSubscription,
    },
}

struct RefInner<A> {
    id: RefId,
    source: Source<A>,
    listeners: Listeners<A>,
    props: RefCell<HashMap<(&'static str, TypeId), Box<dyn Any>>>,
}

/// Observable reference with structural focusing.
///
/// Cloning creates a new handle to the **same** reference.
pub struct RxRef<A> {
    inner: Rc<RefInner<A>>,
}

impl<A> Clone for RxRef<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: fmt::Debug + Clone + PartialEq + 'static> fmt::Debug for RxRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxRef")
            .field("id", &self.inner.id)
            .field("value", &self.value())
            .finish()
    }
}

impl<A: Clone + PartialEq + 'static> RxRef<A> {
    /// A root reference holding `value`.
    #[must_use]
    pub fn make(value: A) -> Self {
        Self::from_source(Source::Root(RefCell::new(value)))
    }

    fn from_source(source: Source<A>) -> Self {
        Self {
            inner: Rc::new(RefInner {
                id: RefId::next(),
                source,
                listeners: Listeners::new(),
                props: RefCell::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> RefId {
        self.inner.id
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> A {
        match &self.inner.source {
            Source::Root(value) => value.borrow().clone(),
            Source::Focused { read, .. } => read(),
        }
    }

    /// Replace the value. Listeners run only if it changed.
    pub fn set(&self, value: A) {
        match &self.inner.source {
            Source::Root(cell) => {
                {
                    let mut current = cell.borrow_mut();
                    if *current == value {
                        return;
                    }
                    *current = value.clone();
                }
                self.inner.listeners.notify(&value);
            }
            // The parent notifies us back through the upstream listener.
            Source::Focused { write, .. } => write(value),
        }
    }

    /// Modify the value in place.
    pub fn update(&self, f: impl FnOnce(&mut A)) {
        let mut value = self.value();
        f(&mut value);
        self.set(value);
    }

    /// Listen to value changes until the returned guard is dropped.
    pub fn subscribe(&self, f: impl Fn(&A) + 'static) -> RefSubscription {
        self.inner.listeners.add(f)
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// A reference focused on one part of this value.
    ///
    /// Memoized per lens key: repeated calls return the same ref while it is
    /// alive.
    pub fn prop<B: Clone + PartialEq + 'static>(&self, lens: Lens<A, B>) -> RxRef<B> {
        let key = (lens.key, TypeId::of::<B>());
        let cached = self
            .inner
            .props
            .borrow()
            .get(&key)
            .and_then(|slot| slot.downcast_ref::<Weak<RefInner<B>>>())
            .and_then(Weak::upgrade);
        if let Some(inner) = cached {
            return RxRef { inner };
        }

        let focused = self.focus(lens);
        self.inner
            .props
            .borrow_mut()
            .insert(key, Box::new(Rc::downgrade(&focused.inner)));
        focused
    }

    fn focus<B: Clone + PartialEq + 'static>(&self, lens: Lens<A, B>) -> RxRef<B> {
        let last = Rc::new(RefCell::new((lens.get)(&self.value())));
        let listeners: Rc<RefCell<Weak<RefInner<B>>>> = Rc::new(RefCell::new(Weak::new()));

        let slot = Rc::clone(&listeners);
        let upstream = self.subscribe(move |parent: &A| {
            let next = (lens.get)(parent);
            if *last.borrow() == next {
                return;
            }
            *last.borrow_mut() = next.clone();
            let target = slot.borrow().upgrade();
            if let Some(inner) = target {
                inner.listeners.notify(&next);
            }
        });

        let reader = self.clone();
        let writer = self.clone();
        let focused = RxRef::from_source(Source::Focused {
            read: Box::new(move || (lens.get)(&reader.value())),
            write: Box::new(move |value: B| writer.update(|parent| (lens.set)(parent, value))),
            _upstream: upstream,
        });
        *listeners.borrow_mut() = Rc::downgrade(&focused.inner);
        focused
    }
}

impl<A> PartialEq for RxRef<A> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// RAII guard for an [`RxRef`] listener.
#[must_use = "dropping a RefSubscription unsubscribes immediately"]
pub struct RefSubscription {
    _guard: Box<dyn Any>,
}

impl fmt::Debug for RefSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefSubscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq)]
    struct Form {
        name: String,
        age: u32,
    }

    const NAME: Lens<Form, String> = Lens::new(
        "name",
        |form: &Form| form.name.clone(),
        |form: &mut Form, name: String| form.name = name,
    );
    const AGE: Lens<Form, u32> = Lens::new(
        "age",
        |form: &Form| form.age,
        |form: &mut Form, age: u32| form.age = age,
    );

    fn form() -> RxRef<Form> {
        RxRef::make(Form {
            name: "ada".into(),
            age: 36,
        })
    }

    #[test]
    fn set_notifies_only_on_change() {
        let r = RxRef::make(1);
        let calls = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&calls);
        let _sub = r.subscribe(move |_| c.set(c.get() + 1));
        r.set(1);
        r.set(2);
        r.set(2);
        assert_eq!(calls.get(), 1);
        assert_eq!(r.value(), 2);
    }

    #[test]
    fn dropped_subscription_is_silent() {
        let r = RxRef::make(0);
        let calls = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&calls);
        let sub = r.subscribe(move |_| c.set(c.get() + 1));
        drop(sub);
        r.set(5);
        assert_eq!(calls.get(), 0);
        assert_eq!(r.listener_count(), 0);
    }

    #[test]
    fn prop_reads_and_writes_through_parent() {
        let parent = form();
        let age = parent.prop(AGE);
        assert_eq!(age.value(), 36);
        age.set(37);
        assert_eq!(parent.value().age, 37);
    }

    #[test]
    fn prop_ignores_unrelated_changes() {
        let parent = form();
        let age = parent.prop(AGE);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = age.subscribe(move |v| s.borrow_mut().push(*v));

        parent.prop(NAME).set("grace".into());
        parent.update(|f| f.age = 40);

        assert_eq!(*seen.borrow(), vec![40]);
    }

    #[test]
    fn prop_is_memoized_per_key() {
        let parent = form();
        let a = parent.prop(AGE);
        let b = parent.prop(AGE);
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(parent.prop(NAME).id(), parent.id());
    }

    #[test]
    fn dropped_prop_is_rebuilt() {
        let parent = form();
        let first = parent.prop(AGE).id();
        let second = parent.prop(AGE).id();
        assert_ne!(first, second);
        assert_eq!(parent.listener_count(), 0);
    }
}
