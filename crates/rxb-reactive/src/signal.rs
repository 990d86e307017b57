#![forbid(unsafe_code)]

//! Signals: a version-tracked cell split into a read half and a write half.
//!
//! # Design
//!
//! [`create_signal`] returns an [`Accessor<T>`] (cloneable, read-only) and a
//! [`Signal<T>`] (the single writer). Both share one `Rc<RefCell<..>>`.
//! Watchers are stored weakly and handed out as [`Watch`] guards.
//!
//! | Operation     | Complexity               |
//! |---------------|--------------------------|
//! | `get()`       | O(1)                     |
//! | `set()`       | O(W) where W = watchers  |
//! | `subscribe()` | O(1) amortized           |
//!
//! # Invariants
//!
//! 1. `version` increments by exactly 1 on every write. Writes are not
//!    compared: the writer decides when a value is new.
//! 2. Watchers are notified in registration order, outside the borrow.
//! 3. A dropped [`Watch`] is never invoked again.
//!
//! # Failure Modes
//!
//! - **Re-entrant `with`**: calling `set()` from inside a `with()` closure
//!   panics (RefCell borrow rules).

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type CallbackRc<T> = Rc<dyn Fn(&T)>;
type CallbackWeak<T> = Weak<dyn Fn(&T)>;

struct SignalInner<T> {
    value: T,
    version: u64,
    watchers: Vec<CallbackWeak<T>>,
}

/// Create a signal holding `value`.
pub fn create_signal<T: Clone + 'static>(value: T) -> (Accessor<T>, Signal<T>) {
    let inner = Rc::new(RefCell::new(SignalInner {
        value,
        version: 0,
        watchers: Vec::new(),
    }));
    (
        Accessor {
            inner: Rc::clone(&inner),
        },
        Signal { inner },
    )
}

/// Read half of a signal.
pub struct Accessor<T> {
    inner: Rc<RefCell<SignalInner<T>>>,
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Accessor")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

impl<T: Clone + 'static> Accessor<T> {
    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Number of writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Call `f` after every write until the returned guard is dropped.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Watch {
        let strong: CallbackRc<T> = Rc::new(f);
        self.inner
            .borrow_mut()
            .watchers
            .push(Rc::downgrade(&strong));
        Watch {
            _guard: Box::new(strong),
        }
    }

    /// Live watcher count.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.inner
            .borrow()
            .watchers
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Whether both accessors read the same signal.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Write half of a signal. Not cloneable: a signal has one writer.
pub struct Signal<T> {
    inner: Rc<RefCell<SignalInner<T>>>,
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &self.inner.borrow().value)
            .finish()
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Store `value` and notify watchers.
    pub fn set(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.value = value;
            inner.version += 1;
        }
        self.notify();
    }

    /// Modify the value in place and notify watchers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        {
            let mut inner = self.inner.borrow_mut();
            f(&mut inner.value);
            inner.version += 1;
        }
        self.notify();
    }

    fn notify(&self) {
        let callbacks: Vec<CallbackRc<T>> = {
            let mut inner = self.inner.borrow_mut();
            inner.watchers.retain(|w| w.strong_count() > 0);
            inner.watchers.iter().filter_map(Weak::upgrade).collect()
        };
        let value = self.inner.borrow().value.clone();
        for callback in callbacks {
            callback(&value);
        }
    }
}

/// RAII guard for a signal watcher.
#[must_use = "dropping a Watch stops it immediately"]
pub struct Watch {
    _guard: Box<dyn Any>,
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch").finish_non_exhaustive()
    }
}
