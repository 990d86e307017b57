#![forbid(unsafe_code)]

//! Asynchronous result state carried by registry nodes.
//!
//! An [`AsyncResult`] tracks an in-flight computation:
//!
//! ```text
//! Initial ──▶ Success { value }
//!    │            │ ▲
//!    │            ▼ │   (waiting = true while a recomputation runs)
//!    └──────▶ Failure { cause }
//! ```
//!
//! # Invariants
//!
//! 1. `Initial` never carries a previous value; only `Success` and
//!    `Failure` can be stale-while-revalidating.
//! 2. [`Cause::squash`] picks the first typed failure, then the first
//!    defect, then interruption, in depth-first order.

use std::fmt;

/// Why an asynchronous computation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause<E> {
    /// An expected, typed failure.
    Fail(E),
    /// An unexpected defect, described by message.
    Die(String),
    /// The computation was interrupted.
    Interrupt,
    /// Several causes that happened one after another.
    Sequential(Vec<Cause<E>>),
}

impl<E> Cause<E> {
    /// Shorthand for [`Cause::Fail`].
    pub fn fail(error: E) -> Self {
        Self::Fail(error)
    }

    /// Shorthand for [`Cause::Die`].
    pub fn die(message: impl Into<String>) -> Self {
        Self::Die(message.into())
    }

    /// The first typed failure in this cause, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Fail(error) => Some(error),
            Self::Sequential(causes) => causes.iter().find_map(Self::failure),
            Self::Die(_) | Self::Interrupt => None,
        }
    }

    fn defect(&self) -> Option<&str> {
        match self {
            Self::Die(message) => Some(message),
            Self::Sequential(causes) => causes.iter().find_map(Self::defect),
            Self::Fail(_) | Self::Interrupt => None,
        }
    }

    /// Collapse the cause into the single error that should be surfaced.
    #[must_use]
    pub fn squash(&self) -> Squashed<E>
    where
        E: Clone,
    {
        if let Some(error) = self.failure() {
            return Squashed::Failure(error.clone());
        }
        if let Some(message) = self.defect() {
            return Squashed::Defect(message.to_owned());
        }
        Squashed::Interrupted
    }
}

/// A [`Cause`] reduced to one surfaced error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Squashed<E> {
    /// A typed failure.
    Failure(E),
    /// A defect message.
    Defect(String),
    /// Interruption with no failure or defect recorded.
    Interrupted,
}

impl<E: fmt::Display> fmt::Display for Squashed<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure(error) => write!(f, "{error}"),
            Self::Defect(message) => write!(f, "defect: {message}"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Squashed<E> {}

/// Terminal outcome of an asynchronous computation.
pub type Exit<A, E> = Result<A, Cause<E>>;

/// State of an asynchronous node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncResult<A, E> {
    /// No value yet. `waiting` is set once the first computation started.
    Initial { waiting: bool },
    /// A successful value, possibly being recomputed.
    Success { value: A, waiting: bool },
    /// A failure, possibly being recomputed.
    Failure { cause: Cause<E>, waiting: bool },
}

impl<A, E> Default for AsyncResult<A, E> {
    fn default() -> Self {
        Self::initial()
    }
}

impl<A, E> AsyncResult<A, E> {
    /// `Initial` with no computation in flight.
    #[must_use]
    pub const fn initial() -> Self {
        Self::Initial { waiting: false }
    }

    /// A settled success.
    pub const fn success(value: A) -> Self {
        Self::Success {
            value,
            waiting: false,
        }
    }

    /// A settled failure.
    pub const fn failure(cause: Cause<E>) -> Self {
        Self::Failure {
            cause,
            waiting: false,
        }
    }

    /// A settled failure with a typed error.
    pub const fn fail(error: E) -> Self {
        Self::failure(Cause::Fail(error))
    }

    /// The same state, marked as recomputing.
    #[must_use]
    pub fn into_waiting(self) -> Self {
        self.with_waiting(true)
    }

    /// The same state with the `waiting` flag replaced.
    #[must_use]
    pub fn with_waiting(self, waiting: bool) -> Self {
        match self {
            Self::Initial { .. } => Self::Initial { waiting },
            Self::Success { value, .. } => Self::Success { value, waiting },
            Self::Failure { cause, .. } => Self::Failure { cause, waiting },
        }
    }

    #[must_use]
    pub const fn is_initial(&self) -> bool {
        matches!(self, Self::Initial { .. })
    }

    #[must_use]
    pub const fn is_not_initial(&self) -> bool {
        !self.is_initial()
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Whether a computation is in flight.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        match self {
            Self::Initial { waiting }
            | Self::Success { waiting, .. }
            | Self::Failure { waiting, .. } => *waiting,
        }
    }

    /// The success value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&A> {
        match self {
            Self::Success { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Convert to an [`Exit`]. `Initial` has no exit.
    #[must_use]
    pub fn to_exit(&self) -> Option<Exit<A, E>>
    where
        A: Clone,
        E: Clone,
    {
        match self {
            Self::Initial { .. } => None,
            Self::Success { value, .. } => Some(Ok(value.clone())),
            Self::Failure { cause, .. } => Some(Err(cause.clone())),
        }
    }

    /// Drop the `Initial` case, keeping the settled variants.
    #[must_use]
    pub fn into_settled(self) -> Option<Settled<A, E>> {
        match self {
            Self::Initial { .. } => None,
            Self::Success { value, waiting } => Some(Settled::Success { value, waiting }),
            Self::Failure { cause, waiting } => Some(Settled::Failure { cause, waiting }),
        }
    }
}

/// An [`AsyncResult`] that is known not to be `Initial`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<A, E> {
    Success { value: A, waiting: bool },
    Failure { cause: Cause<E>, waiting: bool },
}

impl<A, E> Settled<A, E> {
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        match self {
            Self::Success { waiting, .. } | Self::Failure { waiting, .. } => *waiting,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub const fn value(&self) -> Option<&A> {
        match self {
            Self::Success { value, .. } => Some(value),
            Self::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn into_exit(self) -> Exit<A, E> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Failure { cause, .. } => Err(cause),
        }
    }
}

impl<A, E> From<Settled<A, E>> for AsyncResult<A, E> {
    fn from(settled: Settled<A, E>) -> Self {
        match settled {
            Settled::Success { value, waiting } => Self::Success { value, waiting },
            Settled::Failure { cause, waiting } => Self::Failure { cause, waiting },
        }
    }
}
