#![forbid(unsafe_code)]

//! Effects bound to a scope.

use crate::scope::Scope;
use crate::signal::Accessor;

/// Run `f` with the current value of `source`, then again after every write,
/// until `scope` is disposed.
pub fn create_effect<T: Clone + 'static>(
    scope: &Scope,
    source: &Accessor<T>,
    f: impl Fn(&T) + 'static,
) {
    if scope.is_disposed() {
        return;
    }
    source.with(&f);
    let watch = source.subscribe(f);
    scope.own(watch);
}
