#![forbid(unsafe_code)]

//! Reference bridge: [`RxRef`] → signal.
//!
//! Same shape as the value bridge, against the simpler ref contract: no
//! registry lookup, and equality filtering is done by the ref itself.

use std::any::TypeId;

use rxb_reactive::{Accessor, Scope, create_signal};
use rxb_registry::{Lens, RefId, RxRef};

/// An accessor following `source` for the lifetime of `scope`.
pub fn bridge_ref<A: Clone + PartialEq + 'static>(scope: &Scope, source: &RxRef<A>) -> Accessor<A> {
    let (read, write) = create_signal(source.value());
    let subscription = source.subscribe(move |value: &A| write.set(value.clone()));
    scope.own(subscription);
    read
}

/// A ref focused through `lens`, memoized per (ref, lens key) in `scope`.
///
/// The memo key is the lens's `key` string and output type, not its
/// functions: two lenses sharing a key and output type get the same focused
/// ref, built from whichever lens was used first. Give lenses over
/// different fields different keys, as with [`RxRef::prop`].
pub fn bridge_ref_prop<A, B>(scope: &Scope, source: &RxRef<A>, lens: Lens<A, B>) -> RxRef<B>
where
    A: Clone + PartialEq + 'static,
    B: Clone + PartialEq + 'static,
{
    let key: (RefId, &'static str, TypeId) = (source.id(), lens.key, TypeId::of::<B>());
    scope.cached(key, || source.prop(lens))
}

/// An accessor for one field of `source`. Changes to other fields do not
/// touch it.
pub fn bridge_ref_prop_value<A, B>(scope: &Scope, source: &RxRef<A>, lens: Lens<A, B>) -> Accessor<B>
where
    A: Clone + PartialEq + 'static,
    B: Clone + PartialEq + 'static,
{
    bridge_ref(scope, &bridge_ref_prop(scope, source, lens))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    const X: Lens<Point, i32> = Lens::new("x", |p: &Point| p.x, |p: &mut Point, x: i32| p.x = x);

    #[test]
    fn ref_accessor_follows_and_stops() {
        let scope = Scope::root();
        let point = RxRef::make(Point { x: 0, y: 0 });
        let read = bridge_ref(&scope, &point);
        point.update(|p| p.y = 4);
        assert_eq!(read.get().y, 4);
        scope.dispose();
        point.update(|p| p.y = 5);
        assert_eq!(read.get().y, 4);
    }

    #[test]
    fn prop_value_only_moves_with_its_field() {
        let scope = Scope::root();
        let point = RxRef::make(Point { x: 1, y: 1 });
        let x = bridge_ref_prop_value(&scope, &point, X);
        point.update(|p| p.y = 9);
        assert_eq!(x.version(), 0);
        point.update(|p| p.x = 2);
        assert_eq!((x.get(), x.version()), (2, 1));
    }

    #[test]
    fn prop_ref_is_memoized_in_scope() {
        let scope = Scope::root();
        let point = RxRef::make(Point { x: 1, y: 1 });
        let a = bridge_ref_prop(&scope, &point, X);
        let b = bridge_ref_prop(&scope, &point, X);
        assert_eq!(a, b);
    }

    #[test]
    fn prop_memo_is_keyed_by_lens_key() {
        const Y_UNDER_X: Lens<Point, i32> =
            Lens::new("x", |p: &Point| p.y, |p: &mut Point, y: i32| p.y = y);
        let scope = Scope::root();
        let point = RxRef::make(Point { x: 1, y: 2 });
        let x = bridge_ref_prop(&scope, &point, X);
        let shadowed = bridge_ref_prop(&scope, &point, Y_UNDER_X);
        assert_eq!(x, shadowed);
        assert_eq!(shadowed.value(), 1);
    }
}
