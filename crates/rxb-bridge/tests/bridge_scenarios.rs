//! End-to-end behavior of the bridge against a live registry.
//!
//! Covers:
//! 1. Seeding: a bridged accessor starts at `registry.get(node)`.
//! 2. Hydration idempotence, including user writes between batches.
//! 3. Exactly-once settle for `Initial -> Waiting -> Success`.
//! 4. `suspend_on_waiting` on and off.
//! 5. Teardown completeness for read, set, suspense and ref bridges.
//! 6. Derived-node memoization (one subscription per scope).
//! 7. Registry resolution, providers and idle disposal through a task queue.
//! 8. Bridges over nodes that are idle or past their TTL.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rxb_bridge::{
    BridgeError, BridgeRuntime, HydrationRecord, SuspenseOptions, apply_hydration,
    bridge_hydrate, bridge_read, bridge_read_map, bridge_read_write, bridge_ref,
    bridge_ref_prop_value, bridge_resource_set, bridge_set, bridge_subscribe, bridge_suspense,
    extract_state, provide_registry, provide_state, resolve_registry, resolve_registry_strict,
    state_extractor,
};
use rxb_reactive::{Accessor, Scope, TaskQueue};
use rxb_registry::{
    AsyncResult, Atom, Cause, Getter, Lens, Registry, RegistryConfig, RegistryError, RxRef,
    Settled, SubscribeOptions, Writable, WriteContext,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A root scope with a registry whose idle checks wait in a task queue.
fn setup_queued(ttl: Duration) -> (Scope, Registry, TaskQueue) {
    init_tracing();
    let queue = TaskQueue::new();
    let q = queue.clone();
    let registry = Registry::new(
        RegistryConfig::default()
            .with_idle_ttl(Some(ttl))
            .with_scheduler(move |task| q.schedule_boxed(task)),
    );
    let scope = Scope::root();
    provide_registry(&scope, registry.clone());
    (scope, registry, queue)
}

/// A root scope with a fresh registry that never collects idle nodes.
fn setup() -> (Scope, Registry) {
    init_tracing();
    let scope = Scope::root();
    let registry = Registry::new(RegistryConfig::default().with_idle_ttl(None));
    provide_registry(&scope, registry.clone());
    (scope, registry)
}

#[derive(Debug, Clone, PartialEq)]
struct Todos {
    items: Vec<&'static str>,
}

type TodosResult = AsyncResult<Todos, String>;

// ── Seeding ────────────────────────────────────────────────────────────────

#[test]
fn read_starts_at_registry_value() {
    let (scope, registry) = setup();
    let count = Atom::make(0);
    registry.set(&count, 41).unwrap();
    let label = count.map(|n| format!("#{n}"));

    let read = bridge_read(&scope, &count).unwrap();
    let text = bridge_read(&scope, &label).unwrap();

    assert_eq!(read.get(), registry.get(&count).unwrap());
    assert_eq!(text.get(), "#41");
    assert_eq!(read.version(), 0);
}

#[test]
fn read_follows_derived_recomputation() {
    let (scope, registry) = setup();
    let count = Atom::make(1);
    let label = count.map(|n| format!("#{n}"));
    let text = bridge_read(&scope, &label).unwrap();
    registry.set(&count, 2).unwrap();
    assert_eq!(text.get(), "#2");
}

// ── Updaters ───────────────────────────────────────────────────────────────

#[test]
fn counter_updater_three_times() {
    let (scope, _registry) = setup();
    let count = Atom::make(0);
    let (read, write) = bridge_read_write(&scope, &count).unwrap();
    for _ in 0..3 {
        write.update(|v| v + 1).unwrap();
    }
    assert_eq!(read.get(), 3);
}

#[test]
fn custom_write_function_receives_requests() {
    let (scope, registry) = setup();
    let total = Atom::make(0);
    let add: Writable<i32, i32> = Atom::writable(
        {
            let total = total.clone();
            move |get: &Getter<'_>| get.get(&total)
        },
        {
            let total = total.clone();
            move |ctx: &WriteContext<'_, i32>, delta: i32| {
                let next = ctx.get(&total) + delta;
                ctx.set(&total, next);
            }
        },
    );
    let (read, write) = bridge_read_write(&scope, &add).unwrap();
    write.set(5).unwrap();
    write.update(|current| *current).unwrap();
    assert_eq!(registry.get(&total), Ok(10));
    assert_eq!(read.get(), 10);
}

// ── Hydration ──────────────────────────────────────────────────────────────

#[test]
fn hydration_is_idempotent_and_respects_user_writes() {
    let (scope, registry) = setup();
    let count = Atom::make(0);
    let batch = vec![HydrationRecord::new(&count, 7)];

    bridge_hydrate(&scope, batch.clone()).unwrap();
    let once = registry.get(&count).unwrap();
    bridge_hydrate(&scope, batch.clone()).unwrap();
    assert_eq!(registry.get(&count).unwrap(), once);

    let read = bridge_read(&scope, &count).unwrap();
    registry.set(&count, 8).unwrap();
    let report = bridge_hydrate(&scope, batch).unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(registry.get(&count), Ok(8));
    assert_eq!(read.get(), 8);
}

#[test]
fn nested_scopes_seed_once() {
    let (scope, registry) = setup();
    let count = Atom::make(0);
    let batch = vec![HydrationRecord::new(&count, 3)];
    let outer = scope.child();
    let inner = outer.child();
    let first = bridge_hydrate(&outer, batch.clone()).unwrap();
    let second = bridge_hydrate(&inner, batch).unwrap();
    assert_eq!((first.applied, second.applied), (1, 0));
    assert_eq!(registry.get(&count), Ok(3));
}

#[test]
fn hydration_seeds_bypass_write_function() {
    let (_scope, registry) = setup();
    let writes = Rc::new(RefCell::new(0));
    let w = Rc::clone(&writes);
    let guarded: Writable<i32, i32> = Atom::writable(
        |_| 0,
        move |ctx, value| {
            *w.borrow_mut() += 1;
            ctx.set_self(value);
        },
    );
    apply_hydration(&registry, [HydrationRecord::new(&guarded, 4)]).unwrap();
    assert_eq!(registry.get(&guarded), Ok(4));
    assert_eq!(*writes.borrow(), 0);
}

#[test]
fn extract_skips_derived_nodes() {
    let (scope, registry) = setup();
    let count = Atom::make(0);
    let name = Atom::make(String::new());
    let shout = name.map(|s| s.to_uppercase());
    registry.set(&count, 1).unwrap();
    registry.set(&name, "a".to_string()).unwrap();
    let _ = bridge_read(&scope, &shout).unwrap();

    let records = state_extractor(&scope).extract();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].node(), &count.erase());
    assert_eq!(records[0].value_as::<i32>(), Some(&1));
    assert_eq!(records[1].node(), &name.erase());
    assert_eq!(records[1].value_as::<String>().map(String::as_str), Some("a"));
}

#[test]
fn provide_state_seeds_a_fresh_registry() {
    init_tracing();
    let source = Registry::new(RegistryConfig::default().with_idle_ttl(None));
    let count = Atom::make(0);
    source.set(&count, 12).unwrap();

    let scope = Scope::root();
    let registry = provide_state(
        &scope,
        extract_state(&source),
        RegistryConfig::default().with_idle_ttl(None),
    );
    let read = bridge_read(&scope, &count).unwrap();
    assert_eq!(read.get(), 12);
    scope.dispose();
    assert!(registry.is_disposed());
    assert_eq!(
        registry.get(&count),
        Err(RegistryError::Disposed { registry: registry.id() })
    );
}

// ── Suspense ───────────────────────────────────────────────────────────────

#[test]
fn todos_load_then_settle() {
    let (scope, registry) = setup();
    let todos: Writable<TodosResult> = Atom::make(AsyncResult::initial().into_waiting());
    let resource = bridge_suspense(&scope, &todos, SuspenseOptions::default()).unwrap();
    assert!(resource.loading());
    assert_eq!(resource.read(), None);

    let loaded = Todos {
        items: vec!["write", "test"],
    };
    registry.set(&todos, AsyncResult::success(loaded.clone())).unwrap();
    assert!(!resource.loading());
    assert_eq!(resource.read().as_ref().and_then(Settled::value), Some(&loaded));
}

#[test]
fn settles_exactly_once_and_never_reloads_on_success() {
    let (scope, registry) = setup();
    let node: Writable<AsyncResult<u32, String>> = Atom::make(AsyncResult::initial());
    let resource = bridge_suspense(&scope, &node, SuspenseOptions::default()).unwrap();

    let loading_seen = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&loading_seen);
    let _watch = resource.watch(move |snapshot| seen.borrow_mut().push(snapshot.loading));

    registry.set(&node, AsyncResult::initial().into_waiting()).unwrap();
    assert!(resource.loading());
    registry.set(&node, AsyncResult::success(1)).unwrap();
    assert_eq!(resource.resolutions(), 1);

    loading_seen.borrow_mut().clear();
    registry.set(&node, AsyncResult::success(2)).unwrap();
    registry.set(&node, AsyncResult::success(3)).unwrap();
    assert_eq!(resource.resolutions(), 1);
    assert_eq!(*loading_seen.borrow(), vec![false, false]);
    assert_eq!(resource.read().as_ref().and_then(Settled::value), Some(&3));
}

#[test]
fn suspend_on_waiting_holds_loading() {
    let (scope, registry) = setup();
    let node: Writable<AsyncResult<u32, String>> = Atom::make(AsyncResult::success(1));
    let resource = bridge_suspense(&scope, &node, SuspenseOptions::suspend_on_waiting()).unwrap();
    assert!(!resource.loading());

    registry.set(&node, AsyncResult::success(1).into_waiting()).unwrap();
    assert!(resource.loading());
    assert_eq!(resource.read(), None);

    registry.set(&node, AsyncResult::success(2)).unwrap();
    assert!(!resource.loading());
    assert_eq!(resource.read().as_ref().and_then(Settled::value), Some(&2));
}

#[test]
fn waiting_shows_stale_value_by_default() {
    let (scope, registry) = setup();
    let node: Writable<AsyncResult<u32, String>> = Atom::make(AsyncResult::success(1));
    let resource = bridge_suspense(&scope, &node, SuspenseOptions::default()).unwrap();

    registry.set(&node, AsyncResult::success(1).into_waiting()).unwrap();
    assert!(!resource.loading());
    let shown = resource.read().unwrap();
    assert!(shown.is_waiting());
    assert_eq!(shown.value(), Some(&1));
}

#[test]
fn waiting_initial_suspends_even_without_option() {
    let (scope, _registry) = setup();
    let node: Writable<AsyncResult<u32, String>> =
        Atom::make(AsyncResult::initial().into_waiting());
    let resource = bridge_suspense(&scope, &node, SuspenseOptions::default()).unwrap();
    assert!(resource.loading());
}

#[test]
fn resource_set_submit_and_refetch() {
    let (scope, registry) = setup();
    let runs = Rc::new(RefCell::new(0u32));
    let r = Rc::clone(&runs);
    let node: Writable<AsyncResult<u32, String>> = Atom::writable(
        move |_| {
            *r.borrow_mut() += 1;
            AsyncResult::success(*r.borrow())
        },
        |ctx, value| ctx.set_self(value),
    );
    let set = bridge_resource_set(&scope, &node).unwrap();
    assert_eq!(set.read(), Some(Ok(1)));

    set.submit(AsyncResult::fail("bad input".to_string()));
    assert_eq!(set.read(), Some(Err(Cause::Fail("bad input".to_string()))));

    set.refetch();
    assert_eq!(set.read(), Some(Ok(2)));
    assert_eq!(registry.get(&node), Ok(AsyncResult::success(2)));
}

// ── Teardown ───────────────────────────────────────────────────────────────

#[test]
fn read_stops_after_dispose() {
    let (scope, registry) = setup();
    let count = Atom::make(0);
    let child = scope.child();
    let read = bridge_read(&child, &count).unwrap();
    child.dispose();
    let before = read.version();
    registry.set(&count, 9).unwrap();
    assert_eq!(read.version(), before);
    assert_eq!(read.get(), 0);
    assert_eq!(registry.node_stats(&count.erase()).map(|s| s.listeners), Some(0));
}

#[test]
fn subscribe_stops_after_dispose() {
    let (scope, registry) = setup();
    let count = Atom::make(0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    let child = scope.child();
    bridge_subscribe(
        &child,
        &count,
        move |v| s.borrow_mut().push(*v),
        SubscribeOptions::immediate(),
    )
    .unwrap();
    registry.set(&count, 1).unwrap();
    child.dispose();
    registry.set(&count, 2).unwrap();
    assert_eq!(*seen.borrow(), vec![0, 1]);
}

#[test]
fn set_releases_mount_after_dispose() {
    let (scope, registry) = setup();
    let count = Atom::make(0);
    let child = scope.child();
    let write = bridge_set(&child, &count).unwrap();
    write.set(1).unwrap();
    assert_eq!(registry.node_stats(&count.erase()).map(|s| s.mounts), Some(1));
    child.dispose();
    assert_eq!(registry.node_stats(&count.erase()).map(|s| s.mounts), Some(0));
}

#[test]
fn suspense_stops_after_dispose() {
    let (scope, registry) = setup();
    let node: Writable<AsyncResult<u32, String>> = Atom::make(AsyncResult::initial());
    let child = scope.child();
    let resource = bridge_suspense(&child, &node, SuspenseOptions::default()).unwrap();
    child.dispose();
    let before = resource.version();
    registry.set(&node, AsyncResult::success(1)).unwrap();
    registry.set(&node, AsyncResult::success(2)).unwrap();
    assert_eq!(resource.version(), before);
    assert!(resource.loading());
    assert_eq!(registry.node_stats(&node.erase()).map(|s| s.listeners), Some(0));
}

#[test]
fn ref_stops_after_dispose() {
    init_tracing();
    let scope = Scope::root();
    let source = RxRef::make(1);
    let read = bridge_ref(&scope, &source);
    source.set(2);
    scope.dispose();
    source.set(3);
    assert_eq!(read.get(), 2);
    assert_eq!(source.listener_count(), 0);
}

#[test]
fn ref_prop_follows_only_its_field() {
    #[derive(Debug, Clone, PartialEq)]
    struct Form {
        email: String,
        accepted: bool,
    }
    const EMAIL: Lens<Form, String> = Lens::new(
        "email",
        |f: &Form| f.email.clone(),
        |f: &mut Form, email: String| f.email = email,
    );

    let scope = Scope::root();
    let form = RxRef::make(Form {
        email: String::new(),
        accepted: false,
    });
    let email = bridge_ref_prop_value(&scope, &form, EMAIL);
    form.update(|f| f.accepted = true);
    assert_eq!(email.version(), 0);
    form.update(|f| f.email = "a@b.c".to_string());
    assert_eq!(email.get(), "a@b.c");
}

// ── Memoization ────────────────────────────────────────────────────────────

fn doubled(scope: &Scope, node: &Atom<i32>) -> Accessor<i32> {
    bridge_read_map(scope, node, |n: &i32| n * 2).unwrap()
}

#[test]
fn mapped_read_subscribes_once_per_scope() {
    let (scope, registry) = setup();
    let count = Atom::make(2);
    let a = doubled(&scope, &count);
    let b = doubled(&scope, &count);
    assert!(a.ptr_eq(&b));
    assert_eq!(a.get(), 4);

    // One derived node hangs off the source, with one bridged listener.
    assert_eq!(registry.node_stats(&count.erase()).map(|s| s.listeners), Some(1));
    let derived = registry
        .nodes()
        .into_iter()
        .find(|n| n.atom.is_derived())
        .map(|n| n.atom)
        .unwrap();
    assert_eq!(registry.node_stats(&derived).map(|s| s.listeners), Some(1));

    registry.set(&count, 5).unwrap();
    assert_eq!(b.get(), 10);
}

#[test]
fn mapped_read_shares_derived_node_across_scopes() {
    let (scope, registry) = setup();
    let count = Atom::make(1);
    let left = scope.child();
    let right = scope.child();
    let a = doubled(&left, &count);
    let b = doubled(&right, &count);
    assert!(!a.ptr_eq(&b));
    assert_eq!(registry.nodes().iter().filter(|n| n.atom.is_derived()).count(), 1);
}

// ── Resolution and lifecycle ───────────────────────────────────────────────

#[test]
fn strict_resolution_needs_a_provider() {
    init_tracing();
    let scope = Scope::root();
    assert_eq!(resolve_registry_strict(&scope), Err(BridgeError::MissingRegistry));

    let runtime = BridgeRuntime::new(RegistryConfig::default());
    runtime.install(&scope);
    let registry = resolve_registry_strict(&scope.child()).unwrap();
    assert_eq!(registry, runtime.default_registry());
}

#[test]
fn unbound_scopes_share_the_runtime_registry() {
    init_tracing();
    let runtime = BridgeRuntime::default();
    let app = Scope::root();
    runtime.install(&app);
    let count = Atom::make(0);

    let first = app.child();
    let second = app.child();
    let (_, write) = bridge_read_write(&first, &count).unwrap();
    let read = bridge_read(&second, &count).unwrap();
    write.set(6).unwrap();
    assert_eq!(read.get(), 6);
    assert_eq!(resolve_registry(&first), resolve_registry(&second));
}

#[test]
fn disposed_registry_errors_pass_through() {
    let (scope, registry) = setup();
    let count = Atom::make(0);
    registry.dispose();
    let err = bridge_read(&scope, &count).unwrap_err();
    assert_eq!(
        err,
        BridgeError::Registry(RegistryError::Disposed { registry: registry.id() })
    );
    let pending: Writable<AsyncResult<u8, ()>> = Atom::make(AsyncResult::initial());
    assert!(bridge_suspense(&scope, &pending, SuspenseOptions::default()).is_err());
}

#[test]
fn idle_nodes_are_collected_through_the_task_queue() {
    init_tracing();
    let queue = TaskQueue::new();
    let q = queue.clone();
    let registry = Registry::new(
        RegistryConfig::default()
            .with_idle_ttl(Some(Duration::ZERO))
            .with_scheduler(move |task| q.schedule_boxed(task)),
    );
    let scope = Scope::root();
    provide_registry(&scope, registry.clone());

    let count = Atom::make(0);
    let child = scope.child();
    let _read = bridge_read(&child, &count).unwrap();
    child.dispose();
    assert!(registry.contains(&count.erase()));
    assert!(!queue.is_empty());
    queue.run_until_idle();
    assert!(!registry.contains(&count.erase()));
}

// ── Idle TTL ───────────────────────────────────────────────────────────────

#[test]
fn late_mount_after_hydration_keeps_seed() {
    init_tracing();
    let registry = Registry::new(
        RegistryConfig::default().with_idle_ttl(Some(Duration::from_millis(5))),
    );
    let scope = Scope::root();
    provide_registry(&scope, registry.clone());
    let count = Atom::make(0);
    apply_hydration(&registry, [HydrationRecord::new(&count, 42)]).unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let read = bridge_read(&scope, &count).unwrap();
    assert_eq!(read.get(), 42);
    assert_eq!(registry.get(&count), Ok(42));
}

#[test]
fn read_of_pending_idle_node_survives_the_check() {
    let (scope, registry, queue) = setup_queued(Duration::ZERO);
    let count = Atom::make(0);
    registry.set(&count, 3).unwrap();
    assert!(!queue.is_empty());

    let read = bridge_read(&scope, &count).unwrap();
    queue.run_until_idle();
    assert!(registry.contains(&count.erase()));
    assert_eq!(read.get(), 3);
    registry.set(&count, 4).unwrap();
    assert_eq!(read.get(), 4);
}

#[test]
fn setter_updates_survive_idle_checks_while_mounted() {
    let (scope, registry, queue) = setup_queued(Duration::ZERO);
    let count = Atom::make(0);
    let child = scope.child();
    let set = bridge_set(&child, &count).unwrap();
    set.set(5).unwrap();
    queue.run_until_idle();
    set.update(|n| n + 1).unwrap();
    queue.run_until_idle();
    assert_eq!(registry.get(&count), Ok(6));

    child.dispose();
    queue.run_until_idle();
    assert!(!registry.contains(&count.erase()));
}

#[test]
fn hydrated_node_waits_for_a_late_mount_until_its_check_runs() {
    let (scope, registry, queue) = setup_queued(Duration::from_secs(60));
    let count = Atom::make(0);
    bridge_hydrate(&scope, [HydrationRecord::new(&count, 9)]).unwrap();
    queue.run_until_idle();
    assert!(registry.contains(&count.erase()));

    let child = scope.child();
    let (read, write) = bridge_read_write(&child, &count).unwrap();
    assert_eq!(read.get(), 9);
    write.update(|n| n * 2).unwrap();
    assert_eq!(read.get(), 18);
    assert_eq!(extract_state(&registry).len(), 1);
}
