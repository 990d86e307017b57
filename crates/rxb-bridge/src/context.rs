#![forbid(unsafe_code)]

//! Registry resolution.
//!
//! Bridge calls find their registry through the owning [`Scope`]:
//!
//! 1. a [`Registry`] provided with [`provide_registry`] / [`provide_state`]
//!    on the scope or an ancestor;
//! 2. otherwise the default registry of a [`BridgeRuntime`] installed on the
//!    scope or an ancestor;
//! 3. otherwise the default registry of the thread's global runtime, built
//!    once from [`RegistryConfig::from_env`].
//!
//! Unbound call sites on one thread therefore share one registry.
//!
//! # Invariants
//!
//! 1. A runtime creates its default registry at most once.
//! 2. A registry provided through this module is disposed with the scope
//!    that provided it.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use rxb_reactive::Scope;
use rxb_registry::{Registry, RegistryConfig};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::hydration::HydrationRecord;

struct RuntimeInner {
    config: RegistryConfig,
    default: OnceCell<Registry>,
}

/// Owner of the fallback registry.
///
/// Cloning creates a new handle to the **same** runtime. Tests construct a
/// fresh runtime and [`install`](Self::install) it instead of relying on the
/// thread's global one.
#[derive(Clone)]
pub struct BridgeRuntime {
    inner: Rc<RuntimeInner>,
}

impl BridgeRuntime {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                default: OnceCell::new(),
            }),
        }
    }

    /// The runtime's registry, created on first use.
    #[must_use]
    pub fn default_registry(&self) -> Registry {
        self.inner
            .default
            .get_or_init(|| {
                let registry = Registry::new(self.inner.config.clone());
                debug!(registry = %registry.id(), "default registry created");
                registry
            })
            .clone()
    }

    /// Whether the default registry exists yet.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.default.get().is_some()
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Make this runtime the fallback for `scope` and its descendants.
    pub fn install(&self, scope: &Scope) {
        scope.provide_context(self.clone());
    }
}

impl Default for BridgeRuntime {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl fmt::Debug for BridgeRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeRuntime")
            .field("config", &self.inner.config)
            .field("default", &self.inner.default.get().map(Registry::id))
            .finish()
    }
}

thread_local! {
    static GLOBAL_RUNTIME: BridgeRuntime = BridgeRuntime::new(RegistryConfig::from_env());
}

/// This thread's global runtime.
#[must_use]
pub fn global_runtime() -> BridgeRuntime {
    GLOBAL_RUNTIME.with(BridgeRuntime::clone)
}

/// The registry active for `scope`. Never fails.
#[must_use]
pub fn resolve_registry(scope: &Scope) -> Registry {
    if let Some(registry) = scope.use_context::<Registry>() {
        return registry;
    }
    scope
        .use_context::<BridgeRuntime>()
        .unwrap_or_else(global_runtime)
        .default_registry()
}

/// The registry active for `scope`, without falling back to the global
/// runtime.
///
/// # Errors
///
/// Returns [`BridgeError::MissingRegistry`] when neither a registry nor a
/// runtime was provided to `scope` or an ancestor.
pub fn resolve_registry_strict(scope: &Scope) -> Result<Registry> {
    if let Some(registry) = scope.use_context::<Registry>() {
        return Ok(registry);
    }
    scope
        .use_context::<BridgeRuntime>()
        .map(|runtime| runtime.default_registry())
        .ok_or(BridgeError::MissingRegistry)
}

/// Provide `registry` to `scope` and dispose it when `scope` is torn down.
pub fn provide_registry(scope: &Scope, registry: Registry) {
    debug!(registry = %registry.id(), scope = %scope.id(), "registry provided");
    scope.provide_context(registry.clone());
    scope.on_cleanup(move || registry.dispose());
}

/// Build a registry seeded with `records`, provide it to `scope`, and
/// dispose it on teardown.
pub fn provide_state(
    scope: &Scope,
    records: impl IntoIterator<Item = HydrationRecord>,
    config: RegistryConfig,
) -> Registry {
    let config = config.with_initial_values(records.into_iter().map(HydrationRecord::into_parts));
    let registry = Registry::new(config);
    provide_registry(scope, registry.clone());
    registry
}
