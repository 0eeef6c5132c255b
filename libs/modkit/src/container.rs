//! Service Container.
//!
//! A process-lifetime registry of named service instances, separate from
//! [`crate::client_hub::ClientHub`]: the hub is a type-keyed DI cache used by
//! the `client = path::to::Trait` macro attribute, while this container is
//! the name-keyed registry a module's lifecycle actually records its
//! service advertisements and shutdown handlers into.
//!
//! Lookups never panic: `get` returns `None` for an absent name rather than
//! raising, matching the contract's `get(name) -> instance | nil`.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

/// Default priority assigned to a service registered without an explicit one.
pub const DEFAULT_PRIORITY: i32 = 100;

#[derive(Debug, thiserror::Error, Clone, Eq, PartialEq)]
pub enum ContainerError {
    #[error("duplicate service: {0}")]
    DuplicateService(String),
}

/// Which half of shutdown a handler belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    Graceful,
    Force,
}

/// A registered shutdown handler: an async closure the shutdown coordinator runs
/// with a deadline, in ascending-priority order (lower runs earlier).
pub struct ShutdownHandler {
    pub name: String,
    pub kind: ShutdownKind,
    pub priority: i32,
    pub timeout: Duration,
    pub run: Box<dyn Fn() -> futures::future::BoxFuture<'static, anyhow::Result<()>> + Send + Sync>,
}

impl fmt::Debug for ShutdownHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandler")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .finish()
    }
}

struct Entry {
    instance: Arc<dyn Any + Send + Sync>,
    priority: i32,
}

/// A single listed service: `{name, priority}` per the contract.
#[derive(Debug, Clone)]
pub struct ServiceListing {
    pub name: String,
    pub priority: i32,
}

#[derive(Default)]
struct Inner {
    services: HashMap<String, Entry>,
    shutdown_handlers: Vec<Arc<ShutdownHandler>>,
}

/// Name-keyed service container. Cheap to clone (`Arc` internally is not
/// required; callers share `&ServiceContainer` or wrap it in an `Arc`
/// themselves, matching how `ModuleCtx` shares its other fields).
#[derive(Default)]
pub struct ServiceContainer {
    inner: RwLock<Inner>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Registers `instance` under `name` with `priority`. Fails with
    /// [`ContainerError::DuplicateService`] if `name` is already taken.
    pub fn register<T>(&self, name: impl Into<String>, instance: Arc<T>, priority: i32) -> Result<(), ContainerError>
    where
        T: Send + Sync + 'static,
    {
        let name = name.into();
        let mut w = self.inner.write();
        if w.services.contains_key(&name) {
            return Err(ContainerError::DuplicateService(name));
        }
        w.services.insert(
            name,
            Entry {
                instance: instance as Arc<dyn Any + Send + Sync>,
                priority,
            },
        );
        Ok(())
    }

    /// Registers `instance` under `name` with [`DEFAULT_PRIORITY`].
    pub fn register_default<T>(&self, name: impl Into<String>, instance: Arc<T>) -> Result<(), ContainerError>
    where
        T: Send + Sync + 'static,
    {
        self.register(name, instance, DEFAULT_PRIORITY)
    }

    /// Registers an already type-erased instance. Used by the auto-create
    /// step (`#[module(auto_service = ...)]`), where the runtime only holds
    /// a `Module::auto_created_service() -> Arc<dyn Any + Send + Sync>`
    /// handle and never sees the concrete type.
    pub fn register_erased(
        &self,
        name: impl Into<String>,
        instance: Arc<dyn Any + Send + Sync>,
        priority: i32,
    ) -> Result<(), ContainerError> {
        let name = name.into();
        let mut w = self.inner.write();
        if w.services.contains_key(&name) {
            return Err(ContainerError::DuplicateService(name));
        }
        w.services.insert(name, Entry { instance, priority });
        Ok(())
    }

    /// Looks up a service by name and downcasts it to `T`. Returns `None`
    /// both when the name is absent and when the stored value is not a `T` —
    /// lookups never raise.
    pub fn get<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let r = self.inner.read();
        let entry = r.services.get(name)?;
        entry.instance.clone().downcast::<T>().ok()
    }

    /// True if a service with this name is registered, regardless of type.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().services.contains_key(name)
    }

    /// Appends a shutdown handler to the ordered list. Handlers are not
    /// deduplicated by name; the shutdown coordinator runs them in
    /// `(kind, priority, insertion order)` sequence.
    pub fn register_shutdown(
        &self,
        name: impl Into<String>,
        kind: ShutdownKind,
        priority: i32,
        timeout: Duration,
        run: impl Fn() -> futures::future::BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    ) {
        let handler = Arc::new(ShutdownHandler {
            name: name.into(),
            kind,
            priority,
            timeout,
            run: Box::new(run),
        });
        self.inner.write().shutdown_handlers.push(handler);
    }

    /// Returns shutdown handlers of the given kind, sorted by ascending
    /// priority (lower runs first), ties broken by registration order.
    pub fn shutdown_handlers(&self, kind: ShutdownKind) -> Vec<Arc<ShutdownHandler>> {
        let r = self.inner.read();
        let mut matching: Vec<(usize, Arc<ShutdownHandler>)> = r
            .shutdown_handlers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.kind == kind)
            .map(|(i, h)| (i, h.clone()))
            .collect();
        matching.sort_by_key(|(i, h)| (h.priority, *i));
        matching.into_iter().map(|(_, h)| h).collect()
    }

    /// `list() -> [{name, priority}]`, sorted by name for deterministic output.
    pub fn list(&self) -> Vec<ServiceListing> {
        let r = self.inner.read();
        let mut out: Vec<ServiceListing> = r
            .services
            .iter()
            .map(|(name, entry)| ServiceListing {
                name: name.clone(),
                priority: entry.priority,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn len(&self) -> usize {
        self.inner.read().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
