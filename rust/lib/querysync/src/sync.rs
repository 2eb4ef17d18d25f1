use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{NavigationOperation, SyncConfig};
use crate::datatype::Datatype;
use crate::definition::{Definitions, ParamDefinition};
use crate::engine::{Engine, Navigation};
use crate::error::SyncError;
use crate::proxy::QueryProxy;
use crate::query::RawQuery;
use crate::registry::DatatypeRegistry;
use crate::router::{Location, MemoryRouter, Navigator};
use crate::value::{FromValue, SubscriptionId, Value};

/// Shared handle to an [`Engine`].
///
/// Navigations produced by the engine are applied to the router after the
/// engine lock is released, so the router's before-navigation hook may call
/// [`before_each`](Self::before_each) again.
#[derive(Clone)]
pub struct QuerySync {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Mutex<Engine>,
    /// Signals the driver that the deadline may have moved.
    wake: Notify,
    navigator: Arc<dyn Navigator>,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

impl QuerySync {
    pub fn builder() -> QuerySyncBuilder {
        QuerySyncBuilder::default()
    }

    // ── Router events ──

    /// Forward the router's before-navigation event.
    pub fn before_each(&self, to: &Location, from: &Location) {
        self.inner.engine.lock().before_each(to, from);
        self.inner.wake.notify_one();
    }

    /// Parse the router's current location as the first route match.
    pub fn load_current(&self) {
        let current = self.inner.navigator.current_location();
        self.before_each(&current, &current);
    }

    /// Register this synchronizer as a before-navigation hook of `router`.
    ///
    /// The hook holds a weak reference and does nothing once every
    /// `QuerySync` handle is dropped.
    pub fn attach(&self, router: &MemoryRouter) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        router.before_each(move |to, from| {
            if let Some(inner) = weak.upgrade() {
                QuerySync { inner }.before_each(to, from);
            }
        });
    }

    // ── Values ──

    /// Run `f` with a proxy over the typed parameters.
    ///
    /// The engine is locked for the duration of `f`; it must not navigate.
    pub fn with_query<R>(&self, f: impl FnOnce(&mut QueryProxy<'_>) -> R) -> R {
        let result = {
            let mut engine = self.inner.engine.lock();
            let mut proxy = engine.proxy(now());
            f(&mut proxy)
        };
        self.inner.wake.notify_one();
        result
    }

    pub fn get(&self, key: &str) -> Value {
        self.with_query(|q| q.get(key))
    }

    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<T, SyncError> {
        self.with_query(|q| q.get_as(key))
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.with_query(|q| q.set(key, value));
    }

    pub fn define(&self, key: &str, datatype: Arc<dyn Datatype>, default: impl Into<Value>) {
        self.with_query(|q| q.define(key, datatype, default));
    }

    pub fn define_param(&self, key: &str, definition: ParamDefinition) {
        self.inner.engine.lock().define(key, definition);
    }

    pub fn add_value(&self, key: &str, item: &str) {
        self.with_query(|q| q.add_value(key, item));
    }

    pub fn remove_value(&self, key: &str, item: &str) {
        self.with_query(|q| q.remove_value(key, item));
    }

    /// Copy of the raw query snapshot.
    pub fn raw_query(&self) -> RawQuery {
        self.inner.engine.lock().raw_query().clone()
    }

    pub fn definitions(&self) -> Definitions {
        self.inner.engine.lock().definitions().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.engine.lock().is_enabled()
    }

    pub fn revision(&self) -> u64 {
        self.inner.engine.lock().revision()
    }

    /// Subscribe to typed value changes of `pattern` (a key, or
    /// [`ALL_KEYS`](crate::ALL_KEYS)). Handlers run with the engine locked.
    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.inner.engine.lock().subscribe(pattern, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.engine.lock().unsubscribe(id)
    }

    // ── Write-back ──

    /// Apply the pending navigation if due. Returns whether one was applied.
    pub fn flush_due(&self, now: Instant) -> bool {
        let navigation = self.inner.engine.lock().flush_due(now);
        self.navigate(navigation)
    }

    /// Apply the pending navigation now. Returns whether one was applied.
    pub fn flush(&self) -> bool {
        let navigation = self.inner.engine.lock().flush();
        self.navigate(navigation)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.engine.lock().next_deadline()
    }

    fn navigate(&self, navigation: Option<Navigation>) -> bool {
        let Some(Navigation { kind, query }) = navigation else {
            return false;
        };
        debug!(?kind, %query, "writing query back to router");
        self.inner.navigator.navigate(kind, query);
        true
    }

    /// Spawn the debounce driver on the current tokio runtime.
    ///
    /// The driver sleeps until the pending deadline and applies the
    /// navigation; every write wakes it to pick up a moved deadline.
    /// Returns a CancellationToken that stops the driver when cancelled.
    pub fn start(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        let sync = self.clone();
        let token = cancel.clone();

        tokio::spawn(async move {
            info!("query write-back driver started");
            loop {
                let deadline = sync.next_deadline();
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("query write-back driver stopped");
                        break;
                    }
                    _ = sync.inner.wake.notified() => {}
                    _ = wait_until(deadline) => {
                        sync.flush_due(now());
                    }
                }
            }
        });

        cancel
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

// ── Builder ──

/// Install-time configuration of a [`QuerySync`].
#[derive(Default)]
pub struct QuerySyncBuilder {
    navigator: Option<Arc<dyn Navigator>>,
    datatypes: Vec<(String, Arc<dyn Datatype>)>,
    config: SyncConfig,
}

impl QuerySyncBuilder {
    /// The router to write back to. Required.
    pub fn router<N: Navigator + 'static>(mut self, router: Arc<N>) -> Self {
        self.navigator = Some(router);
        self
    }

    /// Register an extra datatype. Replaces a built-in of the same name.
    pub fn datatype(mut self, name: impl Into<String>, datatype: Arc<dyn Datatype>) -> Self {
        self.datatypes.push((name.into(), datatype));
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config.debounce = debounce;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn navigation(mut self, navigation: impl Into<NavigationOperation>) -> Self {
        self.config.navigation = navigation.into();
        self
    }

    pub fn build(self) -> Result<QuerySync, SyncError> {
        let navigator = self.navigator.ok_or(SyncError::MissingRouter)?;

        let mut registry = DatatypeRegistry::with_builtins();
        for (name, datatype) in self.datatypes {
            registry.register(name, datatype);
        }
        registry.resolve(&self.config.unknown_datatype)?;

        info!(
            debounce = ?self.config.debounce,
            datatypes = ?registry.names(),
            "query synchronization installed"
        );
        let engine = Engine::new(registry, self.config, Arc::clone(&navigator));
        Ok(QuerySync {
            inner: Arc::new(Inner {
                engine: Mutex::new(engine),
                wake: Notify::new(),
                navigator,
            }),
        })
    }
}
