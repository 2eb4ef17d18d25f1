//! Router collaborator: location descriptors, route metadata and the
//! navigation interface the synchronizer drives.
//!
//! The host's router forwards each before-navigation event to
//! [`QuerySync::before_each`](crate::QuerySync::before_each) and implements
//! [`Navigator`] so the synchronizer can push or replace the query.
//! [`MemoryRouter`] is an in-memory implementation for tests and headless
//! hosts: a named route table, a current location and a history log.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::debug;

use crate::definition::{Definitions, ParamSpec};
use crate::error::SyncError;
use crate::query::RawQuery;
use crate::store::ParamStore;

// ── Navigation ──

/// How a navigation is recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationKind {
    Push,
    Replace,
}

/// The navigation side of a router.
pub trait Navigator: Send + Sync {
    /// The location currently displayed.
    fn current_location(&self) -> Location;

    /// Navigate to the current route with a new query.
    fn navigate(&self, kind: NavigationKind, query: RawQuery);
}

// ── Hooks ──

/// Called once per route match with the resolved definitions, before the
/// first parse. May change defaults.
pub type InitHook = Arc<dyn Fn(&mut Definitions) + Send + Sync>;

/// Called after typed values were parsed from a location.
pub type LoadHook = Arc<dyn Fn(&ParamStore) + Send + Sync>;

/// Called before a serialized query is handed to the router.
pub type ChangeHook = Arc<dyn Fn(&RawQuery, &ParamStore) + Send + Sync>;

/// Per-route synchronization hooks.
///
/// Hooks run while the synchronizer is mid-transition and must not navigate
/// or call back into it.
#[derive(Clone, Default)]
pub struct QuerySettings {
    pub on_init: Option<InitHook>,
    pub on_load: Option<LoadHook>,
    pub on_change: Option<ChangeHook>,
}

impl QuerySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_init<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Definitions) + Send + Sync + 'static,
    {
        self.on_init = Some(Arc::new(f));
        self
    }

    pub fn on_load<F>(mut self, f: F) -> Self
    where
        F: Fn(&ParamStore) + Send + Sync + 'static,
    {
        self.on_load = Some(Arc::new(f));
        self
    }

    pub fn on_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawQuery, &ParamStore) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(f));
        self
    }

    /// Overlay `other`: each hook it sets replaces ours.
    pub fn merge(&mut self, other: &QuerySettings) {
        if let Some(h) = &other.on_init {
            self.on_init = Some(Arc::clone(h));
        }
        if let Some(h) = &other.on_load {
            self.on_load = Some(Arc::clone(h));
        }
        if let Some(h) = &other.on_change {
            self.on_change = Some(Arc::clone(h));
        }
    }
}

impl fmt::Debug for QuerySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySettings")
            .field("on_init", &self.on_init.is_some())
            .field("on_load", &self.on_load.is_some())
            .field("on_change", &self.on_change.is_some())
            .finish()
    }
}

// ── Route descriptors ──

/// Query schema and hooks declared on one route segment.
#[derive(Debug, Clone, Default)]
pub struct RouteMeta {
    /// Parameter specs keyed by name. `None` when the segment declares no
    /// query schema.
    pub query: Option<BTreeMap<String, ParamSpec>>,
    pub settings: Option<QuerySettings>,
}

impl RouteMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare one parameter.
    pub fn param(mut self, key: impl Into<String>, spec: impl Into<ParamSpec>) -> Self {
        self.query
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), spec.into());
        self
    }

    pub fn settings(mut self, settings: QuerySettings) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// One segment of a matched route.
#[derive(Debug, Clone, Default)]
pub struct RouteRecord {
    pub name: Option<String>,
    pub meta: RouteMeta,
}

impl RouteRecord {
    pub fn new(meta: RouteMeta) -> Self {
        Self { name: None, meta }
    }

    pub fn named(name: impl Into<String>, meta: RouteMeta) -> Self {
        Self {
            name: Some(name.into()),
            meta,
        }
    }
}

/// A resolved location: route name, query, and matched segments from the
/// outermost to the innermost.
#[derive(Debug, Clone, Default)]
pub struct Location {
    pub name: Option<String>,
    pub query: RawQuery,
    pub matched: Vec<Arc<RouteRecord>>,
}

impl Location {
    pub fn new(name: impl Into<String>, query: RawQuery, matched: Vec<Arc<RouteRecord>>) -> Self {
        Self {
            name: Some(name.into()),
            query,
            matched,
        }
    }

    /// The same route with another query.
    pub fn with_query(&self, query: RawQuery) -> Self {
        Self {
            name: self.name.clone(),
            query,
            matched: self.matched.clone(),
        }
    }
}

// ── MemoryRouter ──

/// Hook called before every navigation with `(to, from)`.
pub type BeforeEachHook = Arc<dyn Fn(&Location, &Location) + Send + Sync>;

/// One applied navigation.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub kind: NavigationKind,
    pub location: Location,
}

/// In-memory router: routes are looked up by name, no path matching.
///
/// Hooks are invoked without any router lock held, so they may read the
/// router or trigger follow-up work.
pub struct MemoryRouter {
    routes: RwLock<BTreeMap<String, Vec<Arc<RouteRecord>>>>,
    current: RwLock<Location>,
    history: RwLock<Vec<HistoryEntry>>,
    hooks: RwLock<Vec<BeforeEachHook>>,
}

impl MemoryRouter {
    /// Create a router with no routes, positioned at an unnamed empty location.
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(BTreeMap::new()),
            current: RwLock::new(Location::default()),
            history: RwLock::new(Vec::new()),
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Register a route by name with its matched segments.
    pub fn add_route(&self, name: impl Into<String>, matched: Vec<RouteRecord>) {
        self.routes
            .write()
            .insert(name.into(), matched.into_iter().map(Arc::new).collect());
    }

    /// Register a before-navigation hook.
    pub fn before_each<F>(&self, hook: F)
    where
        F: Fn(&Location, &Location) + Send + Sync + 'static,
    {
        self.hooks.write().push(Arc::new(hook));
    }

    /// Navigate to a named route.
    pub fn navigate_to(&self, name: &str, query: RawQuery) -> Result<(), SyncError> {
        self.go_to(NavigationKind::Push, name, query)
    }

    /// Navigate to a named route, also recording the kind used.
    pub fn go_to(&self, kind: NavigationKind, name: &str, query: RawQuery) -> Result<(), SyncError> {
        let matched = self
            .routes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownRoute(name.to_string()))?;
        self.go(kind, Location::new(name, query, matched));
        Ok(())
    }

    /// The current location.
    pub fn current(&self) -> Location {
        self.current.read().clone()
    }

    /// All navigations applied so far, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.read().clone()
    }

    fn go(&self, kind: NavigationKind, to: Location) {
        let from = self.current();
        let hooks = self.hooks.read().clone();
        for hook in &hooks {
            hook(&to, &from);
        }
        debug!(route = ?to.name, query = %to.query, ?kind, "navigation applied");
        *self.current.write() = to.clone();
        self.history.write().push(HistoryEntry { kind, location: to });
    }
}

impl Default for MemoryRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator for MemoryRouter {
    fn current_location(&self) -> Location {
        self.current()
    }

    fn navigate(&self, kind: NavigationKind, query: RawQuery) {
        let to = self.current().with_query(query);
        self.go(kind, to);
    }
}
