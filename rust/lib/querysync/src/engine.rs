//! Synchronization state machine.
//!
//! The engine owns the typed values of the active route and the raw query
//! snapshot they serialize to. Two paths write values:
//!
//! - the apply path, driven by [`Engine::before_each`], parses an incoming
//!   location into the store and never schedules a navigation;
//! - the user path, [`Engine::set`], serializes the new value into the raw
//!   snapshot and, when the snapshot changed, arms the debounce deadline.
//!
//! Time is passed in explicitly. [`Engine::flush_due`] returns the
//! [`Navigation`] to apply once the deadline has passed; the caller hands it
//! to the router after releasing the engine, so router hooks may call
//! `before_each` again.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::error;

use crate::config::SyncConfig;
use crate::datatype::{ArrayDatatype, Datatype, DefaultValue};
use crate::definition::{Definitions, ParamDefinition, ParamSpec, resolve_spec};
use crate::fingerprint::Fingerprint;
use crate::proxy::QueryProxy;
use crate::query::RawQuery;
use crate::registry::DatatypeRegistry;
use crate::router::{Location, NavigationKind, Navigator, QuerySettings};
use crate::store::ParamStore;
use crate::value::{SubscriptionId, Value};

/// Verbose tracing gated on `SyncConfig::debug`.
macro_rules! dlog {
    ($engine:expr, $($arg:tt)+) => {
        if $engine.config.debug {
            tracing::debug!($($arg)+);
        }
    };
}

/// A write-back the router should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub kind: NavigationKind,
    pub query: RawQuery,
}

pub struct Engine {
    registry: DatatypeRegistry,
    config: SyncConfig,
    navigator: Arc<dyn Navigator>,

    store: ParamStore,
    raw: RawQuery,
    enabled: bool,
    /// Bumped on every user-path change of the raw snapshot.
    revision: u64,

    definitions: Definitions,
    settings: QuerySettings,
    /// Fingerprint of the last applied or produced query.
    fingerprint: Option<Fingerprint>,
    /// Keys whose user writes are serialized back.
    armed: BTreeSet<String>,
    /// When the pending write-back is due.
    deadline: Option<Instant>,

    /// Whether a route has been matched yet.
    routed: bool,
    route: Option<String>,
}

impl Engine {
    pub fn new(registry: DatatypeRegistry, config: SyncConfig, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            registry,
            config,
            navigator,
            store: ParamStore::new(),
            raw: RawQuery::new(),
            enabled: false,
            revision: 0,
            definitions: Definitions::new(),
            settings: QuerySettings::default(),
            fingerprint: None,
            armed: BTreeSet::new(),
            deadline: None,
            routed: false,
            route: None,
        }
    }

    // ── Apply path ──

    /// Handle a before-navigation event.
    pub fn before_each(&mut self, to: &Location, from: &Location) {
        if !self.routed || to.name != from.name {
            self.prepare_route(to);
        }
        if !self.enabled {
            return;
        }

        let incoming = Fingerprint::of(&to.query);
        if self.fingerprint.as_ref().map(Fingerprint::summary) == Some(incoming.summary()) {
            dlog!(self, query = %to.query, "same fingerprint, not changing values");
            return;
        }
        dlog!(self, fingerprint = incoming.summary(), "parsing query");

        self.apply_query(&to.query, &incoming);
        self.armed.extend(self.store.keys());
        self.fingerprint = Some(incoming);
    }

    /// Reset per-route state and resolve the schema of the matched records.
    fn prepare_route(&mut self, to: &Location) {
        self.routed = true;
        self.route = to.name.clone();
        self.definitions.clear();
        self.settings = QuerySettings::default();
        self.store.clear();
        self.raw = RawQuery::new();
        self.armed.clear();
        self.fingerprint = None;
        if self.deadline.take().is_some() {
            dlog!(self, route = ?to.name, "route changed, dropping pending write-back");
        }

        let mut specs: BTreeMap<String, ParamSpec> = BTreeMap::new();
        let mut settings = QuerySettings::default();
        for record in &to.matched {
            if let Some(query) = &record.meta.query {
                specs.extend(query.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            if let Some(s) = &record.meta.settings {
                settings.merge(s);
            }
        }

        if specs.is_empty() {
            dlog!(self, route = ?to.name, "route has no query schema, synchronization disabled");
            self.enabled = false;
            return;
        }

        for (key, spec) in &specs {
            match resolve_spec(spec, &self.registry) {
                Ok(resolved) => {
                    self.definitions.insert(key.clone(), resolved.definition);
                }
                Err(e) => error!(key = %key, error = %e, "skipping query parameter"),
            }
        }
        if let Some(on_init) = &settings.on_init {
            on_init(&mut self.definitions);
        }
        self.settings = settings;
        self.enabled = true;
        dlog!(self, route = ?to.name, definitions = ?self.definitions, "query definitions resolved");
    }

    fn apply_query(&mut self, query: &RawQuery, incoming: &Fingerprint) {
        let previous = self.fingerprint.take().unwrap_or_default();

        for (key, raw) in query {
            if previous.same_fragment(incoming, key) {
                continue;
            }
            // Undefined keys stay in the raw snapshot only.
            let Some(def) = self.definitions.get(key) else {
                continue;
            };
            let value = def.datatype.parse(Some(raw), &def.default());
            dlog!(self, key = %key, %value, "parsed");
            self.store.set(key, value);
        }

        let absent: Vec<(String, Value)> = self
            .definitions
            .iter()
            .filter(|(key, _)| !query.contains_key(key))
            // Absent before and after: keep an edit that has not been written back yet.
            .filter(|(key, _)| previous.fragment(key).is_some() || !self.store.contains(key))
            .map(|(key, def)| (key.clone(), def.default()))
            .collect();
        for (key, value) in absent {
            self.store.set(&key, value);
        }

        let mut snapshot = query.clone();
        let keys: BTreeSet<String> = query.keys().chain(self.raw.keys()).map(String::from).collect();
        for key in keys {
            if !previous.same_fragment(incoming, &key) {
                continue;
            }
            match self.raw.get(&key) {
                Some(value) => {
                    snapshot.insert(key, value.clone());
                }
                None => {
                    snapshot.remove(&key);
                }
            }
        }
        self.raw = snapshot;

        // The incoming location already carries every pending change.
        if self.deadline.is_some() && Fingerprint::of(&self.raw).summary() == incoming.summary() {
            dlog!(self, "incoming query matches pending write-back, dropping it");
            self.deadline = None;
        }

        if let Some(on_load) = &self.settings.on_load {
            on_load(&self.store);
        }
    }

    // ── User path ──

    /// Store a value written by application code and serialize it back.
    ///
    /// An undefined key is defined first with the unknown-key datatype.
    /// While disabled only the local value changes.
    ///
    /// The value is stored as given, not coerced to the datatype: a value
    /// the datatype cannot serialize stays local and removes the key from
    /// the raw query.
    pub fn set(&mut self, key: &str, value: Value, now: Instant) {
        if self.enabled && !self.definitions.contains_key(key) {
            self.define_unknown(key);
        }
        self.store.set(key, value);
        if self.enabled && self.armed.contains(key) {
            self.write_back(key, now);
        }
    }

    fn write_back(&mut self, key: &str, now: Instant) {
        let Some(def) = self.definitions.get(key) else {
            return;
        };
        let value = self.store.get(key).cloned().unwrap_or_default();
        let serialized = def.datatype.serialize(&value, &def.default());
        dlog!(self, key, %value, ?serialized, "serialized");

        let changed = match serialized {
            None => self.raw.remove(key).is_some(),
            Some(raw) if self.raw.get(key) == Some(&raw) => false,
            Some(raw) => {
                self.raw.insert(key, raw);
                true
            }
        };
        if changed {
            self.revision += 1;
            self.deadline = Some(now + self.config.debounce);
            dlog!(self, key, revision = self.revision, "raw query changed");
        }
    }

    /// Define or redefine a parameter, reparsing its current raw value.
    pub fn define(&mut self, key: &str, definition: ParamDefinition) {
        let value = definition
            .datatype
            .parse(self.raw.get(key), &definition.default());
        self.definitions.insert(key.to_string(), definition);
        self.store.set(key, value);
        self.armed.insert(key.to_string());
        dlog!(self, key, "defined new key");
    }

    /// Define `key` with the unknown-key datatype. Returns whether it worked.
    fn define_unknown(&mut self, key: &str) -> bool {
        match self.registry.resolve(&self.config.unknown_datatype) {
            Ok(datatype) => {
                let default = datatype.parse_default("");
                self.define(key, ParamDefinition::new(datatype, default));
                true
            }
            Err(e) => {
                error!(key, error = %e, "cannot define unknown query parameter");
                false
            }
        }
    }

    /// Read a value, auto-defining unknown keys when passthrough is enabled.
    ///
    /// Without a stored value this falls back to the definition's default,
    /// then to the unknown-key datatype's default.
    pub fn get(&mut self, key: &str) -> Value {
        if let Some(value) = self.store.get(key) {
            return value.clone();
        }
        if let Some(def) = self.definitions.get(key) {
            return def.default();
        }
        if self.enabled && self.config.passthrough_unknown && self.define_unknown(key) {
            return self.store.get(key).cloned().unwrap_or_default();
        }
        self.registry
            .get(&self.config.unknown_datatype)
            .map(|dt| dt.parse_default("").resolve())
            .unwrap_or_default()
    }

    /// Add `item` to an array parameter if it is not already there.
    ///
    /// An undefined key is defined with `datatype`, the registry's `array`
    /// datatype when `None`, and an empty default.
    pub fn add_value(&mut self, key: &str, item: &str, datatype: Option<Arc<dyn Datatype>>, now: Instant) {
        let mut items = self.list_value(key, datatype);
        if !items.iter().any(|i| i == item) {
            items.push(item.to_string());
        }
        self.set(key, Value::List(items), now);
    }

    /// Remove `item` from an array parameter if present.
    pub fn remove_value(&mut self, key: &str, item: &str, datatype: Option<Arc<dyn Datatype>>, now: Instant) {
        let mut items = self.list_value(key, datatype);
        if let Some(idx) = items.iter().position(|i| i == item) {
            items.remove(idx);
        }
        self.set(key, Value::List(items), now);
    }

    fn list_value(&mut self, key: &str, datatype: Option<Arc<dyn Datatype>>) -> Vec<String> {
        let holds_list = self
            .definitions
            .get(key)
            .is_some_and(|def| round_trips_list(def.datatype.as_ref()));
        if !holds_list {
            if self.definitions.contains_key(key) {
                dlog!(self, key, "redefining as array parameter");
            }
            let datatype = datatype
                .or_else(|| self.registry.get("array"))
                .unwrap_or_else(|| Arc::new(ArrayDatatype));
            self.define(
                key,
                ParamDefinition::new(datatype, DefaultValue::fresh(|| Value::List(Vec::new()))),
            );
        }
        self.store.get(key).map(Value::to_list).unwrap_or_default()
    }

    // ── Debounce ──

    /// Produce the pending navigation if its deadline has passed.
    pub fn flush_due(&mut self, now: Instant) -> Option<Navigation> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// Produce the pending navigation now, regardless of the deadline.
    ///
    /// The new query's fingerprint is recorded first, so the router's
    /// echo of this navigation is recognised and not parsed again.
    pub fn flush(&mut self) -> Option<Navigation> {
        self.deadline.take()?;
        let fingerprint = Fingerprint::of(&self.raw);
        dlog!(self, fingerprint = fingerprint.summary(), "flushing query");
        self.fingerprint = Some(fingerprint);

        if let Some(on_change) = &self.settings.on_change {
            on_change(&self.raw, &self.store);
        }
        let kind = self.config.navigation.pick(&self.store, self.navigator.as_ref());
        Some(Navigation {
            kind,
            query: self.raw.clone(),
        })
    }

    /// When the pending write-back is due, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_pending(&self) -> bool {
        self.deadline.is_some()
    }

    // ── Accessors ──

    pub fn proxy(&mut self, now: Instant) -> QueryProxy<'_> {
        QueryProxy::new(self, now)
    }

    /// Stored value of a key, without auto-definition.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.store.get(key)
    }

    pub fn store(&self) -> &ParamStore {
        &self.store
    }

    pub fn raw_query(&self) -> &RawQuery {
        &self.raw
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn route_name(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn is_armed(&self, key: &str) -> bool {
        self.armed.contains(key)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &DatatypeRegistry {
        &self.registry
    }

    pub fn subscribe<F>(&mut self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.store.subscribe(pattern, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }
}

/// Whether `datatype` keeps a multi-element list through serialize and parse.
fn round_trips_list(datatype: &dyn Datatype) -> bool {
    let empty = Value::List(Vec::new());
    let sample = Value::List(vec!["a".to_string(), "b".to_string()]);
    let raw = datatype.serialize(&sample, &empty);
    datatype.parse(raw.as_ref(), &empty) == sample
}
