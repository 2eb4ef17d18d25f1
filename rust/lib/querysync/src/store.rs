use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::value::{SubscriptionId, Value};

/// Callback type for typed value change notifications.
pub type ChangeHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Subscription pattern matching every key.
pub const ALL_KEYS: &str = "#";

/// Typed parameter values with change subscriptions.
///
/// - `set(key, value)` stores a value and notifies subscribers when it changed.
/// - `get(key)` reads the current value.
/// - `subscribe(pattern, handler)` registers a change handler for one key,
///   or for every key with [`ALL_KEYS`].
///
/// Owned by the engine. Handlers run synchronously inside `set` and must
/// not call back into the synchronizer.
pub struct ParamStore {
    /// Current typed values, keyed by parameter name.
    values: BTreeMap<String, Value>,
    handlers: Vec<HandlerEntry>,
    /// Monotonic counter for subscription IDs.
    next_id: u64,
}

struct HandlerEntry {
    id: SubscriptionId,
    pattern: String,
    handler: ChangeHandler,
}

impl ParamStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
            handlers: Vec::new(),
            next_id: 1,
        }
    }

    /// Set a value and notify matching subscribers if it differs from the
    /// stored one. Returns whether the value changed.
    pub fn set(&mut self, key: &str, value: Value) -> bool {
        if self.values.get(key) == Some(&value) {
            return false;
        }
        self.values.insert(key.to_string(), value);
        if let Some(value) = self.values.get(key) {
            for entry in &self.handlers {
                if entry.pattern == key || entry.pattern == ALL_KEYS {
                    (entry.handler)(key, value);
                }
            }
        }
        true
    }

    /// Get the current value of a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Remove every value. Subscriptions are kept.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Subscribe to changes of `pattern` (a key, or [`ALL_KEYS`]).
    pub fn subscribe<F>(&mut self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push(HandlerEntry {
            id,
            pattern: pattern.to_string(),
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|entry| entry.id != id);
        self.handlers.len() != before
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParamStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamStore")
            .field("values", &self.values)
            .field("subscriptions", &self.handlers.len())
            .finish()
    }
}
