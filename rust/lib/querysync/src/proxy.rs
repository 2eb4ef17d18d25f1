use std::sync::Arc;
use std::time::Instant;

use crate::datatype::Datatype;
use crate::definition::{Definitions, ParamDefinition};
use crate::engine::Engine;
use crate::error::SyncError;
use crate::query::RawQuery;
use crate::value::{FromValue, Value};

/// String-keyed view of the typed parameters.
///
/// Borrows the engine together with the timestamp used for any write-back
/// deadline, so a batch of writes made through one proxy shares a deadline.
pub struct QueryProxy<'e> {
    engine: &'e mut Engine,
    now: Instant,
}

impl<'e> QueryProxy<'e> {
    pub fn new(engine: &'e mut Engine, now: Instant) -> Self {
        Self { engine, now }
    }

    /// Current value of `key`. Unknown keys are auto-defined when
    /// passthrough is enabled.
    pub fn get(&mut self, key: &str) -> Value {
        self.engine.get(key)
    }

    /// Current value converted to a Rust type.
    pub fn get_as<T: FromValue>(&mut self, key: &str) -> Result<T, SyncError> {
        let value = self.engine.get(key);
        T::try_from_value(key, &value)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.engine.set(key, value.into(), self.now);
    }

    /// Replace the definition of `key` and reparse its raw value.
    pub fn define(&mut self, key: &str, datatype: Arc<dyn Datatype>, default: impl Into<Value>) {
        let default: Value = default.into();
        self.engine.define(key, ParamDefinition::new(datatype, default));
    }

    /// Define `key` from a datatype name and textual default, e.g.
    /// `define_named("page", "int", "1")`.
    pub fn define_named(&mut self, key: &str, datatype: &str, default: &str) -> Result<(), SyncError> {
        let datatype = self.engine.registry().resolve(datatype)?;
        let default = datatype.parse_default(default);
        self.engine.define(key, ParamDefinition::new(datatype, default));
        Ok(())
    }

    /// Add `item` to the array parameter `key`.
    pub fn add_value(&mut self, key: &str, item: &str) {
        self.engine.add_value(key, item, None, self.now);
    }

    /// Like [`add_value`](Self::add_value), defining an unknown key with
    /// `datatype` instead of `array`.
    pub fn add_value_as(&mut self, key: &str, item: &str, datatype: Arc<dyn Datatype>) {
        self.engine.add_value(key, item, Some(datatype), self.now);
    }

    pub fn remove_value(&mut self, key: &str, item: &str) {
        self.engine.remove_value(key, item, None, self.now);
    }

    pub fn remove_value_as(&mut self, key: &str, item: &str, datatype: Arc<dyn Datatype>) {
        self.engine.remove_value(key, item, Some(datatype), self.now);
    }

    pub fn raw_query(&self) -> &RawQuery {
        self.engine.raw_query()
    }

    pub fn definitions(&self) -> &Definitions {
        self.engine.definitions()
    }
}
