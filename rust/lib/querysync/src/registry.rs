use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::datatype::{
    ArrayDatatype, BoolDatatype, Datatype, IntDatatype, SeparatedArrayDatatype, StringDatatype,
};
use crate::error::SyncError;

/// Registry of named datatypes.
///
/// Owned by one synchronizer rather than shared globally, so tests and
/// multiple synchronizers never see each other's registrations.
#[derive(Clone, Default)]
pub struct DatatypeRegistry {
    datatypes: HashMap<String, Arc<dyn Datatype>>,
}

impl DatatypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            datatypes: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in datatypes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("string", Arc::new(StringDatatype));
        registry.register("int", Arc::new(IntDatatype));
        registry.register("bool", Arc::new(BoolDatatype));
        registry.register("array", Arc::new(ArrayDatatype));
        registry.register("commaarray", Arc::new(SeparatedArrayDatatype::comma()));
        registry.register("spacearray", Arc::new(SeparatedArrayDatatype::space()));
        registry
    }

    /// Register a datatype under `name`, replacing any earlier one.
    pub fn register(&mut self, name: impl Into<String>, datatype: Arc<dyn Datatype>) {
        self.datatypes.insert(name.into(), datatype);
    }

    /// Get a datatype by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Datatype>> {
        self.datatypes.get(name).cloned()
    }

    /// Get a datatype by name, failing loudly when it is not registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Datatype>, SyncError> {
        self.get(name)
            .ok_or_else(|| SyncError::UnknownDatatype(name.to_string()))
    }

    /// Check if a datatype is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.datatypes.contains_key(name)
    }

    /// List all registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.datatypes.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.datatypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datatypes.is_empty()
    }
}

impl fmt::Debug for DatatypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatatypeRegistry")
            .field("names", &self.names())
            .finish()
    }
}
