use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SyncError;
use crate::router::{NavigationKind, Navigator};
use crate::store::ParamStore;

/// Decides how a serialized query is handed to the router.
pub type NavigationPicker = Arc<dyn Fn(&ParamStore, &dyn Navigator) -> NavigationKind + Send + Sync>;

/// Push/replace policy for write-back navigations.
#[derive(Clone)]
pub enum NavigationOperation {
    /// Always use the same kind.
    Fixed(NavigationKind),
    /// Ask a callback per navigation, given the typed values and the router.
    Custom(NavigationPicker),
}

impl NavigationOperation {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ParamStore, &dyn Navigator) -> NavigationKind + Send + Sync + 'static,
    {
        NavigationOperation::Custom(Arc::new(f))
    }

    /// Pick the kind for one navigation.
    pub fn pick(&self, values: &ParamStore, navigator: &dyn Navigator) -> NavigationKind {
        match self {
            NavigationOperation::Fixed(kind) => *kind,
            NavigationOperation::Custom(f) => f(values, navigator),
        }
    }
}

impl Default for NavigationOperation {
    fn default() -> Self {
        NavigationOperation::Fixed(NavigationKind::Push)
    }
}

impl From<NavigationKind> for NavigationOperation {
    fn from(kind: NavigationKind) -> Self {
        NavigationOperation::Fixed(kind)
    }
}

impl fmt::Debug for NavigationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationOperation::Fixed(kind) => f.debug_tuple("Fixed").field(kind).finish(),
            NavigationOperation::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Synchronizer settings, fixed at install time.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last user write before the query is pushed.
    pub debounce: Duration,

    /// Emit verbose `debug!` traces of parse, serialize and fingerprint steps.
    pub debug: bool,

    /// Push or replace on write-back.
    pub navigation: NavigationOperation,

    /// Reading an undefined key defines it with `unknown_datatype`.
    pub passthrough_unknown: bool,

    /// Datatype name for keys that are read or written without a definition.
    pub unknown_datatype: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            debug: false,
            navigation: NavigationOperation::default(),
            passthrough_unknown: true,
            unknown_datatype: "string".to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SyncConfigFile {
    debounce_ms: Option<u64>,
    debug: Option<bool>,
    navigation: Option<NavigationKind>,
    passthrough_unknown: Option<bool>,
    unknown_datatype: Option<String>,
}

impl SyncConfig {
    /// Load settings from TOML. Missing keys keep their defaults.
    ///
    /// Supported keys:
    /// - `debounce_ms = 250`
    /// - `debug = true`
    /// - `navigation = "push" | "replace"`
    /// - `passthrough_unknown = false`
    /// - `unknown_datatype = "string"`
    pub fn from_toml_str(text: &str) -> Result<Self, SyncError> {
        let file: SyncConfigFile =
            toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))?;

        let mut config = SyncConfig::default();
        if let Some(ms) = file.debounce_ms {
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(debug) = file.debug {
            config.debug = debug;
        }
        if let Some(kind) = file.navigation {
            config.navigation = NavigationOperation::Fixed(kind);
        }
        if let Some(passthrough) = file.passthrough_unknown {
            config.passthrough_unknown = passthrough;
        }
        if let Some(name) = file.unknown_datatype {
            if name.is_empty() {
                return Err(SyncError::Config("unknown_datatype must not be empty".into()));
            }
            config.unknown_datatype = name;
        }
        Ok(config)
    }
}
