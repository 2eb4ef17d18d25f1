use thiserror::Error;

/// Errors surfaced by query synchronization.
///
/// Only configuration problems reach the caller. Malformed values in the URL
/// never produce an error: datatypes fall back to the parameter's default.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A parameter spec names a datatype that is not registered.
    #[error("unknown datatype: {0}")]
    UnknownDatatype(String),

    /// A navigation named a route the router does not know.
    #[error("unknown route: {0}")]
    UnknownRoute(String),

    /// The synchronizer was built without a router.
    #[error("query synchronization requires a router")]
    MissingRouter,

    /// A typed read asked for a Rust type the stored value cannot convert to.
    #[error("parameter '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// Configuration text could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}
