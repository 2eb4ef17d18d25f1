//! QuerySync: typed query parameters kept in sync with the router.
//!
//! Routes declare their query parameters in metadata; the synchronizer
//! parses the location's query into typed values and writes typed changes
//! back as a debounced push or replace navigation.
//!
//! # Parameter Specs
//!
//! A spec names a datatype and a textual default:
//! - `int:10`: integer, default 10
//! - `bool:`: flag parameter (`?check`), default false
//! - `array:`: repeated key (`?o=a&o=b`), default empty
//! - `commaarray:a,b`: one comma-separated value
//! - `search`: bare name, string with an empty default
//!
//! # Redundant Navigation
//!
//! - A location whose fingerprint equals the last applied or produced one
//!   is ignored, so the router's echo of a write-back is not parsed again.
//! - Writes that serialize to the current raw value change nothing.
//! - Writes within the debounce window coalesce into one navigation.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use openerp_querysync::{MemoryRouter, QuerySync, RawQuery, RouteMeta, RouteRecord};
//!
//! let router = Arc::new(MemoryRouter::new());
//! router.add_route("list", vec![RouteRecord::named(
//!     "list",
//!     RouteMeta::new().param("page", "int:1").param("tags", "array:"),
//! )]);
//!
//! let sync = QuerySync::builder().router(router.clone()).build()?;
//! sync.attach(&router);
//! let _driver = sync.start();
//!
//! router.navigate_to("list", RawQuery::parse("page=3"))?;
//! assert_eq!(sync.get_as::<i64>("page")?, 3);
//! sync.add_value("tags", "red"); // pushes ?page=3&tags=red after 100 ms
//! ```

pub mod config;
pub mod datatype;
pub mod definition;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod proxy;
pub mod query;
pub mod registry;
pub mod router;
pub mod store;
pub mod sync;
pub mod typed;
pub mod value;

// Re-export primary types at crate root.
pub use config::{NavigationOperation, SyncConfig};
pub use datatype::{
    ArrayDatatype, BoolDatatype, Datatype, DefaultValue, IntDatatype, SeparatedArrayDatatype,
    StringDatatype,
};
pub use definition::{Definitions, ParamDefinition, ParamSpec, ResolvedParam, resolve_list, resolve_spec};
pub use engine::{Engine, Navigation};
pub use error::SyncError;
pub use fingerprint::Fingerprint;
pub use proxy::QueryProxy;
pub use query::{RawQuery, RawValue};
pub use registry::DatatypeRegistry;
pub use router::{
    HistoryEntry, Location, MemoryRouter, NavigationKind, Navigator, QuerySettings, RouteMeta,
    RouteRecord,
};
pub use store::{ALL_KEYS, ParamStore};
pub use sync::{QuerySync, QuerySyncBuilder};
pub use value::{FromValue, SubscriptionId, Value};
