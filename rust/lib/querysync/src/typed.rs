//! Typed wrapper for routes with a statically known schema.
//!
//! ```ignore
//! typed_query! {
//!     pub struct ListQuery {
//!         num: i64 = "int:10",
//!         check: bool = "bool:",
//!         option: Vec<String> = "array:",
//!     }
//! }
//!
//! router.add_route("list", vec![RouteRecord::named("list", ListQuery::meta())]);
//! let q = sync.with_query(|p| ListQuery::load(p))?;
//! ```
//!
//! The struct is a plain snapshot; values are moved in and out through a
//! [`QueryProxy`](crate::QueryProxy).

/// Generate a struct with `meta()`, `load()` and `store()` for a fixed set
/// of query parameters. Field names are the query keys.
#[macro_export]
macro_rules! typed_query {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty = $spec:expr ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl $name {
            /// Route metadata declaring every field as a query parameter.
            pub fn meta() -> $crate::RouteMeta {
                $crate::RouteMeta::new()
                    $( .param(stringify!($field), $spec) )*
            }

            /// Read every field from the proxy.
            pub fn load(proxy: &mut $crate::QueryProxy<'_>) -> Result<Self, $crate::SyncError> {
                Ok(Self {
                    $( $field: proxy.get_as::<$ty>(stringify!($field))?, )*
                })
            }

            /// Write every field through the proxy. Unchanged fields do not
            /// touch the query.
            pub fn store(&self, proxy: &mut $crate::QueryProxy<'_>) {
                $( proxy.set(stringify!($field), $crate::Value::from(self.$field.clone())); )*
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use crate::{
        DatatypeRegistry, Engine, Location, MemoryRouter, RawQuery, RouteRecord, SyncConfig,
        SyncError,
    };

    typed_query! {
        /// Filters of a list page.
        pub struct ListQuery {
            num: i64 = "int:10",
            check: bool = "bool:",
            option: Vec<String> = "array:",
            search: String = "string:",
        }
    }

    fn engine(query: &str) -> Engine {
        let mut engine = Engine::new(
            DatatypeRegistry::with_builtins(),
            SyncConfig::default(),
            Arc::new(MemoryRouter::new()),
        );
        let to = Location::new(
            "list",
            RawQuery::parse(query),
            vec![Arc::new(RouteRecord::named("list", ListQuery::meta()))],
        );
        engine.before_each(&to, &Location::default());
        engine
    }

    #[test]
    fn meta_declares_fields() {
        let meta = ListQuery::meta();
        let query = meta.query.unwrap();
        assert_eq!(query.len(), 4);
        assert!(query.contains_key("option"));
    }

    #[test]
    fn load_reads_typed_fields() {
        let mut engine = engine("num=3&check&option=a&option=b");
        let q = ListQuery::load(&mut engine.proxy(Instant::now())).unwrap();
        assert_eq!(
            q,
            ListQuery {
                num: 3,
                check: true,
                option: vec!["a".into(), "b".into()],
                search: String::new(),
            }
        );
    }

    #[test]
    fn store_writes_only_changes() {
        let mut engine = engine("");
        let mut proxy = engine.proxy(Instant::now());
        let mut q = ListQuery::load(&mut proxy).unwrap();
        q.num = 20;
        q.search = "abc".into();
        q.store(&mut proxy);
        assert_eq!(proxy.raw_query().to_query_string(), "num=20&search=abc");
        drop(proxy);
        assert_eq!(engine.revision(), 2);
    }

    #[test]
    fn load_reports_mismatch() {
        let mut engine = engine("");
        let mut proxy = engine.proxy(Instant::now());
        proxy.set("num", "not a number");
        let err = ListQuery::load(&mut proxy).unwrap_err();
        assert!(matches!(err, SyncError::TypeMismatch { .. }));
    }
}
