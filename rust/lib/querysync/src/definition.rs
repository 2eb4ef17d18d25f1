use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::datatype::{Datatype, DefaultValue};
use crate::error::SyncError;
use crate::registry::DatatypeRegistry;
use crate::value::Value;

/// Resolved definitions of the active route, keyed by parameter name.
pub type Definitions = BTreeMap<String, ParamDefinition>;

// ── ParamDefinition ──

/// A parameter's datatype and default value.
#[derive(Clone)]
pub struct ParamDefinition {
    pub datatype: Arc<dyn Datatype>,
    pub default_value: DefaultValue,
}

impl ParamDefinition {
    pub fn new(datatype: Arc<dyn Datatype>, default_value: impl Into<DefaultValue>) -> Self {
        Self {
            datatype,
            default_value: default_value.into(),
        }
    }

    /// A fresh copy of the default value.
    pub fn default(&self) -> Value {
        self.default_value.resolve()
    }
}

impl fmt::Debug for ParamDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamDefinition")
            .field("datatype", &self.datatype.name())
            .field("default_value", &self.default_value)
            .finish()
    }
}

// ── ParamSpec ──

/// How a route declares one parameter.
#[derive(Clone)]
pub enum ParamSpec {
    /// Compact text: `int:10`, `bool:`, `array:`, `int:num:10`, `search`.
    Text(String),
    /// Datatype by name with a textual default. Deserializable, so route
    /// metadata can come from config files.
    Named {
        datatype: Option<String>,
        default: Option<String>,
    },
    /// Datatype instance and typed default supplied directly.
    Definition {
        datatype: Option<Arc<dyn Datatype>>,
        default_value: Option<DefaultValue>,
    },
}

impl ParamSpec {
    pub fn definition(datatype: Arc<dyn Datatype>, default_value: impl Into<DefaultValue>) -> Self {
        ParamSpec::Definition {
            datatype: Some(datatype),
            default_value: Some(default_value.into()),
        }
    }
}

impl From<&str> for ParamSpec {
    fn from(s: &str) -> Self {
        ParamSpec::Text(s.to_string())
    }
}

impl From<String> for ParamSpec {
    fn from(s: String) -> Self {
        ParamSpec::Text(s)
    }
}

impl From<ParamDefinition> for ParamSpec {
    fn from(def: ParamDefinition) -> Self {
        ParamSpec::Definition {
            datatype: Some(def.datatype),
            default_value: Some(def.default_value),
        }
    }
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSpec::Text(s) => f.debug_tuple("Text").field(s).finish(),
            ParamSpec::Named { datatype, default } => f
                .debug_struct("Named")
                .field("datatype", datatype)
                .field("default", default)
                .finish(),
            ParamSpec::Definition {
                datatype,
                default_value,
            } => f
                .debug_struct("Definition")
                .field("datatype", &datatype.as_ref().map(|d| d.name().to_string()))
                .field("default_value", default_value)
                .finish(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParamSpecRepr {
    Text(String),
    Named {
        #[serde(default)]
        datatype: Option<String>,
        #[serde(default)]
        default: Option<String>,
    },
}

impl<'de> Deserialize<'de> for ParamSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match ParamSpecRepr::deserialize(deserializer)? {
            ParamSpecRepr::Text(s) => ParamSpec::Text(s),
            ParamSpecRepr::Named { datatype, default } => ParamSpec::Named { datatype, default },
        })
    }
}

// ── Resolution ──

/// Result of resolving a spec: the definition, plus the parameter name if
/// the text carried one (`int:num:10`, or a bare `search`).
#[derive(Debug, Clone)]
pub struct ResolvedParam {
    pub name: Option<String>,
    pub definition: ParamDefinition,
}

const DEFAULT_DATATYPE: &str = "string";

/// Convert a parameter spec to a definition.
///
/// Text specs split on `:` into at most three parts:
/// - `name`: string parameter named `name`, empty default
/// - `datatype:default`
/// - `datatype:name:default`
///
/// An empty or missing datatype means `string`. Fails with
/// [`SyncError::UnknownDatatype`] when the datatype is not registered.
pub fn resolve_spec(spec: &ParamSpec, registry: &DatatypeRegistry) -> Result<ResolvedParam, SyncError> {
    match spec {
        ParamSpec::Text(text) => {
            let mut parts = text.splitn(3, ':');
            let (datatype, name, default) = match (parts.next(), parts.next(), parts.next()) {
                (Some(datatype), Some(name), Some(default)) => (datatype, Some(name), default),
                (Some(datatype), Some(default), None) => (datatype, None, default),
                (name, _, _) => (DEFAULT_DATATYPE, name, ""),
            };
            let datatype = registry.resolve(non_empty_or_default(datatype))?;
            let default_value = datatype.parse_default(default);
            Ok(ResolvedParam {
                name: name.filter(|n| !n.is_empty()).map(String::from),
                definition: ParamDefinition::new(datatype, default_value),
            })
        }
        ParamSpec::Named { datatype, default } => {
            let name = datatype.as_deref().map(non_empty_or_default).unwrap_or(DEFAULT_DATATYPE);
            let datatype = registry.resolve(name)?;
            let default_value = datatype.parse_default(default.as_deref().unwrap_or(""));
            Ok(ResolvedParam {
                name: None,
                definition: ParamDefinition::new(datatype, default_value),
            })
        }
        ParamSpec::Definition {
            datatype,
            default_value,
        } => {
            let datatype = match datatype {
                Some(dt) => Arc::clone(dt),
                None => registry.resolve(DEFAULT_DATATYPE)?,
            };
            let default_value = match default_value {
                Some(d) => d.clone(),
                None => datatype.parse_default(""),
            };
            Ok(ResolvedParam {
                name: None,
                definition: ParamDefinition::new(datatype, default_value),
            })
        }
    }
}

fn non_empty_or_default(datatype: &str) -> &str {
    if datatype.is_empty() {
        DEFAULT_DATATYPE
    } else {
        datatype
    }
}

/// Resolve a list of self-named text specs, e.g. `["int:num:10", "search"]`.
///
/// A spec without a name part cannot be keyed and fails with
/// [`SyncError::Config`]; so does an unknown datatype.
pub fn resolve_list<I, S>(specs: I, registry: &DatatypeRegistry) -> Result<Definitions, SyncError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut definitions = Definitions::new();
    for spec in specs {
        let spec = spec.as_ref();
        let resolved = resolve_spec(&ParamSpec::from(spec), registry)?;
        let name = resolved
            .name
            .ok_or_else(|| SyncError::Config(format!("parameter spec '{spec}' has no name")))?;
        definitions.insert(name, resolved.definition);
    }
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::IntDatatype;

    fn registry() -> DatatypeRegistry {
        DatatypeRegistry::with_builtins()
    }

    fn resolve(text: &str) -> ResolvedParam {
        resolve_spec(&ParamSpec::from(text), &registry()).unwrap()
    }

    // ========================================================================
    // Text specs
    // ========================================================================

    #[test]
    fn datatype_and_default() {
        let r = resolve("int:10");
        assert_eq!(r.definition.datatype.name(), "int");
        assert_eq!(r.definition.default(), Value::Int(10));
        assert!(r.name.is_none());
    }

    #[test]
    fn empty_default() {
        let r = resolve("bool:");
        assert_eq!(r.definition.datatype.name(), "bool");
        assert_eq!(r.definition.default(), Value::Bool(false));
    }

    #[test]
    fn single_part_is_named_string() {
        let r = resolve("search");
        assert_eq!(r.definition.datatype.name(), "string");
        assert_eq!(r.definition.default(), Value::from(""));
        assert_eq!(r.name.as_deref(), Some("search"));
    }

    #[test]
    fn three_parts_carry_name() {
        let r = resolve("int:num:10");
        assert_eq!(r.name.as_deref(), Some("num"));
        assert_eq!(r.definition.default(), Value::Int(10));
    }

    #[test]
    fn three_parts_keep_colons_in_default() {
        let r = resolve("string:time:12:30");
        assert_eq!(r.name.as_deref(), Some("time"));
        assert_eq!(r.definition.default(), Value::from("12:30"));
    }

    #[test]
    fn empty_datatype_is_string() {
        let r = resolve(":hello");
        assert_eq!(r.definition.datatype.name(), "string");
        assert_eq!(r.definition.default(), Value::from("hello"));
    }

    #[test]
    fn unknown_datatype_fails() {
        let err = resolve_spec(&ParamSpec::from("date:2020"), &registry()).unwrap_err();
        assert_eq!(err, SyncError::UnknownDatatype("date".into()));
    }

    // ========================================================================
    // Object specs
    // ========================================================================

    #[test]
    fn named_spec_defaults_to_string() {
        let spec = ParamSpec::Named {
            datatype: None,
            default: Some("x".into()),
        };
        let r = resolve_spec(&spec, &registry()).unwrap();
        assert_eq!(r.definition.datatype.name(), "string");
        assert_eq!(r.definition.default(), Value::from("x"));
    }

    #[test]
    fn definition_spec_uses_given_datatype() {
        let spec = ParamSpec::definition(Arc::new(IntDatatype), Value::Int(5));
        let r = resolve_spec(&spec, &registry()).unwrap();
        assert_eq!(r.definition.datatype.name(), "int");
        assert_eq!(r.definition.default(), Value::Int(5));
    }

    #[test]
    fn definition_spec_without_datatype_or_default() {
        let spec = ParamSpec::Definition {
            datatype: None,
            default_value: None,
        };
        let r = resolve_spec(&spec, &registry()).unwrap();
        assert_eq!(r.definition.datatype.name(), "string");
        assert_eq!(r.definition.default(), Value::from(""));
    }

    #[test]
    fn deserialize_text_and_object_specs() {
        let specs: BTreeMap<String, ParamSpec> = serde_json::from_str(
            r#"{"num": "int:10", "tags": {"datatype": "commaarray", "default": "a,b"}, "q": {}}"#,
        )
        .unwrap();
        let reg = registry();
        let num = resolve_spec(&specs["num"], &reg).unwrap();
        assert_eq!(num.definition.default(), Value::Int(10));
        let tags = resolve_spec(&specs["tags"], &reg).unwrap();
        assert_eq!(tags.definition.default(), Value::from(vec!["a", "b"]));
        let q = resolve_spec(&specs["q"], &reg).unwrap();
        assert_eq!(q.definition.datatype.name(), "string");
    }

    // ========================================================================
    // List form
    // ========================================================================

    #[test]
    fn resolve_list_keys_by_name() {
        let defs = resolve_list(["int:num:10", "search", "array:option:"], &registry()).unwrap();
        assert_eq!(defs.len(), 3);
        assert_eq!(defs["num"].default(), Value::Int(10));
        assert_eq!(defs["search"].datatype.name(), "string");
        assert_eq!(defs["option"].default(), Value::List(vec![]));
    }

    #[test]
    fn resolve_list_requires_names() {
        let err = resolve_list(["int:10"], &registry()).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
