//! Datatypes: converters between raw query values and typed values.
//!
//! A datatype is looked up by name from a parameter spec such as `int:10`
//! (datatype `int`, default `10`). It knows how to:
//!
//! - turn the textual default into a [`DefaultValue`],
//! - parse a raw value (absent, flag, single, repeated) into a [`Value`],
//! - serialize a [`Value`] back, returning `None` when the key should be
//!   left out of the query (it equals the default, or is empty).
//!
//! Built-ins: `string`, `int`, `bool`, `array`, `commaarray`, `spacearray`.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::query::RawValue;
use crate::value::Value;

/// Converter for one kind of URL parameter.
///
/// Mismatched raw input never fails: `parse` falls back to the default.
/// For every value `v` in the datatype's domain with `v != d`,
/// `parse(serialize(v, d), d) == v`, and `serialize(d, d)` is `None`.
pub trait Datatype: Send + Sync + 'static {
    /// Name used before the first `:` in a parameter spec.
    fn name(&self) -> &str;

    /// Build the default value from the text after the datatype name.
    fn parse_default(&self, text: &str) -> DefaultValue;

    /// Parse a raw value. `None` means the key is absent from the query.
    fn parse(&self, raw: Option<&RawValue>, default: &Value) -> Value;

    /// Serialize a value.
    ///
    /// - `None`: remove the key from the query
    /// - `Some(RawValue::Flag)`: key present without a value (`?strict`)
    /// - `Some(Single)` / `Some(List)`: `key=v` / `key=v1&key=v2`
    fn serialize(&self, value: &Value, default: &Value) -> Option<RawValue>;
}

// ── DefaultValue ──

/// A parameter's default: either a fixed value or a factory producing a
/// fresh value each time one is needed.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Fresh(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn fresh<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        DefaultValue::Fresh(Arc::new(f))
    }

    /// Produce the default value.
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Fresh(f) => f(),
        }
    }
}

impl From<Value> for DefaultValue {
    fn from(value: Value) -> Self {
        DefaultValue::Value(value)
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DefaultValue::Fresh(_) => f.debug_tuple("Fresh").field(&self.resolve()).finish(),
        }
    }
}

// ── string ──

/// Parses a URL parameter as a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringDatatype;

impl Datatype for StringDatatype {
    fn name(&self) -> &str {
        "string"
    }

    fn parse_default(&self, text: &str) -> DefaultValue {
        Value::Str(text.to_string()).into()
    }

    fn parse(&self, raw: Option<&RawValue>, default: &Value) -> Value {
        match raw {
            None => default.clone(),
            Some(RawValue::Flag) => Value::Str(String::new()),
            Some(RawValue::Single(s)) => Value::Str(s.clone()),
            Some(RawValue::List(items)) => {
                warn!(?items, "expecting a single string parameter, got a list");
                default.clone()
            }
        }
    }

    fn serialize(&self, value: &Value, default: &Value) -> Option<RawValue> {
        if value.is_null() {
            return None;
        }
        let Some(text) = value.as_text() else {
            warn!(%value, "string parameter cannot hold a list");
            return None;
        };
        if text.is_empty() && !default.is_truthy() {
            return None;
        }
        if default.as_text().as_deref() == Some(text.as_str()) {
            return None;
        }
        Some(RawValue::Single(text))
    }
}

// ── int ──

/// Interprets a URL parameter as an integer.
///
/// Parsing reads a leading integer and ignores trailing text (`12px` → 12).
#[derive(Debug, Clone, Copy, Default)]
pub struct IntDatatype;

impl Datatype for IntDatatype {
    fn name(&self) -> &str {
        "int"
    }

    fn parse_default(&self, text: &str) -> DefaultValue {
        if text.is_empty() {
            return Value::Int(0).into();
        }
        let n = leading_int(text).unwrap_or_else(|| {
            warn!(text, "int default is not a number, using 0");
            0
        });
        Value::Int(n).into()
    }

    fn parse(&self, raw: Option<&RawValue>, default: &Value) -> Value {
        let text = match raw {
            None | Some(RawValue::Flag) => return default.clone(),
            Some(RawValue::Single(s)) => s.as_str(),
            Some(RawValue::List(items)) => match items.iter().flatten().next() {
                Some(first) => first.as_str(),
                None => return default.clone(),
            },
        };
        match leading_int(text) {
            Some(n) => Value::Int(n),
            None => {
                warn!(text, "expecting an integer parameter");
                default.clone()
            }
        }
    }

    fn serialize(&self, value: &Value, default: &Value) -> Option<RawValue> {
        let n = match value {
            Value::Null => return None,
            Value::Int(n) => *n,
            Value::Bool(b) => *b as i64,
            Value::Str(s) => leading_int(s)?,
            Value::List(_) => {
                warn!(%value, "int parameter cannot hold a list");
                return None;
            }
        };
        if Value::Int(n) == *default {
            return None;
        }
        Some(RawValue::Single(n.to_string()))
    }
}

/// Optional sign followed by digits, after leading whitespace.
fn leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let digits_start = usize::from(text.starts_with(['+', '-']));
    let digits_len = text[digits_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 {
        return None;
    }
    text[..digits_start + digits_len].parse().ok()
}

// ── bool ──

/// Interprets a URL parameter as a boolean flag: present means `true`,
/// absent means the default.
///
/// A `true` value is written as a valueless key (`?check`). `false` is
/// always written by omission, so a parameter whose default is `true`
/// cannot be switched off through the URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolDatatype;

impl Datatype for BoolDatatype {
    fn name(&self) -> &str {
        "bool"
    }

    fn parse_default(&self, text: &str) -> DefaultValue {
        Value::Bool(text == "1" || text == "true").into()
    }

    fn parse(&self, raw: Option<&RawValue>, default: &Value) -> Value {
        match raw {
            None => Value::Bool(default.is_truthy()),
            Some(_) => Value::Bool(true),
        }
    }

    fn serialize(&self, value: &Value, default: &Value) -> Option<RawValue> {
        if value.is_truthy() && value != default {
            return Some(RawValue::Flag);
        }
        None
    }
}

// ── array ──

/// Interprets a URL parameter as a list of strings: the key may be
/// repeated (`?o=a&o=b`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayDatatype;

impl Datatype for ArrayDatatype {
    fn name(&self) -> &str {
        "array"
    }

    fn parse_default(&self, text: &str) -> DefaultValue {
        if text.is_empty() {
            return DefaultValue::fresh(|| Value::List(Vec::new()));
        }
        let item = text.to_string();
        DefaultValue::fresh(move || Value::List(vec![item.clone()]))
    }

    fn parse(&self, raw: Option<&RawValue>, default: &Value) -> Value {
        match raw {
            None => Value::List(default.to_list()),
            Some(RawValue::Flag) => Value::List(Vec::new()),
            Some(RawValue::Single(s)) => Value::List(vec![s.clone()]),
            Some(RawValue::List(items)) => Value::List(items.iter().flatten().cloned().collect()),
        }
    }

    fn serialize(&self, value: &Value, default: &Value) -> Option<RawValue> {
        let mut items = value.to_list();
        if items.is_empty() || items == default.to_list() {
            return None;
        }
        if items.len() == 1 {
            return items.pop().map(RawValue::Single);
        }
        Some(RawValue::list(items))
    }
}

// ── separated array ──

/// A list of strings kept in a single `key=v1<sep>v2` parameter.
#[derive(Debug, Clone)]
pub struct SeparatedArrayDatatype {
    name: String,
    separator: String,
}

impl SeparatedArrayDatatype {
    pub fn new(name: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            separator: separator.into(),
        }
    }

    /// `param=v1,v2,v3`
    pub fn comma() -> Self {
        Self::new("commaarray", ",")
    }

    /// `param=v1%20v2%20v3`
    pub fn space() -> Self {
        Self::new("spacearray", " ")
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        text.split(self.separator.as_str()).map(String::from).collect()
    }
}

impl Datatype for SeparatedArrayDatatype {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse_default(&self, text: &str) -> DefaultValue {
        Value::List(self.split(text)).into()
    }

    fn parse(&self, raw: Option<&RawValue>, default: &Value) -> Value {
        match raw {
            None => Value::List(default.to_list()),
            Some(RawValue::Flag) => Value::List(Vec::new()),
            Some(RawValue::Single(s)) => Value::List(self.split(s)),
            Some(RawValue::List(items)) => Value::List(items.iter().flatten().cloned().collect()),
        }
    }

    fn serialize(&self, value: &Value, default: &Value) -> Option<RawValue> {
        let items = value.to_list();
        if items.is_empty() || items == default.to_list() {
            return None;
        }
        Some(RawValue::Single(items.join(&self.separator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(s: &str) -> RawValue {
        RawValue::single(s)
    }

    fn list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| s.to_string()).collect())
    }

    /// parse(serialize(v, d), d) == v
    fn assert_round_trip(dt: &dyn Datatype, value: Value, default: Value) {
        let raw = dt.serialize(&value, &default);
        assert_eq!(
            dt.parse(raw.as_ref(), &default),
            value,
            "{} round trip via {:?}",
            dt.name(),
            raw
        );
    }

    // ========================================================================
    // string
    // ========================================================================

    #[test]
    fn string_default() {
        assert_eq!(StringDatatype.parse_default("").resolve(), Value::from(""));
        assert_eq!(StringDatatype.parse_default("test").resolve(), Value::from("test"));
    }

    #[test]
    fn string_parse() {
        let d = Value::from("dflt");
        assert_eq!(StringDatatype.parse(None, &d), d);
        assert_eq!(StringDatatype.parse(Some(&RawValue::Flag), &d), Value::from(""));
        assert_eq!(StringDatatype.parse(Some(&single("")), &d), Value::from(""));
        assert_eq!(StringDatatype.parse(Some(&single("x")), &d), Value::from("x"));
        assert_eq!(
            StringDatatype.parse(Some(&RawValue::list(["a", "b"])), &d),
            d,
            "list falls back to default"
        );
    }

    #[test]
    fn string_serialize() {
        let empty = Value::from("");
        assert_eq!(StringDatatype.serialize(&Value::Null, &empty), None);
        assert_eq!(StringDatatype.serialize(&empty, &empty), None);
        assert_eq!(StringDatatype.serialize(&Value::from("x"), &empty), Some(single("x")));

        let d = Value::from("test");
        assert_eq!(StringDatatype.serialize(&d, &d), None);
        // Clearing a non-empty default must be visible in the URL.
        assert_eq!(StringDatatype.serialize(&empty, &d), Some(single("")));
        assert_eq!(StringDatatype.serialize(&Value::Int(3), &empty), Some(single("3")));
    }

    #[test]
    fn string_round_trip() {
        for (v, d) in [("hello", ""), ("", "test"), ("a b&c", "x")] {
            assert_round_trip(&StringDatatype, Value::from(v), Value::from(d));
        }
    }

    // ========================================================================
    // int
    // ========================================================================

    #[test]
    fn int_default() {
        assert_eq!(IntDatatype.parse_default("").resolve(), Value::Int(0));
        assert_eq!(IntDatatype.parse_default("10").resolve(), Value::Int(10));
        assert_eq!(IntDatatype.parse_default("-4").resolve(), Value::Int(-4));
        assert_eq!(IntDatatype.parse_default("abc").resolve(), Value::Int(0));
    }

    #[test]
    fn int_parse() {
        let d = Value::Int(10);
        assert_eq!(IntDatatype.parse(None, &d), d);
        assert_eq!(IntDatatype.parse(Some(&RawValue::Flag), &d), d);
        assert_eq!(IntDatatype.parse(Some(&single("7")), &d), Value::Int(7));
        assert_eq!(IntDatatype.parse(Some(&single("12px")), &d), Value::Int(12));
        assert_eq!(IntDatatype.parse(Some(&single(" -3")), &d), Value::Int(-3));
        assert_eq!(IntDatatype.parse(Some(&single("abc")), &d), d);
        assert_eq!(IntDatatype.parse(Some(&single("")), &d), d);
        assert_eq!(
            IntDatatype.parse(Some(&RawValue::list(["5", "6"])), &d),
            Value::Int(5)
        );
        assert_eq!(
            IntDatatype.parse(Some(&RawValue::List(vec![None])), &d),
            d
        );
    }

    #[test]
    fn int_serialize() {
        let d = Value::Int(10);
        assert_eq!(IntDatatype.serialize(&Value::Null, &d), None);
        assert_eq!(IntDatatype.serialize(&d, &d), None);
        assert_eq!(IntDatatype.serialize(&Value::Int(7), &d), Some(single("7")));
        assert_eq!(IntDatatype.serialize(&Value::from("8"), &d), Some(single("8")));
        assert_eq!(IntDatatype.serialize(&Value::from("10"), &d), None);
        assert_eq!(IntDatatype.serialize(&Value::from("nope"), &d), None);
    }

    #[test]
    fn int_round_trip() {
        for (v, d) in [(7, 10), (0, 10), (-25, 0), (i64::MAX, 1)] {
            assert_round_trip(&IntDatatype, Value::Int(v), Value::Int(d));
        }
    }

    #[test]
    fn leading_int_edges() {
        assert_eq!(leading_int("42"), Some(42));
        assert_eq!(leading_int("+42"), Some(42));
        assert_eq!(leading_int("1.5"), Some(1));
        assert_eq!(leading_int("-"), None);
        assert_eq!(leading_int("x1"), None);
        assert_eq!(leading_int("99999999999999999999"), None);
    }

    // ========================================================================
    // bool
    // ========================================================================

    #[test]
    fn bool_default() {
        assert_eq!(BoolDatatype.parse_default("").resolve(), Value::Bool(false));
        assert_eq!(BoolDatatype.parse_default("1").resolve(), Value::Bool(true));
        assert_eq!(BoolDatatype.parse_default("true").resolve(), Value::Bool(true));
        assert_eq!(BoolDatatype.parse_default("yes").resolve(), Value::Bool(false));
    }

    #[test]
    fn bool_parse_presence() {
        let f = Value::Bool(false);
        assert_eq!(BoolDatatype.parse(None, &f), Value::Bool(false));
        assert_eq!(BoolDatatype.parse(Some(&RawValue::Flag), &f), Value::Bool(true));
        assert_eq!(BoolDatatype.parse(Some(&single("false")), &f), Value::Bool(true));
        assert_eq!(BoolDatatype.parse(None, &Value::Bool(true)), Value::Bool(true));
    }

    #[test]
    fn bool_serialize() {
        let f = Value::Bool(false);
        assert_eq!(BoolDatatype.serialize(&Value::Bool(true), &f), Some(RawValue::Flag));
        assert_eq!(BoolDatatype.serialize(&f, &f), None);
        assert_eq!(BoolDatatype.serialize(&Value::Null, &f), None);

        let t = Value::Bool(true);
        assert_eq!(BoolDatatype.serialize(&t, &t), None);
        assert_eq!(BoolDatatype.serialize(&f, &t), None);
    }

    #[test]
    fn bool_round_trip() {
        assert_round_trip(&BoolDatatype, Value::Bool(true), Value::Bool(false));
    }

    // ========================================================================
    // array
    // ========================================================================

    #[test]
    fn array_default_is_fresh_each_time() {
        let d = ArrayDatatype.parse_default("");
        assert!(matches!(d, DefaultValue::Fresh(_)));
        assert_eq!(d.resolve(), list(&[]));
        assert_eq!(ArrayDatatype.parse_default("a").resolve(), list(&["a"]));
    }

    #[test]
    fn array_parse() {
        let d = list(&["z"]);
        assert_eq!(ArrayDatatype.parse(None, &d), d);
        assert_eq!(ArrayDatatype.parse(Some(&RawValue::Flag), &d), list(&[]));
        assert_eq!(ArrayDatatype.parse(Some(&single("a")), &d), list(&["a"]));
        assert_eq!(
            ArrayDatatype.parse(
                Some(&RawValue::List(vec![Some("a".into()), None, Some("b".into())])),
                &d
            ),
            list(&["a", "b"])
        );
    }

    #[test]
    fn array_serialize() {
        let d = list(&[]);
        assert_eq!(ArrayDatatype.serialize(&list(&[]), &d), None);
        assert_eq!(ArrayDatatype.serialize(&Value::Null, &d), None);
        assert_eq!(ArrayDatatype.serialize(&list(&["a"]), &d), Some(single("a")));
        assert_eq!(
            ArrayDatatype.serialize(&list(&["a", "b"]), &d),
            Some(RawValue::list(["a", "b"]))
        );

        let d = list(&["a", "b"]);
        assert_eq!(ArrayDatatype.serialize(&list(&["a", "b"]), &d), None);
        assert_eq!(
            ArrayDatatype.serialize(&list(&["b", "a"]), &d),
            Some(RawValue::list(["b", "a"]))
        );
    }

    #[test]
    fn array_round_trip() {
        assert_round_trip(&ArrayDatatype, list(&["a"]), list(&[]));
        assert_round_trip(&ArrayDatatype, list(&["a", "b", "c"]), list(&[]));
        assert_round_trip(&ArrayDatatype, list(&["x"]), list(&["y"]));
    }

    // ========================================================================
    // separated arrays
    // ========================================================================

    #[test]
    fn comma_array_parse_and_serialize() {
        let dt = SeparatedArrayDatatype::comma();
        let d = list(&[]);
        assert_eq!(dt.name(), "commaarray");
        assert_eq!(dt.parse(Some(&single("a,b,c")), &d), list(&["a", "b", "c"]));
        assert_eq!(dt.parse(Some(&single("")), &d), list(&[]));
        assert_eq!(dt.parse(None, &list(&["q"])), list(&["q"]));
        assert_eq!(dt.serialize(&list(&["a", "b"]), &d), Some(single("a,b")));
        assert_eq!(dt.serialize(&list(&[]), &d), None);
    }

    #[test]
    fn space_array_default_splits() {
        let dt = SeparatedArrayDatatype::space();
        assert_eq!(dt.parse_default("x y").resolve(), list(&["x", "y"]));
        assert_eq!(dt.parse_default("").resolve(), list(&[]));
        assert_eq!(dt.serialize(&list(&["x", "y"]), &list(&["x", "y"])), None);
    }

    #[test]
    fn separated_round_trip() {
        for dt in [SeparatedArrayDatatype::comma(), SeparatedArrayDatatype::space()] {
            assert_round_trip(&dt, list(&["a", "b"]), list(&[]));
            assert_round_trip(&dt, list(&["only"]), list(&["a", "b"]));
        }
    }
}
