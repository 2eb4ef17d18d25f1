use std::borrow::Cow;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

// ── RawValue ──

/// One key's value as it appears in a location query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Key present without a value: `?strict`.
    Flag,
    /// Key present once: `?q=hello`.
    Single(String),
    /// Key repeated: `?o=a&o=b&o`. Valueless repetitions are `None`.
    List(Vec<Option<String>>),
}

impl RawValue {
    pub fn single(value: impl Into<String>) -> Self {
        RawValue::Single(value.into())
    }

    /// Build a repeated-key value where every element carries a value.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RawValue::List(items.into_iter().map(|s| Some(s.into())).collect())
    }

    /// Every occurrence of the key, `None` for valueless ones.
    pub fn values(&self) -> Vec<Option<&str>> {
        match self {
            RawValue::Flag => vec![None],
            RawValue::Single(s) => vec![Some(s.as_str())],
            RawValue::List(items) => items.iter().map(|v| v.as_deref()).collect(),
        }
    }

    /// Add one more occurrence of the key.
    fn append(existing: Option<RawValue>, value: Option<String>) -> RawValue {
        match existing {
            None => match value {
                Some(s) => RawValue::Single(s),
                None => RawValue::Flag,
            },
            Some(RawValue::Flag) => RawValue::List(vec![None, value]),
            Some(RawValue::Single(s)) => RawValue::List(vec![Some(s), value]),
            Some(RawValue::List(mut items)) => {
                items.push(value);
                RawValue::List(items)
            }
        }
    }
}

// ── RawQuery ──

/// String-keyed raw query of a location: `num=7&check&option=a&option=b`.
///
/// Keys are kept sorted, so rendering is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawQuery(BTreeMap<String, RawValue>);

impl RawQuery {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Parse a query string, with or without the leading `?`.
    ///
    /// `+` decodes to a space. Percent sequences that do not decode to UTF-8
    /// are kept verbatim.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut map: BTreeMap<String, RawValue> = BTreeMap::new();
        for pair in query.split('&').filter(|s| !s.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (decode(k), Some(decode(v))),
                None => (decode(pair), None),
            };
            let existing = map.remove(&key);
            map.insert(key, RawValue::append(existing, value));
        }
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: RawValue) -> Option<RawValue> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<RawValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, RawValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a query string without the leading `?`.
    pub fn to_query_string(&self) -> String {
        let mut parts = Vec::new();
        for (key, value) in &self.0 {
            let key = urlencoding::encode(key);
            for v in value.values() {
                match v {
                    Some(v) => parts.push(format!("{}={}", key, urlencoding::encode(v))),
                    None => parts.push(key.to_string()),
                }
            }
        }
        parts.join("&")
    }
}

fn decode(text: &str) -> String {
    let text: Cow<'_, str> = if text.contains('+') {
        Cow::Owned(text.replace('+', " "))
    } else {
        Cow::Borrowed(text)
    };
    match urlencoding::decode(&text) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => text.into_owned(),
    }
}

impl fmt::Display for RawQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

impl<K: Into<String>> FromIterator<(K, RawValue)> for RawQuery {
    fn from_iter<I: IntoIterator<Item = (K, RawValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<'a> IntoIterator for &'a RawQuery {
    type Item = (&'a String, &'a RawValue);
    type IntoIter = btree_map::Iter<'a, String, RawValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn parse_single_values() {
        let q = RawQuery::parse("num=7&search=hello");
        assert_eq!(q.get("num"), Some(&RawValue::single("7")));
        assert_eq!(q.get("search"), Some(&RawValue::single("hello")));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn parse_strips_leading_question_mark() {
        let q = RawQuery::parse("?num=7");
        assert_eq!(q.get("num"), Some(&RawValue::single("7")));
    }

    #[test]
    fn parse_valueless_flag() {
        let q = RawQuery::parse("check&num=1");
        assert_eq!(q.get("check"), Some(&RawValue::Flag));
    }

    #[test]
    fn parse_repeated_key_becomes_list() {
        let q = RawQuery::parse("option=a&option=b&option");
        assert_eq!(
            q.get("option"),
            Some(&RawValue::List(vec![
                Some("a".to_string()),
                Some("b".to_string()),
                None
            ]))
        );
    }

    #[test]
    fn parse_decodes_percent_and_plus() {
        let q = RawQuery::parse("q=hello+world&r=a%20b%2Cc");
        assert_eq!(q.get("q"), Some(&RawValue::single("hello world")));
        assert_eq!(q.get("r"), Some(&RawValue::single("a b,c")));
    }

    #[test]
    fn parse_empty_string_is_empty_query() {
        assert!(RawQuery::parse("").is_empty());
        assert!(RawQuery::parse("?").is_empty());
        assert!(RawQuery::parse("&&").is_empty());
    }

    #[test]
    fn parse_empty_value_is_single_empty_string() {
        let q = RawQuery::parse("q=");
        assert_eq!(q.get("q"), Some(&RawValue::single("")));
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    #[test]
    fn render_sorted_and_encoded() {
        let q: RawQuery = [
            ("search", RawValue::single("a b")),
            ("check", RawValue::Flag),
            ("option", RawValue::list(["x", "y"])),
        ]
        .into_iter()
        .collect();
        assert_eq!(q.to_query_string(), "check&option=x&option=y&search=a%20b");
        assert_eq!(q.to_string(), q.to_query_string());
    }

    #[test]
    fn render_then_parse_keeps_content() {
        let q = RawQuery::parse("a=1&a=2&flag&name=J%C3%B6rg");
        assert_eq!(RawQuery::parse(&q.to_query_string()), q);
    }

    // ========================================================================
    // Map operations
    // ========================================================================

    #[test]
    fn insert_remove_contains() {
        let mut q = RawQuery::new();
        assert!(q.insert("k", RawValue::single("v")).is_none());
        assert!(q.contains_key("k"));
        assert_eq!(q.remove("k"), Some(RawValue::single("v")));
        assert!(!q.contains_key("k"));
        assert!(q.is_empty());
    }

    #[test]
    fn values_view() {
        assert_eq!(RawValue::Flag.values(), vec![None]);
        assert_eq!(RawValue::single("a").values(), vec![Some("a")]);
        assert_eq!(
            RawValue::List(vec![Some("a".into()), None]).values(),
            vec![Some("a"), None]
        );
    }
}
