//! Order-independent fingerprint of a raw query.
//!
//! Used to recognise a location the synchronizer has already applied (or
//! produced itself) and to find which keys changed between two locations.
//!
//! Keys are sorted and values within a key are sorted, so neither key order
//! nor the order of a repeated key's values affects the result.

use std::collections::BTreeMap;

use crate::query::{RawQuery, RawValue};

/// Summary of a raw query plus one fragment per key.
///
/// Fragments are keyed by the URL-encoded key. A key whose value is a bare
/// flag has a `None` fragment, distinct from an absent key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    summary: String,
    fragments: BTreeMap<String, Option<String>>,
}

impl Fingerprint {
    /// Compute the fingerprint of a raw query.
    pub fn of(query: &RawQuery) -> Self {
        let mut summary = String::new();
        let mut fragments = BTreeMap::new();

        // RawQuery iterates in sorted key order.
        for (key, value) in query {
            let key = urlencoding::encode(key).into_owned();
            if let RawValue::Flag = value {
                summary.push('&');
                summary.push_str(&key);
                fragments.insert(key, None);
                continue;
            }

            let mut values: Vec<Option<String>> = value
                .values()
                .into_iter()
                .map(|v| v.map(|v| urlencoding::encode(v).into_owned()))
                .collect();
            values.sort();

            let mut fragment = String::new();
            for v in &values {
                fragment.push('&');
                fragment.push_str(&key);
                if let Some(v) = v {
                    fragment.push('=');
                    fragment.push_str(v);
                }
            }
            summary.push_str(&fragment);
            fragments.insert(key, Some(fragment));
        }

        Self { summary, fragments }
    }

    /// The whole-query summary string.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Fragment for a raw (unencoded) key.
    ///
    /// - `None`: key absent
    /// - `Some(None)`: key present as a bare flag
    /// - `Some(Some(fragment))`: key with values
    pub fn fragment(&self, key: &str) -> Option<Option<&str>> {
        self.fragments
            .get(urlencoding::encode(key).as_ref())
            .map(|f| f.as_deref())
    }

    /// Whether `key` has the same fragment in both fingerprints.
    pub fn same_fragment(&self, other: &Fingerprint, key: &str) -> bool {
        self.fragment(key) == other.fragment(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> RawQuery {
        RawQuery::parse(s)
    }

    #[test]
    fn summary_format() {
        let fp = Fingerprint::of(&q("b=2&a=1&flag"));
        assert_eq!(fp.summary(), "&a=1&b=2&flag");
        assert_eq!(fp.fragment("a"), Some(Some("&a=1")));
        assert_eq!(fp.fragment("flag"), Some(None));
        assert_eq!(fp.fragment("missing"), None);
        assert_eq!(fp.len(), 3);
    }

    #[test]
    fn empty_query() {
        let fp = Fingerprint::of(&RawQuery::new());
        assert_eq!(fp.summary(), "");
        assert!(fp.is_empty());
    }

    #[test]
    fn key_order_does_not_matter() {
        let a = Fingerprint::of(&q("x=1&y=2&z"));
        let b = Fingerprint::of(&q("z&y=2&x=1"));
        assert_eq!(a, b);
    }

    #[test]
    fn array_order_does_not_matter() {
        let a = Fingerprint::of(&q("o=a&o=b&o=c&n=1"));
        let b = Fingerprint::of(&q("n=1&o=c&o=a&o=b"));
        assert_eq!(a.summary(), b.summary());
        assert!(a.same_fragment(&b, "o"));
    }

    #[test]
    fn valueless_repetition_in_fragment() {
        let fp = Fingerprint::of(&q("o=a&o"));
        assert_eq!(fp.fragment("o"), Some(Some("&o&o=a")));
    }

    #[test]
    fn values_and_keys_are_encoded() {
        let fp = Fingerprint::of(&q("a%20key=x%26y"));
        assert_eq!(fp.summary(), "&a%20key=x%26y");
        assert_eq!(fp.fragment("a key"), Some(Some("&a%20key=x%26y")));
    }

    #[test]
    fn different_content_differs() {
        let a = Fingerprint::of(&q("o=a&o=b"));
        let b = Fingerprint::of(&q("o=a&o=c"));
        assert_ne!(a.summary(), b.summary());
        assert!(!a.same_fragment(&b, "o"));
    }

    #[test]
    fn same_fragment_distinguishes_absent_from_flag() {
        let a = Fingerprint::of(&q("check"));
        let b = Fingerprint::of(&q(""));
        assert!(!a.same_fragment(&b, "check"));
        assert!(a.same_fragment(&b, "other"));
    }
}
