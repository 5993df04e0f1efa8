use std::collections::HashMap;

/// An unordered mapping from header name to one or more values.
///
/// Names are matched case-insensitively (they are normalized to lowercase
/// on insertion). Accumulation is append-only: adding a value for an
/// existing name keeps the earlier values, and multiple values of the same
/// name retain arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: HashMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value under `name`.
    pub fn add(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .entry(name.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value recorded under `name`, if any.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.entries
            .get(&name.as_ref().to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values recorded under `name`, in arrival order.
    pub fn get_all(&self, name: impl AsRef<str>) -> &[String] {
        self.entries
            .get(&name.as_ref().to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append every `(name, value)` pair of `other` to this map.
    pub fn merge(&mut self, other: &Headers) {
        for (name, values) in &other.entries {
            let slot = self.entries.entry(name.clone()).or_default();
            slot.extend(values.iter().cloned());
        }
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<N: AsRef<str>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_insensitive() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn values_append_in_arrival_order() {
        let mut headers = Headers::new();
        headers.add("set-cookie", "a=1");
        headers.add("Set-Cookie", "b=2");
        headers.add("set-cookie", "c=3");
        assert_eq!(headers.get_all("set-cookie"), ["a=1", "b=2", "c=3"]);
        assert_eq!(headers.get("set-cookie"), Some("a=1"));
    }

    #[test]
    fn merge_is_multiset_union() {
        let mut first: Headers = [("foo", "1"), ("bar", "x")].into_iter().collect();
        let second: Headers = [("foo", "2"), ("baz", "y")].into_iter().collect();
        first.merge(&second);

        assert_eq!(first.get_all("foo"), ["1", "2"]);
        assert_eq!(first.get_all("bar"), ["x"]);
        assert_eq!(first.get_all("baz"), ["y"]);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn missing_name_is_empty() {
        let headers = Headers::new();
        assert!(headers.is_empty());
        assert_eq!(headers.get("nope"), None);
        assert!(headers.get_all("nope").is_empty());
    }
}
