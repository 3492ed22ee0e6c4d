//! Multi-valued string maps and uploaded file parts.

use std::collections::HashMap;

use bytes::Bytes;

/// Key → ordered values, as produced by URL-encoded bodies, multipart text
/// parts, query strings and route parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormValues {
    inner: HashMap<String, Vec<String>>,
}

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `a=1&b=2&a=3`.
    ///
    /// Never fails. Decoding is lossy: invalid percent escapes and invalid
    /// UTF-8 are replaced, a pair without `=` reads as an empty value, and
    /// empty pairs (`a=1&&b=2`) are dropped.
    pub fn parse(encoded: &str) -> Self {
        // Pairs of strings accept every input the tokenizer produces.
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(encoded).unwrap_or_default();
        pairs.into_iter().collect()
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    /// Appends every value of `other` after the values already held.
    pub fn extend(&mut self, other: FormValues) {
        for (key, values) in other.inner {
            self.inner.entry(key).or_default().extend(values);
        }
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.inner.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (key, value) in iter {
            values.append(key, value);
        }
        values
    }
}

/// A multipart part that carried a file name.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}
