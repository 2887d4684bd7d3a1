//! Ordered header list with case-insensitive lookup

use anyhow::{Context, Result};
use mail_parser::MimeHeaders;
use serde::{Deserialize, Serialize};

use crate::mime;

/// Header name/value pairs in the order they appeared on a message or part
///
/// Duplicate names are kept. Serializes as a JSON array of `[name, value]`
/// pairs so the order and duplicates survive a round trip through storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    /// Every value for `name`, compared case-insensitively
    pub fn get_all<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.0
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value for `name` with RFC 2047 encoded words decoded
    pub fn decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(mime::decode_header_value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// MIME type from `Content-Type` without parameters, lowercased
    ///
    /// Defaults to `text/plain` when the header is absent (RFC 2045 §5.2).
    pub fn content_type(&self) -> String {
        mime::parse_headers(self)
            .map(|parsed| mime::mime_type(&parsed))
            .unwrap_or_else(|| mime::DEFAULT_CONTENT_TYPE.to_string())
    }

    /// Whether `Content-Disposition` marks this part as an attachment
    pub fn is_attachment(&self) -> bool {
        mime::parse_headers(self).is_some_and(|parsed| mime::is_attachment(&parsed))
    }

    /// Decoded attachment filename from `Content-Disposition`, falling back to the `Content-Type` name
    pub fn filename(&self) -> Option<String> {
        let parsed = mime::parse_headers(self)?;
        parsed
            .attachment_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize headers")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse stored headers")
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
