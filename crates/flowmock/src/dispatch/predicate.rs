//! Static match criteria for outbound calls.
//!
//! A `RequestPredicate` describes the method/path/header/body shape of the
//! calls a rule applies to, excluding any call-count filter. Predicates are
//! immutable once constructed and structurally comparable: predicates that
//! compare equal form one *group* and share a single call counter inside the
//! dispatcher.

use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use regex::Regex;

use crate::error::ConfigError;

/// Snapshot of one outbound HTTP-shaped call made by a running workflow.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub uri: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl MockRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn json_body(mut self, value: &serde_json::Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        self
    }

    /// Path component of the URI, without query string.
    pub fn path(&self) -> &str {
        let without_scheme = self
            .uri
            .find("://")
            .map_or(self.uri.as_str(), |idx| &self.uri[idx + 3..]);
        let path_start = without_scheme.find('/').unwrap_or(without_scheme.len());
        let path = &without_scheme[path_start..];
        let path = if path.is_empty() { "/" } else { path };
        path.split('?').next().unwrap_or(path)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// How a rule's path pattern is applied to the request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathMatch {
    Exact(String),
    StartsWith(String),
    Contains(String),
    /// Pattern is compiled at rule registration; an invalid pattern is a
    /// configuration error, not a silent non-match.
    Regex(String),
}

/// Optional body match criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPredicate {
    Contains(String),
    Equals(String),
    /// Structural JSON equality over the parsed body.
    JsonEquals(serde_json::Value),
}

impl Hash for BodyPredicate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            BodyPredicate::Contains(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            BodyPredicate::Equals(s) => {
                1u8.hash(state);
                s.hash(state);
            }
            // serde_json maps are key-ordered, so equal values serialize
            // identically and the hash stays consistent with Eq.
            BodyPredicate::JsonEquals(v) => {
                2u8.hash(state);
                v.to_string().hash(state);
            }
        }
    }
}

/// Base match criteria of a rule: method, path, required headers, body.
///
/// Structural equality is the predicate-group identity: rules whose
/// predicates compare equal share one call counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestPredicate {
    /// Matches any method when unset.
    pub method: Option<String>,
    pub path: PathMatch,
    /// Required header name/value pairs. Names compare case-insensitively.
    pub headers: BTreeMap<String, String>,
    pub body: Option<BodyPredicate>,
}

impl RequestPredicate {
    pub fn path(path: PathMatch) -> Self {
        Self {
            method: None,
            path,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Exact-path predicate constrained to one method, the common case.
    pub fn endpoint(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            path: PathMatch::Exact(path.into()),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        // Stored lowercased so predicate-group identity ignores header case.
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: BodyPredicate) -> Self {
        self.body = Some(body);
        self
    }

    /// Compile the path pattern if it is a regex. Called once at rule
    /// registration so malformed patterns fail fast.
    pub(crate) fn compile(&self) -> Result<Option<Regex>, ConfigError> {
        match &self.path {
            PathMatch::Regex(pattern) => {
                let regex =
                    Regex::new(pattern).map_err(|source| ConfigError::InvalidPathPattern {
                        pattern: pattern.clone(),
                        source,
                    })?;
                Ok(Some(regex))
            }
            _ => Ok(None),
        }
    }

    /// Whether `request` satisfies this predicate. `path_regex` is the
    /// pre-compiled pattern for the `Regex` kind.
    pub(crate) fn matches(&self, path_regex: Option<&Regex>, request: &MockRequest) -> bool {
        if let Some(method) = &self.method {
            if !method.eq_ignore_ascii_case(&request.method) {
                return false;
            }
        }

        let path = request.path();
        let path_ok = match &self.path {
            PathMatch::Exact(expected) => path == expected,
            PathMatch::StartsWith(prefix) => path.starts_with(prefix.as_str()),
            PathMatch::Contains(needle) => path.contains(needle.as_str()),
            PathMatch::Regex(_) => path_regex.is_some_and(|re| re.is_match(path)),
        };
        if !path_ok {
            return false;
        }

        for (name, expected) in &self.headers {
            match request.header_value(name) {
                Some(actual) if actual == expected => {}
                _ => return false,
            }
        }

        match &self.body {
            None => true,
            Some(BodyPredicate::Contains(needle)) => request.body_text().contains(needle.as_str()),
            Some(BodyPredicate::Equals(expected)) => request.body_text() == *expected,
            Some(BodyPredicate::JsonEquals(expected)) => {
                serde_json::from_slice::<serde_json::Value>(&request.body)
                    .map(|actual| actual == *expected)
                    .unwrap_or(false)
            }
        }
    }
}
