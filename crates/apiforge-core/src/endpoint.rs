//! Normalized API endpoint records.
//!
//! Every document parser (OpenAPI/Swagger, Postman, Markdown) converts its input
//! into [`ApiEndpoint`] values. Everything downstream (test-case generation,
//! tag grouping, the layered generator) depends only on this shape.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// HTTP methods an endpoint may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// Upper-case wire form, e.g. `GET`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }

    /// Returns an iterator over all supported methods
    pub fn all() -> impl Iterator<Item = Self> {
        use HttpMethod::*;
        [Get, Post, Put, Delete, Patch].iter().copied()
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            _ => Err(format!("Unsupported HTTP method: {}", s)),
        }
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HttpMethod> for String {
    fn from(method: HttpMethod) -> Self {
        method.as_str().to_string()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter is carried in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    #[default]
    Query,
    Path,
    Header,
    Cookie,
}

impl FromStr for ParamLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "query" => Ok(Self::Query),
            "path" => Ok(Self::Path),
            "header" => Ok(Self::Header),
            "cookie" => Ok(Self::Cookie),
            _ => Err(format!("Unknown parameter location: {}", s)),
        }
    }
}

/// A single API parameter (query, path, header, or cookie)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub location: ParamLocation,
    #[serde(default)]
    pub required: bool,
    /// string / integer / boolean / array / object
    #[serde(default = "default_param_type")]
    pub param_type: String,
    #[serde(default)]
    pub description: String,
    /// Validation constraints such as `minimum`, `maxLength`, `pattern`, `enum`
    #[serde(default)]
    pub constraints: JsonMap<String, JsonValue>,
}

impl Param {
    /// Create an optional string parameter with no description or constraints
    pub fn new(name: impl Into<String>, location: ParamLocation) -> Self {
        Self {
            name: name.into(),
            location,
            required: location == ParamLocation::Path,
            param_type: default_param_type(),
            description: String::new(),
            constraints: JsonMap::new(),
        }
    }
}

/// Documented response for one status code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseInfo {
    #[serde(default)]
    pub description: String,
}

/// A single API endpoint with all its metadata.
///
/// Immutable once parsed; `path` uses `{name}` placeholders for path parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub parameters: Vec<Param>,
    #[serde(default)]
    pub request_body: Option<JsonValue>,
    /// Status code to response description
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseInfo>,
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

impl ApiEndpoint {
    /// Create an endpoint with only a method and a path set
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            summary: String::new(),
            parameters: Vec::new(),
            request_body: None,
            responses: BTreeMap::new(),
            auth_required: false,
            tags: Vec::new(),
            content_type: default_content_type(),
        }
    }

    /// Builder-style tag assignment, mostly for tests and parsers
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// `METHOD PATH`, the form used in test-case section headers
    pub fn signature(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// The first tag, if any
    pub fn first_tag(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }
}

fn default_param_type() -> String {
    "string".to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}
