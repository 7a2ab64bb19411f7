//! OpenAPI 3 and Swagger 2 documents.
//!
//! The document is kept as raw JSON (YAML input is converted on load) and
//! walked directly, which covers both major versions with one code path.
//!
//! # Examples
//!
//! ```no_run
//! use apiforge_core::parser::openapi::OpenApiDocument;
//!
//! # #[tokio::main]
//! # async fn main() -> apiforge_core::Result<()> {
//! let doc = OpenApiDocument::load("petstore.yaml").await?;
//! if let Some(title) = doc.title() {
//!     println!("API Title: {}", title);
//! }
//! for endpoint in doc.endpoints()? {
//!     println!("{}", endpoint.signature());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::endpoint::{ApiEndpoint, HttpMethod, Param, ParamLocation, ResponseInfo};
use crate::error::{Error, Result};

const CONSTRAINT_KEYS: &[&str] = &[
    "minimum",
    "maximum",
    "minLength",
    "maxLength",
    "pattern",
    "enum",
];
const JSON_MEDIA: &str = "application/json";
const MULTIPART_MEDIA: &str = "multipart/form-data";
const FORM_MEDIA: &str = "application/x-www-form-urlencoded";

/// Upper bound on chained `$ref` hops
const MAX_REF_DEPTH: usize = 16;

/// A parsed OpenAPI or Swagger document
#[derive(Debug, Clone, serde::Serialize)]
#[serde(transparent)]
pub struct OpenApiDocument {
    /// The raw JSON value of the document
    pub json: JsonValue,
}

impl OpenApiDocument {
    /// Load from a file path or an http(s) URL
    pub async fn load(location: &str) -> Result<Self> {
        let content = super::read_location(location).await?;
        Self::parse_content(&content).map_err(|e| {
            Error::document(format!("Failed to parse OpenAPI document {}: {}", location, e))
        })
    }

    /// Parse content as either JSON or YAML
    pub fn parse_content(content: &str) -> Result<Self> {
        if let Ok(json) = serde_json::from_str(content) {
            return Ok(Self { json });
        }
        serde_yaml::from_str(content)
            .map(|json| Self { json })
            .map_err(|e| {
                Error::document(format!("content is neither valid JSON nor YAML: {}", e))
            })
    }

    pub fn title(&self) -> Option<&str> {
        self.json.get("info")?.get("title")?.as_str()
    }

    pub fn version(&self) -> Option<&str> {
        self.json.get("info")?.get("version")?.as_str()
    }

    /// Server URL: OpenAPI 3 `servers`, else Swagger 2 `host` + `basePath`
    pub fn base_path(&self) -> Option<String> {
        if let Some(url) = self
            .json
            .get("servers")
            .and_then(JsonValue::as_array)
            .and_then(|servers| servers.first())
            .and_then(|server| server.get("url"))
            .and_then(JsonValue::as_str)
        {
            return Some(url.to_string());
        }

        let host = self.json.get("host").and_then(JsonValue::as_str)?;
        let base_path = self
            .json
            .get("basePath")
            .and_then(JsonValue::as_str)
            .unwrap_or("");
        let scheme = match self.json.get("schemes").and_then(JsonValue::as_array) {
            Some(schemes) if schemes.iter().any(|s| s.as_str() == Some("https")) => "https",
            Some(schemes) => schemes.first().and_then(JsonValue::as_str).unwrap_or("https"),
            None => "https",
        };
        Some(format!("{}://{}{}", scheme, host, base_path))
    }

    /// Every operation of every path, paths in key order and methods in
    /// GET, POST, PUT, DELETE, PATCH order
    pub fn endpoints(&self) -> Result<Vec<ApiEndpoint>> {
        let paths = self
            .json
            .get("paths")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| Error::document("Missing 'paths' object"))?;

        let mut endpoints = Vec::new();
        for (path, item) in paths {
            let item = self.resolve(item);
            for method in HttpMethod::all() {
                let key = method.as_str().to_lowercase();
                if let Some(operation) = item.get(&key).and_then(JsonValue::as_object) {
                    endpoints.push(self.operation_endpoint(method, path, item, operation));
                }
            }
        }
        log::debug!("Parsed {} endpoint(s) from OpenAPI document", endpoints.len());
        Ok(endpoints)
    }

    fn operation_endpoint(
        &self,
        method: HttpMethod,
        path: &str,
        path_item: &JsonValue,
        operation: &JsonMap<String, JsonValue>,
    ) -> ApiEndpoint {
        let mut endpoint = ApiEndpoint::new(method, path);
        endpoint.summary = operation
            .get("summary")
            .or_else(|| operation.get("description"))
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        endpoint.tags = operation
            .get("tags")
            .and_then(JsonValue::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(JsonValue::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let raw_params = self.merged_parameters(path_item, operation);
        let mut form_fields = JsonMap::new();
        let mut has_file_field = false;
        for param in &raw_params {
            match param.get("in").and_then(JsonValue::as_str) {
                Some("body") => {
                    endpoint.request_body = param.get("schema").map(|s| self.resolve(s).clone());
                }
                Some("formData") => {
                    let name = param
                        .get("name")
                        .and_then(JsonValue::as_str)
                        .unwrap_or_default();
                    let field_type = param
                        .get("type")
                        .and_then(JsonValue::as_str)
                        .unwrap_or("string");
                    has_file_field |= field_type == "file";
                    form_fields.insert(name.to_string(), json!({ "type": field_type }));
                }
                _ => {
                    if let Some(p) = self.param(param) {
                        endpoint.parameters.push(p);
                    }
                }
            }
        }

        if let Some((schema, media)) = self.request_body(operation) {
            endpoint.request_body = schema;
            endpoint.content_type = media;
        } else if !form_fields.is_empty() {
            endpoint.request_body = Some(json!({ "type": "object", "properties": form_fields }));
            endpoint.content_type = if has_file_field || self.consumes(operation, MULTIPART_MEDIA) {
                MULTIPART_MEDIA.to_string()
            } else {
                FORM_MEDIA.to_string()
            };
        }

        endpoint.responses = self.responses(operation);
        endpoint.auth_required = match operation.get("security").and_then(JsonValue::as_array) {
            Some(requirements) => !requirements.is_empty(),
            None => self
                .json
                .get("security")
                .and_then(JsonValue::as_array)
                .is_some_and(|r| !r.is_empty()),
        };
        endpoint
    }

    /// Path-level parameters overridden by operation-level ones with the
    /// same name and location
    fn merged_parameters<'a>(
        &'a self,
        path_item: &'a JsonValue,
        operation: &'a JsonMap<String, JsonValue>,
    ) -> Vec<&'a JsonValue> {
        let resolved = |list: Option<&'a JsonValue>| -> Vec<&'a JsonValue> {
            list.and_then(JsonValue::as_array)
                .map(|arr| arr.iter().map(|p| self.resolve(p)).collect())
                .unwrap_or_default()
        };
        let key = |p: &JsonValue| {
            (
                p.get("name").and_then(JsonValue::as_str).map(String::from),
                p.get("in").and_then(JsonValue::as_str).map(String::from),
            )
        };

        let mut merged = resolved(path_item.get("parameters"));
        for param in resolved(operation.get("parameters")) {
            match merged.iter().position(|existing| key(existing) == key(param)) {
                Some(i) => merged[i] = param,
                None => merged.push(param),
            }
        }
        merged
    }

    fn param(&self, raw: &JsonValue) -> Option<Param> {
        let name = raw.get("name").and_then(JsonValue::as_str)?;
        let location: ParamLocation = match raw.get("in").and_then(JsonValue::as_str)?.parse() {
            Ok(location) => location,
            Err(e) => {
                log::warn!("Skipping parameter '{}': {}", name, e);
                return None;
            }
        };

        let mut param = Param::new(name, location);
        if let Some(required) = raw.get("required").and_then(JsonValue::as_bool) {
            param.required = required || location == ParamLocation::Path;
        }
        param.description = raw
            .get("description")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();

        // Swagger 2 puts type and constraints on the parameter itself
        let schema = raw.get("schema").map(|s| self.resolve(s)).unwrap_or(raw);
        if let Some(t) = schema.get("type").and_then(JsonValue::as_str) {
            param.param_type = t.to_string();
        }
        for key in CONSTRAINT_KEYS {
            if let Some(value) = schema.get(*key) {
                param.constraints.insert(key.to_string(), value.clone());
            }
        }
        Some(param)
    }

    /// OpenAPI 3 request body: schema and media type
    fn request_body(
        &self,
        operation: &JsonMap<String, JsonValue>,
    ) -> Option<(Option<JsonValue>, String)> {
        let body = self.resolve(operation.get("requestBody")?);
        let content = body.get("content").and_then(JsonValue::as_object)?;

        let media = [JSON_MEDIA, MULTIPART_MEDIA]
            .into_iter()
            .find(|m| content.contains_key(*m))
            .map(String::from)
            .or_else(|| content.keys().next().cloned())?;
        let schema = content
            .get(&media)
            .and_then(|entry| entry.get("schema"))
            .map(|s| self.resolve(s).clone());
        let content_type = if content.contains_key(MULTIPART_MEDIA) {
            MULTIPART_MEDIA.to_string()
        } else {
            media
        };
        Some((schema, content_type))
    }

    fn responses(&self, operation: &JsonMap<String, JsonValue>) -> BTreeMap<String, ResponseInfo> {
        operation
            .get("responses")
            .and_then(JsonValue::as_object)
            .map(|map| {
                map.iter()
                    .map(|(code, response)| {
                        let description = self
                            .resolve(response)
                            .get("description")
                            .and_then(JsonValue::as_str)
                            .unwrap_or_default()
                            .to_string();
                        (code.clone(), ResponseInfo { description })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Swagger 2 `consumes`, operation first then document
    fn consumes(&self, operation: &JsonMap<String, JsonValue>, media: &str) -> bool {
        operation
            .get("consumes")
            .or_else(|| self.json.get("consumes"))
            .and_then(JsonValue::as_array)
            .is_some_and(|list| list.iter().any(|m| m.as_str() == Some(media)))
    }

    /// Follow local `$ref` pointers; unresolvable references stay as they are
    fn resolve<'a>(&'a self, value: &'a JsonValue) -> &'a JsonValue {
        let mut current = value;
        for _ in 0..MAX_REF_DEPTH {
            let Some(reference) = current.get("$ref").and_then(JsonValue::as_str) else {
                return current;
            };
            match reference
                .strip_prefix('#')
                .and_then(|pointer| self.json.pointer(pointer))
            {
                Some(target) => current = target,
                None => {
                    log::debug!("Unresolvable reference {}", reference);
                    return current;
                }
            }
        }
        current
    }
}
