//! Postman v2.1 collections.
//!
//! Folders are walked recursively and the innermost folder name becomes the
//! endpoint tag. Postman path variables (`:id` or `{{id}}`) are rewritten to
//! `{id}` placeholders.

use std::collections::HashMap;

use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::endpoint::{ApiEndpoint, HttpMethod, Param, ParamLocation, ResponseInfo};
use crate::error::{Error, Result};

/// Parse a collection into endpoints, in collection order
pub fn parse_postman(content: &str) -> Result<Vec<ApiEndpoint>> {
    let collection: JsonValue = serde_json::from_str(content)
        .map_err(|e| Error::document(format!("Invalid Postman collection: {}", e)))?;

    let items = collection
        .get("item")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| Error::document("Postman collection has no 'item' array"))?;

    let mut endpoints = Vec::new();
    walk(items, None, has_auth(&collection), &mut endpoints);
    log::debug!("Parsed {} endpoint(s) from Postman collection", endpoints.len());
    Ok(endpoints)
}

fn walk(
    items: &[JsonValue],
    folder: Option<&str>,
    inherited_auth: bool,
    out: &mut Vec<ApiEndpoint>,
) {
    for item in items {
        if let Some(children) = item.get("item").and_then(JsonValue::as_array) {
            let name = item.get("name").and_then(JsonValue::as_str).or(folder);
            walk(children, name, inherited_auth || has_auth(item), out);
        } else if let Some(request) = item.get("request") {
            if let Some(endpoint) = request_endpoint(item, request, folder, inherited_auth) {
                out.push(endpoint);
            }
        }
    }
}

fn request_endpoint(
    item: &JsonValue,
    request: &JsonValue,
    folder: Option<&str>,
    inherited_auth: bool,
) -> Option<ApiEndpoint> {
    let name = item.get("name").and_then(JsonValue::as_str).unwrap_or_default();

    // A bare string request is a GET of that URL
    let method_str = request.get("method").and_then(JsonValue::as_str).unwrap_or("GET");
    let method: HttpMethod = match method_str.parse() {
        Ok(method) => method,
        Err(e) => {
            log::warn!("Skipping Postman request '{}': {}", name, e);
            return None;
        }
    };

    let url = request.get("url").unwrap_or(request);
    let (path, path_vars) = url_path(url);
    let mut endpoint = ApiEndpoint::new(method, path);
    endpoint.summary = name.to_string();
    endpoint.tags = folder.map(|f| vec![f.to_string()]).unwrap_or_default();

    let descriptions = variable_descriptions(url);
    for var in path_vars {
        let mut param = Param::new(var.as_str(), ParamLocation::Path);
        param.description = descriptions.get(&var).cloned().unwrap_or_default();
        endpoint.parameters.push(param);
    }
    for query in url.get("query").and_then(JsonValue::as_array).into_iter().flatten() {
        if query.get("disabled").and_then(JsonValue::as_bool) == Some(true) {
            continue;
        }
        let Some(key) = query.get("key").and_then(JsonValue::as_str) else {
            continue;
        };
        let mut param = Param::new(key, ParamLocation::Query);
        param.description = text(query.get("description"));
        endpoint.parameters.push(param);
    }

    if let Some(body) = request.get("body") {
        apply_body(&mut endpoint, body);
    }

    let auth_header = request
        .get("header")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
        .filter_map(|h| h.get("key").and_then(JsonValue::as_str))
        .any(|key| key.eq_ignore_ascii_case("authorization"));
    endpoint.auth_required = auth_header || has_auth(request) || inherited_auth;

    for response in item.get("response").and_then(JsonValue::as_array).into_iter().flatten() {
        if let Some(code) = response.get("code").and_then(JsonValue::as_u64) {
            endpoint.responses.insert(
                code.to_string(),
                ResponseInfo {
                    description: text(response.get("name")),
                },
            );
        }
    }

    Some(endpoint)
}

/// Path with `{name}` placeholders, plus the placeholder names in order
fn url_path(url: &JsonValue) -> (String, Vec<String>) {
    let segments: Vec<String> = match url.get("path") {
        Some(JsonValue::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.as_str().or_else(|| p.get("value").and_then(JsonValue::as_str)))
            .map(String::from)
            .collect(),
        Some(JsonValue::String(path)) => split_segments(path),
        _ => {
            let raw = url
                .as_str()
                .or_else(|| url.get("raw").and_then(JsonValue::as_str))
                .unwrap_or_default();
            split_segments(raw_path(raw))
        }
    };

    let mut vars = Vec::new();
    let converted: Vec<String> = segments
        .iter()
        .filter(|s| !s.is_empty())
        .map(|segment| match placeholder_name(segment) {
            Some(var) => {
                vars.push(var.to_string());
                format!("{{{}}}", var)
            }
            None => segment.clone(),
        })
        .collect();

    (format!("/{}", converted.join("/")), vars)
}

/// `:id`, `{{id}}` or `{id}` to `id`
fn placeholder_name(segment: &str) -> Option<&str> {
    if let Some(var) = segment.strip_prefix(':') {
        return Some(var);
    }
    segment
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .or_else(|| segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
        .filter(|var| !var.is_empty())
}

/// Strip scheme, host (or a leading `{{baseUrl}}`), query and fragment
fn raw_path(raw: &str) -> &str {
    let raw = raw.split(['?', '#']).next().unwrap_or_default();
    if let Some((_, rest)) = raw.split_once("://") {
        rest.find('/').map(|i| &rest[i..]).unwrap_or("")
    } else if raw.starts_with("{{") {
        raw.find("}}").map(|i| &raw[i + 2..]).unwrap_or("")
    } else {
        raw
    }
}

fn split_segments(path: &str) -> Vec<String> {
    path.split('/').filter(|s| !s.is_empty()).map(String::from).collect()
}

fn variable_descriptions(url: &JsonValue) -> HashMap<String, String> {
    url.get("variable")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| {
            let key = v.get("key").and_then(JsonValue::as_str)?;
            Some((key.to_string(), text(v.get("description"))))
        })
        .collect()
}

fn apply_body(endpoint: &mut ApiEndpoint, body: &JsonValue) {
    match body.get("mode").and_then(JsonValue::as_str) {
        Some("raw") => {
            let raw = body.get("raw").and_then(JsonValue::as_str).unwrap_or_default();
            match serde_json::from_str::<JsonValue>(raw) {
                Ok(value) => endpoint.request_body = Some(value),
                Err(_) if raw.trim().is_empty() => {}
                Err(e) => log::debug!("Raw body of {} is not JSON: {}", endpoint.signature(), e),
            }
        }
        Some(mode @ ("formdata" | "urlencoded")) => {
            let mut properties = JsonMap::new();
            for field in body.get(mode).and_then(JsonValue::as_array).into_iter().flatten() {
                if let Some(key) = field.get("key").and_then(JsonValue::as_str) {
                    let schema = if field.get("type").and_then(JsonValue::as_str) == Some("file") {
                        json!({ "type": "string", "format": "binary" })
                    } else {
                        json!({ "type": "string" })
                    };
                    properties.insert(key.to_string(), schema);
                }
            }
            endpoint.request_body = Some(json!({ "type": "object", "properties": properties }));
            endpoint.content_type = if mode == "formdata" {
                "multipart/form-data".to_string()
            } else {
                "application/x-www-form-urlencoded".to_string()
            };
        }
        _ => {}
    }
}

/// An `auth` block that is present and not `noauth`
fn has_auth(value: &JsonValue) -> bool {
    match value.get("auth") {
        None | Some(JsonValue::Null) => false,
        Some(auth) => auth.get("type").and_then(JsonValue::as_str) != Some("noauth"),
    }
}

/// Description fields may be plain strings or `{content}` objects
fn text(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other
            .get("content")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION: &str = r#"{
      "info": {"_postman_id": "abc", "name": "Shop", "schema": "https://schema.getpostman.com/json/collection/v2.1.0/collection.json"},
      "item": [
        {
          "name": "Users",
          "item": [
            {
              "name": "Create user",
              "request": {
                "method": "POST",
                "header": [{"key": "authorization", "value": "Bearer x"}],
                "body": {"mode": "raw", "raw": "{\"name\": \"alice\"}"},
                "url": {"raw": "{{baseUrl}}/api/users", "host": ["{{baseUrl}}"], "path": ["api", "users"]}
              },
              "response": [{"name": "Created", "code": 201}]
            },
            {
              "name": "Get user",
              "request": {
                "method": "GET",
                "url": {
                  "raw": "{{baseUrl}}/api/users/:id?expand=true",
                  "path": ["api", "users", ":id"],
                  "query": [
                    {"key": "expand", "value": "true", "description": "Expand relations"},
                    {"key": "debug", "value": "1", "disabled": true}
                  ],
                  "variable": [{"key": "id", "description": "User id"}]
                }
              }
            }
          ]
        },
        {
          "name": "Upload avatar",
          "request": {
            "method": "PUT",
            "auth": {"type": "bearer"},
            "body": {"mode": "formdata", "formdata": [{"key": "file", "type": "file"}]},
            "url": "https://api.example.com/v1/avatars/{{avatarId}}?x=1"
          }
        },
        {"name": "Ping", "request": {"method": "HEAD", "url": "https://api.example.com/ping"}}
      ]
    }"#;

    #[test]
    fn test_folders_become_tags() {
        let endpoints = parse_postman(COLLECTION).unwrap();
        let signatures: Vec<String> = endpoints.iter().map(ApiEndpoint::signature).collect();
        assert_eq!(
            signatures,
            vec![
                "POST /api/users",
                "GET /api/users/{id}",
                "PUT /v1/avatars/{avatarId}"
            ]
        );
        assert_eq!(endpoints[0].tags, vec!["Users"]);
        assert!(endpoints[2].tags.is_empty());
    }

    #[test]
    fn test_request_details() {
        let endpoints = parse_postman(COLLECTION).unwrap();

        let create = &endpoints[0];
        assert!(create.auth_required);
        assert_eq!(create.request_body, Some(json!({"name": "alice"})));
        assert_eq!(create.responses["201"].description, "Created");
        assert_eq!(create.summary, "Create user");

        let get = &endpoints[1];
        assert!(!get.auth_required);
        let names: Vec<&str> = get.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id", "expand"]);
        assert_eq!(get.parameters[0].location, ParamLocation::Path);
        assert!(get.parameters[0].required);
        assert_eq!(get.parameters[0].description, "User id");
        assert!(!get.parameters[1].required);
        assert_eq!(get.parameters[1].description, "Expand relations");
    }

    #[test]
    fn test_formdata_and_request_auth() {
        let endpoints = parse_postman(COLLECTION).unwrap();
        let upload = &endpoints[2];
        assert!(upload.auth_required);
        assert_eq!(upload.content_type, "multipart/form-data");
        assert_eq!(
            upload.request_body.as_ref().and_then(|b| b.pointer("/properties/file/format")),
            Some(&json!("binary"))
        );
    }

    #[test]
    fn test_collection_auth_is_inherited() {
        let endpoints = parse_postman(
            r#"{"auth": {"type": "apikey"}, "item": [{"name": "x", "request": {"method": "GET", "url": "/health"}}]}"#,
        )
        .unwrap();
        assert!(endpoints[0].auth_required);
        assert_eq!(endpoints[0].path, "/health");
    }

    #[test]
    fn test_raw_path_forms() {
        assert_eq!(raw_path("https://h.example.com/a/b?x=1"), "/a/b");
        assert_eq!(raw_path("{{baseUrl}}/a/:id"), "/a/:id");
        assert_eq!(raw_path("/plain#frag"), "/plain");
        assert_eq!(raw_path("https://h.example.com"), "");
    }

    #[test]
    fn test_invalid_collection() {
        assert!(matches!(parse_postman("not json"), Err(Error::Document(_))));
        assert!(matches!(parse_postman("{}"), Err(Error::Document(_))));
    }
}
