//! API document parsers.
//!
//! Three input formats are understood, all normalized to [`ApiEndpoint`]:
//!
//! - [`openapi`]: OpenAPI 3 / Swagger 2, JSON or YAML
//! - [`postman`]: Postman v2.1 collections
//! - [`markdown`]: free-form Markdown, converted by the language model
//!
//! # Examples
//!
//! ```no_run
//! use apiforge_core::parser::{DocFormat, DocumentParser};
//! use apiforge_core::prompts::PromptSet;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> apiforge_core::Result<()> {
//! let prompts = PromptSet::embedded();
//! let parser = DocumentParser::new(None, &prompts, Duration::from_secs(60));
//! let endpoints = parser.load("openapi.yaml", DocFormat::Auto).await?;
//! println!("{} endpoint(s)", endpoints.len());
//! # Ok(())
//! # }
//! ```

pub mod markdown;
pub mod openapi;
pub mod postman;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::endpoint::ApiEndpoint;
use crate::error::{Error, Result};
use crate::llm::LanguageModel;
use crate::prompts::PromptSet;

pub use markdown::parse_markdown;
pub use openapi::OpenApiDocument;
pub use postman::parse_postman;

/// Input document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocFormat {
    /// Decide from the content
    #[default]
    Auto,
    /// OpenAPI 3 or Swagger 2
    Swagger,
    Postman,
    Markdown,
}

impl FromStr for DocFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "swagger" | "openapi" => Ok(Self::Swagger),
            "postman" => Ok(Self::Postman),
            "markdown" | "md" => Ok(Self::Markdown),
            _ => Err(format!("Unknown document format: {}", s)),
        }
    }
}

impl fmt::Display for DocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Swagger => "swagger",
            Self::Postman => "postman",
            Self::Markdown => "markdown",
        };
        f.write_str(name)
    }
}

/// Guess the format of a document from its content.
///
/// Structured documents with an `openapi` or `swagger` key are Swagger,
/// ones with Postman collection metadata are Postman, anything else is
/// treated as Markdown. Never returns [`DocFormat::Auto`].
pub fn detect_format(content: &str) -> DocFormat {
    let value = serde_json::from_str::<JsonValue>(content)
        .ok()
        .or_else(|| serde_yaml::from_str::<JsonValue>(content).ok());

    let Some(JsonValue::Object(map)) = value else {
        return DocFormat::Markdown;
    };

    if map.contains_key("openapi") || map.contains_key("swagger") {
        return DocFormat::Swagger;
    }

    let info = map.get("info");
    let postman_id = info.and_then(|i| i.get("_postman_id")).is_some();
    let postman_schema = info
        .and_then(|i| i.get("schema"))
        .and_then(JsonValue::as_str)
        .is_some_and(|schema| schema.contains("getpostman"));
    if postman_id || postman_schema {
        return DocFormat::Postman;
    }

    DocFormat::Markdown
}

/// Read a document from a local path or an http(s) URL
pub async fn read_location(location: &str) -> Result<String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        log::debug!("Fetching document from {}", location);
        let response = reqwest::get(location)
            .await
            .map_err(|e| Error::document(format!("Failed to fetch {}: {}", location, e)))?;
        if !response.status().is_success() {
            return Err(Error::document(format!(
                "Failed to fetch {}: HTTP {}",
                location,
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| Error::document(format!("Failed to read {}: {}", location, e)))
    } else {
        tokio::fs::read_to_string(location)
            .await
            .map_err(|e| Error::document(format!("Failed to read {}: {}", location, e)))
    }
}

/// Turns any supported document into endpoints.
///
/// Markdown input needs a model; the structured formats never call one.
pub struct DocumentParser<'a> {
    model: Option<&'a dyn LanguageModel>,
    prompts: &'a PromptSet,
    timeout: Duration,
}

impl<'a> DocumentParser<'a> {
    pub fn new(
        model: Option<&'a dyn LanguageModel>,
        prompts: &'a PromptSet,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            prompts,
            timeout,
        }
    }

    /// Read `location` and parse it
    pub async fn load(&self, location: &str, format: DocFormat) -> Result<Vec<ApiEndpoint>> {
        let content = read_location(location).await?;
        self.parse(&content, format).await
    }

    /// Parse document text; [`DocFormat::Auto`] runs [`detect_format`] first
    pub async fn parse(&self, content: &str, format: DocFormat) -> Result<Vec<ApiEndpoint>> {
        let format = match format {
            DocFormat::Auto => detect_format(content),
            explicit => explicit,
        };
        log::info!("Parsing API document as {}", format);

        match format {
            DocFormat::Swagger => OpenApiDocument::parse_content(content)?.endpoints(),
            DocFormat::Postman => parse_postman(content),
            DocFormat::Markdown | DocFormat::Auto => {
                let model = self.model.ok_or_else(|| {
                    Error::config("Markdown documents need a language model to parse")
                })?;
                parse_markdown(model, self.prompts, self.timeout, content).await
            }
        }
    }
}
