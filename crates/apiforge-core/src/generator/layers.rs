//! The four model-backed layers generated for every tag.
//!
//! Each generator issues exactly one model call, extracts one fenced block
//! and names the file from its first-line comment or from the layer default.
//! Generators never retry; the repair loop does.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use crate::endpoint::ApiEndpoint;
use crate::error::Result;
use crate::generator::extract::{extract_code_block, extract_filename, BlockLang};
use crate::llm::{call_with_timeout, LanguageModel};
use crate::prompts::{PromptKind, PromptSet};
use crate::utils::{api_class_name, python_identifier};

const NO_SECTIONS: &str =
    "(No test-case sections matched these endpoints; derive scenarios from the endpoint definitions.)";

/// A generated artifact kind per tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Api,
    Data,
    Services,
    Tests,
}

impl Layer {
    /// Directory of the generated project holding this layer
    pub fn dir(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Data => "data",
            Self::Services => "services",
            Self::Tests => "tests",
        }
    }

    pub fn lang(&self) -> BlockLang {
        match self {
            Self::Data => BlockLang::Yaml,
            _ => BlockLang::Python,
        }
    }

    pub fn prompt(&self) -> PromptKind {
        match self {
            Self::Api => PromptKind::LayerApi,
            Self::Data => PromptKind::LayerData,
            Self::Services => PromptKind::LayerServices,
            Self::Tests => PromptKind::LayerTests,
        }
    }

    /// File name used when the model declares none
    pub fn default_filename(&self, tag: &str) -> String {
        let ident = python_identifier(tag);
        match self {
            Self::Api => format!("{}_api.py", ident),
            Self::Data => format!("{}.yaml", ident),
            Self::Services => format!("{}_flow.py", ident),
            Self::Tests => format!("test_{}.py", ident),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir())
    }
}

/// Python names derived from one tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNames {
    /// Normalized tag, as shown to the model
    pub tag: String,
    /// Module, file and fixture stem
    pub ident: String,
}

impl TagNames {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ident: python_identifier(tag),
        }
    }

    /// Names for every tag, in order.
    ///
    /// Tags whose identifier or wrapper class collides with an earlier tag
    /// get a numbered identifier, e.g. `pet-store` after `pet_store` becomes
    /// `pet_store_2` with class `PetStore2Api`.
    pub fn unique<'t>(tags: impl IntoIterator<Item = &'t str>) -> Vec<Self> {
        let mut idents = HashSet::new();
        let mut classes = HashSet::new();
        tags.into_iter()
            .map(|tag| {
                let mut names = Self::new(tag);
                let base = names.ident.clone();
                let mut n = 1;
                while idents.contains(&names.ident) || classes.contains(&names.class_name()) {
                    n += 1;
                    names.ident = format!("{}_{}", base, n);
                }
                idents.insert(names.ident.clone());
                classes.insert(names.class_name());
                names
            })
            .collect()
    }

    /// API wrapper class, e.g. `UsersApi`
    pub fn class_name(&self) -> String {
        api_class_name(&self.ident)
    }

    /// conftest fixture providing the wrapper, e.g. `users_api`
    pub fn fixture(&self) -> String {
        format!("{}_api", self.ident)
    }
}

/// One file produced by a layer generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub layer: Layer,
    pub filename: String,
    pub content: String,
}

impl GeneratedFile {
    /// Path inside the generated project, e.g. `api/users_api.py`
    pub fn path(&self) -> String {
        format!("{}/{}", self.layer.dir(), self.filename)
    }

    /// File name without its extension
    pub fn stem(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.filename)
    }
}

/// Issues the per-layer model calls for one tag at a time
pub struct LayerGenerator<'a> {
    model: &'a dyn LanguageModel,
    prompts: &'a PromptSet,
    timeout: Duration,
}

impl<'a> LayerGenerator<'a> {
    pub fn new(model: &'a dyn LanguageModel, prompts: &'a PromptSet, timeout: Duration) -> Self {
        Self {
            model,
            prompts,
            timeout,
        }
    }

    /// API wrapper class for the tag's endpoints
    pub async fn generate_api(
        &self,
        names: &TagNames,
        endpoints: &[&ApiEndpoint],
    ) -> Result<GeneratedFile> {
        let user = format!(
            "Resource tag: {tag}\nClass name: {class}\n\nEndpoints:\n```json\n{endpoints}\n```\n",
            tag = names.tag,
            class = names.class_name(),
            endpoints = endpoints_json(endpoints)?,
        );
        self.run(Layer::Api, names, &user).await
    }

    /// YAML test data from the tag's test-case sections
    pub async fn generate_data(
        &self,
        names: &TagNames,
        endpoints: &[&ApiEndpoint],
        sections: &str,
    ) -> Result<GeneratedFile> {
        let user = format!(
            "Resource tag: {tag}\n\nTest cases:\n{sections}\n\nEndpoints:\n```json\n{endpoints}\n```\n",
            tag = names.tag,
            sections = or_placeholder(sections),
            endpoints = endpoints_json(endpoints)?,
        );
        self.run(Layer::Data, names, &user).await
    }

    /// Business flows built on the already generated API layer
    pub async fn generate_services(
        &self,
        names: &TagNames,
        endpoints: &[&ApiEndpoint],
        api_code: &str,
    ) -> Result<GeneratedFile> {
        let user = format!(
            "Resource tag: {tag}\n\nEndpoints:\n```json\n{endpoints}\n```\n\nAPI layer:\n```python\n{api}\n```\n",
            tag = names.tag,
            endpoints = endpoints_json(endpoints)?,
            api = api_code.trim_end(),
        );
        self.run(Layer::Services, names, &user).await
    }

    /// Test module using the API layer and the data file
    pub async fn generate_tests(
        &self,
        names: &TagNames,
        endpoints: &[&ApiEndpoint],
        sections: &str,
        api_code: &str,
        data: &GeneratedFile,
    ) -> Result<GeneratedFile> {
        let user = format!(
            "Resource tag: {tag}\nFixture: {fixture}\nData file: data/{data_file}\n\n\
             Test cases:\n{sections}\n\nEndpoints:\n```json\n{endpoints}\n```\n\n\
             API layer:\n```python\n{api}\n```\n\nTest data:\n```yaml\n{data}\n```\n",
            tag = names.tag,
            fixture = names.fixture(),
            data_file = data.filename,
            sections = or_placeholder(sections),
            endpoints = endpoints_json(endpoints)?,
            api = api_code.trim_end(),
            data = data.content.trim_end(),
        );
        self.run(Layer::Tests, names, &user).await
    }

    async fn run(&self, layer: Layer, names: &TagNames, user: &str) -> Result<GeneratedFile> {
        log::info!("Generating {} layer for tag '{}'", layer, names.tag);
        let system = self.prompts.get(layer.prompt());
        let response = call_with_timeout(self.model, self.timeout, system, user).await?;

        let code = extract_code_block(&response, layer.lang());
        let filename = match extract_filename(&code, layer.lang()) {
            Some(name) => name,
            None => {
                let name = layer.default_filename(&names.ident);
                log::debug!("No file name declared for {} layer, using {}", layer, name);
                name
            }
        };

        Ok(GeneratedFile {
            layer,
            filename,
            content: with_trailing_newline(code),
        })
    }
}

/// Non-empty text gets a final newline
pub(crate) fn with_trailing_newline(mut text: String) -> String {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

fn endpoints_json(endpoints: &[&ApiEndpoint]) -> Result<String> {
    Ok(serde_json::to_string_pretty(endpoints)?)
}

fn or_placeholder(sections: &str) -> &str {
    if sections.trim().is_empty() {
        NO_SECTIONS
    } else {
        sections
    }
}
