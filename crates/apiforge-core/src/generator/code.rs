//! Flat pytest generation: a `conftest.py` plus one test module per
//! test-case section, all at the project root.

use std::time::Duration;

use crate::artifacts::ArtifactSet;
use crate::error::Result;
use crate::generator::extract::{extract_code_block, extract_filename, BlockLang};
use crate::generator::layers::with_trailing_newline;
use crate::generator::sections::split_sections;
use crate::llm::{call_with_timeout, LanguageModel};
use crate::prompts::{PromptKind, PromptSet};

pub const DEFAULT_TEST_FILE: &str = "test_generated.py";
const CONFTEST: &str = "conftest.py";

const CONFTEST_REQUEST: &str =
    "Generate only the conftest.py file with `base_url` and `auth_headers` fixtures.\n\
     Read the base URL from the API_BASE_URL environment variable (default http://localhost:8080) \
     and the bearer token from API_TOKEN.";

pub struct CodeGenerator<'a> {
    model: &'a dyn LanguageModel,
    prompts: &'a PromptSet,
    timeout: Duration,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(model: &'a dyn LanguageModel, prompts: &'a PromptSet, timeout: Duration) -> Self {
        Self {
            model,
            prompts,
            timeout,
        }
    }

    /// One call for `conftest.py`, then one call per `## ` section
    pub async fn generate(&self, testcases: &str) -> Result<ArtifactSet> {
        let mut artifacts = ArtifactSet::new();

        let conftest = self.call(CONFTEST_REQUEST).await?;
        artifacts.insert(CONFTEST, with_trailing_newline(conftest));

        let sections = split_sections(testcases);
        for (i, section) in sections.iter().enumerate() {
            let header = section.lines().next().unwrap_or_default();
            log::info!("Generating test code {}/{}: {}", i + 1, sections.len(), header);

            let user = format!("Generate pytest code for these test cases:\n\n{}\n", section);
            let code = self.call(&user).await?;
            let name = unique_name(&artifacts, &test_filename(&code));
            artifacts.insert(name, with_trailing_newline(code));
        }
        Ok(artifacts)
    }

    async fn call(&self, user: &str) -> Result<String> {
        let system = self.prompts.get(PromptKind::Code);
        let response = call_with_timeout(self.model, self.timeout, system, user).await?;
        Ok(extract_code_block(&response, BlockLang::Python))
    }
}

/// Declared `test_*.py` name, else the default
fn test_filename(code: &str) -> String {
    extract_filename(code, BlockLang::Python)
        .filter(|name| name.starts_with("test_"))
        .unwrap_or_else(|| DEFAULT_TEST_FILE.to_string())
}

fn unique_name(artifacts: &ArtifactSet, name: &str) -> String {
    if !artifacts.contains(name) {
        return name.to_string();
    }
    let stem = name.trim_end_matches(".py");
    (2..)
        .map(|n| format!("{}_{}.py", stem, n))
        .find(|candidate| !artifacts.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}
