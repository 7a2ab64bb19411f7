//! Test-case document generation.

use std::time::Duration;

use crate::endpoint::ApiEndpoint;
use crate::error::Result;
use crate::llm::{call_with_timeout, LanguageModel};
use crate::prompts::{PromptKind, PromptSet};
use crate::skills::{load_skill_content, select_skills, Depth, SKILL_SEPARATOR};

/// Writes one Markdown section of test cases per endpoint
pub struct TestCaseGenerator<'a> {
    model: &'a dyn LanguageModel,
    prompts: &'a PromptSet,
    timeout: Duration,
}

impl<'a> TestCaseGenerator<'a> {
    pub fn new(model: &'a dyn LanguageModel, prompts: &'a PromptSet, timeout: Duration) -> Self {
        Self {
            model,
            prompts,
            timeout,
        }
    }

    /// One model call per endpoint, in input order; sections joined by a
    /// blank line.
    pub async fn generate(&self, endpoints: &[ApiEndpoint], depth: Depth) -> Result<String> {
        let mut sections = Vec::with_capacity(endpoints.len());
        for (i, endpoint) in endpoints.iter().enumerate() {
            log::info!(
                "Generating test cases {}/{}: {}",
                i + 1,
                endpoints.len(),
                endpoint.signature()
            );
            sections.push(self.generate_one(endpoint, depth).await?);
        }
        Ok(sections.join("\n\n"))
    }

    pub async fn generate_one(&self, endpoint: &ApiEndpoint, depth: Depth) -> Result<String> {
        let skills = load_skill_content(&select_skills(endpoint, depth));
        let system = format!(
            "{}{}{}",
            skills,
            SKILL_SEPARATOR,
            self.prompts.get(PromptKind::TestCase)
        );
        let user = format!(
            "Depth: {}\n\n```json\n{}\n```\n",
            depth,
            serde_json::to_string_pretty(endpoint)?
        );

        let response = call_with_timeout(self.model, self.timeout, &system, &user).await?;
        Ok(response.trim().to_string())
    }
}
