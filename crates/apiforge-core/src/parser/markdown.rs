//! Free-form Markdown API descriptions, turned into endpoints by the model.

use std::time::Duration;

use crate::endpoint::ApiEndpoint;
use crate::error::{Error, Result};
use crate::generator::extract::{extract_code_block, BlockLang};
use crate::llm::{call_with_timeout, LanguageModel};
use crate::prompts::{PromptKind, PromptSet};

/// Ask the model for a JSON array of endpoints describing `content`
pub async fn parse_markdown(
    model: &dyn LanguageModel,
    prompts: &PromptSet,
    timeout: Duration,
    content: &str,
) -> Result<Vec<ApiEndpoint>> {
    let system = prompts.get(PromptKind::MarkdownParser);
    let user = format!("Extract the API endpoints from this document:\n\n{}\n", content.trim());
    let response = call_with_timeout(model, timeout, system, &user).await?;

    let json = extract_code_block(&response, BlockLang::Json);
    let endpoints: Vec<ApiEndpoint> = serde_json::from_str(&json).map_err(|e| {
        Error::document(format!("Model returned unusable endpoint JSON: {}", e))
    })?;
    log::debug!("Model extracted {} endpoint(s) from Markdown", endpoints.len());
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::HttpMethod;
    use crate::llm::ScriptedModel;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_fenced_json_answer() -> Result<()> {
        let model = ScriptedModel::new([r#"Here you go:
```json
[
  {"method": "GET", "path": "/api/users", "tags": ["users"]},
  {"method": "post", "path": "/api/users", "auth_required": true}
]
```"#]);
        let prompts = PromptSet::embedded();

        let endpoints = parse_markdown(&model, &prompts, TIMEOUT, "# Users API\n").await?;
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].tags, vec!["users"]);
        assert_eq!(endpoints[1].method, HttpMethod::Post);
        assert!(endpoints[1].auth_required);

        let calls = model.calls();
        assert_eq!(calls[0].system, prompts.get(PromptKind::MarkdownParser));
        assert!(calls[0].user.contains("# Users API"));
        Ok(())
    }

    #[tokio::test]
    async fn test_bare_json_answer() -> Result<()> {
        let model = ScriptedModel::new([r#"[{"method": "DELETE", "path": "/x/{id}"}]"#]);
        let endpoints =
            parse_markdown(&model, &PromptSet::embedded(), TIMEOUT, "DELETE /x/{id}").await?;
        assert_eq!(endpoints[0].signature(), "DELETE /x/{id}");
        Ok(())
    }

    #[tokio::test]
    async fn test_unusable_answer_is_document_error() {
        let model = ScriptedModel::new(["I could not find any endpoints."]);
        let result = parse_markdown(&model, &PromptSet::embedded(), TIMEOUT, "text").await;
        assert!(matches!(result, Err(Error::Document(_))));
    }
}
