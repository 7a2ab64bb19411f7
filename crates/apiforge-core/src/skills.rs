//! Test-design guidance snippets prepended to test-case prompts.
//!
//! Which snippets are used depends on the endpoint's shape (parameters,
//! pagination, uploads) and on the requested [`Depth`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::endpoint::ApiEndpoint;

/// Separator placed between concatenated skill snippets
pub const SKILL_SEPARATOR: &str = "\n\n---\n\n";

const PAGINATION_PARAM_NAMES: &[&str] = &[
    "page",
    "size",
    "limit",
    "offset",
    "page_size",
    "per_page",
    "pagesize",
];

/// How thorough the generated test cases should be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    #[default]
    Quick,
    Full,
}

impl Depth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Full => "full",
        }
    }
}

impl FromStr for Depth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "full" => Ok(Self::Full),
            _ => Err(format!("Unknown depth: {} (expected quick or full)", s)),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A guidance snippet shipped with the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Skill {
    Base,
    ParamValidation,
    Pagination,
    FileUpload,
    AuthTesting,
    Idempotency,
}

impl Skill {
    /// File name of the snippet
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Base => "base.md",
            Self::ParamValidation => "param-validation.md",
            Self::Pagination => "pagination.md",
            Self::FileUpload => "file-upload.md",
            Self::AuthTesting => "auth-testing.md",
            Self::Idempotency => "idempotency.md",
        }
    }

    /// Snippet text
    pub fn content(&self) -> &'static str {
        match self {
            Self::Base => include_str!("../templates/skills/base.md"),
            Self::ParamValidation => include_str!("../templates/skills/param-validation.md"),
            Self::Pagination => include_str!("../templates/skills/pagination.md"),
            Self::FileUpload => include_str!("../templates/skills/file-upload.md"),
            Self::AuthTesting => include_str!("../templates/skills/auth-testing.md"),
            Self::Idempotency => include_str!("../templates/skills/idempotency.md"),
        }
    }
}

/// Select the skills relevant to an endpoint, `Base` first.
pub fn select_skills(endpoint: &ApiEndpoint, depth: Depth) -> Vec<Skill> {
    let mut skills = vec![Skill::Base];

    if !endpoint.parameters.is_empty() {
        skills.push(Skill::ParamValidation);
    }

    if has_pagination_params(endpoint) {
        skills.push(Skill::Pagination);
    }

    if endpoint.content_type == "multipart/form-data" {
        skills.push(Skill::FileUpload);
    }

    if depth == Depth::Full {
        for skill in [Skill::AuthTesting, Skill::Idempotency] {
            if !skills.contains(&skill) {
                skills.push(skill);
            }
        }
    }

    skills
}

/// Concatenate the content of the given skills
pub fn load_skill_content(skills: &[Skill]) -> String {
    skills
        .iter()
        .map(|s| s.content().trim_end())
        .collect::<Vec<_>>()
        .join(SKILL_SEPARATOR)
}

fn has_pagination_params(endpoint: &ApiEndpoint) -> bool {
    endpoint
        .parameters
        .iter()
        .any(|p| PAGINATION_PARAM_NAMES.contains(&p.name.to_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{HttpMethod, Param, ParamLocation};

    fn endpoint() -> ApiEndpoint {
        ApiEndpoint::new(HttpMethod::Get, "/api/test")
    }

    #[test]
    fn test_always_includes_base() {
        assert_eq!(select_skills(&endpoint(), Depth::Quick), vec![Skill::Base]);
    }

    #[test]
    fn test_params_include_param_validation() {
        let mut ep = endpoint();
        ep.parameters.push(Param::new("q", ParamLocation::Query));
        assert!(select_skills(&ep, Depth::Quick).contains(&Skill::ParamValidation));
    }

    #[test]
    fn test_full_adds_auth_and_idempotency() {
        let skills = select_skills(&endpoint(), Depth::Full);
        assert!(skills.contains(&Skill::AuthTesting));
        assert!(skills.contains(&Skill::Idempotency));
        assert!(!select_skills(&endpoint(), Depth::Quick).contains(&Skill::AuthTesting));
    }

    #[test]
    fn test_pagination_detected_case_insensitive() {
        let mut ep = endpoint();
        ep.parameters.push(Param::new("Page", ParamLocation::Query));
        ep.parameters.push(Param::new("size", ParamLocation::Query));
        let skills = select_skills(&ep, Depth::Quick);
        assert_eq!(
            skills,
            vec![Skill::Base, Skill::ParamValidation, Skill::Pagination]
        );
    }

    #[test]
    fn test_file_upload_detected() {
        let mut ep = endpoint();
        ep.content_type = "multipart/form-data".to_string();
        assert!(select_skills(&ep, Depth::Quick).contains(&Skill::FileUpload));
    }

    #[test]
    fn test_load_skill_content_joins_with_separator() {
        let content = load_skill_content(&[Skill::Base, Skill::Pagination]);
        assert!(content.contains("test"));
        assert!(content.contains(SKILL_SEPARATOR));
        assert!(load_skill_content(&[]).is_empty());
    }

    #[test]
    fn test_depth_parse() {
        assert_eq!("FULL".parse::<Depth>().unwrap(), Depth::Full);
        assert!("deep".parse::<Depth>().is_err());
        assert_eq!(Depth::Quick.to_string(), "quick");
    }
}
