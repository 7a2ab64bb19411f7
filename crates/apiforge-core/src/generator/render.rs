//! Deterministic rendering of the files that need no model call.

use serde::Serialize;
use tera::{Context, Tera};

use crate::artifacts::ArtifactSet;
use crate::config::ProjectConfig;
use crate::error::{Error, Result};
use crate::utils::{api_class_name, python_identifier};

pub const CONFIG_PATH: &str = "base/config.py";
pub const CLIENT_PATH: &str = "base/client.py";
pub const REQUIREMENTS_PATH: &str = "requirements.txt";
pub const CI_WORKFLOW_PATH: &str = ".github/workflows/api-tests.yml";
pub const CONFTEST_PATH: &str = "tests/conftest.py";

/// Directories that hold importable Python packages
pub const PACKAGE_DIRS: &[&str] = &["base", "api", "services", "tests"];

const TEMPLATES: &[(&str, &str)] = &[
    ("config.py", include_str!("../../templates/project/config.py.tera")),
    ("client.py", include_str!("../../templates/project/client.py.tera")),
    (
        "requirements.txt",
        include_str!("../../templates/project/requirements.txt.tera"),
    ),
    ("conftest.py", include_str!("../../templates/project/conftest.py.tera")),
    ("api-tests.yml", include_str!("../../templates/project/api-tests.yml.tera")),
];

/// One tag's entry in the fixture aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagFixture {
    /// Fixture name, e.g. `users_api`
    pub fixture: String,
    /// Module below `api/` that defines the wrapper, e.g. `users_api`
    pub module: String,
    /// Wrapper class, e.g. `UsersApi`
    pub class_name: String,
}

impl TagFixture {
    /// Fixture for a tag whose API layer lives in `api/{module}.py`
    pub fn new(tag: &str, module: impl Into<String>) -> Self {
        Self {
            fixture: format!("{}_api", python_identifier(tag)),
            module: module.into(),
            class_name: api_class_name(tag),
        }
    }
}

#[derive(Serialize)]
struct Environments {
    dev: String,
    staging: String,
    prod: String,
}

/// Renders the static part of a generated project
#[derive(Debug)]
pub struct ProjectRenderer {
    tera: Tera,
    project: ProjectConfig,
}

impl ProjectRenderer {
    pub fn new(project: ProjectConfig) -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_templates(TEMPLATES.to_vec())?;
        Ok(Self { tera, project })
    }

    /// Every artifact that is known before any model call, conftest excluded
    pub fn render_static(&self) -> Result<ArtifactSet> {
        let mut artifacts = ArtifactSet::new();
        artifacts.insert(CONFIG_PATH, self.render_config()?);
        artifacts.insert(CLIENT_PATH, self.render_client()?);
        artifacts.insert(REQUIREMENTS_PATH, self.render_requirements()?);
        artifacts.insert(CI_WORKFLOW_PATH, self.render_ci()?);
        for dir in PACKAGE_DIRS {
            artifacts.insert(format!("{}/__init__.py", dir), "");
        }
        Ok(artifacts)
    }

    pub fn render_config(&self) -> Result<String> {
        let mut context = Context::new();
        context.insert("base_url", trim_url(&self.project.base_url));
        self.render("config.py", &context)
    }

    pub fn render_client(&self) -> Result<String> {
        self.render("client.py", &Context::new())
    }

    pub fn render_requirements(&self) -> Result<String> {
        self.render("requirements.txt", &Context::new())
    }

    pub fn render_ci(&self) -> Result<String> {
        let envs = &self.project.environments;
        let environments = Environments {
            dev: trim_url(&envs.dev).to_string(),
            staging: trim_url(&envs.staging).to_string(),
            prod: trim_url(&envs.prod).to_string(),
        };
        let mut context = Context::new();
        context.insert("environments", &environments);
        self.render("api-tests.yml", &context)
    }

    /// The fixture aggregator; needs every tag, so it is rendered last
    pub fn render_conftest(&self, tags: &[TagFixture]) -> Result<String> {
        let mut context = Context::new();
        context.insert("tags", tags);
        self.render("conftest.py", &context)
    }

    fn render(&self, name: &str, context: &Context) -> Result<String> {
        self.tera.render(name, context).map_err(|e| {
            log::error!("Template rendering failed for '{}': {:?}", name, e);
            Error::template(format!("Failed to render template '{}': {}", name, e))
        })
    }
}

fn trim_url(url: &url::Url) -> &str {
    url.as_str().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> ProjectRenderer {
        ProjectRenderer::new(ProjectConfig::default()).unwrap()
    }

    #[test]
    fn test_static_render_is_deterministic() -> Result<()> {
        let first = renderer().render_static()?;
        let second = renderer().render_static()?;
        assert_eq!(first, second);

        for path in [CONFIG_PATH, CLIENT_PATH, REQUIREMENTS_PATH, CI_WORKFLOW_PATH] {
            assert!(first.contains(path), "{}", path);
        }
        assert_eq!(first.get("api/__init__.py"), Some(""));
        assert!(!first.contains(CONFTEST_PATH));
        Ok(())
    }

    #[test]
    fn test_config_uses_project_base_url() -> Result<()> {
        let config = renderer().render_config()?;
        assert!(config.contains(r#"os.getenv("API_BASE_URL", "http://localhost:8080")"#));
        assert!(config.contains("API_TOKEN"));
        Ok(())
    }

    #[test]
    fn test_client_exposes_all_methods() -> Result<()> {
        let client = renderer().render_client()?;
        for method in ["get", "post", "put", "delete", "patch"] {
            assert!(client.contains(&format!("def {}(self, path", method)), "{}", method);
        }
        assert!(client.contains("Bearer {token}"));
        Ok(())
    }

    #[test]
    fn test_requirements_pin_minimum_versions() -> Result<()> {
        let requirements = renderer().render_requirements()?;
        let names: Vec<&str> = requirements
            .lines()
            .filter_map(|l| l.split(">=").next())
            .collect();
        assert_eq!(names, vec!["requests", "pytest", "pyyaml"]);
        Ok(())
    }

    #[test]
    fn test_ci_workflow_maps_environments() -> Result<()> {
        let ci = renderer().render_ci()?;
        assert!(ci.contains("API_BASE_URL=https://staging-api.example.com\""));
        assert!(ci.contains("API_BASE_URL=https://api.example.com\""));
        assert!(ci.contains("${{ secrets.API_TOKEN }}"));

        let parsed: serde_yaml::Value = serde_yaml::from_str(&ci)?;
        assert!(parsed.get("jobs").is_some());
        Ok(())
    }

    #[test]
    fn test_conftest_imports_one_class_per_tag() -> Result<()> {
        let tags = vec![
            TagFixture::new("pet_store", "pet_store_api"),
            TagFixture::new("users", "users_api"),
        ];
        let conftest = renderer().render_conftest(&tags)?;

        assert!(conftest.contains("from api.users_api import UsersApi\n"));
        assert!(conftest.contains("from api.pet_store_api import PetStoreApi\n"));
        assert!(conftest.contains("def users_api(client):\n    return UsersApi(client)\n"));
        assert!(conftest.contains("def pet_store_api(client):"));
        assert!(conftest.ends_with("return UsersApi(client)\n"));
        Ok(())
    }

    #[test]
    fn test_conftest_without_tags() -> Result<()> {
        let conftest = renderer().render_conftest(&[])?;
        assert!(conftest.contains("def client():"));
        assert!(!conftest.contains("from api."));
        Ok(())
    }
}
