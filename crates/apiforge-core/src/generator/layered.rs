//! End-to-end layered project generation.
//!
//! For every tag group (sorted by key) the four layers are generated in the
//! order API, Data, Services, Tests, so one tag costs exactly four model
//! calls. The static files, the per-tag layers and finally the fixture
//! aggregator are merged into one [`ArtifactSet`], which is then run through
//! the [`RepairLoop`] once.

use std::time::Duration;

use crate::artifacts::{ArtifactSet, ValidationReport};
use crate::config::{Config, ProjectConfig, DEFAULT_MAX_REPAIR_ROUNDS};
use crate::endpoint::ApiEndpoint;
use crate::error::Result;
use crate::generator::grouping::group_by_tag;
use crate::generator::layers::{GeneratedFile, Layer, LayerGenerator, TagNames};
use crate::generator::render::{ProjectRenderer, TagFixture, CONFTEST_PATH};
use crate::generator::repair::{RepairLoop, RepairStatus};
use crate::generator::sections::extract_sections;
use crate::generator::validator::ArtifactValidator;
use crate::llm::LanguageModel;
use crate::prompts::PromptSet;

/// Everything the pipeline needs besides the model and the validator
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_repair_rounds: usize,
    pub model_timeout: Duration,
    pub prompts: PromptSet,
    pub project: ProjectConfig,
}

impl PipelineOptions {
    pub fn from_config(config: &Config, prompts: PromptSet) -> Self {
        Self {
            max_repair_rounds: config.generation.max_repair_rounds,
            model_timeout: config.model.timeout(),
            prompts,
            project: config.project.clone(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_repair_rounds: DEFAULT_MAX_REPAIR_ROUNDS,
            model_timeout: Config::default().model.timeout(),
            prompts: PromptSet::embedded(),
            project: ProjectConfig::default(),
        }
    }
}

/// Result of a layered generation run
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Best-effort artifacts, including files that still fail validation
    pub artifacts: ArtifactSet,
    /// Diagnostics left after the last repair round
    pub report: ValidationReport,
    pub status: RepairStatus,
    pub repair_rounds: usize,
    /// Normalized tags, in generation order
    pub tags: Vec<String>,
}

impl GenerationResult {
    pub fn is_clean(&self) -> bool {
        self.status == RepairStatus::Done
    }
}

/// Generates, validates and repairs a layered pytest project
pub struct LayeredGenerator<'a> {
    model: &'a dyn LanguageModel,
    validator: &'a dyn ArtifactValidator,
    options: PipelineOptions,
    renderer: ProjectRenderer,
}

impl<'a> LayeredGenerator<'a> {
    pub fn new(
        model: &'a dyn LanguageModel,
        validator: &'a dyn ArtifactValidator,
        options: PipelineOptions,
    ) -> Result<Self> {
        let renderer = ProjectRenderer::new(options.project.clone())?;
        Ok(Self {
            model,
            validator,
            options,
            renderer,
        })
    }

    /// Run the whole pipeline for `endpoints`, using `testcases` (a test-case
    /// document, possibly empty) as context for the data and test layers.
    pub async fn generate(
        &self,
        endpoints: &[ApiEndpoint],
        testcases: &str,
    ) -> Result<GenerationResult> {
        let groups = group_by_tag(endpoints);
        log::info!(
            "Generating layered project for {} endpoint(s) in {} tag group(s)",
            endpoints.len(),
            groups.len()
        );

        let mut artifacts = self.renderer.render_static()?;
        let mut fixtures = Vec::with_capacity(groups.len());
        let tag_names = TagNames::unique(groups.keys().map(String::as_str));

        for (names, group) in tag_names.iter().zip(groups.values()) {
            let files = self.generate_tag(names, group, testcases, &artifacts).await?;
            for file in files {
                if file.layer == Layer::Api {
                    fixtures.push(TagFixture::new(&names.ident, file.stem()));
                }
                artifacts.insert(file.path(), file.content);
            }
        }

        artifacts.insert(CONFTEST_PATH, self.renderer.render_conftest(&fixtures)?);

        let outcome = RepairLoop::new(
            self.model,
            self.validator,
            &self.options.prompts,
            self.options.model_timeout,
            self.options.max_repair_rounds,
        )
        .run(artifacts)
        .await?;

        if !outcome.is_clean() {
            log::warn!(
                "{} artifact(s) still fail validation after {} repair round(s)",
                outcome.report.len(),
                outcome.rounds
            );
        }

        Ok(GenerationResult {
            artifacts: outcome.artifacts,
            report: outcome.report,
            status: outcome.status,
            repair_rounds: outcome.rounds,
            tags: groups.into_keys().collect(),
        })
    }

    /// The four layers of one tag, in call order.
    ///
    /// File names already taken in `existing`, or reserved for the fixture
    /// aggregator, fall back to the layer default and then to a numbered
    /// variant, so no generated file replaces another.
    pub async fn generate_tag(
        &self,
        names: &TagNames,
        endpoints: &[&ApiEndpoint],
        testcases: &str,
        existing: &ArtifactSet,
    ) -> Result<Vec<GeneratedFile>> {
        let layers = LayerGenerator::new(
            self.model,
            &self.options.prompts,
            self.options.model_timeout,
        );
        let sections = extract_sections(testcases, endpoints.iter().copied());
        if sections.is_empty() && !testcases.trim().is_empty() {
            log::debug!("No test-case sections match tag '{}'", names.tag);
        }

        let mut taken: Vec<String> = Vec::with_capacity(4);
        let mut claim = |mut file: GeneratedFile| {
            file.filename = unique_filename(&file, &names.ident, |path| {
                path == CONFTEST_PATH
                    || existing.contains(path)
                    || taken.iter().any(|t| t == path)
            });
            taken.push(file.path());
            file
        };

        let api = claim(layers.generate_api(names, endpoints).await?);
        let data = claim(layers.generate_data(names, endpoints, &sections).await?);
        let services = claim(
            layers
                .generate_services(names, endpoints, &api.content)
                .await?,
        );
        let tests = claim(
            layers
                .generate_tests(names, endpoints, &sections, &api.content, &data)
                .await?,
        );

        Ok(vec![api, data, services, tests])
    }
}

fn unique_filename(file: &GeneratedFile, ident: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let path_of = |name: &str| format!("{}/{}", file.layer.dir(), name);
    if !is_taken(&path_of(&file.filename)) {
        return file.filename.clone();
    }

    let default = file.layer.default_filename(ident);
    let candidate = if is_taken(&path_of(&default)) {
        let (stem, ext) = default.rsplit_once('.').unwrap_or((default.as_str(), ""));
        (2..)
            .map(|n| format!("{}_{}.{}", stem, n, ext))
            .find(|name| !is_taken(&path_of(name)))
            .unwrap_or(default.clone())
    } else {
        default
    };
    log::warn!(
        "{} layer for '{}' declared {} which is already taken, using {}",
        file.layer,
        ident,
        file.filename,
        candidate
    );
    candidate
}
