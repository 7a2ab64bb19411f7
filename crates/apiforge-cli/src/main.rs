//! apiforge CLI entrypoint
//! Parses command-line arguments and dispatches to the core generators.

// Internal imports (std, crate)
use std::path::{Path, PathBuf};

// External imports (alphabetized)
use anyhow::{Context, Result};
use apiforge_core::artifacts::{ArtifactSet, ValidationReport};
use apiforge_core::generator::{CodeGenerator, TestCaseGenerator};
use apiforge_core::prompts::PromptSet;
use apiforge_core::{
    ApiEndpoint, ChatModel, Config, Depth, DocFormat, DocumentParser, LayeredGenerator,
    PipelineOptions, Validator,
};
use clap::Parser;
use tokio::fs;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "apiforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (YAML, or TOML by extension)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Repair rounds allowed after the first validation pass
    #[arg(long, global = true)]
    max_repair_rounds: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Generate a Markdown test-case document from API documentation
    GenCases {
        /// Path or URL of the API document
        doc: String,
        /// Output Markdown file
        #[arg(short, long, default_value = "testcases.md")]
        output: PathBuf,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Generate pytest code from a test-case document
    GenCode {
        /// Test-case Markdown file
        cases: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = "generated")]
        output: PathBuf,
        /// Generate the layered project (needs --doc)
        #[arg(long, requires = "doc")]
        layered: bool,
        /// API document the test cases were written for
        #[arg(long)]
        doc: Option<String>,
        /// Input format of --doc
        #[arg(long, default_value = "auto")]
        format: DocFormat,
        /// Model name, overriding the configuration
        #[arg(long)]
        model: Option<String>,
    },
    /// Generate test cases and pytest code in one go
    Run {
        /// Path or URL of the API document
        doc: String,
        /// Output directory
        #[arg(short, long, default_value = "generated")]
        output: PathBuf,
        #[command(flatten)]
        source: SourceArgs,
        /// Generate the layered project instead of flat test modules
        #[arg(long)]
        layered: bool,
    },
}

#[derive(clap::Args, Debug)]
struct SourceArgs {
    /// Test-case depth (quick or full)
    #[arg(long)]
    depth: Option<Depth>,
    /// Input format (auto, swagger, postman or markdown)
    #[arg(long, default_value = "auto")]
    format: DocFormat,
    /// Model name, overriding the configuration
    #[arg(long)]
    model: Option<String>,
}

/// Everything a command needs once configuration is resolved
struct Session {
    config: Config,
    prompts: PromptSet,
    model: ChatModel,
}

impl Session {
    async fn new(cli: &Cli, model_name: Option<&str>) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Config::from_file(path)
                .await
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(rounds) = cli.max_repair_rounds {
            config.generation.max_repair_rounds = rounds;
        }
        if let Some(name) = model_name {
            config.model.name = name.to_string();
        }

        let prompts = PromptSet::load(config.generation.prompt_dir.as_deref())
            .await
            .context("Failed to load prompts")?;
        let model = ChatModel::from_config(&config.model)
            .context("Failed to set up the language model client")?;
        tracing::debug!("Using model {}", model.model());

        Ok(Self {
            config,
            prompts,
            model,
        })
    }

    fn depth(&self, depth: Option<Depth>) -> Depth {
        depth.unwrap_or(self.config.generation.depth)
    }

    async fn parse(&self, doc: &str, format: DocFormat) -> Result<Vec<ApiEndpoint>> {
        let timeout = self.config.model.timeout();
        let parser = DocumentParser::new(Some(&self.model), &self.prompts, timeout);
        let endpoints = parser
            .load(doc, format)
            .await
            .with_context(|| format!("Failed to parse API document {}", doc))?;
        println!("Parsed {} endpoint(s) from {}", endpoints.len(), doc);
        Ok(endpoints)
    }

    async fn testcases(&self, endpoints: &[ApiEndpoint], depth: Depth) -> Result<String> {
        let generator =
            TestCaseGenerator::new(&self.model, &self.prompts, self.config.model.timeout());
        generator
            .generate(endpoints, depth)
            .await
            .context("Failed to generate test cases")
    }

    async fn flat(&self, testcases: &str, output: &Path) -> Result<()> {
        let generator = CodeGenerator::new(&self.model, &self.prompts, self.config.model.timeout());
        let artifacts = generator
            .generate(testcases)
            .await
            .context("Failed to generate test code")?;
        write_artifacts(&artifacts, output).await
    }

    async fn layered(
        &self,
        endpoints: &[ApiEndpoint],
        testcases: &str,
        output: &Path,
    ) -> Result<()> {
        let validator = Validator::from_config(&self.config.validation);
        let options = PipelineOptions::from_config(&self.config, self.prompts.clone());
        let generator = LayeredGenerator::new(&self.model, &validator, options)
            .context("Failed to prepare the layered generator")?;

        let result = generator
            .generate(endpoints, testcases)
            .await
            .context("Layered generation failed")?;
        write_artifacts(&result.artifacts, output).await?;

        println!(
            "Tags: {} | repair rounds: {}",
            result.tags.join(", "),
            result.repair_rounds
        );
        if !result.is_clean() {
            print_report(&result.report);
        }
        Ok(())
    }
}

async fn write_artifacts(artifacts: &ArtifactSet, output: &Path) -> Result<()> {
    let written = artifacts
        .write_to(output)
        .await
        .with_context(|| format!("Failed to write project to {}", output.display()))?;
    println!("Wrote {} file(s) to {}", written.len(), output.display());
    Ok(())
}

fn print_report(report: &ValidationReport) {
    println!("{} artifact(s) still fail validation:", report.len());
    for (path, diagnostic) in report.iter() {
        println!("--- {}", path);
        println!("{}", diagnostic.trim_end());
    }
}

async fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::GenCases {
            doc,
            output,
            source,
        } => {
            let session = Session::new(&cli, source.model.as_deref()).await?;
            let endpoints = session.parse(doc, source.format).await?;
            let testcases = session
                .testcases(&endpoints, session.depth(source.depth))
                .await?;
            write_text(output, &testcases).await?;
            println!("Wrote test cases to {}", output.display());
        }
        Commands::GenCode {
            cases,
            output,
            layered,
            doc,
            format,
            model,
        } => {
            let session = Session::new(&cli, model.as_deref()).await?;
            let testcases = fs::read_to_string(cases)
                .await
                .with_context(|| format!("Failed to read test cases {}", cases.display()))?;

            match doc.as_deref().filter(|_| *layered) {
                Some(doc) => {
                    let endpoints = session.parse(doc, *format).await?;
                    session.layered(&endpoints, &testcases, output).await?;
                }
                None => session.flat(&testcases, output).await?,
            }
        }
        Commands::Run {
            doc,
            output,
            source,
            layered,
        } => {
            let session = Session::new(&cli, source.model.as_deref()).await?;
            let endpoints = session.parse(doc, source.format).await?;
            let testcases = session
                .testcases(&endpoints, session.depth(source.depth))
                .await?;
            write_text(&output.join("testcases.md"), &testcases).await?;

            if *layered {
                session.layered(&endpoints, &testcases, output).await?;
            } else {
                session.flat(&testcases, output).await?;
            }
        }
    }
    Ok(())
}
