//! System instructions used for every kind of model call.
//!
//! Defaults are embedded in the binary. A prompt directory may override any of
//! them file-by-file: a file named like [`PromptKind::file_name`] in that
//! directory replaces the embedded text.
//!
//! The override directory is resolved in this order:
//! 1. The directory passed explicitly (from `generation.prompt_dir`)
//! 2. The `APIFORGE_PROMPT_DIR` environment variable
//! 3. `~/.apiforge/prompts` in the user's home directory

// Internal imports (std, crate)
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming a prompt override directory
pub const PROMPT_DIR_ENV: &str = "APIFORGE_PROMPT_DIR";

/// Every instruction the library sends to a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    TestCase,
    Code,
    LayerApi,
    LayerData,
    LayerServices,
    LayerTests,
    Repair,
    MarkdownParser,
}

impl PromptKind {
    /// File name used for overrides
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::TestCase => "testcase.md",
            Self::Code => "code.md",
            Self::LayerApi => "layer_api.md",
            Self::LayerData => "layer_data.md",
            Self::LayerServices => "layer_services.md",
            Self::LayerTests => "layer_tests.md",
            Self::Repair => "repair.md",
            Self::MarkdownParser => "markdown_parser.md",
        }
    }

    fn embedded(&self) -> &'static str {
        match self {
            Self::TestCase => include_str!("../templates/prompts/testcase.md"),
            Self::Code => include_str!("../templates/prompts/code.md"),
            Self::LayerApi => include_str!("../templates/prompts/layer_api.md"),
            Self::LayerData => include_str!("../templates/prompts/layer_data.md"),
            Self::LayerServices => include_str!("../templates/prompts/layer_services.md"),
            Self::LayerTests => include_str!("../templates/prompts/layer_tests.md"),
            Self::Repair => include_str!("../templates/prompts/repair.md"),
            Self::MarkdownParser => include_str!("../templates/prompts/markdown_parser.md"),
        }
    }

    /// Returns an iterator over all prompt kinds
    pub fn all() -> impl Iterator<Item = Self> {
        use PromptKind::*;
        [
            TestCase,
            Code,
            LayerApi,
            LayerData,
            LayerServices,
            LayerTests,
            Repair,
            MarkdownParser,
        ]
        .iter()
        .copied()
    }
}

/// The resolved set of system instructions
#[derive(Debug, Clone, Default)]
pub struct PromptSet {
    overrides: HashMap<PromptKind, String>,
}

impl PromptSet {
    /// Embedded prompts only
    pub fn embedded() -> Self {
        Self::default()
    }

    /// Load overrides from the given directory, or from the first standard
    /// location that exists when `dir` is `None`.
    ///
    /// An explicitly given directory must exist.
    pub async fn load(dir: Option<&Path>) -> Result<Self> {
        let dir = match dir {
            Some(dir) => {
                if !dir.exists() {
                    return Err(Error::config(format!(
                        "Prompt directory not found: {}",
                        dir.display()
                    )));
                }
                Some(dir.to_path_buf())
            }
            None => Self::find_prompt_dir(),
        };

        let Some(dir) = dir else {
            log::debug!("Using embedded prompts");
            return Ok(Self::embedded());
        };

        let mut overrides = HashMap::new();
        for kind in PromptKind::all() {
            let path = dir.join(kind.file_name());
            if path.is_file() {
                log::debug!("Prompt override: {}", path.display());
                let content = tokio::fs::read_to_string(&path).await?;
                overrides.insert(kind, content);
            }
        }
        Ok(Self { overrides })
    }

    /// Replace one prompt in memory
    pub fn with_override(mut self, kind: PromptKind, content: impl Into<String>) -> Self {
        self.overrides.insert(kind, content.into());
        self
    }

    /// Text of the given prompt
    pub fn get(&self, kind: PromptKind) -> &str {
        self.overrides
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.embedded())
    }

    fn find_prompt_dir() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var(PROMPT_DIR_ENV) {
            let path = PathBuf::from(dir);
            if path.exists() {
                return Some(path);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let prompts_dir = home_dir.join(".apiforge").join("prompts");
            if prompts_dir.exists() {
                return Some(prompts_dir);
            }
        }

        None
    }
}
