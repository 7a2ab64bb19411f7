//! Best-effort recovery of code and file names from free-form model output.
//!
//! Model answers are untrusted text. The decoding rules are:
//!
//! - **Code block**: the first fenced block tagged with the requested
//!   language (aliases such as `py`/`python` or `yml`/`yaml` count); failing
//!   that, the first fenced block with any tag; failing that, the whole answer
//!   with a stray unterminated opening fence removed. The result is trimmed.
//! - **File name**: the first line of the extracted block must be a `#`
//!   comment naming a file with the block language's extension. Directories
//!   in the declared name are dropped. No match means `None`; the caller then
//!   applies its own default.
//!
//! Neither function ever fails.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::artifacts::ArtifactKind;

static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+.-]*)[^\n]*\n(.*?)```").expect("valid fence regex")
});

static PY_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z0-9_./-]+\.py)\b").expect("valid python name regex"));

static YAML_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z0-9_./-]+\.ya?ml)\b").expect("valid yaml name regex"));

static JSON_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z0-9_./-]+\.json)\b").expect("valid json name regex"));

/// Language of a fenced block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLang {
    Python,
    Yaml,
    Json,
}

impl BlockLang {
    /// Fence tag written in prompts
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }

    fn matches(&self, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        match self {
            Self::Python => tag == "python" || tag == "py" || tag == "python3",
            Self::Yaml => tag == "yaml" || tag == "yml",
            Self::Json => tag == "json",
        }
    }

    fn name_re(&self) -> &'static Regex {
        match self {
            Self::Python => &PY_NAME_RE,
            Self::Yaml => &YAML_NAME_RE,
            Self::Json => &JSON_NAME_RE,
        }
    }

    /// Block language for an artifact path: YAML for data files, else Python
    pub fn for_path(path: &str) -> Self {
        match ArtifactKind::of(path) {
            ArtifactKind::Data => Self::Yaml,
            _ => Self::Python,
        }
    }
}

/// Pull one code block of the given language out of a model answer
pub fn extract_code_block(response: &str, lang: BlockLang) -> String {
    let blocks: Vec<(&str, &str)> = FENCE_RE
        .captures_iter(response)
        .filter_map(|caps| {
            let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            caps.get(2).map(|body| (tag, body.as_str()))
        })
        .collect();

    if let Some((_, body)) = blocks.iter().find(|(tag, _)| lang.matches(tag)) {
        return body.trim().to_string();
    }

    if let Some((tag, body)) = blocks.first() {
        log::debug!(
            "No ```{} block in model answer, using first block tagged '{}'",
            lang.tag(),
            tag
        );
        return body.trim().to_string();
    }

    strip_unterminated_fence(response.trim()).to_string()
}

/// File name declared by a first-line comment, if any
pub fn extract_filename(code: &str, lang: BlockLang) -> Option<String> {
    let first_line = code.lines().next()?.trim();
    let comment = first_line.strip_prefix('#')?;

    let declared = lang.name_re().captures(comment)?.get(1)?.as_str();
    let name = declared.rsplit('/').next().unwrap_or(declared);
    if name.starts_with('.') || name.len() <= ".py".len() {
        return None;
    }
    Some(name.to_string())
}

fn strip_unterminated_fence(text: &str) -> &str {
    if text.starts_with("```") {
        match text.split_once('\n') {
            Some((_, rest)) => rest.trim(),
            None => "",
        }
    } else {
        text
    }
}
