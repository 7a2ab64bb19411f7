//! Model-backed code generation.
//!
//! - [`testcase`]: endpoints to a Markdown test-case document
//! - [`code`]: test-case document to a flat pytest project
//! - [`layered`]: endpoints plus test cases to a layered pytest project,
//!   validated and repaired

pub mod code;
pub mod extract;
pub mod grouping;
pub mod layered;
pub mod layers;
pub mod render;
pub mod repair;
pub mod sections;
pub mod testcase;
pub mod validator;

pub use code::CodeGenerator;
pub use extract::{extract_code_block, extract_filename, BlockLang};
pub use grouping::{group_by_tag, normalize_tag, TagGroups, DEFAULT_TAG};
pub use layered::{GenerationResult, LayeredGenerator, PipelineOptions};
pub use layers::{GeneratedFile, Layer, LayerGenerator, TagNames};
pub use render::ProjectRenderer;
pub use repair::{RepairLoop, RepairOutcome, RepairState, RepairStatus};
pub use sections::{extract_sections, split_sections};
pub use testcase::TestCaseGenerator;
pub use validator::{
    validate_files, ArtifactValidator, DiscoveryCheck, PythonCompileCheck, Validator,
};
