//! Apiforge Core Library
//!
//! This library turns API documentation (OpenAPI/Swagger, Postman or
//! Markdown) into test cases and layered pytest automation projects, using a
//! language model for the creative parts and validating everything it
//! generates before handing it back.

pub mod artifacts;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod generator;
pub mod llm;
pub mod parser;
pub mod prompts;
pub mod skills;
pub mod utils;

pub use crate::{
    artifacts::{ArtifactSet, ValidationReport},
    config::Config,
    endpoint::{ApiEndpoint, HttpMethod, Param, ParamLocation},
    error::{Error, Result},
    generator::{GenerationResult, LayeredGenerator, PipelineOptions, Validator},
    llm::{ChatModel, LanguageModel, ScriptedModel},
    parser::{DocFormat, DocumentParser},
    skills::Depth,
};
