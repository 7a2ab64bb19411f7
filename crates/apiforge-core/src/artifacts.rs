//! Generated artifacts and validation reports.
//!
//! An [`ArtifactSet`] maps a relative, forward-slash separated path to file
//! content. Keys are unique and a later write to the same path replaces the
//! earlier content. Iteration is ordered by path.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use crate::error::{Error, Result};

/// Report key for collection failures that cannot be pinned to one file
pub const COLLECT_SENTINEL: &str = "_collect";

/// What kind of file an artifact is, judged by its suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Python source
    Code,
    /// YAML data
    Data,
    /// Anything else (requirements, markers)
    Other,
}

impl ArtifactKind {
    pub fn of(path: &str) -> Self {
        if path.ends_with(".py") {
            Self::Code
        } else if path.ends_with(".yaml") || path.ends_with(".yml") {
            Self::Data
        } else {
            Self::Other
        }
    }
}

/// Relative path to file content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    files: BTreeMap<String, String>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an artifact, returning the previous content
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> Option<String> {
        self.files.insert(path.into(), content.into())
    }

    /// A copy of this set with one artifact inserted or replaced
    pub fn with(&self, path: impl Into<String>, content: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.insert(path, content);
        next
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Write every artifact below `dir`, creating parent directories.
    ///
    /// Absolute paths and paths containing `..` are rejected before anything
    /// is written.
    pub async fn write_to(&self, dir: &Path) -> Result<Vec<std::path::PathBuf>> {
        if let Some(bad) = self.paths().find(|p| !is_safe_relative_path(p)) {
            return Err(Error::config(format!(
                "Refusing to write artifact outside the output directory: {}",
                bad
            )));
        }

        let mut written = Vec::with_capacity(self.len());
        for (path, content) in self.iter() {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, content).await?;
            log::debug!("Wrote {}", target.display());
            written.push(target);
        }
        Ok(written)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ArtifactSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            files: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for ArtifactSet {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl IntoIterator for ArtifactSet {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// True when `path` is relative and never climbs above its root
pub fn is_safe_relative_path(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Artifact path (or [`COLLECT_SENTINEL`]) to diagnostic text.
///
/// An empty report means the artifact set is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: BTreeMap<String, String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, diagnostic: impl Into<String>) {
        self.errors.insert(path.into(), diagnostic.into());
    }

    /// Merge another report into this one; entries of `other` win
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.errors.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.errors.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ValidationReport {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            errors: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
