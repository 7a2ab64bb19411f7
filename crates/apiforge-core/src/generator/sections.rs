//! Mapping endpoints back onto sections of a test-case document.
//!
//! A test-case document is Markdown whose sections start with a level-2
//! header naming one `METHOD PATH` pair. Text before the first such header is
//! not part of any section.

use crate::endpoint::ApiEndpoint;

/// Split a document into its `## ` sections, each starting with its header line
pub fn split_sections(document: &str) -> Vec<&str> {
    let mut starts: Vec<usize> = Vec::new();
    let mut offset = 0;
    for line in document.split_inclusive('\n') {
        if line.starts_with("## ") {
            starts.push(offset);
        }
        offset += line.len();
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(document.len());
            document[start..end].trim()
        })
        .collect()
}

/// Sections whose header names at least one of `endpoints`, in document
/// order, joined by a blank line. Empty when nothing matches.
pub fn extract_sections<'a, I>(document: &str, endpoints: I) -> String
where
    I: IntoIterator<Item = &'a ApiEndpoint>,
{
    let endpoints: Vec<&ApiEndpoint> = endpoints.into_iter().collect();

    split_sections(document)
        .into_iter()
        .filter(|section| {
            let header = section.lines().next().unwrap_or_default();
            endpoints.iter().any(|ep| header_matches(header, ep))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The header contains the method as a whole word and the exact path
fn header_matches(header: &str, endpoint: &ApiEndpoint) -> bool {
    let method = endpoint.method.as_str();
    let has_method = header
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == method);

    has_method && contains_path(header, &endpoint.path)
}

/// `path` occurs in `header` and is not part of a longer path
fn contains_path(header: &str, path: &str) -> bool {
    if path.is_empty() {
        return false;
    }

    header.match_indices(path).any(|(start, _)| {
        let before = header[..start].chars().next_back();
        let after = header[start + path.len()..].chars().next();
        !before.is_some_and(is_path_char) && !after.is_some_and(is_path_char)
    })
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '{' | '}' | '_' | '-' | '.')
}
