//! Partitioning endpoints into per-tag groups.

use std::collections::BTreeMap;

use crate::endpoint::ApiEndpoint;

/// Group for endpoints without a usable first tag
pub const DEFAULT_TAG: &str = "default";

/// Normalized tag to the endpoints sharing it, iterated in key order
pub type TagGroups<'a> = BTreeMap<String, Vec<&'a ApiEndpoint>>;

/// Lower-case a tag and replace spaces with underscores
pub fn normalize_tag(tag: &str) -> String {
    let normalized = tag.trim().to_lowercase().replace(' ', "_");
    if normalized.is_empty() {
        DEFAULT_TAG.to_string()
    } else {
        normalized
    }
}

/// Partition endpoints by their normalized first tag.
///
/// Every endpoint lands in exactly one group and keeps its relative input
/// order within the group.
pub fn group_by_tag(endpoints: &[ApiEndpoint]) -> TagGroups<'_> {
    let mut groups: TagGroups<'_> = BTreeMap::new();
    for endpoint in endpoints {
        let key = endpoint
            .first_tag()
            .map(normalize_tag)
            .unwrap_or_else(|| DEFAULT_TAG.to_string());
        groups.entry(key).or_default().push(endpoint);
    }
    groups
}
