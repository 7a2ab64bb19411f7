//! String transformation utilities for generated Python identifiers

/// Sanitize a tag so it is usable as a Python module and fixture name.
///
/// Letters and digits of any script are kept, as Python 3 allows them in
/// identifiers. Anything else becomes `_` and a name that does not start
/// with a letter or `_` is prefixed with `m_`. An empty input becomes
/// `default`.
pub fn python_identifier(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if result.is_empty() {
        return "default".to_string();
    }

    if !result.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        result = format!("m_{}", result);
    }

    result
}

/// Title-case a string the way Python's `str.title` does: the first letter of
/// every alphabetic run is upper-cased, every other letter lower-cased.
pub fn title_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_is_alpha = false;

    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_is_alpha {
                result.extend(ch.to_lowercase());
            } else {
                result.extend(ch.to_uppercase());
            }
            prev_is_alpha = true;
        } else {
            result.push(ch);
            prev_is_alpha = false;
        }
    }

    result
}

/// Name of the generated API wrapper class for a tag, e.g. `user_profiles`
/// becomes `UserProfilesApi`.
pub fn api_class_name(tag: &str) -> String {
    let ident = python_identifier(tag);
    format!("{}Api", title_case(&ident).replace('_', ""))
}
