//! Name normalization shared by the dump loader, the store and the web layer.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NAME_KEY: Regex = Regex::new(r"^[a-z0-9_\-]{1,40}$").unwrap();
}

/// Normalize a display name into a storage key: lowercase, spaces to underscores.
///
/// Surrounding whitespace is trimmed first, so `" Testlandia "` and
/// `"testlandia"` share a key.
pub fn sanitize_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Render a storage key for display: underscores to spaces, words capitalized.
pub fn format_name(key: &str) -> String {
    key.split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a sanitized key is shaped like a nation or region name.
pub fn is_valid_key(key: &str) -> bool {
    NAME_KEY.is_match(key)
}
