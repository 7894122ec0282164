//! Test profile discovery.
//!
//! `GetTestProfiles` lists profile files from the configured directory.
//! The filter is either a test-type keyword (mapped to the vendor file
//! extension for that type) or a literal wildcard pattern passed through
//! as-is. The reply is always a well-formed `TestProfiles` document; a
//! missing directory or an unreadable entry yields a document with zero
//! profiles, never a failure token.

use regex::RegexBuilder;
use std::fmt::Write as _;
use std::path::Path;
use tracing::warn;

/// Map a test-type keyword to its profile file pattern. Keywords are
/// matched case-insensitively; anything else is already a pattern.
fn filter_pattern(filter: &str) -> String {
    match filter.to_ascii_lowercase().as_str() {
        "sine" => "*.vsp".to_string(),
        "random" => "*.vrp".to_string(),
        "shock" => "*.vkp".to_string(),
        "datareplay" => "*.vfp".to_string(),
        _ => filter.to_string(),
    }
}

/// Compile a `*`/`?` wildcard into an anchored case-insensitive regex.
fn wildcard_regex(pattern: &str) -> Option<regex::Regex> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    for c in pattern.chars() {
        match c {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    match RegexBuilder::new(&translated).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(error) => {
            warn!(pattern, %error, "unusable profile filter");
            None
        }
    }
}

/// File names in `dir` matching the pattern, sorted. Directory problems
/// log and yield an empty list.
fn matching_files(dir: &Path, pattern: &str) -> Vec<String> {
    let Some(re) = wildcard_regex(pattern) else {
        return Vec::new();
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(dir = %dir.display(), %error, "profile directory unreadable");
            return Vec::new();
        }
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| re.is_match(name))
        .collect();
    names.sort();
    names
}

/// Build the `TestProfiles` document for one filter.
pub fn list_profiles(dir: &Path, filter: &str) -> String {
    let pattern = filter_pattern(filter);
    let mut doc = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><TestProfiles>");
    for name in matching_files(dir, &pattern) {
        let _ = write!(doc, "<Profile><Name>{}</Name></Profile>", escape(&name));
    }
    doc.push_str("</TestProfiles>");
    doc
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_map_to_vendor_extensions() {
        assert_eq!(filter_pattern("sine"), "*.vsp");
        assert_eq!(filter_pattern("Random"), "*.vrp");
        assert_eq!(filter_pattern("SHOCK"), "*.vkp");
        assert_eq!(filter_pattern("DataReplay"), "*.vfp");
        assert_eq!(filter_pattern("*.vsp"), "*.vsp");
        assert_eq!(filter_pattern("run_??.vrp"), "run_??.vrp");
    }

    #[test]
    fn wildcard_matches_are_case_insensitive_and_anchored() {
        let re = wildcard_regex("*.vsp").unwrap();
        assert!(re.is_match("sweep.vsp"));
        assert!(re.is_match("SWEEP.VSP"));
        assert!(!re.is_match("sweep.vsp.bak"));

        let re = wildcard_regex("run_?.vrp").unwrap();
        assert!(re.is_match("run_1.vrp"));
        assert!(!re.is_match("run_12.vrp"));
    }

    #[test]
    fn literal_regex_metacharacters_are_escaped() {
        let re = wildcard_regex("a+b.vsp").unwrap();
        assert!(re.is_match("a+b.vsp"));
        assert!(!re.is_match("aab.vsp"));
    }

    #[test]
    fn missing_directory_yields_empty_document() {
        let doc = list_profiles(Path::new("/no/such/dir"), "sine");
        assert_eq!(
            doc,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><TestProfiles></TestProfiles>"
        );
    }
}
