//! Best-effort inference of file paths and access types from free-form
//! action text.
//!
//! Workers describe their actions in natural language; path-shaped
//! substrings are scanned out and a keyword classifier picks the access
//! type. Inferred locking is advisory: a timeout on an inferred lock skips
//! the lock rather than failing the task.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use cortex_core::models::AccessType;
use regex::Regex;

fn path_patterns() -> &'static [Regex; 4] {
    static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Absolute Unix paths with an extension
            Regex::new(r"/(?:[^/\s:*?\x22<>|]+/)*[^/\s:*?\x22<>|]+\.[A-Za-z0-9]+").unwrap(),
            // Relative paths with an extension
            Regex::new(r"(?:\./)?(?:[^/\\\s:*?\x22<>|]+/)+[^/\\\s:*?\x22<>|]+\.[A-Za-z0-9]+")
                .unwrap(),
            // Double-quoted paths
            Regex::new(r#""([^"]+\.[A-Za-z0-9]+)""#).unwrap(),
            // Single-quoted paths
            Regex::new(r"'([^']+\.[A-Za-z0-9]+)'").unwrap(),
        ]
    })
}

/// Extract potential file paths from an action description.
///
/// Returns a sorted, deduplicated set; matches shorter than two characters
/// are discarded.
pub fn extract_file_paths(action: &str) -> Vec<String> {
    let mut paths = BTreeSet::new();

    for (index, pattern) in path_patterns().iter().enumerate() {
        for capture in pattern.captures_iter(action) {
            // Quoted patterns carry the path in group 1
            let matched = if index >= 2 {
                capture.get(1).map(|m| m.as_str())
            } else {
                capture.get(0).map(|m| m.as_str())
            };

            if let Some(matched) = matched {
                let trimmed = matched.trim_matches(|c| c == '.' || c == ',');
                if trimmed.len() > 1 {
                    paths.insert(trimmed.to_string());
                }
            }
        }
    }

    paths.into_iter().collect()
}

/// Keywords indicating the file will be removed or displaced
const EXCLUSIVE_KEYWORDS: [&str; 5] = ["delete", "remove", "rename", "move", "replace"];

/// Keywords indicating the file contents will change
const WRITE_KEYWORDS: [&str; 7] = ["write", "edit", "modify", "update", "create", "save", "append"];

/// Classify the access type an action implies for a file.
///
/// Destructive verbs win over mutating verbs; anything else defaults to
/// `read`.
pub fn classify_access_type(action: &str) -> AccessType {
    let action_lower = action.to_lowercase();

    if EXCLUSIVE_KEYWORDS.iter().any(|kw| action_lower.contains(kw)) {
        return AccessType::Exclusive;
    }
    if WRITE_KEYWORDS.iter().any(|kw| action_lower.contains(kw)) {
        return AccessType::Write;
    }
    AccessType::Read
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_absolute_paths() {
        let paths = extract_file_paths("Read the config at /etc/app/config.toml before starting");
        assert!(paths.contains(&"/etc/app/config.toml".to_string()));
    }

    #[test]
    fn test_extracts_quoted_paths() {
        let paths = extract_file_paths(r#"Open "notes/summary.md" and 'data/input.csv'"#);
        assert!(paths.contains(&"notes/summary.md".to_string()));
        assert!(paths.contains(&"data/input.csv".to_string()));
    }

    #[test]
    fn test_extracts_relative_paths() {
        let paths = extract_file_paths("Update src/main.rs with the new handler");
        assert!(paths.contains(&"src/main.rs".to_string()));
    }

    #[test]
    fn test_ignores_plain_prose() {
        let paths = extract_file_paths("Summarize the findings and report back");
        assert!(paths.is_empty());
    }

    #[test]
    fn test_deduplicates_paths() {
        let paths = extract_file_paths("Copy /tmp/a.txt then verify /tmp/a.txt");
        assert_eq!(
            paths.iter().filter(|p| p.as_str() == "/tmp/a.txt").count(),
            1
        );
    }

    #[test]
    fn test_classify_exclusive() {
        assert_eq!(
            classify_access_type("Delete the obsolete file /tmp/old.log"),
            AccessType::Exclusive
        );
        assert_eq!(
            classify_access_type("Rename report.md to final_report.md"),
            AccessType::Exclusive
        );
    }

    #[test]
    fn test_classify_write() {
        assert_eq!(
            classify_access_type("Write the summary to output.md"),
            AccessType::Write
        );
        assert_eq!(
            classify_access_type("Append results to the log"),
            AccessType::Write
        );
    }

    #[test]
    fn test_classify_defaults_to_read() {
        assert_eq!(
            classify_access_type("Inspect the data in metrics.csv"),
            AccessType::Read
        );
    }

    #[test]
    fn test_exclusive_wins_over_write() {
        // "move" implies displacement even when "write" also appears
        assert_eq!(
            classify_access_type("Move the file after writing it"),
            AccessType::Exclusive
        );
    }
}
