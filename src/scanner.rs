use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use regex::Regex;
use serde::Serialize;

use crate::error::ScanError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeckEntry {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub include_hidden: bool,
    pub extra_ignore_patterns: Vec<String>,
}

struct IgnorePattern {
    regex: Regex,
    dir_only: bool,
    negate: bool,
}

// For a given path, the last matching pattern wins: a plain pattern ignores
// the path, a `!`-prefixed one re-includes it even over an earlier ignore.
pub struct IgnoreMatcher {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreMatcher {
    // Malformed patterns are dropped rather than failing the scan.
    pub fn build(root: &Path, extra_patterns: &[String]) -> IgnoreMatcher {
        let mut lines: Vec<String> = Vec::new();
        if let Ok(text) = fs::read_to_string(root.join(".reignore")) {
            for line in text.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                lines.push(trimmed.to_string());
            }
        }
        lines.extend(extra_patterns.iter().cloned());

        let patterns = lines.iter().filter_map(|p| compile_pattern(p)).collect();
        IgnoreMatcher { patterns }
    }

    // `r` uses `/` separators and should end in `/` when testing a directory.
    pub fn is_ignored(&self, r: &str) -> bool {
        let trimmed = r.trim_end_matches('/');
        let mut ignored = false;
        for p in &self.patterns {
            if p.dir_only && !r.ends_with('/') {
                continue;
            }
            if p.regex.is_match(trimmed) {
                ignored = !p.negate;
            }
        }
        ignored
    }
}

fn compile_pattern(pattern: &str) -> Option<IgnorePattern> {
    let mut pattern = pattern.to_string();
    let negate = pattern.starts_with('!');
    if negate {
        pattern.remove(0);
    }
    let dir_only = pattern.ends_with('/');
    if dir_only {
        pattern.pop();
    }
    let anchored = pattern.starts_with('/');
    let core = pattern.trim_start_matches('/');

    let mut regex_src = String::from("^");
    if !anchored && !core.contains('/') {
        regex_src.push_str("(?:.*/)?");
    }
    regex_src.push_str(&glob_to_regex(core));
    regex_src.push('$');

    Regex::new(&regex_src).ok().map(|regex| IgnorePattern { regex, dir_only, negate })
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::new();
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            c if "\\.+^$()|[]{}".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

// Shared by scan (`.md` files) and the recovery sweep (`.tmp` files).
pub fn walk_files(
    root: &Path,
    options: &ScanOptions,
    include_file: impl Fn(&Path) -> bool,
) -> Result<Vec<(PathBuf, String)>, ScanError> {
    let root_meta = fs::symlink_metadata(root)
        .map_err(|_| ScanError::WorkspaceRootNotFound(root.to_path_buf()))?;
    if !root_meta.is_dir() {
        return Err(ScanError::WorkspaceRootNotDirectory(root.to_path_buf()));
    }

    let matcher = IgnoreMatcher::build(root, &options.extra_ignore_patterns);

    let root_entries = fs::read_dir(root).map_err(|e| ScanError::WorkspaceRootUnreadable {
        operation: "read_directory",
        path: root.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut worklist: Vec<PathBuf> = Vec::new();
    for entry in root_entries.filter_map(Result::ok) {
        worklist.push(entry.path());
    }

    let mut found = Vec::new();
    while let Some(path) = worklist.pop() {
        let relative = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let relative_str = path_to_slash(relative);

        if !options.include_hidden && relative_str.split('/').any(|seg| seg.starts_with('.')) {
            continue;
        }

        let is_symlink = fs::symlink_metadata(&path).map(|m| m.file_type().is_symlink()).unwrap_or(false);
        if is_symlink {
            debug!("skipping symlink {}", path.display());
            continue;
        }

        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if matches!(e.kind(), std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied) => {
                warn!("skipping {} during scan: {}", path.display(), e);
                continue;
            }
            Err(e) => {
                return Err(ScanError::WorkspaceRootUnreadable {
                    operation: "stat",
                    path: path.clone(),
                    message: e.to_string(),
                });
            }
        };

        if meta.is_dir() {
            let dir_key = format!("{}/", relative_str);
            if matcher.is_ignored(&dir_key) {
                continue;
            }
            match fs::read_dir(&path) {
                Ok(children) => {
                    for child in children.filter_map(Result::ok) {
                        worklist.push(child.path());
                    }
                }
                Err(e) if matches!(e.kind(), std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied) => {
                    warn!("skipping subtree {} during scan: {}", path.display(), e);
                    continue;
                }
                Err(e) => {
                    return Err(ScanError::WorkspaceRootUnreadable {
                        operation: "read_directory",
                        path: path.clone(),
                        message: e.to_string(),
                    });
                }
            }
        } else {
            if matcher.is_ignored(&relative_str) {
                continue;
            }
            if !include_file(&path) {
                continue;
            }
            found.push((path, relative_str));
        }
    }

    Ok(found)
}

pub fn scan(root: &Path, options: &ScanOptions) -> Result<Vec<DeckEntry>, ScanError> {
    let found = walk_files(root, options, |p| p.extension().and_then(|e| e.to_str()) == Some("md"))?;

    let mut entries: Vec<DeckEntry> = found
        .into_iter()
        .map(|(path, relative_str)| {
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
            DeckEntry { absolute_path: path, relative_path: relative_str, name }
        })
        .collect();

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(entries)
}

fn path_to_slash(p: &Path) -> String {
    p.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn scans_markdown_files_and_sorts_by_relative_path() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.md"), "").unwrap();
        fs::write(dir.path().join("a.md"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let entries = scan(dir.path(), &ScanOptions::default()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn skips_hidden_entries_by_default() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join(".hidden").join("x.md"), "").unwrap();
        fs::write(dir.path().join("visible.md"), "").unwrap();

        let entries = scan(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "visible");
    }

    #[test]
    fn honors_reignore_patterns() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".reignore"), "archive/\nskip-me.md\n").unwrap();
        fs::create_dir(dir.path().join("archive")).unwrap();
        fs::write(dir.path().join("archive").join("old.md"), "").unwrap();
        fs::write(dir.path().join("skip-me.md"), "").unwrap();
        fs::write(dir.path().join("keep.md"), "").unwrap();

        let entries = scan(dir.path(), &ScanOptions::default()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["keep"]);
    }

    #[test]
    fn nonexistent_root_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let err = scan(&missing, &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, ScanError::WorkspaceRootNotFound(_)));
    }

    #[test]
    fn root_that_is_a_file_is_an_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir.md");
        fs::write(&file, "").unwrap();
        let err = scan(&file, &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, ScanError::WorkspaceRootNotDirectory(_)));
    }

    #[test]
    fn negated_pattern_re_includes_a_path_excluded_by_an_earlier_pattern() {
        let dir = tempdir().unwrap();
        let matcher = IgnoreMatcher::build(dir.path(), &["*.md".to_string(), "!keep.md".to_string()]);
        assert!(matcher.is_ignored("skip.md"));
        assert!(!matcher.is_ignored("keep.md"));
    }

    #[test]
    fn later_plain_pattern_re_ignores_after_an_earlier_negation() {
        let dir = tempdir().unwrap();
        let matcher = IgnoreMatcher::build(
            dir.path(),
            &["!keep.md".to_string(), "*.md".to_string()],
        );
        assert!(matcher.is_ignored("keep.md"));
    }
}
