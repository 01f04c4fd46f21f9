//! Report source resolution.
//!
//! Turns one input pattern into an ordered list of [`ReportSource`]s:
//!
//! 1. An absolute `http`, `https`, or `ftp` URL is returned as-is, with no
//!    existence check.
//! 2. A literal path that exists is returned as the only source.
//! 3. Otherwise the pattern is expanded as a glob against the working
//!    directory. `*` and `?` stay within one path component, `**` crosses
//!    directories. Matches are files only, in lexicographic path order.

use globset::GlobBuilder;
use publish_report_core::models::ReportSource;
use publish_report_core::ReportError;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

fn url_pattern() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| {
        Regex::new(r"^(https?|ftp)://[^\s/$.?#].[^\s]*$").expect("url pattern is valid")
    })
}

/// True if `pattern` is an absolute `http`, `https`, or `ftp` URL.
pub fn is_url(pattern: &str) -> bool {
    url_pattern().is_match(pattern)
}

/// Resolve `pattern` into report sources.
///
/// # Errors
///
/// - [`ReportError::InvalidInput`] for an empty pattern or an invalid glob.
/// - [`ReportError::NoReportsFound`] when nothing matches.
pub fn resolve_sources(pattern: &str, working_dir: &Path) -> Result<Vec<ReportSource>, ReportError> {
    if pattern.is_empty() {
        return Err(ReportError::InvalidInput(
            "Report filepath cannot be empty. Please provide a path to the report.".to_string(),
        ));
    }

    if is_url(pattern) {
        tracing::debug!(pattern, "pattern is a url");
        return Ok(vec![ReportSource::Url(pattern.to_string())]);
    }

    let literal = working_dir.join(pattern);
    if literal.exists() {
        tracing::debug!(path = %literal.display(), "pattern is an existing path");
        return Ok(vec![ReportSource::Path(literal)]);
    }

    tracing::debug!(pattern, "expanding glob");
    let matches = expand_glob(pattern, working_dir)?;
    if matches.is_empty() {
        return Err(ReportError::NoReportsFound(format!(
            "No reports found with filepath pattern {}",
            pattern
        )));
    }

    tracing::info!(pattern, count = matches.len(), "found reports");
    Ok(matches.into_iter().map(ReportSource::Path).collect())
}

fn expand_glob(pattern: &str, working_dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
    let full = working_dir.join(pattern);
    let full_str = full.to_string_lossy().to_string();

    let matcher = GlobBuilder::new(&full_str)
        .literal_separator(true)
        .build()
        .map_err(|e| ReportError::InvalidInput(format!("invalid pattern '{}': {}", pattern, e)))?
        .compile_matcher();

    let root = literal_prefix(&full);
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| matcher.is_match(path))
        .collect();

    paths.sort();
    Ok(paths)
}

/// The longest leading run of path components with no glob syntax.
fn literal_prefix(path: &Path) -> PathBuf {
    let mut prefix = PathBuf::new();
    for component in path.components() {
        let is_glob = matches!(component, Component::Normal(part)
            if part.to_string_lossy().contains(['*', '?', '[', '{']));
        if is_glob {
            break;
        }
        prefix.push(component);
    }
    prefix
}
