//! Core data types shared by the producer and consumer pipelines.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::REPORT_SUFFIX;

/// One resolved report input: an absolute URL or a file-system path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ReportSource {
    Url(String),
    Path(PathBuf),
}

impl fmt::Display for ReportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportSource::Url(url) => f.write_str(url),
            ReportSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A single self-contained HTML document produced from one [`ReportSource`].
///
/// Immutable once built; the publisher consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinedDocument {
    html: String,
}

impl InlinedDocument {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.html
    }

    pub fn len(&self) -> usize {
        self.html.len()
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty()
    }

    pub fn into_string(self) -> String {
        self.html
    }
}

/// Identifier of one report tab, derived from record id and attachment name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Derive the key for an attachment: URL-safe base64 of `"{record_id}/{name}"`.
    pub fn derive(record_id: &str, name: &str) -> Self {
        Self(URL_SAFE_NO_PAD.encode(format!("{}/{}", record_id, name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A published report as seen by the viewer.
///
/// Built in bulk by the catalog. `content` is filled once by the content
/// cache and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportItem {
    pub key: ItemKey,
    pub url: String,
    pub timeline_id: String,
    pub record_id: String,
    pub name: String,
    pub friendly_name: String,
    /// Execution phase the attachment belongs to (release scopes only).
    pub plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ReportItem {
    pub fn new(
        url: impl Into<String>,
        timeline_id: impl Into<String>,
        record_id: impl Into<String>,
        name: impl Into<String>,
        plan_id: Option<String>,
    ) -> Self {
        let record_id = record_id.into();
        let name = name.into();
        Self {
            key: ItemKey::derive(&record_id, &name),
            url: url.into(),
            timeline_id: timeline_id.into(),
            friendly_name: friendly_name(&name).to_string(),
            record_id,
            name,
            plan_id,
            content: None,
        }
    }

    /// True once content has been fetched and is non-empty.
    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Display label for an attachment name: a trailing `.html` is removed.
///
/// The suffix match is case-sensitive.
pub fn friendly_name(name: &str) -> &str {
    name.strip_suffix(REPORT_SUFFIX).unwrap_or(name)
}

/// The kind of pipeline run the attachments are scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RunScope {
    /// A single-phase build run.
    Build { build_id: u64 },
    /// A staged release environment with one plan id per deployment phase.
    Release {
        release_id: u64,
        environment_id: u64,
        attempt_number: u32,
        plan_ids: Vec<String>,
    },
}

impl RunScope {
    /// Path segment used as the attachment category in the local layout.
    pub fn category(&self) -> &'static str {
        match self {
            RunScope::Build { .. } => "build",
            RunScope::Release { .. } => "release",
        }
    }

    /// Phases to enumerate when listing attachments, in phase order.
    ///
    /// Build scopes have a single implicit phase (`None`).
    pub fn phases(&self) -> Vec<Option<&str>> {
        match self {
            RunScope::Build { .. } => vec![None],
            RunScope::Release { plan_ids, .. } => {
                plan_ids.iter().map(|p| Some(p.as_str())).collect()
            }
        }
    }
}

/// Run-scope identifiers needed to address the attachment store.
///
/// Resolved once at session start and passed explicitly to every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub project_id: String,
    /// Display name of the run (build definition or release environment).
    pub name: String,
    pub scope: RunScope,
}

/// Locates one attachment's content in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentLocator {
    pub plan_id: Option<String>,
    pub timeline_id: String,
    pub record_id: String,
    pub attachment_type: String,
    pub name: String,
}

impl AttachmentLocator {
    pub fn for_item(item: &ReportItem) -> Self {
        Self {
            plan_id: item.plan_id.clone(),
            timeline_id: item.timeline_id.clone(),
            record_id: item.record_id.clone(),
            attachment_type: crate::ATTACHMENT_TYPE.to_string(),
            name: item.name.clone(),
        }
    }
}
