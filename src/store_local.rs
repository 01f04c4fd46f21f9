//! Directory-backed attachment store.
//!
//! Lays attachments out exactly as the addressing contract names them:
//!
//! ```text
//! {root}/{timelineId}/{recordId}/{category}/{type}/{name}
//! ```
//!
//! Release runs keep one such tree per plan under `{root}/plans/{planId}/`.
//! Self links are `file://` URLs, so the catalog decodes them with the same
//! five-segment rule it applies to host links. The store is both a producer
//! registrar and a consumer store, which lets a run on a developer machine
//! exercise the full publish/view round trip.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use publish_report_core::models::{AttachmentLocator, Environment};
use publish_report_core::store::{AttachmentRecord, AttachmentStore};
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

use crate::traits::AttachmentRegistrar;

/// Where a producer step files its attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTarget {
    pub plan_id: Option<String>,
    pub timeline_id: String,
    pub record_id: String,
    pub category: String,
}

#[derive(Debug, Clone)]
pub struct LocalAttachmentStore {
    root: PathBuf,
    step: Option<StepTarget>,
}

impl LocalAttachmentStore {
    /// A read-only store over `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            step: None,
        }
    }

    /// A store that also registers attachments for one step.
    pub fn for_step(root: impl Into<PathBuf>, step: StepTarget) -> Self {
        Self {
            root: root.into(),
            step: Some(step),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Plans with an attachment tree under `{root}/plans`, in name order.
    pub fn plan_ids(&self) -> Result<Vec<String>> {
        let plans = self.root.join("plans");
        if !plans.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in WalkDir::new(&plans)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| format!("failed to read {}", plans.display()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        Ok(ids)
    }

    fn plan_root(&self, plan_id: Option<&str>) -> Result<PathBuf> {
        match plan_id {
            Some(plan) => Ok(self.root.join("plans").join(segment(plan)?)),
            None => Ok(self.root.clone()),
        }
    }

    fn attachment_path(
        &self,
        plan_id: Option<&str>,
        timeline_id: &str,
        record_id: &str,
        category: &str,
        attachment_type: &str,
        name: &str,
    ) -> Result<PathBuf> {
        let mut path = self.plan_root(plan_id)?;
        for part in [timeline_id, record_id, category, attachment_type, name] {
            path.push(segment(part)?);
        }
        Ok(path)
    }
}

/// Reject anything that would not stay one directory level deep.
fn segment(value: &str) -> Result<&str> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || value.contains('\0')
    {
        bail!("invalid attachment path segment: '{}'", value);
    }
    Ok(value)
}

#[async_trait]
impl AttachmentRegistrar for LocalAttachmentStore {
    async fn add_attachment(
        &self,
        attachment_type: &str,
        filename: &str,
        file_path: &Path,
    ) -> Result<()> {
        let Some(step) = &self.step else {
            bail!("local store has no step target; set producer.timeline_id and producer.record_id");
        };

        let dest = self.attachment_path(
            step.plan_id.as_deref(),
            &step.timeline_id,
            &step.record_id,
            &step.category,
            attachment_type,
            filename,
        )?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::copy(file_path, &dest)
            .await
            .with_context(|| format!("failed to store attachment {}", dest.display()))?;

        tracing::debug!(attachment = %dest.display(), "stored local attachment");
        Ok(())
    }
}

#[async_trait]
impl AttachmentStore for LocalAttachmentStore {
    async fn list_attachments(
        &self,
        env: &Environment,
        plan_id: Option<&str>,
        attachment_type: &str,
    ) -> Result<Vec<AttachmentRecord>> {
        let base = self.plan_root(plan_id)?;
        if !base.is_dir() {
            return Ok(Vec::new());
        }
        let category = env.scope.category();

        let mut records = Vec::new();
        for entry in WalkDir::new(&base)
            .min_depth(5)
            .max_depth(5)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| format!("failed to list {}", base.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let parts: Vec<String> = match entry.path().strip_prefix(&base) {
                Ok(rel) => rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect(),
                Err(_) => continue,
            };
            if parts.len() != 5 || parts[2] != category || parts[3] != attachment_type {
                continue;
            }

            let absolute = std::fs::canonicalize(entry.path())
                .with_context(|| format!("failed to resolve {}", entry.path().display()))?;
            let url = Url::from_file_path(&absolute).map_err(|_| {
                anyhow::anyhow!("cannot address {} as a url", absolute.display())
            })?;
            records.push(AttachmentRecord::from_url(url.to_string()));
        }

        Ok(records)
    }

    async fn get_attachment_content(
        &self,
        env: &Environment,
        locator: &AttachmentLocator,
    ) -> Result<Vec<u8>> {
        let path = self.attachment_path(
            locator.plan_id.as_deref(),
            &locator.timeline_id,
            &locator.record_id,
            env.scope.category(),
            &locator.attachment_type,
            &locator.name,
        )?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("attachment not found: {}", path.display()))
    }
}
