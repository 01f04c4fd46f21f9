//! Command-line viewer.
//!
//! `publish-report list` prints the report catalog of a run and
//! `publish-report show` renders one report's document. Both drive the same
//! catalog and tab state machine the HTTP viewer uses. Also hosts the store
//! factory shared by every consumer surface.

use anyhow::{anyhow, bail, Result};
use publish_report_core::catalog::build_catalog;
use publish_report_core::models::{Environment, ItemKey, ReportItem};
use publish_report_core::store::AttachmentStore;
use publish_report_core::tabs::{ReportSession, TabState};
use serde::Serialize;
use std::sync::Arc;

use crate::config::{resolve_environment, Config, StoreKind};
use crate::store_host::{HostAttachmentStore, ReleasePhases};
use crate::store_local::LocalAttachmentStore;

/// Open the attachment store named by `[store]`.
pub fn open_store(config: &Config) -> Result<Arc<dyn AttachmentStore>> {
    match config.store.kind {
        StoreKind::Host => Ok(Arc::new(HostAttachmentStore::from_config(&config.store)?)),
        StoreKind::Local => match &config.store.root {
            Some(root) => Ok(Arc::new(LocalAttachmentStore::new(root))),
            None => bail!("store.root must be set when store.kind is 'local'"),
        },
    }
}

/// Resolve the run to view.
///
/// A release environment runs one plan per phase. When `[run.release]`
/// lists no plans, they are read from the store: the host's release API,
/// or the plan trees of a local store.
pub async fn resolve_run(config: &Config) -> Result<Environment> {
    let mut config = config.clone();
    let project_id = config.run.project_id.clone();
    if let (Some(release), Some(project_id)) = (config.run.release.as_mut(), project_id) {
        if release.plan_ids.is_empty() {
            let phases = match config.store.kind {
                StoreKind::Host => {
                    HostAttachmentStore::from_config(&config.store)?
                        .release_phases(
                            &project_id,
                            release.release_id,
                            release.environment_id,
                            release.attempt_number,
                        )
                        .await?
                }
                StoreKind::Local => {
                    let root = config.store.root.as_ref().ok_or_else(|| {
                        anyhow!("store.root must be set when store.kind is 'local'")
                    })?;
                    ReleasePhases {
                        attempt_number: release.attempt(),
                        plan_ids: LocalAttachmentStore::new(root).plan_ids()?,
                    }
                }
            };
            tracing::info!(
                attempt = phases.attempt_number,
                plans = ?phases.plan_ids,
                "resolved release phases"
            );
            release.attempt_number = Some(phases.attempt_number);
            release.plan_ids = phases.plan_ids;
        }
    }
    Ok(resolve_environment(&config)?)
}

/// Catalog row for `list --json`.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub key: String,
    pub name: String,
    pub friendly_name: String,
    pub record_id: String,
    pub timeline_id: String,
    pub plan_id: Option<String>,
    pub url: String,
}

impl From<&ReportItem> for CatalogEntry {
    fn from(item: &ReportItem) -> Self {
        Self {
            key: item.key.to_string(),
            name: item.name.clone(),
            friendly_name: item.friendly_name.clone(),
            record_id: item.record_id.clone(),
            timeline_id: item.timeline_id.clone(),
            plan_id: item.plan_id.clone(),
            url: item.url.clone(),
        }
    }
}

/// Run the list command.
pub async fn run_list(store: &dyn AttachmentStore, env: &Environment, json: bool) -> Result<()> {
    let items = build_catalog(store, env).await?;

    if json {
        let entries: Vec<CatalogEntry> = items.iter().map(CatalogEntry::from).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    print!("{}", format_catalog(env, &items));
    Ok(())
}

fn format_catalog(env: &Environment, items: &[ReportItem]) -> String {
    let mut out = format!("{} ({} {})\n", env.name, env.scope.category(), env.project_id);
    if items.is_empty() {
        out.push_str("  no report found\n");
        return out;
    }

    let key_width = items
        .iter()
        .map(|i| i.key.as_str().len())
        .max()
        .unwrap_or(0)
        .max(3);
    let name_width = items
        .iter()
        .map(|i| i.friendly_name.len())
        .max()
        .unwrap_or(0)
        .max(6);

    out.push_str(&format!(
        "  {:<kw$}  {:<nw$}  {:<36}  {}\n",
        "KEY",
        "REPORT",
        "RECORD",
        "TIMELINE",
        kw = key_width,
        nw = name_width
    ));
    for item in items {
        out.push_str(&format!(
            "  {:<kw$}  {:<nw$}  {:<36}  {}\n",
            item.key.as_str(),
            item.friendly_name,
            item.record_id,
            item.timeline_id,
            kw = key_width,
            nw = name_width
        ));
    }
    out
}

/// Load the session, select `key` (the first report when `None`) and return
/// the report's document.
pub async fn show_report(
    store: &dyn AttachmentStore,
    env: &Environment,
    key: Option<&str>,
) -> Result<String> {
    let mut session = ReportSession::new(store, env.clone());
    session.start().await;

    if let Some(key) = key {
        let key = ItemKey::from(key);
        if session.controller().item(&key).is_none() {
            bail!("no report with key: {}", key);
        }
        session.select(&key).await;
    }

    match session.controller().state() {
        TabState::Ready(_) => match session.controller().selected_item() {
            Some(item) => Ok(item.content.clone().unwrap_or_default()),
            None => bail!("selected report is missing"),
        },
        TabState::Empty(message) | TabState::Error(message) => bail!("{}", message),
        TabState::Loading => bail!("report is still loading"),
    }
}
