//! In-memory [`AttachmentStore`] for tests and embedding.
//!
//! Attachments live in a `Vec` behind `std::sync::RwLock`. Self links are
//! built under a configurable base URL using the five-segment layout, so the
//! catalog decodes them exactly as it would a real store's links. Listing and
//! content calls are counted, and either can be made to fail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use url::Url;

use crate::identifier::AttachmentPath;
use crate::models::{AttachmentLocator, Environment};

use super::{AttachmentRecord, AttachmentStore};

struct StoredAttachment {
    plan_id: Option<String>,
    path: AttachmentPath,
    url: String,
    bytes: Vec<u8>,
}

/// In-memory attachment store.
pub struct InMemoryAttachmentStore {
    base_url: Url,
    attachments: RwLock<Vec<StoredAttachment>>,
    list_calls: AtomicUsize,
    content_calls: AtomicUsize,
    list_failure: RwLock<Option<String>>,
    content_failure: RwLock<Option<String>>,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::with_base_url(Url::parse("memory://attachments/_apis/").expect("static url"))
    }

    pub fn with_base_url(base_url: Url) -> Self {
        Self {
            base_url,
            attachments: RwLock::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            content_calls: AtomicUsize::new(0),
            list_failure: RwLock::new(None),
            content_failure: RwLock::new(None),
        }
    }

    /// Store an attachment and return its self link.
    pub fn insert(&self, plan_id: Option<&str>, path: AttachmentPath, bytes: Vec<u8>) -> String {
        let url = self.url_for(&path);
        self.attachments.write().unwrap().push(StoredAttachment {
            plan_id: plan_id.map(str::to_string),
            path,
            url: url.clone(),
            bytes,
        });
        url
    }

    /// Self link for an attachment path under this store's base URL.
    pub fn url_for(&self, path: &AttachmentPath) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(path.segments());
        }
        url.to_string()
    }

    /// Make every subsequent listing fail with `message` (`None` clears it).
    pub fn fail_listing(&self, message: Option<&str>) {
        *self.list_failure.write().unwrap() = message.map(str::to_string);
    }

    /// Make every subsequent content fetch fail with `message` (`None` clears it).
    pub fn fail_content(&self, message: Option<&str>) {
        *self.content_failure.write().unwrap() = message.map(str::to_string);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn content_calls(&self) -> usize {
        self.content_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.attachments.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAttachmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn list_attachments(
        &self,
        _env: &Environment,
        plan_id: Option<&str>,
        attachment_type: &str,
    ) -> Result<Vec<AttachmentRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.list_failure.read().unwrap().clone() {
            bail!(message);
        }
        let attachments = self.attachments.read().unwrap();
        Ok(attachments
            .iter()
            .filter(|a| a.plan_id.as_deref() == plan_id)
            .filter(|a| a.path.attachment_type == attachment_type)
            .map(|a| AttachmentRecord::from_url(a.url.clone()))
            .collect())
    }

    async fn get_attachment_content(
        &self,
        _env: &Environment,
        locator: &AttachmentLocator,
    ) -> Result<Vec<u8>> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.content_failure.read().unwrap().clone() {
            bail!(message);
        }
        let attachments = self.attachments.read().unwrap();
        attachments
            .iter()
            .find(|a| {
                a.plan_id == locator.plan_id
                    && a.path.timeline_id == locator.timeline_id
                    && a.path.record_id == locator.record_id
                    && a.path.attachment_type == locator.attachment_type
                    && a.path.name == locator.name
            })
            .map(|a| a.bytes.clone())
            .ok_or_else(|| anyhow!("attachment not found: {}", locator.name))
    }
}
