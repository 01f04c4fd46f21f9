//! Attachment store abstraction.
//!
//! The [`AttachmentStore`] trait is the consumer's view of the run-scoped
//! attachment store: list the attachments of one type for a run phase, and
//! fetch the bytes of one attachment. Backends: the host REST API, a local
//! directory laid out by the addressing contract, and the in-memory store in
//! [`memory`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{AttachmentLocator, Environment};

/// One entry from an attachment listing.
///
/// `url` is the attachment's self link. Backends whose self links do not
/// follow the five-segment layout fill the explicit ids, which then take
/// precedence over decoding the URL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttachmentRecord {
    pub url: String,
    pub timeline_id: Option<String>,
    pub record_id: Option<String>,
    pub name: Option<String>,
}

impl AttachmentRecord {
    /// A record that is fully described by its URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Run-scoped attachment storage, as used by the viewer.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// List attachments of `attachment_type` for the run in `env`.
    ///
    /// `plan_id` selects one execution phase for release scopes and is
    /// `None` for build scopes.
    async fn list_attachments(
        &self,
        env: &Environment,
        plan_id: Option<&str>,
        attachment_type: &str,
    ) -> Result<Vec<AttachmentRecord>>;

    /// Fetch the raw bytes of one attachment.
    async fn get_attachment_content(
        &self,
        env: &Environment,
        locator: &AttachmentLocator,
    ) -> Result<Vec<u8>>;
}

#[async_trait]
impl<'a, S: AttachmentStore + ?Sized> AttachmentStore for &'a S {
    async fn list_attachments(
        &self,
        env: &Environment,
        plan_id: Option<&str>,
        attachment_type: &str,
    ) -> Result<Vec<AttachmentRecord>> {
        (**self).list_attachments(env, plan_id, attachment_type).await
    }

    async fn get_attachment_content(
        &self,
        env: &Environment,
        locator: &AttachmentLocator,
    ) -> Result<Vec<u8>> {
        (**self).get_attachment_content(env, locator).await
    }
}

#[async_trait]
impl<S: AttachmentStore + ?Sized> AttachmentStore for Arc<S> {
    async fn list_attachments(
        &self,
        env: &Environment,
        plan_id: Option<&str>,
        attachment_type: &str,
    ) -> Result<Vec<AttachmentRecord>> {
        (**self).list_attachments(env, plan_id, attachment_type).await
    }

    async fn get_attachment_content(
        &self,
        env: &Environment,
        locator: &AttachmentLocator,
    ) -> Result<Vec<u8>> {
        (**self).get_attachment_content(env, locator).await
    }
}
