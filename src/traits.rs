//! Capability traits for the producer pipeline.
//!
//! The producer depends on two external collaborators, each behind one
//! trait so the pipeline runs the same against the real agent, a local
//! store, or test doubles:
//!
//! ```text
//!  ReportSource ──▶ Inliner ──▶ InlinedDocument ──▶ AttachmentPublisher ──▶ AttachmentRegistrar
//!                  (HtmlInliner)                    (temp file)             (agent / local store)
//! ```
//!
//! The consumer's counterpart is
//! [`AttachmentStore`](publish_report_core::store::AttachmentStore) in the
//! core crate.

use anyhow::Result;
use async_trait::async_trait;
use publish_report_core::models::{InlinedDocument, ReportSource};
use std::path::Path;
use std::sync::Arc;

/// Converts one report source into a single self-contained document.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use publish_report::traits::Inliner;
/// use publish_report_core::models::{InlinedDocument, ReportSource};
///
/// struct Verbatim;
///
/// #[async_trait]
/// impl Inliner for Verbatim {
///     async fn inline(&self, source: &ReportSource) -> Result<InlinedDocument> {
///         Ok(InlinedDocument::new(format!("<p>{}</p>", source)))
///     }
/// }
/// ```
#[async_trait]
pub trait Inliner: Send + Sync {
    /// Load `source` and inline every external resource it references.
    ///
    /// Errors are reported to the step as
    /// [`ReportError::ConversionFailed`](publish_report_core::ReportError::ConversionFailed).
    async fn inline(&self, source: &ReportSource) -> Result<InlinedDocument>;
}

/// Registers a file as an attachment of the current run.
#[async_trait]
pub trait AttachmentRegistrar: Send + Sync {
    /// Attach `file_path` to the run as `filename` under `attachment_type`.
    async fn add_attachment(
        &self,
        attachment_type: &str,
        filename: &str,
        file_path: &Path,
    ) -> Result<()>;
}

#[async_trait]
impl<T: Inliner + ?Sized> Inliner for Arc<T> {
    async fn inline(&self, source: &ReportSource) -> Result<InlinedDocument> {
        (**self).inline(source).await
    }
}

#[async_trait]
impl<T: AttachmentRegistrar + ?Sized> AttachmentRegistrar for Arc<T> {
    async fn add_attachment(
        &self,
        attachment_type: &str,
        filename: &str,
        file_path: &Path,
    ) -> Result<()> {
        (**self)
            .add_attachment(attachment_type, filename, file_path)
            .await
    }
}

#[async_trait]
impl<T: AttachmentRegistrar + ?Sized> AttachmentRegistrar for Box<T> {
    async fn add_attachment(
        &self,
        attachment_type: &str,
        filename: &str,
        file_path: &Path,
    ) -> Result<()> {
        (**self)
            .add_attachment(attachment_type, filename, file_path)
            .await
    }
}
