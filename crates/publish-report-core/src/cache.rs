//! Fetch-once content retrieval for report items.
//!
//! Content is memoized on the [`ReportItem`] itself: once an item holds
//! non-empty content, [`ensure_content`] returns it without touching the
//! store. A failed fetch leaves the item without content so the next
//! selection retries.

use crate::error::ReportError;
use crate::models::{AttachmentLocator, Environment, ReportItem};
use crate::store::AttachmentStore;

/// Fetch and decode one item's content without modifying the item.
///
/// # Errors
///
/// Returns [`ReportError::FetchFailed`] if the store call fails or the bytes
/// are not valid UTF-8.
pub async fn fetch_content<S>(
    store: &S,
    env: &Environment,
    item: &ReportItem,
) -> Result<String, ReportError>
where
    S: AttachmentStore + ?Sized,
{
    let locator = AttachmentLocator::for_item(item);
    tracing::debug!(report = %item.name, record_id = %item.record_id, "fetching report content");

    let bytes = store
        .get_attachment_content(env, &locator)
        .await
        .map_err(|e| ReportError::FetchFailed(e.to_string()))?;

    String::from_utf8(bytes).map_err(|e| {
        ReportError::FetchFailed(format!("{} is not valid UTF-8: {}", item.name, e))
    })
}

/// Make sure `item` holds its content, fetching it at most once.
pub async fn ensure_content<'a, S>(
    store: &S,
    env: &Environment,
    item: &'a mut ReportItem,
) -> Result<&'a str, ReportError>
where
    S: AttachmentStore + ?Sized,
{
    if !item.has_content() {
        let content = fetch_content(store, env, item).await?;
        item.content = Some(content);
    }
    Ok(item.content.as_deref().unwrap_or_default())
}
