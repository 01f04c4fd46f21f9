//! Attachment catalog: the list of reports published for a run.
//!
//! Lists every `publish-report` attachment scoped to an [`Environment`] and
//! decodes each into a [`ReportItem`]. Release scopes are listed phase by
//! phase and concatenated in phase order. An empty catalog is not an error.

use std::collections::HashSet;

use crate::error::ReportError;
use crate::identifier::AttachmentPath;
use crate::models::{Environment, ReportItem};
use crate::store::{AttachmentRecord, AttachmentStore};
use crate::ATTACHMENT_TYPE;

/// Build the catalog of report items for `env`.
///
/// # Errors
///
/// Returns [`ReportError::CatalogFailed`] if a listing call fails or an
/// attachment link cannot be decoded.
pub async fn build_catalog<S>(store: &S, env: &Environment) -> Result<Vec<ReportItem>, ReportError>
where
    S: AttachmentStore + ?Sized,
{
    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for plan_id in env.scope.phases() {
        let records = store
            .list_attachments(env, plan_id, ATTACHMENT_TYPE)
            .await
            .map_err(|e| ReportError::CatalogFailed(e.to_string()))?;

        tracing::debug!(
            plan_id = plan_id.unwrap_or("-"),
            count = records.len(),
            "listed report attachments"
        );

        for record in &records {
            let item = decode_record(record, plan_id)?;
            if !seen.insert(item.key.clone()) {
                tracing::warn!(report = %item.name, record_id = %item.record_id, "duplicate report attachment skipped");
                continue;
            }
            items.push(item);
        }
    }

    Ok(items)
}

/// Decode one listing entry into a [`ReportItem`].
///
/// Explicit ids on the record win; anything missing comes from the
/// five-segment URL layout.
pub fn decode_record(
    record: &AttachmentRecord,
    plan_id: Option<&str>,
) -> Result<ReportItem, ReportError> {
    let (timeline_id, record_id, name) =
        match (&record.timeline_id, &record.record_id, &record.name) {
            (Some(t), Some(r), Some(n)) => (t.clone(), r.clone(), n.clone()),
            (t, r, n) => {
                let path = AttachmentPath::decode(&record.url)?;
                (
                    t.clone().unwrap_or(path.timeline_id),
                    r.clone().unwrap_or(path.record_id),
                    n.clone().unwrap_or(path.name),
                )
            }
        };

    Ok(ReportItem::new(
        record.url.clone(),
        timeline_id,
        record_id,
        name,
        plan_id.map(str::to_string),
    ))
}
