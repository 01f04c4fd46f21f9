//! Attachment identifier paths.
//!
//! Every attachment is addressable by a URL whose path ends in five
//! segments, most specific last:
//!
//! ```text
//! .../{timelineId}/{recordId}/{category}/{type}/{name}
//! ```
//!
//! The producer's storage layout and the viewer's decoder must agree on this
//! order exactly. [`AttachmentPath::decode`] pops the segments from the end
//! in the order name, type, category, record id, timeline id.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::ReportError;

/// The scoping metadata carried by an attachment URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPath {
    pub timeline_id: String,
    pub record_id: String,
    pub category: String,
    pub attachment_type: String,
    pub name: String,
}

impl AttachmentPath {
    /// Decode the trailing five path segments of an attachment URL.
    ///
    /// Segments are split on `/` first and then percent-decoded, so an
    /// encoded slash inside a name does not shift the layout.
    pub fn decode(url: &str) -> Result<Self, ReportError> {
        let parsed = Url::parse(url).map_err(|e| {
            ReportError::CatalogFailed(format!("invalid attachment url '{}': {}", url, e))
        })?;

        let mut segments = parsed
            .path_segments()
            .ok_or_else(|| {
                ReportError::CatalogFailed(format!("attachment url has no path: {}", url))
            })?
            .map(|s| {
                percent_decode_str(s)
                    .decode_utf8()
                    .map(|decoded| decoded.into_owned())
                    .map_err(|e| {
                        ReportError::CatalogFailed(format!(
                            "attachment url segment '{}' is not UTF-8 ({}): {}",
                            s, e, url
                        ))
                    })
            })
            .collect::<Result<Vec<String>, ReportError>>()?;

        let mut pop = |what: &str| {
            segments.pop().ok_or_else(|| {
                ReportError::CatalogFailed(format!(
                    "attachment url is missing the {} segment: {}",
                    what, url
                ))
            })
        };

        let name = pop("name")?;
        let attachment_type = pop("type")?;
        let category = pop("category")?;
        let record_id = pop("record id")?;
        let timeline_id = pop("timeline id")?;

        if name.is_empty() {
            return Err(ReportError::CatalogFailed(format!(
                "attachment url has an empty name: {}",
                url
            )));
        }

        Ok(Self {
            timeline_id,
            record_id,
            category,
            attachment_type,
            name,
        })
    }

    /// The five segments in storage order, for building paths and URLs.
    pub fn segments(&self) -> [&str; 5] {
        [
            &self.timeline_id,
            &self.record_id,
            &self.category,
            &self.attachment_type,
            &self.name,
        ]
    }
}
