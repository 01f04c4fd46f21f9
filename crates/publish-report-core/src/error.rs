//! Error kinds for the producer and consumer pipelines.
//!
//! Producer kinds (`InvalidInput`, `NoReportsFound`, `ConversionFailed`,
//! `PublishFailed`) are fatal for the pipeline step. Consumer kinds
//! (`CatalogFailed`, `FetchFailed`) are recovered by the viewer into a
//! displayed message.

/// Errors raised while publishing or viewing reports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    /// Empty or malformed pattern, or missing required configuration.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A pattern resolved to zero report sources.
    #[error("no reports found: {0}")]
    NoReportsFound(String),

    /// A report source could not be inlined into a single document.
    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    /// Writing or registering the attachment failed.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// Listing attachments for the run failed.
    #[error("catalog failed: {0}")]
    CatalogFailed(String),

    /// Retrieving or decoding attachment content failed.
    #[error("fetch failed: {0}")]
    FetchFailed(String),
}

impl ReportError {
    /// The underlying message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            ReportError::InvalidInput(m)
            | ReportError::NoReportsFound(m)
            | ReportError::ConversionFailed(m)
            | ReportError::PublishFailed(m)
            | ReportError::CatalogFailed(m)
            | ReportError::FetchFailed(m) => m,
        }
    }

    /// Short machine-readable code, used in JSON output and HTTP errors.
    pub fn code(&self) -> &'static str {
        match self {
            ReportError::InvalidInput(_) => "invalid_input",
            ReportError::NoReportsFound(_) => "no_reports_found",
            ReportError::ConversionFailed(_) => "conversion_failed",
            ReportError::PublishFailed(_) => "publish_failed",
            ReportError::CatalogFailed(_) => "catalog_failed",
            ReportError::FetchFailed(_) => "fetch_failed",
        }
    }
}
