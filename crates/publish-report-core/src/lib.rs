//! # Publish Report Core
//!
//! Shared, runtime-free logic for publish-report: the data model, error
//! kinds, attachment naming, attachment identifier decoding, the attachment
//! store abstraction, and the viewer state machine.
//!
//! This crate contains no tokio, filesystem I/O, or HTTP client. The
//! producer (pipeline step) and the consumer (report viewer) both depend on
//! it, which keeps the naming and addressing contract between them in one
//! place.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Report sources, inlined documents, report items, run environment |
//! | [`error`] | [`ReportError`] kinds shared by producer and consumer |
//! | [`naming`] | Collision-free display names for published reports |
//! | [`identifier`] | Decoding attachment URLs into scoping metadata |
//! | [`store`] | [`store::AttachmentStore`] trait and an in-memory store |
//! | [`catalog`] | Listing and decoding the attachments of a run |
//! | [`cache`] | Fetch-once content retrieval for report items |
//! | [`tabs`] | The viewer tab state machine and its session driver |
//! | [`view`] | Pure projection of viewer state for rendering |

pub mod cache;
pub mod catalog;
pub mod error;
pub mod identifier;
pub mod models;
pub mod naming;
pub mod store;
pub mod tabs;
pub mod view;

pub use error::ReportError;

/// Attachment type under which every report is published.
pub const ATTACHMENT_TYPE: &str = "publish-report";

/// File suffix every published attachment name carries.
pub const REPORT_SUFFIX: &str = ".html";
