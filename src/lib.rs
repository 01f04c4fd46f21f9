//! # Publish Report
//!
//! Publish HTML reports from a CI pipeline step as run attachments, and view
//! them later in a tabbed viewer.
//!
//! ## Architecture
//!
//! ```text
//!  producer (pipeline step)                          consumer (viewer)
//! ┌──────────┐  ┌─────────┐  ┌──────────┐       ┌─────────┐  ┌──────────────┐
//! │ resolve  │─▶│ inline  │─▶│ publish  │──┐ ┌─▶│ catalog │─▶│ TabController│
//! │ patterns │  │ (HTML)  │  │ + names  │  │ │  └─────────┘  └──────┬───────┘
//! └──────────┘  └─────────┘  └──────────┘  ▼ │                      ▼
//!                                    ┌──────────────┐        ┌──────────┐
//!                                    │  attachment  │        │ CLI/HTTP │
//!                                    │    store     │        │  viewer  │
//!                                    └──────────────┘        └──────────┘
//! ```
//!
//! The two halves share nothing at runtime. They agree only on the
//! attachment type (`publish-report`) and on the five trailing path segments
//! of an attachment URL: `{timelineId}/{recordId}/{category}/{type}/{name}`.
//!
//! ## Quick Start
//!
//! ```bash
//! publish-report publish --html-path "reports/**/*.html" --report-name Tests
//! publish-report list
//! publish-report show <key> --out report.html
//! publish-report serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and agent variables |
//! | [`resolve`] | Pattern → report sources |
//! | [`inline`] | Self-contained HTML documents |
//! | [`publish`] | Producer pipeline |
//! | [`host`] | Pipeline agent logging commands |
//! | [`progress`] | Publish progress reporting |
//! | [`store_local`] | Directory-backed attachment store |
//! | [`store_host`] | Host REST attachment store |
//! | [`viewer`] | `list` / `show` commands |
//! | [`server`] | HTTP viewer |
//! | [`traits`] | Inliner and registrar seams |
//!
//! Runtime-free logic (naming, identifier decoding, catalog, tab state)
//! lives in the `publish-report-core` crate.

pub mod config;
pub mod host;
pub mod inline;
pub mod progress;
pub mod publish;
pub mod resolve;
pub mod server;
pub mod store_host;
pub mod store_local;
pub mod traits;
pub mod viewer;
