//! Producer pipeline.
//!
//! Runs one publishing step end to end:
//!
//! ```text
//! pattern ──▶ resolve_sources ──▶ Inliner ──▶ NameAllocator ──▶ AttachmentPublisher
//! ```
//!
//! Patterns and their sources are processed strictly in order, one inline
//! plus one publish at a time. The first error of any kind ends the run; a
//! step never reports partial success.

use chrono::{DateTime, Utc};
use publish_report_core::models::{InlinedDocument, ReportSource};
use publish_report_core::naming::NameAllocator;
use publish_report_core::{ReportError, ATTACHMENT_TYPE, REPORT_SUFFIX};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::{Config, StoreKind};
use crate::host::{AgentCommandRegistrar, CommandSink};
use crate::progress::{ProgressReporter, PublishProgressEvent};
use crate::resolve::resolve_sources;
use crate::store_local::{LocalAttachmentStore, StepTarget};
use crate::traits::{AttachmentRegistrar, Inliner};

/// Step inputs after splitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub patterns: Vec<String>,
    /// Base names, positionally aligned with `patterns`. May be shorter.
    pub names: Vec<String>,
}

impl PublishRequest {
    /// Build a request from the raw `htmlPath` and `reportName` inputs.
    pub fn from_inputs(
        html_path: &str,
        report_name: &str,
        delimiter: char,
    ) -> Result<Self, ReportError> {
        let patterns = split_delimited(html_path, delimiter);
        if patterns.is_empty() {
            return Err(ReportError::InvalidInput(
                "Report filepath cannot be empty. Please provide a path to the report."
                    .to_string(),
            ));
        }
        Ok(Self {
            patterns,
            names: split_delimited(report_name, delimiter),
        })
    }
}

/// Split a delimited input, trimming entries and dropping empty ones.
pub fn split_delimited(value: &str, delimiter: char) -> Vec<String> {
    value
        .split(delimiter)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// One attachment registered by a publishing run.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedReport {
    pub name: String,
    pub filename: String,
    pub source: String,
    pub temp_path: PathBuf,
    pub bytes: usize,
    pub published_at: DateTime<Utc>,
}

/// Writes inlined documents to the temp directory and registers them.
pub struct AttachmentPublisher<R> {
    temp_dir: PathBuf,
    registrar: R,
}

impl<R: AttachmentRegistrar> AttachmentPublisher<R> {
    pub fn new(temp_dir: impl Into<PathBuf>, registrar: R) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            registrar,
        }
    }

    pub fn registrar(&self) -> &R {
        &self.registrar
    }

    /// Persist `document` and register it as `"{name}.html"`.
    ///
    /// Returns the path of the written temp file, which must outlive the
    /// step for agent registrars.
    pub async fn publish(
        &self,
        document: &InlinedDocument,
        name: &str,
    ) -> Result<PathBuf, ReportError> {
        let filename = format!("{}{}", name, REPORT_SUFFIX);
        let path = self
            .temp_dir
            .join(format!("{}{}", Uuid::new_v4(), REPORT_SUFFIX));

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| {
                ReportError::PublishFailed(format!(
                    "failed to create {}: {}",
                    self.temp_dir.display(),
                    e
                ))
            })?;
        tokio::fs::write(&path, document.as_str())
            .await
            .map_err(|e| {
                ReportError::PublishFailed(format!("failed to write {}: {}", path.display(), e))
            })?;

        self.registrar
            .add_attachment(ATTACHMENT_TYPE, &filename, &path)
            .await
            .map_err(|e| ReportError::PublishFailed(format!("{:#}", e)))?;

        tracing::debug!(filename = %filename, path = %path.display(), "attachment registered");
        Ok(path)
    }
}

/// Run the producer pipeline for `request`.
pub async fn run_publish<I, R>(
    request: &PublishRequest,
    working_dir: &Path,
    inliner: &I,
    publisher: &AttachmentPublisher<R>,
    progress: &dyn ProgressReporter,
) -> Result<Vec<PublishedReport>, ReportError>
where
    I: Inliner + ?Sized,
    R: AttachmentRegistrar,
{
    let pattern_count = request.patterns.len();
    let mut names = NameAllocator::new(pattern_count, request.names.clone());
    let mut published = Vec::new();

    for (p, pattern) in request.patterns.iter().enumerate() {
        let sources = resolve_sources(pattern, working_dir)?;
        let source_count = sources.len();
        progress.report(PublishProgressEvent::Resolved {
            pattern: pattern.clone(),
            count: source_count,
        });

        for (s, source) in sources.iter().enumerate() {
            tracing::info!(
                "Uploading report {} - {} of {}",
                source,
                s + 1,
                source_count
            );

            let document = inliner
                .inline(source)
                .await
                .map_err(conversion_error)?;
            let name = names.allocate(p, source_count, s);
            let temp_path = publisher.publish(&document, &name).await?;

            progress.report(PublishProgressEvent::Uploaded {
                source: source.to_string(),
                name: name.clone(),
                n: s + 1,
                total: source_count,
            });
            published.push(PublishedReport {
                filename: format!("{}{}", name, REPORT_SUFFIX),
                name,
                source: source_label(source),
                temp_path,
                bytes: document.len(),
                published_at: Utc::now(),
            });
        }

        progress.report(PublishProgressEvent::PatternDone {
            completed: p + 1,
            total: pattern_count,
        });
    }

    Ok(published)
}

/// Pick the registrar for `config`: agent commands for a host store, the
/// directory layout for a local one.
pub fn open_registrar(
    config: &Config,
    sink: &CommandSink,
) -> anyhow::Result<Box<dyn AttachmentRegistrar>> {
    match config.store.kind {
        StoreKind::Host => Ok(Box::new(AgentCommandRegistrar::new(sink.clone()))),
        StoreKind::Local => {
            let Some(root) = &config.store.root else {
                anyhow::bail!("store.root must be set when store.kind is 'local'");
            };
            let producer = &config.producer;
            let release = config.run.release.is_some();
            let step = StepTarget {
                plan_id: producer.plan_id.clone().filter(|_| release),
                timeline_id: producer
                    .timeline_id
                    .clone()
                    .unwrap_or_else(|| "local".to_string()),
                record_id: producer
                    .record_id
                    .clone()
                    .unwrap_or_else(|| "publish".to_string()),
                category: if release {
                    "release".to_string()
                } else {
                    "build".to_string()
                },
            };
            tracing::debug!(root = %root.display(), ?step, "registering into local store");
            Ok(Box::new(LocalAttachmentStore::for_step(root, step)))
        }
    }
}

fn source_label(source: &ReportSource) -> String {
    match source {
        ReportSource::Url(url) => url.clone(),
        ReportSource::Path(path) => path.display().to_string(),
    }
}

fn conversion_error(err: anyhow::Error) -> ReportError {
    match err.downcast::<ReportError>() {
        Ok(e @ ReportError::ConversionFailed(_)) => e,
        Ok(other) => ReportError::ConversionFailed(other.message().to_string()),
        Err(err) => ReportError::ConversionFailed(format!("{:#}", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Verbatim;

    #[async_trait]
    impl Inliner for Verbatim {
        async fn inline(&self, source: &ReportSource) -> Result<InlinedDocument> {
            match source {
                ReportSource::Path(p) => Ok(InlinedDocument::new(fs::read_to_string(p)?)),
                ReportSource::Url(u) => Ok(InlinedDocument::new(format!("<a href=\"{}\">", u))),
            }
        }
    }

    struct Broken;

    #[async_trait]
    impl Inliner for Broken {
        async fn inline(&self, _source: &ReportSource) -> Result<InlinedDocument> {
            bail!("parser exploded")
        }
    }

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, String, PathBuf)>>,
        fail: bool,
    }

    #[async_trait]
    impl AttachmentRegistrar for Recording {
        async fn add_attachment(&self, kind: &str, filename: &str, path: &Path) -> Result<()> {
            if self.fail {
                bail!("store unavailable");
            }
            self.calls
                .lock()
                .unwrap()
                .push((kind.to_string(), filename.to_string(), path.to_path_buf()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<PublishProgressEvent>>);

    impl ProgressReporter for Events {
        fn report(&self, event: PublishProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn workspace() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("unit")).unwrap();
        fs::create_dir_all(tmp.path().join("e2e")).unwrap();
        fs::write(tmp.path().join("unit/a.html"), "<p>unit a</p>").unwrap();
        fs::write(tmp.path().join("unit/b.html"), "<p>unit b</p>").unwrap();
        fs::write(tmp.path().join("e2e/a.html"), "<p>e2e a</p>").unwrap();
        fs::write(tmp.path().join("e2e/b.html"), "<p>e2e b</p>").unwrap();
        tmp
    }

    fn filenames(registrar: &Recording) -> Vec<String> {
        registrar
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, f, _)| f.clone())
            .collect()
    }

    #[test]
    fn inputs_are_split_and_trimmed() {
        let req = PublishRequest::from_inputs(" a/*.html , ,b.html ", "Unit,", ',').unwrap();
        assert_eq!(req.patterns, vec!["a/*.html", "b.html"]);
        assert_eq!(req.names, vec!["Unit"]);
    }

    #[test]
    fn empty_html_path_is_invalid_input() {
        let err = PublishRequest::from_inputs(" , ", "Report", ',').unwrap_err();
        assert!(matches!(err, ReportError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn publishes_every_source_with_positional_names() {
        let ws = workspace();
        let temp = TempDir::new().unwrap();
        let publisher = AttachmentPublisher::new(temp.path(), Recording::default());
        let events = Events::default();
        let req = PublishRequest::from_inputs("unit/*.html,e2e/*.html", "Unit", ',').unwrap();

        let published = run_publish(&req, ws.path(), &Verbatim, &publisher, &events)
            .await
            .unwrap();

        assert_eq!(
            filenames(publisher.registrar()),
            vec![
                "1.1-Unit.html",
                "1.2-Unit.html",
                "2.1-Report.html",
                "2.2-Report.html"
            ]
        );
        assert_eq!(published.len(), 4);
        for (kind, _, path) in publisher.registrar().calls.lock().unwrap().iter() {
            assert_eq!(kind, ATTACHMENT_TYPE);
            assert!(path.starts_with(temp.path()));
        }
        assert_eq!(
            fs::read_to_string(&published[2].temp_path).unwrap(),
            "<p>e2e a</p>"
        );

        let done: Vec<_> = events
            .0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                PublishProgressEvent::PatternDone { completed, total } => Some((*completed, *total)),
                _ => None,
            })
            .collect();
        assert_eq!(done, vec![(1, 2), (2, 2)]);
    }

    #[tokio::test]
    async fn single_source_keeps_base_name() {
        let ws = workspace();
        let temp = TempDir::new().unwrap();
        let publisher = AttachmentPublisher::new(temp.path(), Recording::default());
        let req = PublishRequest::from_inputs("unit/a.html", " Coverage ", ',').unwrap();

        run_publish(&req, ws.path(), &Verbatim, &publisher, &NoProgress)
            .await
            .unwrap();
        assert_eq!(filenames(publisher.registrar()), vec!["Coverage.html"]);
    }

    #[tokio::test]
    async fn duplicate_names_are_suffixed() {
        let ws = workspace();
        let temp = TempDir::new().unwrap();
        let publisher = AttachmentPublisher::new(temp.path(), Recording::default());
        let req = PublishRequest::from_inputs("unit/a.html,e2e/a.html", "Same,Same", ',').unwrap();

        run_publish(&req, ws.path(), &Verbatim, &publisher, &NoProgress)
            .await
            .unwrap();
        assert_eq!(
            filenames(publisher.registrar()),
            vec!["Same.html", "Same-2.html"]
        );
    }

    #[tokio::test]
    async fn missing_pattern_stops_the_run() {
        let ws = workspace();
        let temp = TempDir::new().unwrap();
        let publisher = AttachmentPublisher::new(temp.path(), Recording::default());
        let req = PublishRequest::from_inputs("coverage/*.html,unit/*.html", "", ',').unwrap();

        let err = run_publish(&req, ws.path(), &Verbatim, &publisher, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::NoReportsFound(_)));
        assert!(filenames(publisher.registrar()).is_empty());
    }

    #[tokio::test]
    async fn conversion_failure_aborts_remaining_sources() {
        let ws = workspace();
        let temp = TempDir::new().unwrap();
        let publisher = AttachmentPublisher::new(temp.path(), Recording::default());
        let req = PublishRequest::from_inputs("unit/*.html", "", ',').unwrap();

        let err = run_publish(&req, ws.path(), &Broken, &publisher, &NoProgress)
            .await
            .unwrap_err();
        assert_eq!(err, ReportError::ConversionFailed("parser exploded".to_string()));
        assert!(filenames(publisher.registrar()).is_empty());
    }

    #[tokio::test]
    async fn registration_failure_is_publish_failed() {
        let ws = workspace();
        let temp = TempDir::new().unwrap();
        let registrar = Recording {
            fail: true,
            ..Default::default()
        };
        let publisher = AttachmentPublisher::new(temp.path(), registrar);
        let req = PublishRequest::from_inputs("unit/*.html", "", ',').unwrap();

        let err = run_publish(&req, ws.path(), &Verbatim, &publisher, &NoProgress)
            .await
            .unwrap_err();
        assert_eq!(err, ReportError::PublishFailed("store unavailable".to_string()));
    }

    #[tokio::test]
    async fn urls_are_published_without_existence_check() {
        let temp = TempDir::new().unwrap();
        let publisher = AttachmentPublisher::new(temp.path(), Recording::default());
        let req =
            PublishRequest::from_inputs("https://ci.example.com/report/index.html", "Live", ',')
                .unwrap();

        let published = run_publish(&req, temp.path(), &Verbatim, &publisher, &NoProgress)
            .await
            .unwrap();
        assert_eq!(published[0].source, "https://ci.example.com/report/index.html");
        assert_eq!(published[0].filename, "Live.html");
    }
}
