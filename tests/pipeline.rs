//! End-to-end tests for the publish → view round trip.
//!
//! A producer step publishes real HTML through the [`HtmlInliner`] into a
//! [`LocalAttachmentStore`]; a viewer session then lists, decodes, and
//! renders those attachments through the same store. The two halves only
//! share the directory layout, exactly as producer and consumer only share
//! the attachment addressing convention in a pipeline.

use publish_report::config::{Config, StoreKind};
use publish_report::host::{AgentCommandRegistrar, CommandSink};
use publish_report::inline::HtmlInliner;
use publish_report::progress::NoProgress;
use publish_report::publish::{open_registrar, run_publish, AttachmentPublisher, PublishRequest};
use publish_report::store_local::{LocalAttachmentStore, StepTarget};
use publish_report_core::catalog::build_catalog;
use publish_report_core::models::{Environment, ItemKey, RunScope};
use publish_report_core::tabs::{ReportSession, TabState, EMPTY_MESSAGE};
use publish_report_core::view::{Pane, ViewModel};
use publish_report_core::ReportError;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ─── Fixtures ───────────────────────────────────────────────────────

fn write_report(dir: &Path, title: &str) {
    fs::create_dir_all(dir.join("css")).unwrap();
    fs::write(dir.join("css/style.css"), "h1 { color: green; }").unwrap();
    fs::write(
        dir.join("index.html"),
        format!(
            "<html><head><link rel=\"stylesheet\" href=\"css/style.css\"></head>\
             <body><h1>{}</h1></body></html>",
            title
        ),
    )
    .unwrap();
}

fn workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write_report(&tmp.path().join("reports/unit"), "unit");
    write_report(&tmp.path().join("reports/e2e"), "e2e");
    write_report(&tmp.path().join("coverage"), "coverage");
    tmp
}

fn build_env() -> Environment {
    Environment {
        project_id: "proj".to_string(),
        name: "nightly".to_string(),
        scope: RunScope::Build { build_id: 42 },
    }
}

fn step() -> StepTarget {
    StepTarget {
        plan_id: None,
        timeline_id: "tl-9".to_string(),
        record_id: "job-3".to_string(),
        category: "build".to_string(),
    }
}

// ─── Round trip ─────────────────────────────────────────────────────

#[tokio::test]
async fn published_reports_are_viewable() {
    let ws = workspace();
    let temp = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();

    let publisher =
        AttachmentPublisher::new(temp.path(), LocalAttachmentStore::for_step(root.path(), step()));
    let request =
        PublishRequest::from_inputs("reports/*/index.html, coverage/index.html", "Tests,Coverage", ',')
            .unwrap();

    let published = run_publish(
        &request,
        ws.path(),
        &HtmlInliner::new(),
        &publisher,
        &NoProgress,
    )
    .await
    .unwrap();
    let names: Vec<_> = published.iter().map(|p| p.filename.as_str()).collect();
    assert_eq!(names, vec!["1.1-Tests.html", "1.2-Tests.html", "Coverage.html"]);

    let reader = LocalAttachmentStore::new(root.path());
    let items = build_catalog(&reader, &build_env()).await.unwrap();
    let labels: Vec<_> = items.iter().map(|i| i.friendly_name.as_str()).collect();
    assert_eq!(labels, vec!["1.1-Tests", "1.2-Tests", "Coverage"]);
    for item in &items {
        assert_eq!(item.timeline_id, "tl-9");
        assert_eq!(item.record_id, "job-3");
        assert_eq!(item.key, ItemKey::derive("job-3", &item.name));
    }

    let mut session = ReportSession::new(&reader, build_env());
    let first = items[0].key.clone();
    assert_eq!(session.start().await, &TabState::Ready(first));

    let coverage = items[2].key.clone();
    assert_eq!(session.select(&coverage).await, &TabState::Ready(coverage.clone()));

    let view = ViewModel::project(session.controller(), "nightly");
    match &view.pane {
        Pane::Document { html } => {
            assert!(html.contains("<h1>coverage</h1>"));
            assert!(html.contains("h1 { color: green; }"));
            assert!(!html.contains("css/style.css"));
        }
        other => panic!("expected a document, got {:?}", other),
    }
    assert!(view.tabs[2].selected);
    assert!(view.download.unwrap().url.ends_with("/publish-report/Coverage.html"));
}

#[tokio::test]
async fn empty_store_is_an_empty_session() {
    let root = TempDir::new().unwrap();
    let reader = LocalAttachmentStore::new(root.path());
    let mut session = ReportSession::new(&reader, build_env());
    assert_eq!(
        session.start().await,
        &TabState::Empty(EMPTY_MESSAGE.to_string())
    );
}

#[tokio::test]
async fn missing_report_publishes_nothing() {
    let ws = workspace();
    let temp = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let publisher =
        AttachmentPublisher::new(temp.path(), LocalAttachmentStore::for_step(root.path(), step()));
    let request =
        PublishRequest::from_inputs("coverage/index.html,missing/*.html", "", ',').unwrap();

    let err = run_publish(&request, ws.path(), &HtmlInliner::new(), &publisher, &NoProgress)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ReportError::NoReportsFound("No reports found with filepath pattern missing/*.html".to_string())
    );

    // The first pattern was already published; nothing after the failure.
    let items = build_catalog(&LocalAttachmentStore::new(root.path()), &build_env())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
}

// ─── Agent registration ─────────────────────────────────────────────

#[tokio::test]
async fn agent_registrar_emits_attachment_commands() {
    let ws = workspace();
    let temp = TempDir::new().unwrap();
    let sink = CommandSink::buffer();
    let publisher = AttachmentPublisher::new(temp.path(), AgentCommandRegistrar::new(sink.clone()));
    let request = PublishRequest::from_inputs("coverage/index.html", "Coverage", ',').unwrap();

    let published = run_publish(&request, ws.path(), &HtmlInliner::new(), &publisher, &NoProgress)
        .await
        .unwrap();

    let lines = sink.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(
        lines[0],
        format!(
            "##vso[task.addattachment type=publish-report;name=Coverage.html;]{}",
            published[0].temp_path.display()
        )
    );
    assert!(published[0].temp_path.is_file());
}

#[tokio::test]
async fn config_selects_local_registrar() {
    let ws = workspace();
    let temp = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();

    let mut cfg = Config::minimal();
    cfg.store.kind = StoreKind::Local;
    cfg.store.root = Some(root.path().to_path_buf());
    cfg.producer.timeline_id = Some("tl-1".to_string());
    cfg.producer.record_id = Some("job-1".to_string());

    let sink = CommandSink::buffer();
    let publisher = AttachmentPublisher::new(temp.path(), open_registrar(&cfg, &sink).unwrap());
    let request = PublishRequest::from_inputs("coverage/index.html", "", ',').unwrap();
    run_publish(&request, ws.path(), &HtmlInliner::new(), &publisher, &NoProgress)
        .await
        .unwrap();

    assert!(sink.lines().is_empty());
    assert!(root
        .path()
        .join("tl-1/job-1/build/publish-report/Report.html")
        .is_file());
}

#[tokio::test]
async fn build_step_publishes_where_build_viewer_looks() {
    let ws = workspace();
    let temp = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();

    // Build agents export a plan id as well; it must not move the tree.
    let vars = [
        ("SYSTEM_TEAMPROJECTID", "proj"),
        ("BUILD_BUILDID", "5"),
        ("SYSTEM_PLANID", "plan-1"),
        ("SYSTEM_TIMELINEID", "tl"),
        ("SYSTEM_JOBID", "job"),
    ];
    let mut cfg = Config::minimal();
    cfg.store.kind = StoreKind::Local;
    cfg.store.root = Some(root.path().to_path_buf());
    cfg.apply_agent_variables(|k| {
        vars.iter()
            .find(|(name, _)| *name == k)
            .map(|(_, v)| v.to_string())
    })
    .unwrap();

    let publisher =
        AttachmentPublisher::new(temp.path(), open_registrar(&cfg, &CommandSink::buffer()).unwrap());
    let request = PublishRequest::from_inputs("coverage/index.html", "R", ',').unwrap();
    run_publish(&request, ws.path(), &HtmlInliner::new(), &publisher, &NoProgress)
        .await
        .unwrap();

    let env = publish_report::config::resolve_environment(&cfg).unwrap();
    let items = build_catalog(&LocalAttachmentStore::new(root.path()), &env)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "R.html");
    assert!(!root.path().join("plans").exists());
}

struct ClosedStdout;

impl std::io::Write for ClosedStdout {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn unwritable_agent_command_fails_the_step() {
    let ws = workspace();
    let temp = TempDir::new().unwrap();
    let publisher = AttachmentPublisher::new(
        temp.path(),
        AgentCommandRegistrar::new(CommandSink::writer(ClosedStdout)),
    );
    let request = PublishRequest::from_inputs("coverage/index.html", "Coverage", ',').unwrap();

    let err = run_publish(&request, ws.path(), &HtmlInliner::new(), &publisher, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::PublishFailed(_)));
    assert!(err.message().contains("Coverage.html"));
}
