//! Publish progress reporting.
//!
//! Reports observable progress while `publish-report publish` resolves,
//! inlines, and uploads reports. Human and JSON progress go to **stderr** so
//! stdout stays reserved for agent commands; agent progress is itself an
//! agent command and goes to stdout.

use std::io::Write;

use crate::host::{AgentCommand, CommandSink};

/// A single progress event for a publish run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishProgressEvent {
    /// A pattern resolved to `count` sources.
    Resolved { pattern: String, count: usize },
    /// Source `n` of `total` for the current pattern was uploaded.
    Uploaded {
        source: String,
        name: String,
        n: usize,
        total: usize,
    },
    /// Pattern `completed` of `total` finished.
    PatternDone { completed: usize, total: usize },
}

impl PublishProgressEvent {
    /// Overall completion, by pattern.
    pub fn percent(completed: usize, total: usize) -> u32 {
        if total == 0 {
            return 100;
        }
        ((completed as f64 / total as f64) * 100.0).round() as u32
    }
}

/// Reports publish progress.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: PublishProgressEvent);
}

/// Human-friendly progress on stderr.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: PublishProgressEvent) {
        let line = match &event {
            PublishProgressEvent::Resolved { pattern, count } => {
                format!("publish {}  found {} report(s)\n", pattern, count)
            }
            PublishProgressEvent::Uploaded {
                source,
                name,
                n,
                total,
            } => format!("publish {}  uploaded as {}  {} / {}\n", source, name, n, total),
            PublishProgressEvent::PatternDone { completed, total } => format!(
                "publish  {}%  ({} / {} patterns)\n",
                PublishProgressEvent::percent(*completed, *total),
                completed,
                total
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: PublishProgressEvent) {
        let obj = match &event {
            PublishProgressEvent::Resolved { pattern, count } => serde_json::json!({
                "event": "progress",
                "phase": "resolved",
                "pattern": pattern,
                "count": count
            }),
            PublishProgressEvent::Uploaded {
                source,
                name,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "phase": "uploaded",
                "source": source,
                "name": name,
                "n": n,
                "total": total
            }),
            PublishProgressEvent::PatternDone { completed, total } => serde_json::json!({
                "event": "progress",
                "phase": "pattern_done",
                "completed": completed,
                "total": total,
                "percent": PublishProgressEvent::percent(*completed, *total)
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// Agent progress: `##vso[task.setprogress]` after each pattern.
pub struct AgentProgress {
    sink: CommandSink,
}

impl AgentProgress {
    pub fn new(sink: CommandSink) -> Self {
        Self { sink }
    }
}

impl ProgressReporter for AgentProgress {
    fn report(&self, event: PublishProgressEvent) {
        if let PublishProgressEvent::PatternDone { completed, total } = event {
            let _ = self.sink.emit(&AgentCommand::set_progress(
                PublishProgressEvent::percent(completed, total),
                "Uploading reports",
            ));
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: PublishProgressEvent) {}
}

/// Progress mode for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
    Agent,
}

impl ProgressMode {
    /// Agent progress under a pipeline agent, human progress when stderr is
    /// a TTY, otherwise off.
    pub fn detect(under_agent: bool) -> Self {
        if under_agent {
            ProgressMode::Agent
        } else if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self, sink: &CommandSink) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
            ProgressMode::Agent => Box::new(AgentProgress::new(sink.clone())),
        }
    }
}
