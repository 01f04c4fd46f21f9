//! Pipeline agent logging commands.
//!
//! The agent watches a step's stdout for lines of the form
//!
//! ```text
//! ##vso[area.action key=value;key=value;]data
//! ```
//!
//! and acts on them: registering attachments, updating progress, logging
//! issues, and setting the step result. Property values and data are
//! escaped so they cannot terminate the command early.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::traits::AttachmentRegistrar;

/// One agent logging command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    name: &'static str,
    properties: Vec<(&'static str, String)>,
    data: String,
}

impl AgentCommand {
    pub fn add_attachment(attachment_type: &str, name: &str, path: &Path) -> Self {
        Self {
            name: "task.addattachment",
            properties: vec![("type", attachment_type.to_string()), ("name", name.to_string())],
            data: path.display().to_string(),
        }
    }

    pub fn set_progress(percent: u32, text: &str) -> Self {
        Self {
            name: "task.setprogress",
            properties: vec![("value", percent.min(100).to_string())],
            data: text.to_string(),
        }
    }

    pub fn log_error(message: &str) -> Self {
        Self {
            name: "task.logissue",
            properties: vec![("type", "error".to_string())],
            data: message.to_string(),
        }
    }

    pub fn complete_failed(message: &str) -> Self {
        Self {
            name: "task.complete",
            properties: vec![("result", "Failed".to_string())],
            data: message.to_string(),
        }
    }
}

impl fmt::Display for AgentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "##vso[{}", self.name)?;
        if !self.properties.is_empty() {
            f.write_str(" ")?;
            for (key, value) in &self.properties {
                write!(f, "{}={};", key, escape_property(value))?;
            }
        }
        write!(f, "]{}", escape_data(&self.data))
    }
}

fn escape_data(value: &str) -> String {
    value
        .replace('%', "%AZP25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_property(value: &str) -> String {
    escape_data(value).replace(';', "%3B").replace(']', "%5D")
}

/// Where agent commands are written.
#[derive(Clone, Default)]
pub enum CommandSink {
    /// Process stdout, where the agent reads them.
    #[default]
    Stdout,
    /// Collected in memory (tests and dry runs).
    Buffer(Arc<Mutex<Vec<String>>>),
    /// Any other writer, e.g. a log file the agent tails.
    Writer(Arc<Mutex<Box<dyn Write + Send>>>),
}

impl CommandSink {
    pub fn buffer() -> Self {
        CommandSink::Buffer(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        CommandSink::Writer(Arc::new(Mutex::new(Box::new(writer))))
    }

    /// Write one command line. The agent only acts on commands it reads, so
    /// a failed write means the command was lost.
    pub fn emit(&self, command: &AgentCommand) -> io::Result<()> {
        match self {
            CommandSink::Stdout => {
                let mut out = io::stdout().lock();
                writeln!(out, "{}", command)?;
                out.flush()
            }
            CommandSink::Buffer(lines) => {
                lines
                    .lock()
                    .map_err(|_| io::Error::other("command buffer poisoned"))?
                    .push(command.to_string());
                Ok(())
            }
            CommandSink::Writer(writer) => {
                let mut out = writer
                    .lock()
                    .map_err(|_| io::Error::other("command writer poisoned"))?;
                writeln!(out, "{}", command)?;
                out.flush()
            }
        }
    }

    /// Lines collected so far (empty unless this is a [`CommandSink::Buffer`]).
    pub fn lines(&self) -> Vec<String> {
        match self {
            CommandSink::Buffer(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

/// Registers attachments by emitting `task.addattachment` commands.
///
/// The agent uploads the file after the step writes the command, so the
/// file must stay in place until the step ends.
#[derive(Clone, Default)]
pub struct AgentCommandRegistrar {
    sink: CommandSink,
}

impl AgentCommandRegistrar {
    pub fn new(sink: CommandSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl AttachmentRegistrar for AgentCommandRegistrar {
    async fn add_attachment(
        &self,
        attachment_type: &str,
        filename: &str,
        file_path: &Path,
    ) -> Result<()> {
        if !file_path.is_file() {
            anyhow::bail!("attachment file does not exist: {}", file_path.display());
        }
        self.sink
            .emit(&AgentCommand::add_attachment(
                attachment_type,
                filename,
                file_path,
            ))
            .with_context(|| format!("failed to register attachment {}", filename))
    }
}

/// Report a fatal step error to the agent: an error issue plus a failed result.
pub fn report_failure(sink: &CommandSink, message: &str) {
    for command in [
        AgentCommand::log_error(message),
        AgentCommand::complete_failed(message),
    ] {
        if let Err(e) = sink.emit(&command) {
            tracing::warn!(error = %e, "could not report failure to the agent");
        }
    }
}
