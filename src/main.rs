//! # Publish Report CLI (`publish-report`)
//!
//! ## Usage
//!
//! ```bash
//! publish-report --config ./config/publish-report.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `publish-report publish` | Inline and attach reports to the current run |
//! | `publish-report list` | List the reports published for a run |
//! | `publish-report show [key]` | Print one report's document |
//! | `publish-report serve` | Start the HTTP viewer |
//!
//! Inside a pipeline step, `publish` reads its inputs from `INPUT_HTMLPATH`
//! and `INPUT_REPORTNAME`, and every run identifier from the agent's
//! variables, so it needs no flags at all.

use anyhow::Result;
use clap::{Parser, Subcommand};
use publish_report::config::{self, Config};
use publish_report::host::{report_failure, CommandSink};
use publish_report::inline::HtmlInliner;
use publish_report::progress::ProgressMode;
use publish_report::publish::{open_registrar, run_publish, AttachmentPublisher, PublishRequest};
use publish_report::{server, viewer};
use publish_report_core::ReportError;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Publish HTML reports as pipeline run attachments and view them.
#[derive(Parser)]
#[command(
    name = "publish-report",
    about = "Publish HTML reports as pipeline run attachments and view them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Optional; agent variables fill
    /// anything it leaves unset.
    #[arg(long, global = true, default_value = "./config/publish-report.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inline each matched report and attach it to the current run.
    Publish {
        /// Delimited list of report paths, glob patterns, or URLs.
        #[arg(long, env = "INPUT_HTMLPATH", default_value = "")]
        html_path: String,

        /// Delimited list of base names, aligned with `--html-path`.
        #[arg(long, env = "INPUT_REPORTNAME", default_value = "")]
        report_name: String,

        /// Progress output. Defaults to agent commands under a pipeline
        /// agent, human lines on a terminal, otherwise off.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Print a JSON summary of the published reports on stderr (stdout
        /// carries agent commands).
        #[arg(long)]
        json: bool,
    },

    /// List the reports published for the configured run.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Print a report's document (the first report when no key is given).
    Show {
        /// Item key, as printed by `list`.
        key: Option<String>,

        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Start the HTTP viewer on `[server].bind`.
    Serve {
        /// Override the bind address.
        #[arg(long)]
        bind: Option<String>,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn under_agent() -> bool {
    std::env::var_os("TF_BUILD").is_some()
}

fn load(path: &Path) -> Result<Config> {
    let mut cfg = config::load_or_default(path)?;
    cfg.apply_agent_variables(|key| std::env::var(key).ok())?;
    Ok(cfg)
}

fn banner(title: &str) {
    println!();
    println!("=======================================");
    println!("\t{}", title);
    println!("=======================================");
    println!();
}

fn heading(title: &str) {
    println!();
    println!("> {}", title);
}

async fn publish(
    config_path: &Path,
    sink: &CommandSink,
    html_path: &str,
    report_name: &str,
    progress: Option<ProgressMode>,
    json: bool,
) -> Result<()> {
    tracing::info!("Publish Report {}", env!("CARGO_PKG_VERSION"));
    let cfg = &load(config_path)?;

    let request = PublishRequest::from_inputs(html_path, report_name, cfg.producer.delimiter)?;
    banner("Save a report in pipeline");
    let working_dir = cfg.working_dir()?;
    let reporter = progress
        .unwrap_or_else(|| ProgressMode::detect(under_agent()))
        .reporter(sink);
    let publisher = AttachmentPublisher::new(cfg.temp_dir(), open_registrar(cfg, sink)?);

    let published = run_publish(
        &request,
        &working_dir,
        &HtmlInliner::new(),
        &publisher,
        reporter.as_ref(),
    )
    .await?;

    tracing::info!(count = published.len(), "Reports published");
    heading("Report has been saved successfully in pipeline !");
    if json {
        eprintln!("{}", serde_json::to_string_pretty(&published)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Publish {
            html_path,
            report_name,
            progress,
            json,
        } => {
            let sink = CommandSink::Stdout;
            let result =
                publish(&cli.config, &sink, &html_path, &report_name, progress, json).await;
            if let Err(err) = result {
                let message = err
                    .downcast_ref::<ReportError>()
                    .map(|e| e.message().to_string())
                    .unwrap_or_else(|| format!("{:#}", err));
                tracing::error!("{}", message);
                if under_agent() {
                    report_failure(&sink, &message);
                }
                return Err(err);
            }
        }
        Commands::List { json } => {
            let cfg = load(&cli.config)?;
            let env = viewer::resolve_run(&cfg).await?;
            let store = viewer::open_store(&cfg)?;
            viewer::run_list(store.as_ref(), &env, json).await?;
        }
        Commands::Show { key, out } => {
            let cfg = load(&cli.config)?;
            let env = viewer::resolve_run(&cfg).await?;
            let store = viewer::open_store(&cfg)?;
            let html = viewer::show_report(store.as_ref(), &env, key.as_deref()).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, html).await?;
                    tracing::info!(path = %path.display(), "report written");
                }
                None => print!("{}", html),
            }
        }
        Commands::Serve { bind } => {
            let cfg = load(&cli.config)?;
            let env = viewer::resolve_run(&cfg).await?;
            let store = viewer::open_store(&cfg)?;
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            server::run_server(&bind, store, env).await?;
        }
    }

    Ok(())
}
