//! Configuration loading.
//!
//! Settings come from an optional TOML file and from the variables the
//! pipeline agent exports to every step. File values win; agent variables
//! fill whatever the file leaves unset. The run-scope [`Environment`] is
//! resolved once from the merged config by [`resolve_environment`].
//!
//! # Example
//!
//! ```toml
//! [store]
//! kind = "local"
//! root = "./attachments"
//!
//! [run]
//! project_id = "b5c1e8d2"
//! name = "nightly"
//! build_id = 1042
//!
//! [producer]
//! temp_dir = "/tmp/reports"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{bail, Context, Result};
use publish_report_core::models::{Environment, RunScope};
use publish_report_core::ReportError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// The pipeline host's attachment API.
    #[default]
    Host,
    /// A local directory using the attachment path layout.
    Local,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    /// Root directory for `kind = "local"`.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Organization URL of the host, e.g. `https://dev.azure.com/acme/`.
    #[serde(default)]
    pub collection_uri: Option<String>,
    /// Release management URL; defaults to `collection_uri`.
    #[serde(default)]
    pub release_uri: Option<String>,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Host,
            root: None,
            collection_uri: None,
            release_uri: None,
            token_env: default_token_env(),
            api_version: default_api_version(),
        }
    }
}

fn default_token_env() -> String {
    "SYSTEM_ACCESSTOKEN".to_string()
}
fn default_api_version() -> String {
    "7.1".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RunConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub build_id: Option<u64>,
    #[serde(default)]
    pub release: Option<ReleaseRunConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReleaseRunConfig {
    pub release_id: u64,
    pub environment_id: u64,
    /// Deployment attempt. Resolved from the release when unset.
    #[serde(default)]
    pub attempt_number: Option<u32>,
    /// Plans covering every phase of the attempt, in phase order. Resolved
    /// from the store when empty.
    #[serde(default)]
    pub plan_ids: Vec<String>,
}

impl ReleaseRunConfig {
    /// Attempt used to address the store.
    pub fn attempt(&self) -> u32 {
        self.attempt_number.unwrap_or(1)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProducerConfig {
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Directory glob patterns are expanded against.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Timeline and record ids used when registering into a local store.
    #[serde(default)]
    pub timeline_id: Option<String>,
    #[serde(default)]
    pub record_id: Option<String>,
    /// Plan a release step runs under; each plan keeps its own attachment
    /// tree. Ignored for build runs.
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            working_dir: None,
            timeline_id: None,
            record_id: None,
            plan_id: None,
            delimiter: default_delimiter(),
        }
    }
}

fn default_delimiter() -> char {
    ','
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// Config used when no file is present.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Fill unset values from pipeline agent variables.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`.
    pub fn apply_agent_variables<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        fill(&mut self.producer.temp_dir, get("AGENT_TEMPDIRECTORY").map(PathBuf::from));
        fill(&mut self.producer.working_dir, get("AGENT_BUILDDIRECTORY").map(PathBuf::from));
        fill(&mut self.producer.timeline_id, get("SYSTEM_TIMELINEID"));
        fill(&mut self.producer.record_id, get("SYSTEM_JOBID"));
        fill(&mut self.store.collection_uri, get("SYSTEM_COLLECTIONURI"));
        fill(&mut self.run.project_id, get("SYSTEM_TEAMPROJECTID"));

        if self.run.release.is_none() && self.run.build_id.is_none() {
            if let (Some(release_id), Some(environment_id)) =
                (get("RELEASE_RELEASEID"), get("RELEASE_ENVIRONMENTID"))
            {
                let attempt_number = match get("RELEASE_ATTEMPTNUMBER") {
                    Some(v) => Some(parse_number("RELEASE_ATTEMPTNUMBER", &v)?),
                    None => None,
                };
                self.run.release = Some(ReleaseRunConfig {
                    release_id: parse_number("RELEASE_RELEASEID", &release_id)?,
                    environment_id: parse_number("RELEASE_ENVIRONMENTID", &environment_id)?,
                    attempt_number,
                    plan_ids: Vec::new(),
                });
                fill(&mut self.run.name, get("RELEASE_ENVIRONMENTNAME"));
            } else if let Some(build_id) = get("BUILD_BUILDID") {
                self.run.build_id = Some(parse_number("BUILD_BUILDID", &build_id)?);
            }
        }

        // Build agents export SYSTEM_PLANID too; only release steps file
        // attachments per plan.
        if self.run.release.is_some() {
            fill(&mut self.producer.plan_id, get("SYSTEM_PLANID"));
        }
        fill(&mut self.run.name, get("BUILD_DEFINITIONNAME"));

        Ok(())
    }

    /// Temp directory for inlined documents before registration.
    pub fn temp_dir(&self) -> PathBuf {
        self.producer
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Working directory for glob expansion.
    pub fn working_dir(&self) -> Result<PathBuf> {
        match &self.producer.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Failed to read current directory"),
        }
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a number, got '{}'", key, value))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.store.kind == StoreKind::Local && config.store.root.is_none() {
        bail!("store.root must be set when store.kind is 'local'");
    }

    if config.store.token_env.trim().is_empty() {
        bail!("store.token_env must not be empty");
    }

    if config.producer.delimiter.is_whitespace() {
        bail!("producer.delimiter must not be whitespace");
    }

    if let Some(release) = &config.run.release {
        if config.run.build_id.is_some() {
            bail!("run.build_id and [run.release] are mutually exclusive");
        }
        if release.attempt_number == Some(0) {
            bail!("run.release.attempt_number must be >= 1");
        }
    }

    if config.server.bind.trim().is_empty() {
        bail!("server.bind must not be empty");
    }

    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(Config::minimal())
    }
}

/// Resolve the run-scope identifiers needed to address the attachment store.
pub fn resolve_environment(config: &Config) -> Result<Environment, ReportError> {
    let project_id = config.run.project_id.clone().ok_or_else(|| {
        ReportError::InvalidInput(
            "project id is not set (run.project_id or SYSTEM_TEAMPROJECTID)".to_string(),
        )
    })?;

    let scope = match (&config.run.release, config.run.build_id) {
        (Some(release), _) => {
            if release.plan_ids.is_empty() {
                return Err(ReportError::InvalidInput(
                    "run.release.plan_ids must list at least one plan id".to_string(),
                ));
            }
            RunScope::Release {
                release_id: release.release_id,
                environment_id: release.environment_id,
                attempt_number: release.attempt(),
                plan_ids: release.plan_ids.clone(),
            }
        }
        (None, Some(build_id)) => RunScope::Build { build_id },
        (None, None) => {
            return Err(ReportError::InvalidInput(
                "run is not set (run.build_id, [run.release], BUILD_BUILDID or RELEASE_RELEASEID)"
                    .to_string(),
            ))
        }
    };

    Ok(Environment {
        project_id,
        name: config.run.name.clone().unwrap_or_else(|| "Reports".to_string()),
        scope,
    })
}
