//! Pipeline host REST attachment store.
//!
//! Lists and downloads run attachments through the host's REST API.
//!
//! | Scope | Operation | Endpoint (under `{project}/_apis/`) |
//! |-------|-----------|--------------------------------------|
//! | build | list | `build/builds/{id}/attachments/{type}` |
//! | build | content | `build/builds/{id}/{timeline}/{record}/attachments/{type}/{name}` |
//! | release | list | `release/releases/{r}/environments/{e}/attempts/{a}/plan/{p}/attachments/{type}` |
//! | release | content | `…/plan/{p}/timelines/{t}/records/{rec}/attachments/{type}/{name}` |
//!
//! Build endpoints live on the collection URI; release endpoints on the
//! release management URI. Requests carry a bearer token read from the
//! environment variable named by `store.token_env`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use publish_report_core::models::{AttachmentLocator, Environment, RunScope};
use publish_report_core::store::{AttachmentRecord, AttachmentStore};
use serde::Deserialize;
use url::Url;

use crate::config::StoreConfig;

#[derive(Clone)]
pub struct HostAttachmentStore {
    client: reqwest::Client,
    collection_uri: Url,
    release_uri: Url,
    api_version: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttachmentList {
    #[serde(default)]
    value: Vec<AttachmentEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentEntry {
    name: Option<String>,
    timeline_id: Option<String>,
    record_id: Option<String>,
    #[serde(rename = "_links")]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(rename = "self")]
    self_link: Link,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    environments: Vec<ReleaseEnvironment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseEnvironment {
    id: u64,
    #[serde(default)]
    deploy_steps: Vec<DeployStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployStep {
    #[serde(default)]
    attempt: Option<u32>,
    #[serde(default)]
    release_deploy_phases: Vec<DeployPhase>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployPhase {
    run_plan_id: Option<String>,
}

/// Deployment attempt of a release environment and the plans of its phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePhases {
    pub attempt_number: u32,
    /// One plan per phase, in phase order.
    pub plan_ids: Vec<String>,
}

impl HostAttachmentStore {
    pub fn new(collection_uri: Url, release_uri: Url, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            collection_uri,
            release_uri,
            api_version: "7.1".to_string(),
            token,
        }
    }

    /// Build a store from `[store]`, reading the token from `token_env`.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let collection = config
            .collection_uri
            .as_deref()
            .ok_or_else(|| anyhow!("store.collection_uri is not set (or SYSTEM_COLLECTIONURI)"))?;
        let collection_uri = Url::parse(collection)
            .with_context(|| format!("invalid store.collection_uri: {}", collection))?;
        let release_uri = match &config.release_uri {
            Some(uri) => Url::parse(uri)
                .with_context(|| format!("invalid store.release_uri: {}", uri))?,
            None => release_uri_for(&collection_uri)?,
        };

        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(
                token_env = %config.token_env,
                "no access token; requests are unauthenticated"
            );
        }

        let mut store = Self::new(collection_uri, release_uri, token);
        store.api_version = config.api_version.clone();
        Ok(store)
    }

    fn endpoint(&self, base: &Url, segments: &[&str]) -> Result<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("base url cannot have a path: {}", base))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    fn list_url(&self, env: &Environment, plan_id: Option<&str>, kind: &str) -> Result<Url> {
        match &env.scope {
            RunScope::Build { build_id } => {
                let build = build_id.to_string();
                self.endpoint(
                    &self.collection_uri,
                    &[env.project_id.as_str(), "_apis", "build", "builds", build.as_str(), "attachments", kind],
                )
            }
            RunScope::Release {
                release_id,
                environment_id,
                attempt_number,
                ..
            } => {
                let plan = plan_id.ok_or_else(|| anyhow!("release listing needs a plan id"))?;
                let (r, e, a) = (
                    release_id.to_string(),
                    environment_id.to_string(),
                    attempt_number.to_string(),
                );
                self.endpoint(
                    &self.release_uri,
                    &[
                        env.project_id.as_str(), "_apis", "release", "releases", r.as_str(), "environments", e.as_str(),
                        "attempts", a.as_str(), "plan", plan, "attachments", kind,
                    ],
                )
            }
        }
    }

    fn content_url(&self, env: &Environment, locator: &AttachmentLocator) -> Result<Url> {
        let l = locator;
        match &env.scope {
            RunScope::Build { build_id } => {
                let build = build_id.to_string();
                self.endpoint(
                    &self.collection_uri,
                    &[
                        env.project_id.as_str(), "_apis", "build", "builds", build.as_str(), l.timeline_id.as_str(),
                        l.record_id.as_str(), "attachments", l.attachment_type.as_str(), l.name.as_str(),
                    ],
                )
            }
            RunScope::Release {
                release_id,
                environment_id,
                attempt_number,
                ..
            } => {
                let plan = l
                    .plan_id
                    .as_deref()
                    .ok_or_else(|| anyhow!("release content needs a plan id"))?;
                let (r, e, a) = (
                    release_id.to_string(),
                    environment_id.to_string(),
                    attempt_number.to_string(),
                );
                self.endpoint(
                    &self.release_uri,
                    &[
                        env.project_id.as_str(), "_apis", "release", "releases", r.as_str(), "environments", e.as_str(),
                        "attempts", a.as_str(), "plan", plan, "timelines", l.timeline_id.as_str(), "records",
                        l.record_id.as_str(), "attachments", l.attachment_type.as_str(), l.name.as_str(),
                    ],
                )
            }
        }
    }

    /// Look up the phases of one release environment.
    ///
    /// Without an explicit `attempt_number` the latest attempt is used: the
    /// number of deploy steps the environment has run.
    pub async fn release_phases(
        &self,
        project_id: &str,
        release_id: u64,
        environment_id: u64,
        attempt_number: Option<u32>,
    ) -> Result<ReleasePhases> {
        let release = release_id.to_string();
        let url = self.endpoint(
            &self.release_uri,
            &[project_id, "_apis", "release", "releases", release.as_str()],
        )?;
        tracing::debug!(url = %url, "reading release");

        let response = self
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("release request failed: {}", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("release lookup returned {} for {}", status, url);
        }
        let release: Release = response
            .json()
            .await
            .context("release response is not valid JSON")?;

        let environment = release
            .environments
            .into_iter()
            .find(|e| e.id == environment_id)
            .ok_or_else(|| {
                anyhow!("release {} has no environment {}", release_id, environment_id)
            })?;
        if environment.deploy_steps.is_empty() {
            bail!(
                "environment {} of release {} has not been deployed",
                environment_id,
                release_id
            );
        }

        let attempt_number =
            attempt_number.unwrap_or(environment.deploy_steps.len() as u32);
        let step = environment
            .deploy_steps
            .iter()
            .find(|step| step.attempt == Some(attempt_number))
            .or_else(|| environment.deploy_steps.first())
            .ok_or_else(|| anyhow!("no deploy step for attempt {}", attempt_number))?;

        let plan_ids: Vec<String> = step
            .release_deploy_phases
            .iter()
            .filter_map(|phase| phase.run_plan_id.clone())
            .collect();
        if plan_ids.is_empty() {
            bail!(
                "attempt {} of environment {} has no phases with a plan",
                attempt_number,
                environment_id
            );
        }

        Ok(ReleasePhases {
            attempt_number,
            plan_ids,
        })
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Release management URI for a collection: `dev.azure.com` collections move
/// to the `vsrm.` host, anything else serves both from one origin.
fn release_uri_for(collection: &Url) -> Result<Url> {
    match collection.host_str() {
        Some("dev.azure.com") => {
            let mut release = collection.clone();
            release
                .set_host(Some("vsrm.dev.azure.com"))
                .map_err(|e| anyhow!("cannot derive release uri: {}", e))?;
            Ok(release)
        }
        Some(host) if host.ends_with(".visualstudio.com") => {
            let account = host.trim_end_matches(".visualstudio.com");
            let mut release = collection.clone();
            release
                .set_host(Some(&format!("{}.vsrm.visualstudio.com", account)))
                .map_err(|e| anyhow!("cannot derive release uri: {}", e))?;
            Ok(release)
        }
        _ => Ok(collection.clone()),
    }
}

#[async_trait]
impl AttachmentStore for HostAttachmentStore {
    async fn list_attachments(
        &self,
        env: &Environment,
        plan_id: Option<&str>,
        attachment_type: &str,
    ) -> Result<Vec<AttachmentRecord>> {
        let url = self.list_url(env, plan_id, attachment_type)?;
        tracing::debug!(url = %url, "listing attachments");

        let response = self
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("attachment listing request failed: {}", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("attachment listing returned {} for {}", status, url);
        }
        let list: AttachmentList = response
            .json()
            .await
            .context("attachment listing is not valid JSON")?;

        let explicit_ids = matches!(env.scope, RunScope::Release { .. });
        Ok(list
            .value
            .into_iter()
            .map(|entry| {
                let mut record = AttachmentRecord::from_url(entry.links.self_link.href);
                if explicit_ids {
                    record.timeline_id = entry.timeline_id;
                    record.record_id = entry.record_id;
                    record.name = entry.name;
                }
                record
            })
            .collect())
    }

    async fn get_attachment_content(
        &self,
        env: &Environment,
        locator: &AttachmentLocator,
    ) -> Result<Vec<u8>> {
        let url = self.content_url(env, locator)?;
        tracing::debug!(url = %url, "downloading attachment");

        let response = self
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/octet-stream")
            .send()
            .await
            .with_context(|| format!("attachment request failed: {}", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("attachment download returned {} for {}", status, url);
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path as AxumPath, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use publish_report_core::catalog::build_catalog;
    use publish_report_core::ATTACHMENT_TYPE;

    fn build_env() -> Environment {
        Environment {
            project_id: "proj".to_string(),
            name: "ci".to_string(),
            scope: RunScope::Build { build_id: 7 },
        }
    }

    fn release_env() -> Environment {
        Environment {
            project_id: "proj".to_string(),
            name: "staging".to_string(),
            scope: RunScope::Release {
                release_id: 3,
                environment_id: 9,
                attempt_number: 2,
                plan_ids: vec!["plan-a".to_string()],
            },
        }
    }

    fn store(base: &str) -> HostAttachmentStore {
        let base = Url::parse(base).unwrap();
        HostAttachmentStore::new(base.clone(), base, Some("secret".to_string()))
    }

    #[test]
    fn build_urls() {
        let s = store("https://dev.example.com/acme/");
        let list = s.list_url(&build_env(), None, ATTACHMENT_TYPE).unwrap();
        assert_eq!(
            list.as_str(),
            "https://dev.example.com/acme/proj/_apis/build/builds/7/attachments/publish-report?api-version=7.1"
        );

        let locator = AttachmentLocator {
            plan_id: None,
            timeline_id: "tl".to_string(),
            record_id: "rec".to_string(),
            attachment_type: ATTACHMENT_TYPE.to_string(),
            name: "Unit Tests.html".to_string(),
        };
        let content = s.content_url(&build_env(), &locator).unwrap();
        assert_eq!(
            content.as_str(),
            "https://dev.example.com/acme/proj/_apis/build/builds/7/tl/rec/attachments/publish-report/Unit%20Tests.html?api-version=7.1"
        );
    }

    #[test]
    fn release_urls_need_a_plan() {
        let s = store("https://rm.example.com/acme");
        let list = s
            .list_url(&release_env(), Some("plan-a"), ATTACHMENT_TYPE)
            .unwrap();
        assert_eq!(
            list.path(),
            "/acme/proj/_apis/release/releases/3/environments/9/attempts/2/plan/plan-a/attachments/publish-report"
        );
        assert!(s.list_url(&release_env(), None, ATTACHMENT_TYPE).is_err());
    }

    #[test]
    fn release_uri_is_derived_for_hosted_collections() {
        let hosted = Url::parse("https://dev.azure.com/acme/").unwrap();
        assert_eq!(
            release_uri_for(&hosted).unwrap().as_str(),
            "https://vsrm.dev.azure.com/acme/"
        );
        let legacy = Url::parse("https://acme.visualstudio.com/").unwrap();
        assert_eq!(
            release_uri_for(&legacy).unwrap().as_str(),
            "https://acme.vsrm.visualstudio.com/"
        );
        let server = Url::parse("https://tfs.corp.local/tfs/Default/").unwrap();
        assert_eq!(release_uri_for(&server).unwrap(), server);
    }

    async fn list_build(
        State(base): State<String>,
        AxumPath((_project, _build, kind)): AxumPath<(String, String, String)>,
    ) -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "count": 1,
            "value": [{
                "name": "Unit Tests.html",
                "_links": { "self": { "href": format!(
                    "{}proj/_apis/build/builds/7/tl-1/job-1/attachments/{}/Unit%20Tests.html",
                    base, kind
                ) } }
            }]
        }))
    }

    async fn build_content(
        headers: HeaderMap,
        AxumPath((_p, _b, timeline, record, _kind, name)): AxumPath<(
            String,
            String,
            String,
            String,
            String,
            String,
        )>,
    ) -> Result<String, StatusCode> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth != "Bearer secret" {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(format!("<p>{} {} {}</p>", timeline, record, name))
    }

    async fn release(AxumPath((_project, release)): AxumPath<(String, u64)>) -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "id": release,
            "environments": [
                { "id": 1, "name": "dev", "deploySteps": [] },
                {
                    "id": 9,
                    "name": "staging",
                    "deploySteps": [
                        {
                            "attempt": 1,
                            "releaseDeployPhases": [{ "runPlanId": "plan-old" }]
                        },
                        {
                            "attempt": 2,
                            "releaseDeployPhases": [
                                { "runPlanId": "plan-a" },
                                { "runPlanId": null },
                                { "runPlanId": "plan-b" }
                            ]
                        }
                    ]
                }
            ]
        }))
    }

    async fn mock_host() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        let app = Router::new()
            .route("/{project}/_apis/release/releases/{release}", get(release))
            .route(
                "/{project}/_apis/build/builds/{build}/attachments/{kind}",
                get(list_build),
            )
            .route(
                "/{project}/_apis/build/builds/{build}/{timeline}/{record}/attachments/{kind}/{name}",
                get(build_content),
            )
            .with_state(base.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    #[tokio::test]
    async fn lists_and_downloads_build_attachments() {
        let base = mock_host().await;
        let s = store(&base);

        let items = build_catalog(&s, &build_env()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].timeline_id, "tl-1");
        assert_eq!(items[0].record_id, "job-1");
        assert_eq!(items[0].friendly_name, "Unit Tests");

        let bytes = s
            .get_attachment_content(&build_env(), &AttachmentLocator::for_item(&items[0]))
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "<p>tl-1 job-1 Unit Tests.html</p>"
        );
    }

    #[tokio::test]
    async fn rejected_requests_are_errors() {
        let base = mock_host().await;
        let url = Url::parse(&base).unwrap();
        let anonymous = HostAttachmentStore::new(url.clone(), url, None);
        let locator = AttachmentLocator {
            plan_id: None,
            timeline_id: "tl".to_string(),
            record_id: "rec".to_string(),
            attachment_type: ATTACHMENT_TYPE.to_string(),
            name: "r.html".to_string(),
        };
        let err = anonymous
            .get_attachment_content(&build_env(), &locator)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn release_phases_cover_every_phase_of_the_latest_attempt() {
        let base = mock_host().await;
        let s = store(&base);

        let phases = s.release_phases("proj", 3, 9, None).await.unwrap();
        assert_eq!(
            phases,
            ReleasePhases {
                attempt_number: 2,
                plan_ids: vec!["plan-a".to_string(), "plan-b".to_string()],
            }
        );

        let first = s.release_phases("proj", 3, 9, Some(1)).await.unwrap();
        assert_eq!(first.plan_ids, vec!["plan-old".to_string()]);
    }

    #[tokio::test]
    async fn undeployed_or_unknown_environments_are_errors() {
        let base = mock_host().await;
        let s = store(&base);

        let err = s.release_phases("proj", 3, 1, None).await.unwrap_err();
        assert!(err.to_string().contains("not been deployed"));
        let err = s.release_phases("proj", 3, 42, None).await.unwrap_err();
        assert!(err.to_string().contains("no environment 42"));
    }
}
