use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::{redirect, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::auth::{self, Credentials};
use crate::config::ServerConfig;
use crate::error::{GerritError, Result};
use crate::list_view::ListQueryState;
use crate::rest::cache::FetchCache;
use crate::rest::url::{
    encode_url, filter_param, page_params, parse_prefixed_json, repo_query, url_with_params,
    QueryParams,
};
use crate::router::ListKind;
use crate::source::{CancelCondition, ListSource};
use crate::types::{
    AccountInfo, BranchInfo, DashboardInfo, DocResult, GroupInfo, ListEntry, PluginInfo,
    ProjectInfo, TagInfo,
};

/// A GET against a JSON endpoint.
#[derive(Clone, Default)]
pub struct FetchRequest {
    pub url: String,
    pub params: QueryParams,
    /// Logged instead of the real URL, which may carry user data.
    pub anonymized_url: Option<String>,
    pub cancel_condition: Option<CancelCondition>,
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("url", &self.url)
            .field("params", &self.params)
            .field("anonymized_url", &self.anonymized_url)
            .field("cancellable", &self.cancel_condition.is_some())
            .finish()
    }
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), Some(value.into())));
        self
    }

    /// Valueless parameter such as `?all`.
    pub fn flag(mut self, key: &str) -> Self {
        self.params.push((key.to_string(), None));
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = (String, Option<String>)>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn anonymized(mut self, url: &str) -> Self {
        self.anonymized_url = Some(url.to_string());
        self
    }

    /// Drop the response if `condition` says so by the time it arrives.
    pub fn with_cancel(mut self, condition: Option<CancelCondition>) -> Self {
        self.cancel_condition = condition;
        self
    }

    /// Path plus sorted query string; also the cache key.
    pub fn key(&self) -> String {
        url_with_params(&self.url, &self.params)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_condition.as_ref().is_some_and(|cancel| cancel())
    }
}

/// A redirect (to the login page) or an auth rejection means the session
/// is gone; the request is worth one anonymous retry.
fn needs_anonymous_retry(status: StatusCode) -> bool {
    status.is_redirection() || status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Gerrit REST client with a shared response cache.
#[derive(Clone)]
pub struct GerritClient {
    http: Client,
    name: String,
    base_url: String,
    credentials: Option<Credentials>,
    cache: Arc<FetchCache>,
}

impl fmt::Debug for GerritClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GerritClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl GerritClient {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        credentials: Option<Credentials>,
        cache: Arc<FetchCache>,
    ) -> Result<Self> {
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(concat!("gerrit-lists/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GerritError::Config(e.to_string()))?;

        Ok(Self {
            http,
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            cache,
        })
    }

    /// Client for a configured server, with credentials resolved from its
    /// password sources.
    pub fn connect(server: &ServerConfig, cache: Arc<FetchCache>) -> Result<Self> {
        let credentials = auth::load_credentials(server);
        Self::new(server.name.clone(), server.base_url(), credentials, cache)
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    fn endpoint(&self, path: &str, credentialed: bool) -> String {
        if credentialed {
            format!("{}/a{}", self.base_url, path)
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn send_get(&self, path: &str, credentialed: bool, log_url: &str) -> Result<Response> {
        let start = Instant::now();
        let mut request = self
            .http
            .get(self.endpoint(path, credentialed))
            .header("Accept", "application/json");
        if credentialed {
            if let Some(creds) = &self.credentials {
                request = request.basic_auth(&creds.username, Some(&creds.password));
            }
        }

        match request.send().await {
            Ok(response) => {
                tracing::debug!(
                    status = response.status().as_u16(),
                    method = "GET",
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    url = log_url,
                    "HTTP"
                );
                Ok(response)
            }
            Err(err) => {
                tracing::debug!(%err, method = "GET", url = log_url, "HTTP request failed");
                Err(err.into())
            }
        }
    }

    /// Issue the request, retrying once without credentials if the
    /// credentialed attempt is rejected or fails. `Ok(None)` when the
    /// request's cancel condition fired before the response was handled.
    pub async fn fetch_raw(&self, req: &FetchRequest) -> Result<Option<Response>> {
        let path = req.key();
        let log_url = req.anonymized_url.as_deref().unwrap_or(&path);

        let response = if self.credentials.is_some() {
            match self.send_get(&path, true, log_url).await {
                Ok(response) if !needs_anonymous_retry(response.status()) => response,
                Ok(response) => {
                    tracing::warn!(
                        status = response.status().as_u16(),
                        url = log_url,
                        "credentials rejected, retrying anonymously"
                    );
                    self.send_get(&path, false, log_url).await?
                }
                Err(err) => {
                    tracing::warn!(%err, url = log_url, "credentialed request failed, retrying anonymously");
                    self.send_get(&path, false, log_url).await?
                }
            }
        } else {
            self.send_get(&path, false, log_url).await?
        };

        if req.is_cancelled() {
            tracing::debug!(url = log_url, "response no longer wanted");
            return Ok(None);
        }
        Ok(Some(response))
    }

    /// Fetch and decode a prefixed JSON body.
    ///
    /// Non-2xx statuses are errors. A body that cannot be parsed is `Ok(None)`.
    pub async fn fetch_json(&self, req: &FetchRequest) -> Result<Option<Value>> {
        let Some(response) = self.fetch_raw(req).await? else {
            return Ok(None);
        };

        let status = response.status();
        if !status.is_success() {
            return Err(GerritError::Http {
                status: status.as_u16(),
                url: req.anonymized_url.clone().unwrap_or_else(|| req.key()),
            });
        }

        let body = response.text().await?;
        Ok(parse_prefixed_json(&body))
    }

    /// [`fetch_json`](Self::fetch_json) through the shared cache: one request
    /// per URL in flight, successful bodies kept until invalidated.
    pub async fn fetch_shared_cache_url(&self, req: FetchRequest) -> Result<Option<Value>> {
        let key = req.key();
        let client = self.clone();
        self.cache
            .get_or_fetch(&key, move || async move { client.fetch_json(&req).await })
            .await
    }

    pub async fn get_account(&self) -> Result<Option<AccountInfo>> {
        let value = self
            .fetch_shared_cache_url(FetchRequest::new("/accounts/self/detail"))
            .await?;
        Ok(decode(value, "account"))
    }

    /// Repositories matching `filter`, which [`repo_query`] turns into a
    /// project query.
    pub async fn get_repos(
        &self,
        filter: Option<&str>,
        items_per_page: u32,
        offset: u32,
    ) -> Result<Vec<ListEntry>> {
        let req = FetchRequest::new("/projects/")
            .param("query", repo_query(filter))
            .params(page_params(items_per_page, offset))
            .anonymized("/projects/?*");
        let value = self.fetch_shared_cache_url(req).await?;
        let projects: Vec<ProjectInfo> = decode(value, "projects").unwrap_or_default();
        Ok(projects
            .into_iter()
            .map(|p| ListEntry::from_project(p.id.clone(), p))
            .collect())
    }

    pub async fn get_groups(
        &self,
        filter: Option<&str>,
        items_per_page: u32,
        offset: u32,
    ) -> Result<Vec<ListEntry>> {
        let req = FetchRequest::new("/groups/")
            .params(page_params(items_per_page, offset))
            .params(filter_param(filter))
            .anonymized("/groups/?*");
        let value = self.fetch_shared_cache_url(req).await?;
        let groups: BTreeMap<String, GroupInfo> = decode(value, "groups").unwrap_or_default();
        Ok(groups
            .into_iter()
            .map(|(name, g)| ListEntry::from_group(name, g))
            .collect())
    }

    pub async fn get_plugins(
        &self,
        filter: Option<&str>,
        items_per_page: u32,
        offset: u32,
        cancel: Option<CancelCondition>,
    ) -> Result<Vec<ListEntry>> {
        let req = FetchRequest::new("/plugins/")
            .flag("all")
            .params(page_params(items_per_page, offset))
            .params(filter_param(filter))
            .anonymized("/plugins/?all")
            .with_cancel(cancel);
        let value = self.fetch_json(&req).await?;
        let plugins: BTreeMap<String, PluginInfo> = decode(value, "plugins").unwrap_or_default();
        Ok(plugins
            .into_iter()
            .map(|(id, p)| ListEntry::from_plugin(id, p))
            .collect())
    }

    pub async fn get_repo_branches(
        &self,
        repo: &str,
        filter: Option<&str>,
        items_per_page: u32,
        offset: u32,
        cancel: Option<CancelCondition>,
    ) -> Result<Vec<ListEntry>> {
        let req = FetchRequest::new(format!("/projects/{}/branches", urlencoding::encode(repo)))
            .params(page_params(items_per_page, offset))
            .params(filter_param(filter))
            .anonymized("/projects/*/branches?*")
            .with_cancel(cancel);
        let value = self.fetch_json(&req).await?;
        let branches: Vec<BranchInfo> = decode(value, "branches").unwrap_or_default();
        Ok(branches.into_iter().map(ListEntry::from_branch).collect())
    }

    pub async fn get_repo_tags(
        &self,
        repo: &str,
        filter: Option<&str>,
        items_per_page: u32,
        offset: u32,
        cancel: Option<CancelCondition>,
    ) -> Result<Vec<ListEntry>> {
        let req = FetchRequest::new(format!("/projects/{}/tags", urlencoding::encode(repo)))
            .params(page_params(items_per_page, offset))
            .params(filter_param(filter))
            .anonymized("/projects/*/tags")
            .with_cancel(cancel);
        let value = self.fetch_json(&req).await?;
        let tags: Vec<TagInfo> = decode(value, "tags").unwrap_or_default();
        Ok(tags.into_iter().map(ListEntry::from_tag).collect())
    }

    /// Dashboards of `repo`, including those inherited from parent projects.
    ///
    /// The server returns either a flat list or one list per project in the
    /// inheritance chain; both are flattened and sorted by id. The endpoint
    /// has no server-side filter, so `filter` is matched against the title
    /// or id here, case-insensitively.
    pub async fn get_repo_dashboards(
        &self,
        repo: &str,
        filter: Option<&str>,
    ) -> Result<Vec<ListEntry>> {
        let req = FetchRequest::new(format!("/projects/{}/dashboards", urlencoding::encode(repo)))
            .flag("inherited")
            .anonymized("/projects/*/dashboards?inherited");
        let value = self.fetch_shared_cache_url(req).await?;

        let mut dashboards: Vec<DashboardInfo> = match decode(value, "dashboards") {
            Some(DashboardList::PerProject(lists)) => lists.into_iter().flatten().collect(),
            Some(DashboardList::Flat(list)) => list,
            None => Vec::new(),
        };
        dashboards.sort_by(|a, b| a.id.cmp(&b.id));

        let needle = filter.unwrap_or_default().trim().to_lowercase();
        Ok(dashboards
            .into_iter()
            .map(ListEntry::from_dashboard)
            .filter(|entry| needle.is_empty() || entry.label().to_lowercase().contains(&needle))
            .collect())
    }

    pub async fn get_documentation_searches(&self, filter: Option<&str>) -> Result<Vec<ListEntry>> {
        let filter = filter.unwrap_or_default().trim();
        let req = FetchRequest::new("/Documentation/")
            .param("q", filter)
            .anonymized("/Documentation/?*");
        let value = self.fetch_shared_cache_url(req).await?;
        let docs: Vec<DocResult> = decode(value, "documentation").unwrap_or_default();
        Ok(docs.into_iter().map(ListEntry::from_doc).collect())
    }

    pub fn invalidate_repos_cache(&self) {
        self.cache.invalidate_prefix("/projects/?");
    }

    pub fn invalidate_groups_cache(&self) {
        self.cache.invalidate_prefix("/groups/?");
    }

    pub fn invalidate_dashboards_cache(&self, repo: &str) {
        self.cache
            .invalidate_prefix(&format!("/projects/{}/dashboards", urlencoding::encode(repo)));
    }

    pub fn invalidate_documentation_cache(&self) {
        self.cache.invalidate_prefix("/Documentation/?");
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum DashboardList {
    PerProject(Vec<Vec<DashboardInfo>>),
    Flat(Vec<DashboardInfo>),
}

/// A body of the wrong shape counts as no data, like an unparsable one.
fn decode<T: DeserializeOwned>(value: Option<Value>, what: &str) -> Option<T> {
    match serde_json::from_value(value?) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            tracing::warn!(%err, what, "unexpected response shape");
            None
        }
    }
}

#[async_trait]
impl ListSource for GerritClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn web_url(&self, kind: &ListKind, entry: &ListEntry) -> Option<String> {
        let base = &self.base_url;
        match entry {
            ListEntry::Repo { name, .. } => {
                Some(format!("{}/admin/repos/{}", base, encode_url(name, true)))
            }
            ListEntry::Group { id, .. } => {
                Some(format!("{}/admin/groups/{}", base, encode_url(id, true)))
            }
            ListEntry::Plugin { index_url, .. } => index_url
                .as_deref()
                .map(|index| format!("{}/{}", base, index.trim_start_matches('/'))),
            ListEntry::Branch { .. } | ListEntry::Tag { .. } => {
                kind.repo().map(|_| format!("{}{}", base, kind.base_path()))
            }
            ListEntry::Doc { url, .. } => {
                Some(format!("{}/{}", base, url.trim_start_matches('/')))
            }
            ListEntry::Dashboard { url, .. } => url
                .as_deref()
                .map(|url| format!("{}/{}", base, url.trim_start_matches('/'))),
        }
    }

    async fn fetch_page(
        &self,
        kind: &ListKind,
        query: &ListQueryState,
        cancel: Option<CancelCondition>,
    ) -> Result<Vec<ListEntry>> {
        let filter = query.filter();
        let (per_page, offset) = (query.items_per_page, query.offset);
        // Shared-cache fetches may have other waiters, so only direct
        // fetches take the cancel condition.
        match kind {
            ListKind::Repos => self.get_repos(filter, per_page, offset).await,
            ListKind::Groups => self.get_groups(filter, per_page, offset).await,
            ListKind::Plugins => self.get_plugins(filter, per_page, offset, cancel).await,
            ListKind::Branches(repo) => {
                self.get_repo_branches(repo, filter, per_page, offset, cancel)
                    .await
            }
            ListKind::Tags(repo) => {
                self.get_repo_tags(repo, filter, per_page, offset, cancel)
                    .await
            }
            ListKind::Dashboards(repo) => self.get_repo_dashboards(repo, filter).await,
            ListKind::Documentation => self.get_documentation_searches(filter).await,
        }
    }

    async fn current_user(&self) -> Result<Option<String>> {
        if !self.is_authenticated() {
            return Ok(None);
        }
        Ok(self.get_account().await?.map(|a| a.display_name()))
    }

    fn invalidate(&self, kind: &ListKind) {
        match kind {
            ListKind::Repos => self.invalidate_repos_cache(),
            ListKind::Groups => self.invalidate_groups_cache(),
            ListKind::Documentation => self.invalidate_documentation_cache(),
            ListKind::Dashboards(repo) => self.invalidate_dashboards_cache(repo),
            // fetched without the shared cache
            ListKind::Plugins | ListKind::Branches(_) | ListKind::Tags(_) => {}
        }
    }
}
