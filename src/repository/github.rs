//! GitHub REST data source
//!
//! Reads metadata, the language breakdown, the recursive git tree, and raw
//! file contents. Every request goes through the retry policy.

use super::retry::RetryPolicy;
use super::types::{FileEntry, RepositoryInfo};
use super::RepositorySource;
use crate::errors::SourceError;
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default GitHub API root
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("repolens/", env!("CARGO_PKG_VERSION"));
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// GitHub client settings
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    /// Personal access token; anonymous requests get a lower rate limit
    pub token: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// GitHub REST API client
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: Url,
    token: Option<String>,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self, SourceError> {
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| SourceError::InvalidResponse(format!("invalid API url {}: {}", config.api_url, e)))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url,
            token: config.token,
            retry: config.retry,
        })
    }

    /// API url for the given path segments, each percent-encoded
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, SourceError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidResponse(format!("API url cannot be a base: {}", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, url: Url, accept: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .get(url)
            .header(header::ACCEPT, accept)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send(&self, url: Url, accept: &'static str) -> Result<Response, SourceError> {
        self.retry
            .execute(|| {
                let url = url.clone();
                async move {
                    debug!(%url, "github request");
                    let response = self.request(url.clone(), accept).send().await.map_err(|e| {
                        SourceError::Unavailable(format!("request to {} failed: {}", url, e))
                    })?;
                    check_status(response).await
                }
            })
            .await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T, SourceError> {
        let response = self.send(url.clone(), JSON_MEDIA_TYPE).await?;
        response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl RepositorySource for GitHubClient {
    async fn fetch_repository(&self, owner: &str, name: &str) -> Result<RepositoryInfo, SourceError> {
        let meta: RepoResponse = self.get_json(self.endpoint(["repos", owner, name])?).await?;
        let languages: BTreeMap<String, u64> = self
            .get_json(self.endpoint(["repos", owner, name, "languages"])?)
            .await?;

        let mut info = RepositoryInfo::new(meta.html_url, owner, name);
        info.description = meta.description;
        info.language = meta.language;
        info.languages = languages;
        info.stars = meta.stargazers_count;
        info.forks = meta.forks_count;
        info.size = meta.size;
        info.default_branch = meta.default_branch;
        Ok(info)
    }

    async fn list_files(&self, repository: &RepositoryInfo) -> Result<Vec<FileEntry>, SourceError> {
        let mut url = self.endpoint([
            "repos",
            repository.owner.as_str(),
            repository.name.as_str(),
            "git",
            "trees",
            repository.default_branch.as_str(),
        ])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let tree: TreeResponse = self.get_json(url).await?;
        if tree.truncated {
            debug!(repository = %repository.full_name(), "git tree listing was truncated");
        }
        Ok(blobs(tree))
    }

    async fn fetch_file(&self, repository: &RepositoryInfo, path: &str) -> Result<String, SourceError> {
        let mut url = self.endpoint(
            ["repos", repository.owner.as_str(), repository.name.as_str(), "contents"]
                .into_iter()
                .chain(path.split('/')),
        )?;
        url.query_pairs_mut()
            .append_pair("ref", &repository.default_branch);

        let response = self.send(url, RAW_MEDIA_TYPE).await?;
        response
            .text()
            .await
            .map_err(|e| SourceError::InvalidResponse(format!("{}: {}", path, e)))
    }
}

/// Pass successful responses through; classify the rest
async fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let rate_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, rate_exhausted, format!("{} ({})", url, body.trim())))
}

fn classify_status(status: StatusCode, rate_exhausted: bool, detail: String) -> SourceError {
    match status {
        StatusCode::NOT_FOUND => SourceError::NotFound(detail),
        StatusCode::UNAUTHORIZED => SourceError::Unauthorized(detail),
        StatusCode::FORBIDDEN if rate_exhausted => SourceError::RateLimited(detail),
        StatusCode::FORBIDDEN => SourceError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited(detail),
        s if s.is_server_error() => SourceError::Unavailable(format!("HTTP {}: {}", s, detail)),
        s => SourceError::InvalidResponse(format!("HTTP {}: {}", s, detail)),
    }
}

fn blobs(tree: TreeResponse) -> Vec<FileEntry> {
    tree.tree
        .into_iter()
        .filter(|node| node.kind == "blob")
        .map(|node| FileEntry::new(node.path, node.size.unwrap_or(0)))
        .collect()
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    html_url: String,
    description: Option<String>,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    size: u64,
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeNode>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeNode {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<u64>,
}
