//! Typed operations against the GitHub REST v3 API for a single repository.
//!
//! One [`GitHubGateway`] is constructed per review pass with the bearer
//! token and `owner/name` coordinate injected once; no call varies either.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::pagination::{Page, PageFetcher, collect_pages, parse_next_link};

const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";
// GitHub rejects requests without a User-Agent.
const USER_AGENT: &str = concat!("prsweep/", env!("CARGO_PKG_VERSION"));

/// A snapshot of an open pull request, read-only for the duration of a pass.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub head: BranchRef,
    pub base: BranchRef,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub name: String,
}

/// One file changed by a pull request. `patch` is absent for binary or
/// mode-only changes.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangedFile {
    #[serde(rename = "filename")]
    pub path: String,
    #[serde(default)]
    pub patch: Option<String>,
}

/// A file fetched for mutation. `sha` is the contents-API version token;
/// a write must present the sha it last read, and a stale sha is rejected
/// remotely with a conflict.
#[derive(Debug, Clone)]
pub struct VersionedFile {
    pub path: String,
    pub branch: String,
    pub sha: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

/// Abstraction over authenticated HTTP for testability.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse>;
    fn put(&self, url: &str, body: &serde_json::Value) -> Result<()>;
    fn post(&self, url: &str, body: &serde_json::Value) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub body: serde_json::Value,
    /// Raw `Link` header, if the endpoint paginates.
    pub link: Option<String>,
}

/// Real client over a ureq agent with a per-request timeout. Timeouts and
/// rate-limit statuses (403/429) surface as [`Error::Transport`]; they are
/// recorded per unit, never retried indefinitely.
struct UreqClient {
    agent: ureq::Agent,
    auth: String,
}

impl UreqClient {
    fn new(token: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            auth: format!("token {token}"),
        }
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.agent
            .request(method, url)
            .set("Authorization", &self.auth)
            .set("Accept", ACCEPT_HEADER)
            .set("User-Agent", USER_AGENT)
    }
}

fn status_error(url: &str, code: u16, response: ureq::Response) -> Error {
    let text = response.into_string().unwrap_or_default();
    match code {
        404 => Error::NotFound(format!("{url} returned 404")),
        // The contents PUT reports a stale sha as 409 (occasionally 422).
        409 | 422 => Error::Conflict(format!("{url} returned {code}: {text}")),
        _ => Error::Transport(format!("{url} returned {code}: {text}")),
    }
}

fn transport_error(url: &str, err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(code, response) => status_error(url, code, response),
        ureq::Error::Transport(t) => Error::Transport(format!("{url}: {t}")),
    }
}

impl HttpClient for UreqClient {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self
            .request("GET", url)
            .call()
            .map_err(|e| transport_error(url, e))?;
        let link = response.header("link").map(str::to_string);
        let body = response
            .into_json()
            .map_err(|e| Error::Transport(format!("failed to decode {url}: {e}")))?;
        Ok(HttpResponse { body, link })
    }

    fn put(&self, url: &str, body: &serde_json::Value) -> Result<()> {
        self.request("PUT", url)
            .send_json(body)
            .map_err(|e| transport_error(url, e))?;
        Ok(())
    }

    fn post(&self, url: &str, body: &serde_json::Value) -> Result<()> {
        self.request("POST", url)
            .send_json(body)
            .map_err(|e| transport_error(url, e))?;
        Ok(())
    }
}

/// The engine's seam onto the hosting service.
pub trait Gateway: Send + Sync {
    fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>>;
    fn list_changed_files(&self, number: u64) -> Result<Vec<ChangedFile>>;
    fn fetch_file(&self, path: &str, branch: &str) -> Result<VersionedFile>;
    fn write_file(
        &self,
        path: &str,
        branch: &str,
        content: &str,
        sha: &str,
        message: &str,
    ) -> Result<()>;
    fn post_comment(&self, number: u64, body: &str) -> Result<()>;
}

pub struct GitHubGateway {
    repo: String,
    api_base: String,
    client: Box<dyn HttpClient>,
}

impl GitHubGateway {
    pub fn new(repo: &str, token: &str, api_base: &str, timeout: Duration) -> Self {
        Self {
            repo: repo.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client: Box::new(UreqClient::new(token, timeout)),
        }
    }

    #[cfg(test)]
    fn with_client(repo: &str, client: Box<dyn HttpClient>) -> Self {
        Self {
            repo: repo.to_string(),
            api_base: "https://api.github.com".to_string(),
            client,
        }
    }

    /// Collect a paginated list endpoint into deserialized items, keeping
    /// whatever pages succeeded.
    fn list<T: serde::de::DeserializeOwned>(&self, url: String) -> Vec<T> {
        let fetcher = ClientPageFetcher {
            client: &*self.client,
        };
        let mut items = Vec::new();
        for body in collect_pages(&fetcher, url) {
            match serde_json::from_value::<Vec<T>>(body) {
                Ok(page_items) => items.extend(page_items),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable page");
                }
            }
        }
        items
    }
}

struct ClientPageFetcher<'a> {
    client: &'a dyn HttpClient,
}

impl PageFetcher for ClientPageFetcher<'_> {
    fn fetch_page(&self, url: &str) -> Result<Page> {
        let response = self.client.get(url)?;
        let next = response.link.as_deref().and_then(parse_next_link);
        Ok(Page {
            body: response.body,
            next,
        })
    }
}

impl Gateway for GitHubGateway {
    fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let url = format!(
            "{}/repos/{}/pulls?state=open&per_page=100",
            self.api_base, self.repo
        );
        let pulls: Vec<PullRequest> = self.list(url);
        // The query already filters, but a page fetched across a state
        // change can still carry a freshly closed PR.
        let pulls: Vec<PullRequest> = pulls.into_iter().filter(|pr| pr.state == "open").collect();
        debug!(count = pulls.len(), "listed open pull requests");
        Ok(pulls)
    }

    fn list_changed_files(&self, number: u64) -> Result<Vec<ChangedFile>> {
        let url = format!(
            "{}/repos/{}/pulls/{}/files?per_page=100",
            self.api_base, self.repo, number
        );
        let files: Vec<ChangedFile> = self.list(url);
        debug!(pr = number, count = files.len(), "listed changed files");
        Ok(files)
    }

    fn fetch_file(&self, path: &str, branch: &str) -> Result<VersionedFile> {
        let url = format!(
            "{}/repos/{}/contents/{}?ref={}",
            self.api_base, self.repo, path, branch
        );
        let response = self.client.get(&url)?;
        let contents: ContentsResponse = serde_json::from_value(response.body)
            .map_err(|e| Error::Transport(format!("failed to decode contents of {path}: {e}")))?;

        // The API wraps base64 in newlines.
        let raw: String = contents
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = BASE64
            .decode(raw)
            .map_err(|e| Error::Transport(format!("invalid base64 for {path}: {e}")))?;
        let content = String::from_utf8(bytes)
            .map_err(|e| Error::Transport(format!("non-utf8 content in {path}: {e}")))?;

        Ok(VersionedFile {
            path: path.to_string(),
            branch: branch.to_string(),
            sha: contents.sha,
            content,
        })
    }

    fn write_file(
        &self,
        path: &str,
        branch: &str,
        content: &str,
        sha: &str,
        message: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/repos/{}/contents/{}?ref={}",
            self.api_base, self.repo, path, branch
        );
        let body = serde_json::json!({
            "message": message,
            "content": BASE64.encode(content),
            "sha": sha,
            "branch": branch,
        });
        self.client.put(&url, &body)?;
        debug!(path, branch, "committed file update");
        Ok(())
    }

    fn post_comment(&self, number: u64, body: &str) -> Result<()> {
        let url = format!(
            "{}/repos/{}/issues/{}/comments",
            self.api_base, self.repo, number
        );
        self.client
            .post(&url, &serde_json::json!({ "body": body }))?;
        debug!(pr = number, "posted comment");
        Ok(())
    }
}
