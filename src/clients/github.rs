use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::instrument;

use super::http::HttpOps;
use super::http::HttpRequest;
use super::http::get_all_pages;

const GITHUB_API: &str = "https://api.github.com";
const GITHUB_JSON: &str = "application/vnd.github+json";

// -----------------------------------------------------------------------------
// Types

/// Client to interact with GitHub API.
pub struct GithubClient<'a, H> {
    http: &'a H,
    token: String,
    /// `owner/name`
    repository: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
struct CreatePullRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

// -----------------------------------------------------------------------------
// GithubClient impl

impl<'a, H: HttpOps> GithubClient<'a, H> {
    pub fn new(http: &'a H, token: String, repository: String) -> Self {
        Self {
            http,
            token,
            repository,
        }
    }

    /// All open pull requests of the repository
    #[instrument(skip_all)]
    pub async fn open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let url = format!("{}/repos/{}/pulls?state=open", GITHUB_API, self.repository);
        let prs: Vec<PullRequest> = get_all_pages(self.http, &url, Some(&self.token)).await?;
        info!("Read all pull requests: Total = {}", prs.len());
        Ok(prs)
    }

    /// Create a pull request merging `head` into `base` and return its URL
    #[instrument(skip(self, body))]
    pub async fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<String> {
        let url = format!("{}/repos/{}/pulls", GITHUB_API, self.repository);
        let request_body = CreatePullRequest {
            title,
            body,
            head,
            base,
        };

        let request = HttpRequest::post_json(&url, serde_json::to_string(&request_body)?)
            .accept(GITHUB_JSON)
            .bearer(&self.token);
        let response = self.http.send(&request).await?.error_for_status(&url)?;
        let pr: PullRequest = response.json()?;
        Ok(pr.html_url)
    }
}
