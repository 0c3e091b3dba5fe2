use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use tracing::info;
use tracing::instrument;

use super::http::HttpOps;
use super::http::HttpRequest;
use super::http::HttpResponse;
use super::http::get_all_pages;

/// Default patchwork REST API base
pub const DEFAULT_API_URL: &str = "https://patchwork.kernel.org/api/1.1";

// -----------------------------------------------------------------------------
// Types

/// Client for the patchwork REST API.
pub struct PatchworkClient<'a, H> {
    http: &'a H,
    api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: u64,
    pub link_name: String,
}

/// A patch as listed by `/patches/`; only the series it belongs to matters here.
#[derive(Debug, Clone, Deserialize)]
pub struct Patch {
    pub id: u64,
    #[serde(default)]
    pub series: Vec<SeriesRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesRef {
    pub id: u64,
    pub url: String,
    pub name: Option<String>,
}

impl SeriesRef {
    /// Series name, with a placeholder for untitled series
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Untitled series of #{}", self.id))
    }
}

// -----------------------------------------------------------------------------
// PatchworkClient impl

impl<'a, H: HttpOps> PatchworkClient<'a, H> {
    pub fn new(http: &'a H, api_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Find the id of the project with the given link name
    #[instrument(skip(self))]
    pub async fn project_id(&self, link_name: &str) -> Result<Option<u64>> {
        let url = format!("{}/projects/", self.api_base);
        let projects: Vec<Project> = get_all_pages(self.http, &url, None).await?;
        info!("Number of projects: {}", projects.len());

        Ok(projects
            .into_iter()
            .find(|project| project.link_name == link_name)
            .map(|project| project.id))
    }

    /// Non-archived patches of a project in the given state
    #[instrument(skip(self))]
    pub async fn patches(&self, project_id: u64, state: &str) -> Result<Vec<Patch>> {
        let url = format!(
            "{}/patches/?project={}&state={}&archived=0",
            self.api_base, project_id, state
        );
        let patches: Vec<Patch> = get_all_pages(self.http, &url, None).await?;
        info!("Read {} patches in state {}", patches.len(), state);
        Ok(patches)
    }

    /// Series detail as raw JSON, to be stored verbatim
    #[instrument(skip(self))]
    pub async fn series_detail(&self, url: &str) -> Result<serde_json::Value> {
        self.get(url)
            .await?
            .json()
            .with_context(|| format!("Invalid series detail from {}", url))
    }

    /// Download an mbox (patch or cover letter)
    #[instrument(skip(self))]
    pub async fn mbox(&self, url: &str) -> Result<HttpResponse> {
        self.get(url).await
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.http
            .send(&HttpRequest::get(url))
            .await?
            .error_for_status(url)
    }
}

/// Series referenced by the patches, de-duplicated by id in first-seen order.
pub fn series_from_patches(patches: &[Patch]) -> Vec<SeriesRef> {
    let mut series_list: Vec<SeriesRef> = Vec::new();
    for series in patches.iter().flat_map(|patch| &patch.series) {
        if !series_list.iter().any(|s| s.id == series.id) {
            series_list.push(series.clone());
        }
    }
    series_list
}
