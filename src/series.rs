//! On-disk series artifact shared by `save-series` and `create-pr`.
//!
//! ```text
//! <root>/<series-id>/series.json
//! <root>/<series-id>/cover_letter
//! <root>/<series-id>/patches/<mbox files>
//! <root>/<series-id>/pr_msg
//! ```

use std::path;

use anyhow::Context;
use anyhow::Result;
use regex::Regex;
use serde::Deserialize;

/// Marker put in pull request titles to recognise published series
pub const PR_TITLE_PREFIX: &str = "PW_S_ID";

const SERIES_JSON: &str = "series.json";
const COVER_LETTER: &str = "cover_letter";
const PATCHES_DIR: &str = "patches";
const PR_MSG: &str = "pr_msg";

// -----------------------------------------------------------------------------
// Types

/// One series directory
#[derive(Debug, Clone)]
pub struct SeriesDir {
    path: path::PathBuf,
}

/// The fields of a patchwork series detail this crate relies on
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesDetail {
    pub id: u64,
    pub name: Option<String>,
    pub cover_letter: Option<MboxRef>,
    #[serde(default)]
    pub patches: Vec<PatchRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MboxRef {
    pub mbox: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchRef {
    pub id: u64,
    pub mbox: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestMessage {
    pub title: String,
    pub body: String,
}

// -----------------------------------------------------------------------------
// SeriesDir impl

impl SeriesDir {
    pub fn new(path: path::PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &path::Path {
        &self.path
    }

    /// The series directory for `id` under `root`
    pub fn for_id(root: &path::Path, id: u64) -> Self {
        Self::new(root.join(id.to_string()))
    }

    /// All series directories under `root`, sorted by name
    pub async fn list(root: &path::Path) -> Result<Vec<SeriesDir>> {
        Ok(sorted_entries(root, true)
            .await
            .with_context(|| format!("Failed to read series directory {}", root.display()))?
            .into_iter()
            .map(SeriesDir::new)
            .collect())
    }

    pub fn series_json(&self) -> path::PathBuf {
        self.path.join(SERIES_JSON)
    }

    pub fn cover_letter(&self) -> path::PathBuf {
        self.path.join(COVER_LETTER)
    }

    pub fn patches_dir(&self) -> path::PathBuf {
        self.path.join(PATCHES_DIR)
    }

    pub fn pr_msg(&self) -> path::PathBuf {
        self.path.join(PR_MSG)
    }

    /// Read `series.json`, `None` if it does not exist
    pub async fn read_detail(&self) -> Result<Option<SeriesDetail>> {
        let json_file = self.series_json();
        if !tokio::fs::try_exists(&json_file).await? {
            return Ok(None);
        }
        let contents = tokio::fs::read(&json_file).await?;
        let detail = serde_json::from_slice(&contents)
            .with_context(|| format!("Invalid series detail in {}", json_file.display()))?;
        Ok(Some(detail))
    }

    pub async fn write_detail(&self, detail: &serde_json::Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.path).await?;
        tokio::fs::write(self.series_json(), serde_json::to_vec(detail)?).await?;
        Ok(())
    }

    /// Patch files in application order; empty when there is no patches directory
    pub async fn patch_files(&self) -> Result<Vec<path::PathBuf>> {
        let patches_dir = self.patches_dir();
        if !tokio::fs::try_exists(&patches_dir).await? {
            return Ok(vec![]);
        }
        sorted_entries(&patches_dir, false).await
    }

    /// Build the pull request message from the cover letter, or the first
    /// patch if there is no cover letter, and store it in `pr_msg`.
    pub async fn write_pr_message(
        &self,
        detail: &SeriesDetail,
        patches: &[path::PathBuf],
    ) -> Result<PullRequestMessage> {
        let cover_letter = self.cover_letter();
        let source = if tokio::fs::try_exists(&cover_letter).await? {
            cover_letter
        } else {
            patches.first().context("Series has no patches")?.clone()
        };
        let mbox = tokio::fs::read(&source).await?;

        let message = PullRequestMessage {
            title: pr_title(detail),
            body: commit_message(&String::from_utf8_lossy(&mbox)),
        };
        tokio::fs::write(self.pr_msg(), message.to_string()).await?;

        Ok(message)
    }
}

async fn sorted_entries(dir: &path::Path, dirs_only: bool) -> Result<Vec<path::PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = vec![];
    while let Some(entry) = entries.next_entry().await? {
        if dirs_only && !entry.file_type().await?.is_dir() {
            continue;
        }
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

// -----------------------------------------------------------------------------
// Pull request message

impl std::fmt::Display for PullRequestMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n\n{}", self.title, self.body)
    }
}

/// `[PW_S_ID:<id>] <name>`
pub fn pr_title(detail: &SeriesDetail) -> String {
    let name = detail
        .name
        .clone()
        .unwrap_or_else(|| format!("Untitled series of #{}", detail.id));
    format!("[{}:{}] {}", PR_TITLE_PREFIX, detail.id, name)
}

/// Whether a pull request title marks the given series as published
pub fn title_has_series(title: &str, series_id: u64) -> bool {
    let pattern = format!(r"(?i){}:{}\b", PR_TITLE_PREFIX, series_id);
    Regex::new(&pattern)
        .map(|re| re.is_match(title))
        .unwrap_or(false)
}

/// Extract the commit message from an mbox: the lines after the header block,
/// up to the `---` separator, with leading blanks removed.
pub fn commit_message(mbox: &str) -> String {
    let mut body = String::new();
    let mut in_body = false;

    for line in mbox.lines() {
        let line = line.trim_end_matches('\r').trim_start_matches([' ', '\t']);
        if !in_body {
            if line.is_empty() {
                in_body = true;
            }
            continue;
        }
        if line.contains("---") {
            break;
        }
        body.push_str(line);
        body.push('\n');
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCH: &str = "From 1234 Mon Sep 17 00:00:00 2001\n\
From: Jane Dev <jane@example.com>\n\
Subject: [PATCH v2 1/2] Bluetooth: hci_sync: Fix leak\n\
\n\
This fixes a leak of the connection handle\n\
\twhen the controller resets.\n\
\n\
Signed-off-by: Jane Dev <jane@example.com>\n\
---\n\
 net/bluetooth/hci_sync.c | 2 +-\n";

    fn detail(name: Option<&str>) -> SeriesDetail {
        SeriesDetail {
            id: 812,
            name: name.map(str::to_string),
            cover_letter: None,
            patches: vec![],
        }
    }

    #[test]
    fn test_commit_message() {
        insta::assert_snapshot!(commit_message(PATCH), @r"
        This fixes a leak of the connection handle
        when the controller resets.

        Signed-off-by: Jane Dev <jane@example.com>
        ");
    }

    #[test]
    fn test_commit_message_crlf() {
        let mbox = "Subject: x\r\n\r\nbody line\r\n---\r\n";
        assert_eq!(commit_message(mbox), "body line\n");
    }

    #[test]
    fn test_commit_message_without_body() {
        assert_eq!(commit_message("Subject: only headers\n"), "");
    }

    #[test]
    fn test_pr_title() {
        assert_eq!(
            pr_title(&detail(Some("Bluetooth: fixes"))),
            "[PW_S_ID:812] Bluetooth: fixes"
        );
        assert_eq!(
            pr_title(&detail(None)),
            "[PW_S_ID:812] Untitled series of #812"
        );
    }

    #[test]
    fn test_title_has_series() {
        assert!(title_has_series("[PW_S_ID:812] Bluetooth: fixes", 812));
        assert!(title_has_series("[pw_s_id:812] lower case", 812));
        assert!(!title_has_series("[PW_S_ID:813] other", 812));
        assert!(!title_has_series("[PW_S_ID:8120] longer id", 812));
        assert!(!title_has_series("Bluetooth: fixes", 812));
    }

    #[tokio::test]
    async fn test_series_dir_layout() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let series = SeriesDir::for_id(root.path(), 812);
        series
            .write_detail(&serde_json::json!({
                "id": 812,
                "name": "Bluetooth: fixes",
                "cover_letter": null,
                "patches": [{"id": 1, "mbox": "https://pw/patch/1/mbox/"}],
                "extra": "kept"
            }))
            .await?;

        let detail = series.read_detail().await?.expect("series.json exists");
        assert_eq!(detail.id, 812);
        assert_eq!(detail.patches.len(), 1);
        assert!(series.patch_files().await?.is_empty());

        tokio::fs::create_dir_all(series.patches_dir()).await?;
        tokio::fs::write(series.patches_dir().join("2-b.patch"), PATCH).await?;
        tokio::fs::write(series.patches_dir().join("1-a.patch"), PATCH).await?;
        let patches = series.patch_files().await?;
        let names: Vec<_> = patches
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["1-a.patch", "2-b.patch"]);

        let message = series.write_pr_message(&detail, &patches).await?;
        assert_eq!(message.title, "[PW_S_ID:812] Bluetooth: fixes");
        let written = tokio::fs::read_to_string(series.pr_msg()).await?;
        assert!(written.starts_with("[PW_S_ID:812] Bluetooth: fixes\n\nThis fixes a leak"));

        tokio::fs::write(root.path().join("stray.txt"), "x").await?;
        let listed = SeriesDir::list(root.path()).await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path(), series.path());
        Ok(())
    }

    #[tokio::test]
    async fn test_pr_message_prefers_cover_letter() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let series = SeriesDir::for_id(root.path(), 5);
        tokio::fs::create_dir_all(series.path()).await?;
        tokio::fs::write(
            series.cover_letter(),
            "Subject: [PATCH 0/2] cover\n\nSeries overview.\n\nJane Dev (2):\n  a\n\n--\n2.43.0\n",
        )
        .await?;
        let patch = root.path().join("p.patch");
        tokio::fs::write(&patch, PATCH).await?;

        let message = series.write_pr_message(&detail(Some("x")), &[patch]).await?;
        assert_eq!(message.body, "Series overview.\n\nJane Dev (2):\na\n\n--\n2.43.0\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_read_detail_missing() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let series = SeriesDir::for_id(root.path(), 1);
        assert!(series.read_detail().await?.is_none());
        Ok(())
    }
}
