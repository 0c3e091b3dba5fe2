use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::App;
use crate::clients::git::GitOps;
use crate::clients::github::GithubClient;
use crate::clients::github::PullRequest;
use crate::clients::http::HttpOps;
use crate::clients::runner::StepRunner;
use crate::config::Environment;
use crate::series::SeriesDir;
use crate::series::title_has_series;

#[derive(Debug, Clone)]
pub struct CreatePrArgs {
    pub series_path: PathBuf,
    /// `owner/name`
    pub base_repo: String,
    pub base_branch: String,
    /// Branch checked out between series
    pub working_branch: String,
    /// Pause between pushing a branch and opening its pull request
    pub pr_delay: Duration,
}

/// What happened to one series directory
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Created(String),
    Skipped(String),
    Failed(String),
}

impl<G: GitOps, H: HttpOps, R: StepRunner> App<G, H, R> {
    /// Open a pull request for every saved series that has none yet.
    ///
    /// Each series gets a branch named after its id with its patches applied
    /// by `git am`. A series that fails to apply, push or open is reported and
    /// left behind; the others still go ahead.
    pub async fn cmd_create_pr(
        &self,
        env: &Environment,
        args: &CreatePrArgs,
        stdout: &mut impl std::io::Write,
    ) -> Result<()> {
        let token = env.require_token()?;
        let gh = GithubClient::new(&self.http, token, args.base_repo.clone());

        let series_dirs = SeriesDir::list(&args.series_path).await?;
        let open_prs = gh.open_pull_requests().await?;

        let mut created = 0;
        let mut skipped = 0;
        let mut failed = 0;

        for series_dir in &series_dirs {
            info!("Series path: {}", series_dir.path().display());
            let label = series_dir
                .path()
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            match self
                .publish_series(&gh, &open_prs, series_dir, args)
                .await?
            {
                Outcome::Created(url) => {
                    created += 1;
                    writeln!(stdout, "{} {}: {}", "Created".green(), label, url)?;
                }
                Outcome::Skipped(reason) => {
                    skipped += 1;
                    writeln!(stdout, "{} {}: {}", "Skipped".yellow(), label, reason)?;
                }
                Outcome::Failed(reason) => {
                    failed += 1;
                    writeln!(stdout, "{} {}: {}", "Failed".red(), label, reason)?;
                }
            }
        }

        writeln!(
            stdout,
            "{} created, {} skipped, {} failed",
            created, skipped, failed
        )?;
        Ok(())
    }

    async fn publish_series(
        &self,
        gh: &GithubClient<'_, H>,
        open_prs: &[PullRequest],
        series_dir: &SeriesDir,
        args: &CreatePrArgs,
    ) -> Result<Outcome> {
        let Some(detail) = series_dir.read_detail().await? else {
            error!(
                "Cannot find series detail: {}",
                series_dir.series_json().display()
            );
            return Ok(Outcome::Skipped("no series.json".to_string()));
        };

        if let Some(pr) = open_prs
            .iter()
            .find(|pr| title_has_series(&pr.title, detail.id))
        {
            info!("PR already exists for series {}", detail.id);
            return Ok(Outcome::Skipped(format!(
                "pull request already exists: {}",
                pr.html_url
            )));
        }

        let patches = series_dir.patch_files().await?;
        if patches.is_empty() {
            error!("No patch file found in {}", series_dir.path().display());
            return Ok(Outcome::Skipped("no patches".to_string()));
        }

        let branch = detail.id.to_string();
        self.git.checkout_new_branch(&branch).await?;

        if let Err(e) = self.git.am(&patches).await {
            warn!("Failed to apply patches: {:#}", e);
            self.git.am_abort().await?;
            self.git.checkout(&args.working_branch).await?;
            return Ok(Outcome::Failed("patches do not apply".to_string()));
        }

        if let Err(e) = self.git.push_branch(&branch).await {
            warn!("Failed to push {}: {:#}", branch, e);
            self.git.checkout(&args.working_branch).await?;
            return Ok(Outcome::Failed(format!("push of {} failed", branch)));
        }

        let message = series_dir.write_pr_message(&detail, &patches).await?;

        tokio::time::sleep(args.pr_delay).await;

        let outcome = match gh
            .create_pull_request(&branch, &args.base_branch, &message.title, &message.body)
            .await
        {
            Ok(url) => Outcome::Created(url),
            Err(e) => {
                warn!("Failed to create pull request: {:#}", e);
                if let Err(e) = self.git.delete_remote_branch(&branch).await {
                    warn!("Failed to delete remote branch {}: {:#}", branch, e);
                }
                Outcome::Failed("pull request creation failed".to_string())
            }
        };

        self.git.checkout(&args.working_branch).await?;
        Ok(outcome)
    }
}
