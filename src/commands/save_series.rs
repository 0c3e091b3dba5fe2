use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use futures_util::future::try_join_all;
use regex::Regex;
use regex::RegexBuilder;
use tracing::info;

use crate::App;
use crate::clients::git::GitOps;
use crate::clients::http::HttpOps;
use crate::clients::patchwork::PatchworkClient;
use crate::clients::patchwork::SeriesRef;
use crate::clients::patchwork::series_from_patches;
use crate::clients::runner::StepRunner;
use crate::series::SeriesDetail;
use crate::series::SeriesDir;

/// Name filter applied to series titles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesFilter {
    /// Skip series whose name matches
    Exclude(String),
    /// Keep only series whose name matches
    Include(String),
}

#[derive(Debug, Clone)]
pub struct SaveSeriesArgs {
    /// Patchwork REST API base
    pub url: String,
    pub project_name: String,
    pub patch_states: Vec<String>,
    pub dest_path: PathBuf,
    pub filter: Option<SeriesFilter>,
}

/// Compiled form of [`SeriesFilter`]; patterns are case-insensitive.
struct NameFilter {
    regex: Regex,
    exclude: bool,
}

impl NameFilter {
    fn new(filter: &SeriesFilter) -> Result<Self> {
        let (pattern, exclude) = match filter {
            SeriesFilter::Exclude(pattern) => (pattern, true),
            SeriesFilter::Include(pattern) => (pattern, false),
        };
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Invalid series filter: {}", pattern))?;
        Ok(Self { regex, exclude })
    }

    fn keeps(&self, name: &str) -> bool {
        self.regex.is_match(name) != self.exclude
    }
}

impl<G: GitOps, H: HttpOps, R: StepRunner> App<G, H, R> {
    /// Save the series of a patchwork project to `dest_path`, one directory
    /// per series id.
    pub async fn cmd_save_series(
        &self,
        args: &SaveSeriesArgs,
        stdout: &mut impl std::io::Write,
    ) -> Result<()> {
        let filter = args.filter.as_ref().map(NameFilter::new).transpose()?;
        let pw = PatchworkClient::new(&self.http, &args.url);
        info!("PatchWork REST API Base URL: {}", args.url);

        let Some(project_id) = pw.project_id(&args.project_name).await? else {
            bail!("Unable to find the project name: {}", args.project_name);
        };
        info!("Project \"{}\" ID = {}", args.project_name, project_id);

        let patches = try_join_all(
            args.patch_states
                .iter()
                .map(|state| pw.patches(project_id, state)),
        )
        .await?
        .concat();
        let series_list = series_from_patches(&patches);
        writeln!(
            stdout,
            "Found {} series in {} patches",
            series_list.len(),
            patches.len()
        )?;

        tokio::fs::create_dir_all(&args.dest_path)
            .await
            .with_context(|| format!("Failed to create {}", args.dest_path.display()))?;

        for series in &series_list {
            let name = series.display_name();
            if filter.as_ref().is_some_and(|f| !f.keeps(&name)) {
                writeln!(stdout, "Skipping series {}: {}", series.id, name)?;
                continue;
            }

            self.save_one_series(&pw, series, args).await?;
            writeln!(stdout, "Saved series {}: {}", series.id, name)?;
        }

        writeln!(
            stdout,
            "Series patches are saved to: {}",
            args.dest_path.display()
        )?;
        Ok(())
    }

    async fn save_one_series(
        &self,
        pw: &PatchworkClient<'_, H>,
        series: &SeriesRef,
        args: &SaveSeriesArgs,
    ) -> Result<()> {
        let raw = pw.series_detail(&series.url).await?;
        let detail: SeriesDetail = serde_json::from_value(raw.clone())
            .with_context(|| format!("Unexpected series detail for {}", series.id))?;

        let dir = SeriesDir::for_id(&args.dest_path, detail.id);
        dir.write_detail(&raw).await?;

        if let Some(cover_letter) = &detail.cover_letter {
            let response = pw.mbox(&cover_letter.mbox).await?;
            tokio::fs::write(dir.cover_letter(), &response.body).await?;
        }

        if !detail.patches.is_empty() {
            let patches_dir = dir.patches_dir();
            tokio::fs::create_dir_all(&patches_dir).await?;
            for (index, patch) in detail.patches.iter().enumerate() {
                let response = pw.mbox(&patch.mbox).await?;
                let filename = response
                    .attachment_filename()
                    .unwrap_or_else(|| format!("{}-{}", index + 1, patch.id));
                let dest = patches_dir.join(sanitize_filename(&filename));
                info!("Saving patch to {}", dest.display());
                tokio::fs::write(&dest, &response.body).await?;
            }
        }

        Ok(())
    }
}

/// Keep a server-supplied file name inside the patches directory
fn sanitize_filename(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}
