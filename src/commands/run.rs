use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use tracing::info;

use crate::App;
use crate::clients::git::GitOps;
use crate::clients::http::HttpOps;
use crate::clients::runner::StepCommand;
use crate::clients::runner::StepProgram;
use crate::clients::runner::StepRunner;
use crate::config::Config;
use crate::config::Environment;
use crate::error::PipelineError;
use crate::error::Step;

/// Positional arguments of a run. Missing ones are passed on as empty strings.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub source_url: String,
    pub exclusion_filter: String,
    pub base_branch: String,
}

/// Where the two steps live and where they exchange the series.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub fetch: StepProgram,
    pub publish: StepProgram,
    pub series_dir: PathBuf,
}

/// Arguments handed to the fetch step, in `save-series` flag form
pub fn fetch_step_args(
    source_url: &str,
    exclusion_filter: &str,
    series_dir: &str,
) -> Vec<String> {
    ["-u", source_url, "-e", exclusion_filter, "-d", series_dir]
        .map(str::to_string)
        .to_vec()
}

/// Arguments handed to the publish step, in `create-pr` flag form
pub fn publish_step_args(
    repository: &str,
    base_branch: &str,
    series_dir: &str,
) -> Vec<String> {
    ["-r", repository, "-b", base_branch, "-s", series_dir]
        .map(str::to_string)
        .to_vec()
}

impl<G: GitOps, H: HttpOps, R: StepRunner> App<G, H, R> {
    /// Fetch a patch series and open it as a pull request.
    ///
    /// 1. Refuse to start without an access token.
    /// 2. Set the commit identity and embed the token in the `origin` URL.
    /// 3. Run the fetch step into the series directory.
    /// 4. Run the publish step on the series directory.
    ///
    /// Each step must succeed before the next one starts.
    pub async fn cmd_run(
        &self,
        env: &Environment,
        pipeline: &Pipeline,
        args: &RunArgs,
        stdout: &mut impl std::io::Write,
    ) -> Result<()> {
        writeln!(stdout, "source url: {}", args.source_url)?;
        writeln!(stdout, "exclusion filter: {}", args.exclusion_filter)?;
        writeln!(stdout, "base branch: {}", args.base_branch)?;

        let config = Config::resolve(env, pipeline.series_dir.clone())?;
        self.setup_git(&config).await?;

        let series_dir = config.series_dir.to_string_lossy().into_owned();

        let fetch = StepCommand {
            step: Step::Fetch,
            program: pipeline.fetch.clone(),
            args: fetch_step_args(&args.source_url, &args.exclusion_filter, &series_dir),
            env: config.child_env(),
        };
        writeln!(stdout, "{}", "Fetching patch series".bold())?;
        self.run_step(&fetch).await?;

        let publish = StepCommand {
            step: Step::Publish,
            program: pipeline.publish.clone(),
            args: publish_step_args(&config.repository, &args.base_branch, &series_dir),
            env: config.child_env(),
        };
        writeln!(stdout, "{}", "Creating pull requests".bold())?;
        self.run_step(&publish).await?;

        Ok(())
    }

    /// Configure the checkout for authenticated pushes. Rerunning overwrites.
    pub(crate) async fn setup_git(&self, config: &Config) -> Result<()> {
        self.git.set_config("user.name", &config.actor).await?;
        self.git.set_config("user.email", &config.email()).await?;
        self.git
            .set_remote_url("origin", &config.authenticated_remote_url())
            .await?;
        info!("Configured git for {}", config.repository);
        Ok(())
    }

    async fn run_step(&self, command: &StepCommand) -> Result<()> {
        let code = self.runner.run(command).await?;
        if code != 0 {
            return Err(PipelineError::StepFailed {
                step: command.step,
                code,
            }
            .into());
        }
        Ok(())
    }
}
