use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use patchwork_pr::App;
use patchwork_pr::PipelineError;
use patchwork_pr::clients::git::RealGit;
use patchwork_pr::clients::http::CurlClient;
use patchwork_pr::clients::patchwork::DEFAULT_API_URL;
use patchwork_pr::clients::runner::ProcessRunner;
use patchwork_pr::clients::runner::StepProgram;
use patchwork_pr::commands::create_pr::CreatePrArgs;
use patchwork_pr::commands::run::Pipeline;
use patchwork_pr::commands::run::RunArgs;
use patchwork_pr::commands::save_series::SaveSeriesArgs;
use patchwork_pr::commands::save_series::SeriesFilter;
use patchwork_pr::config::DEFAULT_SERIES_DIR;
use patchwork_pr::config::Environment;
use patchwork_pr::error::exit_code_for;

const SAVE_SERIES: &str = "save-series";
const CREATE_PR: &str = "create-pr";

#[derive(Parser)]
#[command(name = "patchwork-pr")]
#[command(about = "Open patchwork patch series as GitHub pull requests", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunCli,
}

/// Fetch a series and publish it (the container entrypoint)
#[derive(Args)]
pub struct RunCli {
    /// Patchwork REST API URL handed to the fetch step
    #[arg(allow_hyphen_values = true)]
    source_url: Option<String>,
    /// Regex of series names the fetch step skips
    #[arg(allow_hyphen_values = true)]
    exclusion_filter: Option<String>,
    /// Branch the pull requests target
    #[arg(allow_hyphen_values = true)]
    base_branch: Option<String>,
    /// Directory the series is saved to and published from
    #[arg(long, default_value = DEFAULT_SERIES_DIR)]
    series_dir: PathBuf,
    /// Program to run as the fetch step (defaults to this binary's save-series)
    #[arg(long)]
    fetch_cmd: Option<PathBuf>,
    /// Program to run as the publish step (defaults to this binary's create-pr)
    #[arg(long)]
    publish_cmd: Option<PathBuf>,
}

impl RunCli {
    fn args(&self) -> RunArgs {
        RunArgs {
            source_url: self.source_url.clone().unwrap_or_default(),
            exclusion_filter: self.exclusion_filter.clone().unwrap_or_default(),
            base_branch: self.base_branch.clone().unwrap_or_default(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save patch series from a patchwork server
    #[command(name = SAVE_SERIES)]
    SaveSeries(SaveSeriesCli),
    /// Create pull requests for saved series
    #[command(name = CREATE_PR)]
    CreatePr(CreatePrCli),
}

#[derive(Args)]
pub struct SaveSeriesCli {
    /// Patchwork REST API base URL
    #[arg(short, long, default_value = DEFAULT_API_URL, allow_hyphen_values = true)]
    url: String,
    /// Project link name
    #[arg(short, long, default_value = "bluetooth")]
    project_name: String,
    /// Patch states to query
    #[arg(short = 's', long, num_args = 1.., default_values = ["1", "2"])]
    patch_state: Vec<String>,
    /// Directory to save the series to
    #[arg(short, long, default_value = "./series")]
    dest_path: PathBuf,
    /// Skip series whose name matches this regex (empty disables it)
    #[arg(
        short,
        long,
        default_value = "Bluetooth:",
        conflicts_with = "include_str",
        allow_hyphen_values = true
    )]
    exclude_str: String,
    /// Only save series whose name matches this regex
    #[arg(short, long, allow_hyphen_values = true)]
    include_str: Option<String>,
}

impl SaveSeriesCli {
    /// `-i` replaces the exclusion filter; an empty `-e` saves everything.
    fn into_args(self) -> SaveSeriesArgs {
        let filter = match self.include_str {
            Some(pattern) => Some(SeriesFilter::Include(pattern)),
            None if self.exclude_str.is_empty() => None,
            None => Some(SeriesFilter::Exclude(self.exclude_str)),
        };
        SaveSeriesArgs {
            url: self.url,
            project_name: self.project_name,
            patch_states: self.patch_state,
            dest_path: self.dest_path,
            filter,
        }
    }
}

#[derive(Args)]
pub struct CreatePrCli {
    /// Directory containing the saved series
    #[arg(short, long, default_value = "./series")]
    series_path: PathBuf,
    /// Repository to open the pull requests on, as OWNER/NAME
    #[arg(short = 'r', long)]
    base_repo: String,
    /// Branch the pull requests target
    #[arg(short = 'b', long, default_value = "master", allow_hyphen_values = true)]
    base_branch: String,
    /// Branch to return to between series
    #[arg(short, long, default_value = "master")]
    working_branch: String,
}

impl CreatePrCli {
    fn into_args(self) -> CreatePrArgs {
        CreatePrArgs {
            series_path: self.series_path,
            base_repo: self.base_repo,
            base_branch: self.base_branch,
            working_branch: self.working_branch,
            pr_delay: Duration::from_secs(1),
        }
    }
}

async fn dispatch(cli: Cli, stdout: &mut impl std::io::Write) -> Result<()> {
    let env = Environment::capture();
    let app = App::new(RealGit::new(PathBuf::from(".")), CurlClient, ProcessRunner);

    match cli.command {
        Some(Commands::SaveSeries(save)) => {
            app.cmd_save_series(&save.into_args(), stdout).await
        }
        Some(Commands::CreatePr(create)) => {
            app.cmd_create_pr(&env, &create.into_args(), stdout).await
        }
        None => {
            let run = cli.run;
            let args = run.args();
            let pipeline = Pipeline {
                fetch: match run.fetch_cmd {
                    Some(program) => StepProgram::external(program),
                    None => StepProgram::builtin(SAVE_SERIES)?,
                },
                publish: match run.publish_cmd {
                    Some(program) => StepProgram::external(program),
                    None => StepProgram::builtin(CREATE_PR)?,
                },
                series_dir: run.series_dir,
            };
            app.cmd_run(&env, &pipeline, &args, stdout).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = patchwork_pr::logging::init() {
        eprintln!("Failed to set up logging: {:#}", e);
    }

    let cli = Cli::parse();

    match dispatch(cli, &mut std::io::stdout()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(PipelineError::MissingToken) = err.downcast_ref::<PipelineError>() {
                println!("{}", err);
            } else {
                eprintln!("Error: {:#}", err);
            }
            ExitCode::from(u8::try_from(exit_code_for(&err)).unwrap_or(1))
        }
    }
}
