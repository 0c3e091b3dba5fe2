#![allow(async_fn_in_trait)]

use std::path;

use anyhow::Context;
use anyhow::Result;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::error::Step;

// -----------------------------------------------------------------------------
// Types

/// Program that implements one of the steps, with any leading arguments
/// (e.g. a subcommand) placed before the step's own flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepProgram {
    pub program: path::PathBuf,
    pub leading_args: Vec<String>,
}

/// A fully resolved step invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
    pub step: Step,
    pub program: StepProgram,
    /// The step's own flags, e.g. `-u <url> -e <filter> -d <dir>`
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

// -----------------------------------------------------------------------------
// StepRunner trait

/// Runs a step to completion
#[cfg_attr(test, automock)]
pub trait StepRunner {
    /// Run the step and return its exit status
    async fn run(&self, command: &StepCommand) -> Result<i32>;
}

// -----------------------------------------------------------------------------
// StepProgram impl

impl StepProgram {
    /// A standalone program taking the step flags directly
    pub fn external(program: impl Into<path::PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: vec![],
        }
    }

    /// This binary, invoked with the given subcommand
    pub fn builtin(subcommand: &str) -> Result<Self> {
        let program = std::env::current_exe().context("Failed to locate own executable")?;
        Ok(Self {
            program,
            leading_args: vec![subcommand.to_string()],
        })
    }
}

// -----------------------------------------------------------------------------
// ProcessRunner

/// Real implementation that spawns the step as a child process, inheriting
/// stdout and stderr so its output lands in the CI log.
pub struct ProcessRunner;

impl StepRunner for ProcessRunner {
    #[instrument(skip_all, fields(step = %command.step))]
    async fn run(&self, command: &StepCommand) -> Result<i32> {
        info!(
            "Running {} {}",
            command.program.program.display(),
            command
                .program
                .leading_args
                .iter()
                .chain(&command.args)
                .cloned()
                .collect::<Vec<_>>()
                .join(" ")
        );

        let status = Command::new(&command.program.program)
            .args(&command.program.leading_args)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k, v)))
            .status()
            .await
            .with_context(|| {
                format!(
                    "Failed to execute {} step: {}",
                    command.step,
                    command.program.program.display()
                )
            })?;

        match status.code() {
            Some(code) => Ok(code),
            None => {
                warn!("{} step terminated by signal", command.step);
                Ok(1)
            }
        }
    }
}
