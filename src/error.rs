use std::fmt::Display;

use thiserror::Error;

/// The two external steps sequenced by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetch,
    Publish,
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Fetch => f.write_str("fetch"),
            Step::Publish => f.write_str("publish"),
        }
    }
}

/// Failures that decide the process exit status.
///
/// Anything that is not a `PipelineError` exits with status 1.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Set GITHUB_TOKEN environment variable")]
    MissingToken,

    #[error("{step} step failed with exit status {code}")]
    StepFailed { step: Step, code: i32 },
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::MissingToken => 1,
            PipelineError::StepFailed { code, .. } => *code,
        }
    }
}

/// Exit status for an arbitrary error coming out of a command.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<PipelineError>()
        .map(PipelineError::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_message() {
        assert_eq!(
            PipelineError::MissingToken.to_string(),
            "Set GITHUB_TOKEN environment variable"
        );
        assert_eq!(PipelineError::MissingToken.exit_code(), 1);
    }

    #[test]
    fn test_step_failure_keeps_code() {
        let err = PipelineError::StepFailed {
            step: Step::Publish,
            code: 42,
        };
        assert_eq!(err.to_string(), "publish step failed with exit status 42");
        assert_eq!(exit_code_for(&anyhow::Error::new(err)), 42);
    }

    #[test]
    fn test_other_errors_exit_one() {
        assert_eq!(exit_code_for(&anyhow::anyhow!("git exploded")), 1);
    }
}
