#![allow(async_fn_in_trait)]

use std::path;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::instrument;

// -----------------------------------------------------------------------------
// GitOps trait

/// Operations for interacting with the git checkout the action runs in
#[cfg_attr(test, automock)]
pub trait GitOps {
    /// Set a key in the repository's local config
    async fn set_config(&self, key: &str, value: &str) -> Result<()>;

    /// Point an existing remote at a new URL, replacing the previous one
    async fn set_remote_url(&self, remote: &str, url: &str) -> Result<()>;

    async fn checkout(&self, branch: &str) -> Result<()>;

    async fn checkout_new_branch(&self, branch: &str) -> Result<()>;

    /// Apply mbox patches on top of the current branch
    async fn am(&self, patches: &[path::PathBuf]) -> Result<()>;

    async fn am_abort(&self) -> Result<()>;

    async fn push_branch(&self, branch: &str) -> Result<()>;

    async fn delete_remote_branch(&self, branch: &str) -> Result<()>;
}

// -----------------------------------------------------------------------------
// RealGit

/// Real implementation that calls the git CLI
pub struct RealGit {
    path: path::PathBuf,
}

impl RealGit {
    pub fn new(path: path::PathBuf) -> Self {
        Self { path }
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .current_dir(&self.path)
            .args(args)
            .output()
            .await
            .context("Failed to execute git command")?;

        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }
}

impl GitOps for RealGit {
    #[instrument(skip(self, value))]
    async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.git(&["config", key, value]).await?;
        Ok(())
    }

    // The URL carries a token, keep it out of the span
    #[instrument(skip(self, url))]
    async fn set_remote_url(&self, remote: &str, url: &str) -> Result<()> {
        self.git(&["remote", "set-url", remote, url]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn checkout(&self, branch: &str) -> Result<()> {
        self.git(&["checkout", branch]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        self.git(&["checkout", "-b", branch]).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn am(&self, patches: &[path::PathBuf]) -> Result<()> {
        let mut args = vec!["am".to_string()];
        for patch in patches {
            args.push(patch.to_string_lossy().into_owned());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        self.git(&args).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn am_abort(&self) -> Result<()> {
        self.git(&["am", "--abort"]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn push_branch(&self, branch: &str) -> Result<()> {
        self.git(&["push", "origin", branch]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_remote_branch(&self, branch: &str) -> Result<()> {
        self.git(&["push", "origin", "--delete", branch]).await?;
        Ok(())
    }
}
