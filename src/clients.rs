//! Clients for the external systems the action coordinates.
//!
//! - [`git`]: the local checkout (identity, remote URL, `git am`, pushing)
//! - [`http`]: curl-based HTTP transport shared by the API clients
//! - [`patchwork`]: patchwork REST API (projects, patches, series, mboxes)
//! - [`github`]: GitHub pull requests
//! - [`runner`]: child processes implementing the fetch and publish steps
//!
//! The traits have real implementations for production and mockall mocks
//! for unit tests.

pub mod git;
pub mod github;
pub mod http;
pub mod patchwork;
pub mod runner;
