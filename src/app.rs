use crate::clients::git::GitOps;
use crate::clients::http::HttpOps;
use crate::clients::runner::StepRunner;

/// Entry point for the commands, generic over the external systems it drives
/// so tests can substitute mocks.
pub struct App<G, H, R> {
    pub git: G,
    pub http: H,
    pub runner: R,
}

impl<G: GitOps, H: HttpOps, R: StepRunner> App<G, H, R> {
    pub fn new(git: G, http: H, runner: R) -> Self {
        Self { git, http, runner }
    }
}
