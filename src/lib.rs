pub mod clients;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod series;

mod app;

pub use app::App;
pub use config::Config;
pub use error::PipelineError;

// Disable colors for all tests to get clean output
#[cfg(test)]
#[ctor::ctor]
fn init_tests() {
    colored::control::set_override(false);
}
