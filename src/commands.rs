pub mod create_pr;
pub mod run;
pub mod save_series;
