pub mod completions;
pub mod config;
pub mod estimate;
pub mod history;
pub mod preview;
pub mod run;
