//! Side-effecting seams: version control, hosting, configuration and run state.

pub mod backend;
pub mod config;
pub mod git;
pub mod hosting;
pub mod paths;
pub mod run_state;
