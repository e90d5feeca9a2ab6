//! Preview engine services — collaborators and the components built on them.

pub mod activity_service;
pub mod cluster;
pub mod command_runner;
pub mod descriptor;
pub mod diagnostics;
pub mod env_vars;
pub mod git;
pub mod github_service;
pub mod helmfile;
pub mod kubectl;
pub mod namer;
pub mod output_vars;
pub mod preview_store;
pub mod prompt;
pub mod upsert;
pub mod url_discovery;
pub mod values;
pub mod watcher;
