//! Centrix Preview — per-pull-request preview environments.
//!
//! Provisions a namespace for a pull request, deploys it with helmfile,
//! records the result as a `Preview` resource and tears it down again when
//! the pull request is closed.

pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

#[cfg(test)]
mod testing;
