//! Preview engine data models.

pub mod activity;
pub mod cluster;
pub mod preview;
pub mod pull_request;
