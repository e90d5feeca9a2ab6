//! Pull request facts as reported by the source-control host.

use serde::{Deserialize, Serialize};

pub const OK_TO_TEST_LABEL: &str = "ok-to-test";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: i64,
    pub title: String,
    pub body: String,
    /// Commit the pull request was opened/built from.
    pub sha: String,
    /// Web link of the pull request.
    pub link: String,
    pub base: PullRequestBranch,
    pub head: PullRequestBranch,
    pub author: Author,
    pub state: String,
    pub closed: bool,
    pub merged: bool,
    pub draft: bool,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestBranch {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
    pub repo: Repository,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Owner / organisation.
    pub namespace: String,
    pub name: String,
    pub link: String,
    pub clone_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
    pub name: String,
    pub avatar: String,
    pub link: String,
}

impl PullRequest {
    /// The repository the pull request targets.
    pub fn repository(&self) -> &Repository {
        &self.base.repo
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }

    /// Whether a GC sweep should destroy this pull request's preview.
    pub fn is_gc_candidate(&self, destroy_drafts: bool) -> bool {
        self.closed
            || self.merged
            || (destroy_drafts && self.draft && !self.has_label(OK_TO_TEST_LABEL))
    }
}
