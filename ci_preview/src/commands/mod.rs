//! User-facing preview flows — one per CLI subcommand.

pub mod create;
pub mod destroy;
pub mod gc;
pub mod get;
pub mod template;

use std::sync::Arc;

use crate::config::PreviewConfig;
use crate::services::activity_service::{ActivityStore, KubeActivityStore};
use crate::services::cluster::{Cluster, KubectlCluster};
use crate::services::command_runner::{CommandRunner, ProcessRunner};
use crate::services::env_vars::Environment;
use crate::services::git::{credentialed_url, Git};
use crate::services::github_service::{GithubClient, ScmClient};
use crate::services::kubectl::Kubectl;
use crate::services::preview_store::{KubePreviewStore, PreviewStore};
use crate::services::prompt::{Prompter, TerminalPrompter};
use crate::services::values::ValuesGenerator;

/// Shared collaborators for preview commands.
#[derive(Clone)]
pub struct PreviewContext {
    pub config: PreviewConfig,
    pub env: Environment,
    pub runner: Arc<dyn CommandRunner>,
    pub store: Arc<dyn PreviewStore>,
    pub cluster: Arc<dyn Cluster>,
    pub scm: Arc<dyn ScmClient>,
    pub activities: Arc<dyn ActivityStore>,
    pub prompter: Arc<dyn Prompter>,
}

impl PreviewContext {
    /// Wire the real subprocess, cluster and GitHub collaborators.
    pub fn new(config: PreviewConfig, env: Environment) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
        let kubectl = Kubectl::new(runner.clone(), config.kubectl_bin.clone());
        Self {
            store: Arc::new(KubePreviewStore::new(kubectl.clone(), config.namespace.clone())),
            cluster: Arc::new(KubectlCluster::new(kubectl.clone())),
            scm: Arc::new(GithubClient::new(&config.github_api_url, &config.git_token)),
            activities: Arc::new(KubeActivityStore::new(kubectl)),
            prompter: Arc::new(TerminalPrompter),
            runner,
            config,
            env,
        }
    }

    pub fn git(&self) -> Git {
        Git::new(self.runner.clone(), self.config.git_bin.clone())
    }

    /// `url` with the configured git credentials embedded.
    pub fn credentialed(&self, url: &str, git_user: &str) -> String {
        let user = if git_user.is_empty() {
            self.config.git_user.as_str()
        } else {
            git_user
        };
        credentialed_url(url, user, &self.config.git_token)
    }

    pub fn values_generator(&self, git_user: &str) -> ValuesGenerator {
        ValuesGenerator::new(
            self.git(),
            self.credentialed(&self.config.dev_env_git_url, git_user),
            self.config.workspace_dir.clone(),
        )
    }
}
