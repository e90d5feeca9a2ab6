//! PipelineActivity updates — attach the preview URLs to the running build.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::activity::{ActivityKey, PipelineActivity};
use crate::services::kubectl::Kubectl;
use crate::services::namer::to_valid_name;

const RESOURCE: &str = "pipelineactivities.jenkins.io";

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<PipelineActivity>>;
    async fn create(&self, activity: &PipelineActivity) -> Result<PipelineActivity>;
    async fn update(&self, activity: &PipelineActivity) -> Result<PipelineActivity>;
}

pub struct KubeActivityStore {
    kubectl: Kubectl,
}

impl KubeActivityStore {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl ActivityStore for KubeActivityStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<PipelineActivity>> {
        self.kubectl.get(RESOURCE, name, Some(namespace)).await
    }

    async fn create(&self, activity: &PipelineActivity) -> Result<PipelineActivity> {
        self.kubectl.create(activity, &activity.metadata.namespace).await
    }

    async fn update(&self, activity: &PipelineActivity) -> Result<PipelineActivity> {
        self.kubectl.replace(activity, &activity.metadata.namespace).await
    }
}

/// Key of the activity for `owner/repository/branch` build `build`.
pub fn activity_key(owner: &str, repository: &str, branch: &str, build: &str) -> ActivityKey {
    let pipeline = format!("{owner}/{repository}/{branch}");
    ActivityKey {
        name: to_valid_name(&format!("{pipeline}-{build}")),
        pipeline,
        build: build.to_string(),
        owner: owner.to_string(),
        repository: repository.to_string(),
    }
}

/// Record the preview URLs on the build's activity, creating it if needed.
/// Returns whether the activity was written.
pub async fn record_preview_activity(
    store: &dyn ActivityStore,
    namespace: &str,
    key: &ActivityKey,
    application_url: &str,
    pull_request_url: &str,
) -> Result<bool> {
    match store.get(namespace, &key.name).await? {
        Some(mut activity) => {
            if !activity.record_preview_urls(application_url, pull_request_url) {
                return Ok(false);
            }
            store.update(&activity).await?;
        }
        None => {
            let mut activity = PipelineActivity::new(key, namespace);
            activity.record_preview_urls(application_url, pull_request_url);
            store.create(&activity).await?;
        }
    }
    tracing::info!(activity = %key.name, url = %application_url, "Updated pipeline activity");
    Ok(true)
}
