//! jenkins.io/v1 PipelineActivity — coarse build activity enriched with preview URLs.

use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "jenkins.io/v1";
pub const KIND: &str = "PipelineActivity";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineActivity {
    pub api_version: String,
    pub kind: String,
    pub metadata: ActivityMeta,
    #[serde(default)]
    pub spec: ActivitySpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    /// Labels, annotations and the rest, kept across a replace.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pipeline: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_owner: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default)]
    pub steps: Vec<ActivityStep>,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStep {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<PreviewActivityStep>,
    /// Fields of other step kinds are carried through untouched.
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewActivityStep {
    #[serde(rename = "applicationURL", default, skip_serializing_if = "String::is_empty")]
    pub application_url: String,
    #[serde(rename = "pullRequestURL", default, skip_serializing_if = "String::is_empty")]
    pub pull_request_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub started_timestamp: String,
}

/// Identifies the activity of one pipeline build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityKey {
    pub name: String,
    pub pipeline: String,
    pub build: String,
    pub owner: String,
    pub repository: String,
}

impl PipelineActivity {
    pub fn new(key: &ActivityKey, namespace: &str) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ActivityMeta {
                name: key.name.clone(),
                namespace: namespace.to_string(),
                ..ActivityMeta::default()
            },
            spec: ActivitySpec {
                pipeline: key.pipeline.clone(),
                build: key.build.clone(),
                git_owner: key.owner.clone(),
                git_repository: key.repository.clone(),
                status: "Running".to_string(),
                ..ActivitySpec::default()
            },
        }
    }

    /// The preview step, appended if the activity has none yet.
    pub fn preview_step_mut(&mut self) -> &mut PreviewActivityStep {
        let idx = match self
            .spec
            .steps
            .iter()
            .position(|s| s.kind == "Preview" && s.preview.is_some())
        {
            Some(idx) => idx,
            None => {
                self.spec.steps.push(ActivityStep {
                    kind: "Preview".to_string(),
                    preview: Some(PreviewActivityStep {
                        started_timestamp: chrono::Utc::now().to_rfc3339(),
                        ..PreviewActivityStep::default()
                    }),
                    other: serde_json::Map::new(),
                });
                self.spec.steps.len() - 1
            }
        };
        self.spec.steps[idx]
            .preview
            .get_or_insert_with(PreviewActivityStep::default)
    }

    /// Set the preview URLs where still empty. Returns whether anything changed.
    pub fn record_preview_urls(&mut self, application_url: &str, pull_request_url: &str) -> bool {
        let step = self.preview_step_mut();
        let mut updated = false;
        if step.application_url.is_empty() && !application_url.is_empty() {
            step.application_url = application_url.to_string();
            updated = true;
        }
        if step.pull_request_url.is_empty() && !pull_request_url.is_empty() {
            step.pull_request_url = pull_request_url.to_string();
            updated = true;
        }
        updated
    }
}
