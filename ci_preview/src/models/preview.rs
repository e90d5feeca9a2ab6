//! preview.jenkins.io/v1alpha1 Preview — durable record of one pull request's preview.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "preview.jenkins.io/v1alpha1";
pub const KIND: &str = "Preview";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PreviewSpec,
    /// Controller-owned status; never written by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Optimistic-concurrency token echoed back on update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
    /// Labels, annotations, finalizers and the rest, kept across a replace.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSpec {
    #[serde(default)]
    pub source: PreviewSource,
    #[serde(default)]
    pub pull_request: PullRequestSpec,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub destroy_command: DestroyCommand,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Credentialed clone URL, needed to clone again at destroy/GC time.
    #[serde(rename = "cloneURL", default, skip_serializing_if = "String::is_empty")]
    pub clone_url: String,
    #[serde(rename = "ref", default, skip_serializing_if = "String::is_empty")]
    pub git_ref: String,
    /// Relative path of the preview descriptor.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestSpec {
    #[serde(default)]
    pub number: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default)]
    pub user: UserSpec,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub latest_commit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "linkUrl", default, skip_serializing_if = "String::is_empty")]
    pub link_url: String,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "String::is_empty")]
    pub image_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// Display name of the deployed application.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// The preview namespace the pull request is deployed into.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

/// Fully parameterised command able to tear the preview down later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyCommand {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// `kubectl get previews -o json` list shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewList {
    #[serde(default)]
    pub items: Vec<Preview>,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

impl Preview {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                ..ObjectMeta::default()
            },
            spec: PreviewSpec::default(),
            status: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

impl DestroyCommand {
    pub fn has_command(&self) -> bool {
        !self.command.is_empty()
    }
}

/// Ordering used for listing and GC: owner, then repository, then PR number.
pub fn compare_previews(a: &Preview, b: &Preview) -> Ordering {
    let (pa, pb) = (&a.spec.pull_request, &b.spec.pull_request);
    pa.owner
        .cmp(&pb.owner)
        .then_with(|| pa.repository.cmp(&pb.repository))
        .then_with(|| pa.number.cmp(&pb.number))
}

pub fn sort_previews(previews: &mut [Preview]) {
    previews.sort_by(compare_previews);
}
