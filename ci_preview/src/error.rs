//! Preview engine error taxonomy.
//!
//! Component seams return [`PreviewError`]; command flows wrap it in
//! `anyhow` with the operation context as it crosses into the binary.

use std::time::Duration;

/// Result alias used by engine components.
pub type Result<T, E = PreviewError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// Required deployment variable has neither a value nor a default.
    #[error("missing ${0} environment variable")]
    MissingEnvVar(String),

    #[error("{0}")]
    Validation(String),

    /// Preview namespace exceeds the platform limit even after truncation.
    #[error("preview namespace {name} is too long. Must be no more than {limit} characters")]
    NameTooLong { name: String, limit: usize },

    #[error("failed to find preview URL for app names {candidates:?} in timeout {timeout:?}")]
    DiscoveryTimeout {
        candidates: Vec<String>,
        timeout: Duration,
    },

    /// A subprocess could not be spawned or exited non-zero.
    #[error("failed to run {command}: {message}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        message: String,
    },

    /// `helmfile sync` failed, optionally enriched with a failing pod's logs.
    #[error("{}", render_sync_failure(.source, .pod))]
    SyncFailed {
        #[source]
        source: Box<PreviewError>,
        pod: Option<FailedPod>,
    },

    #[error("failed to find preview {name} in namespace {namespace}")]
    RecordNotFound { name: String, namespace: String },

    #[error("conflict writing preview {name} in namespace {namespace}: {message}")]
    StoreConflict {
        name: String,
        namespace: String,
        message: String,
    },

    #[error("preview store error in namespace {namespace}: {message}")]
    Store { namespace: String, message: String },

    #[error("failed to git clone {url}: {message}")]
    CloneFailed { url: String, message: String },

    #[error("failed to run destroy command for preview {name}")]
    DestroyCommandFailed {
        name: String,
        #[source]
        source: Box<PreviewError>,
    },

    #[error("failed to delete preview namespace {namespace}: {message}")]
    NamespaceDeleteFailed { namespace: String, message: String },

    #[error("failed to delete preview {name} in namespace {namespace}")]
    RecordDeleteFailed {
        name: String,
        namespace: String,
        #[source]
        source: Box<PreviewError>,
    },

    /// Source-control API failure.
    #[error("source control error: {0}")]
    Scm(String),

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// The pod singled out by sync diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPod {
    pub pod: String,
    pub container: String,
    pub namespace: String,
    pub logs: String,
}

fn render_sync_failure(source: &PreviewError, pod: &Option<FailedPod>) -> String {
    match pod {
        None => format!("helmfile sync failed: {source}"),
        Some(p) => format!(
            "failed to sync helmfile due to a timeout, pod {} container {} in namespace {} has failed with the logs:\n {}: {source}",
            p.pod, p.container, p.namespace, p.logs
        ),
    }
}

impl PreviewError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True for "the object does not exist" failures from the control plane.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::RecordNotFound { .. } => true,
            Self::CommandFailed { message, .. } => {
                message.contains("NotFound") || message.contains("not found")
            }
            _ => false,
        }
    }
}
