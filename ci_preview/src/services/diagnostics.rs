//! Sync failure diagnostics — attach the logs of a crashing pod to a sync timeout.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{FailedPod, PreviewError};
use crate::models::cluster::Pod;
use crate::services::cluster::Cluster;

/// A pod restarting more often than this is considered failing.
pub const RESTART_THRESHOLD: i32 = 5;

static SYNC_TIMEOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"UPGRADE FAILED: timed out waiting for the condition|context deadline exceeded")
        .expect("valid sync timeout regex")
});

pub fn is_sync_timeout(message: &str) -> bool {
    SYNC_TIMEOUT.is_match(message)
}

/// Wrap a failed `helmfile sync` error, enriched with pod logs on timeouts.
pub async fn diagnose_sync_failure(
    cluster: &dyn Cluster,
    namespace: &str,
    err: PreviewError,
) -> PreviewError {
    if !is_sync_timeout(&err.to_string()) {
        return PreviewError::SyncFailed {
            source: Box::new(err),
            pod: None,
        };
    }

    tracing::warn!(namespace = %namespace, "helmfile sync timed out, looking for failing pods");
    let pod = match cluster.pods(namespace).await {
        Ok(pods) => find_failed_pod(cluster, namespace, &pods).await,
        Err(e) => {
            tracing::error!(namespace = %namespace, "Failed to list pods: {e}");
            None
        }
    };
    PreviewError::SyncFailed {
        source: Box::new(err),
        pod,
    }
}

async fn find_failed_pod(cluster: &dyn Cluster, namespace: &str, pods: &[Pod]) -> Option<FailedPod> {
    for pod in pods {
        let restarted = pod.most_restarted_container();
        let restarts = restarted.map_or(0, |c| c.restart_count);
        if !pod.is_failed() && restarts <= RESTART_THRESHOLD {
            continue;
        }
        let container = restarted
            .or_else(|| pod.status.container_statuses.first())
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let previous = !pod.is_failed();
        let logs = cluster
            .container_logs(namespace, &pod.metadata.name, &container, previous)
            .await
            .unwrap_or_else(|e| format!("failed to fetch logs: {e}"));
        tracing::warn!(pod = %pod.metadata.name, container = %container, restarts, "Found failing pod");
        return Some(FailedPod {
            pod: pod.metadata.name.clone(),
            container,
            namespace: namespace.to_string(),
            logs,
        });
    }
    None
}
