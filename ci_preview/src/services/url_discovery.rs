//! Preview URL discovery — poll candidate services under exponential backoff.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::error::{PreviewError, Result};
use crate::services::cluster::Cluster;
use crate::services::git::join_url;
use crate::services::helmfile::Helmfile;

const INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const MULTIPLIER: f64 = 1.5;
const MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Deterministic exponential backoff (no jitter).
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    multiplier: f64,
    max_interval: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_INTERVAL, MULTIPLIER, MAX_INTERVAL)
    }
}

impl Backoff {
    pub fn new(initial: Duration, multiplier: f64, max_interval: Duration) -> Self {
        Self {
            next: initial,
            multiplier,
            max_interval,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.mul_f64(self.multiplier).min(self.max_interval);
        delay
    }
}

/// Where candidate names come from on each attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates {
    /// A single explicitly configured service.
    Explicit(String),
    /// Every service currently present in the namespace.
    AllServices,
}

/// Poll until some candidate exposes a URL or `timeout` elapses.
pub async fn discover_url(
    cluster: &dyn Cluster,
    namespace: &str,
    candidates: &Candidates,
    timeout: Duration,
) -> Result<String> {
    let start = Instant::now();
    let mut backoff = Backoff::default();
    let mut names: Vec<String> = Vec::new();

    loop {
        names = match candidates {
            Candidates::Explicit(name) => vec![name.clone()],
            Candidates::AllServices => match cluster.service_names(namespace).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(namespace = %namespace, "Failed to list services: {e}");
                    names
                }
            },
        };

        for name in &names {
            if let Some(url) = lookup(cluster, namespace, name).await {
                tracing::info!(service = %name, url = %url, "Found preview URL");
                return Ok(url);
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(PreviewError::DiscoveryTimeout {
                candidates: names,
                timeout,
            });
        }
        let delay = backoff.next_delay().min(timeout - elapsed);
        tracing::debug!(namespace = %namespace, delay_ms = delay.as_millis() as u64, "No preview URL yet, retrying");
        tokio::time::sleep(delay).await;
    }
}

/// Generic service/ingress lookup first, then the Knative service.
async fn lookup(cluster: &dyn Cluster, namespace: &str, name: &str) -> Option<String> {
    match cluster.service_url(namespace, name).await {
        Ok(Some(url)) => return Some(url),
        Ok(None) => {}
        Err(e) => tracing::warn!(service = %name, "Failed to look up service URL: {e}"),
    }
    match cluster.knative_url(namespace, name).await {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(service = %name, "Failed to look up Knative URL: {e}");
            None
        }
    }
}

/// Discover the URL of a synced preview and append the configured path.
pub async fn find_preview_url(
    cluster: &dyn Cluster,
    helmfile: &Helmfile,
    env: &BTreeMap<String, String>,
    preview_namespace: &str,
    service: Option<&str>,
    path: &str,
    timeout: Duration,
) -> Result<String> {
    let releases = helmfile.list_releases(env).await?;
    let release = releases.first().ok_or_else(|| {
        PreviewError::Validation("no releases found in the preview helmfile".to_string())
    })?;
    let namespace = if release.namespace.is_empty() {
        preview_namespace
    } else {
        release.namespace.as_str()
    };
    let candidates = match service.filter(|s| !s.is_empty()) {
        Some(name) => Candidates::Explicit(name.to_string()),
        None => Candidates::AllServices,
    };
    let url = discover_url(cluster, namespace, &candidates, timeout).await?;
    Ok(join_url(&url, path))
}
