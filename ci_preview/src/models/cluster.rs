//! Subsets of core cluster objects read by URL discovery and sync diagnostics.

use std::collections::BTreeMap;

use serde::Deserialize;

pub const EXPOSE_URL_ANNOTATION: &str = "fabric8.io/exposeUrl";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

// ── Services ──

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub metadata: Meta,
    #[serde(default)]
    pub spec: ServiceSpec,
    #[serde(default)]
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(default, rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicePort {
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    #[serde(default)]
    pub load_balancer: LoadBalancerStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadBalancerStatus {
    #[serde(default)]
    pub ingress: Vec<LoadBalancerIngress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadBalancerIngress {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub hostname: String,
}

// ── Ingresses ──

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ingress {
    #[serde(default)]
    pub metadata: Meta,
    #[serde(default)]
    pub spec: IngressSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngressSpec {
    #[serde(default)]
    pub tls: Vec<IngressTls>,
    #[serde(default)]
    pub rules: Vec<IngressRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngressTls {
    #[serde(default)]
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngressRule {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub http: Option<HttpIngressRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpIngressRule {
    #[serde(default)]
    pub paths: Vec<HttpIngressPath>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpIngressPath {
    #[serde(default)]
    pub path: String,
}

// ── Knative services ──

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnativeService {
    #[serde(default)]
    pub metadata: Meta,
    #[serde(default)]
    pub status: KnativeStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnativeStatus {
    #[serde(default)]
    pub url: Option<String>,
}

// ── Pods ──

pub const POD_FAILED: &str = "Failed";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: Meta,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub restart_count: i32,
}

impl Pod {
    pub fn is_failed(&self) -> bool {
        self.status.phase == POD_FAILED
    }

    /// Container with the most restarts; the first wins on ties, none if nothing restarted.
    pub fn most_restarted_container(&self) -> Option<&ContainerStatus> {
        let mut best: Option<&ContainerStatus> = None;
        for status in &self.status.container_statuses {
            if status.restart_count > best.map_or(0, |b| b.restart_count) {
                best = Some(status);
            }
        }
        best
    }
}

impl Ingress {
    /// URL of the first rule with a host.
    pub fn url(&self) -> Option<String> {
        let rule = self.spec.rules.iter().find(|r| !r.host.is_empty())?;
        let tls = self
            .spec
            .tls
            .iter()
            .any(|t| t.hosts.iter().any(|h| h == &rule.host));
        let scheme = if tls { "https" } else { "http" };
        let path = rule
            .http
            .as_ref()
            .and_then(|h| h.paths.first())
            .map(|p| p.path.trim_matches('/'))
            .unwrap_or_default();
        if path.is_empty() {
            Some(format!("{scheme}://{}", rule.host))
        } else {
            Some(format!("{scheme}://{}/{path}", rule.host))
        }
    }
}

impl Service {
    pub fn expose_url(&self) -> Option<String> {
        self.metadata
            .annotations
            .get(EXPOSE_URL_ANNOTATION)
            .filter(|u| !u.is_empty())
            .cloned()
    }

    /// URL of a `LoadBalancer` service once the cloud assigned an address.
    pub fn load_balancer_url(&self) -> Option<String> {
        if self.spec.service_type != "LoadBalancer" {
            return None;
        }
        let ingress = self.status.load_balancer.ingress.first()?;
        let host = if ingress.hostname.is_empty() {
            &ingress.ip
        } else {
            &ingress.hostname
        };
        if host.is_empty() {
            return None;
        }
        match self.spec.ports.first().map(|p| p.port) {
            Some(port) if port != 80 && port != 0 => Some(format!("http://{host}:{port}")),
            _ => Some(format!("http://{host}")),
        }
    }
}
