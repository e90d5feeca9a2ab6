//! Cluster reads and deletes needed by the preview flows.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::cluster::{Ingress, KnativeService, Pod, Service};
use crate::services::kubectl::{is_unknown_resource, Kubectl};

#[async_trait]
pub trait Cluster: Send + Sync {
    /// Names of all services in a namespace.
    async fn service_names(&self, namespace: &str) -> Result<Vec<String>>;

    /// External URL of a service: expose annotation, then a same-named
    /// ingress, then a load balancer address. `None` while not exposed yet.
    async fn service_url(&self, namespace: &str, name: &str) -> Result<Option<String>>;

    /// `status.url` of a Knative service, if any.
    async fn knative_url(&self, namespace: &str, name: &str) -> Result<Option<String>>;

    async fn pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    async fn container_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        previous: bool,
    ) -> Result<String>;

    /// Delete a namespace. `false` when it did not exist.
    async fn delete_namespace(&self, namespace: &str) -> Result<bool>;
}

pub struct KubectlCluster {
    kubectl: Kubectl,
}

impl KubectlCluster {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl Cluster for KubectlCluster {
    async fn service_names(&self, namespace: &str) -> Result<Vec<String>> {
        let services: Vec<Service> = self.kubectl.list("services", namespace).await?;
        Ok(services.into_iter().map(|s| s.metadata.name).collect())
    }

    async fn service_url(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        let Some(service) = self
            .kubectl
            .get::<Service>("service", name, Some(namespace))
            .await?
        else {
            return Ok(None);
        };
        if let Some(url) = service.expose_url() {
            return Ok(Some(url));
        }
        let ingress = self
            .kubectl
            .get::<Ingress>("ingress", name, Some(namespace))
            .await?;
        if let Some(url) = ingress.and_then(|i| i.url()) {
            return Ok(Some(url));
        }
        Ok(service.load_balancer_url())
    }

    async fn knative_url(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        match self
            .kubectl
            .get::<KnativeService>("ksvc", name, Some(namespace))
            .await
        {
            Ok(ksvc) => Ok(ksvc
                .and_then(|k| k.status.url)
                .filter(|u| !u.is_empty())),
            Err(e) if is_unknown_resource(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        self.kubectl.list("pods", namespace).await
    }

    async fn container_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        previous: bool,
    ) -> Result<String> {
        self.kubectl.logs(namespace, pod, container, previous).await
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool> {
        let existing = self
            .kubectl
            .get::<serde_json::Value>("namespace", namespace, None)
            .await?;
        if existing.is_none() {
            return Ok(false);
        }
        tracing::info!(namespace = %namespace, "Deleting preview namespace");
        self.kubectl.delete("namespace", namespace, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;

    fn service_json(annotation: Option<&str>) -> String {
        let annotations = match annotation {
            Some(url) => format!(r#"{{"fabric8.io/exposeUrl":"{url}"}}"#),
            None => "{}".to_string(),
        };
        format!(r#"{{"metadata":{{"name":"web","annotations":{annotations}}},"spec":{{"type":"ClusterIP"}}}}"#)
    }

    #[tokio::test]
    async fn expose_annotation_wins() {
        let runner = FakeRunner::new(|cmd| {
            if cmd.args[1] == "service" {
                FakeRunner::ok(service_json(Some("http://web.1.2.3.4.nip.io")))
            } else {
                FakeRunner::fail("unexpected")
            }
        });
        let cluster = KubectlCluster::new(Kubectl::new(runner, "kubectl"));
        let url = cluster.service_url("ns", "web").await.unwrap();
        assert_eq!(url.as_deref(), Some("http://web.1.2.3.4.nip.io"));
    }

    #[tokio::test]
    async fn falls_back_to_ingress() {
        let runner = FakeRunner::new(|cmd| match cmd.args[1].as_str() {
            "service" => FakeRunner::ok(service_json(None)),
            "ingress" => FakeRunner::ok(
                r#"{"metadata":{"name":"web"},"spec":{"rules":[{"host":"web.example.com"}]}}"#,
            ),
            _ => FakeRunner::fail("unexpected"),
        });
        let cluster = KubectlCluster::new(Kubectl::new(runner, "kubectl"));
        let url = cluster.service_url("ns", "web").await.unwrap();
        assert_eq!(url.as_deref(), Some("http://web.example.com"));
    }

    #[tokio::test]
    async fn unexposed_service_has_no_url_yet() {
        let runner = FakeRunner::new(|cmd| match cmd.args[1].as_str() {
            "service" => FakeRunner::ok(service_json(None)),
            _ => FakeRunner::fail("Error from server (NotFound): ingresses \"web\" not found"),
        });
        let cluster = KubectlCluster::new(Kubectl::new(runner, "kubectl"));
        assert_eq!(cluster.service_url("ns", "web").await.unwrap(), None);
    }

    #[tokio::test]
    async fn deleting_a_missing_namespace_is_not_an_error() {
        let runner = FakeRunner::new(|_| {
            FakeRunner::fail("Error from server (NotFound): namespaces \"jx-o-r-pr-1\" not found")
        });
        let cluster = KubectlCluster::new(Kubectl::new(runner.clone(), "kubectl"));
        assert!(!cluster.delete_namespace("jx-o-r-pr-1").await.unwrap());
        assert_eq!(runner.commands().len(), 1);
    }

    #[tokio::test]
    async fn knative_crd_absence_is_tolerated() {
        let runner = FakeRunner::new(|_| {
            FakeRunner::fail("error: the server doesn't have a resource type \"ksvc\"")
        });
        let cluster = KubectlCluster::new(Kubectl::new(runner, "kubectl"));
        assert_eq!(cluster.knative_url("ns", "web").await.unwrap(), None);
    }
}
