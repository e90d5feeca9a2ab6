//! Thin JSON accessor over the `kubectl` CLI.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PreviewError, Result};
use crate::models::cluster::List;
use crate::services::command_runner::{Command, CommandRunner};

#[derive(Clone)]
pub struct Kubectl {
    runner: Arc<dyn CommandRunner>,
    bin: String,
}

impl Kubectl {
    pub fn new(runner: Arc<dyn CommandRunner>, bin: impl Into<String>) -> Self {
        Self {
            runner,
            bin: bin.into(),
        }
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    fn command(&self) -> Command {
        Command::new(&self.bin)
    }

    /// Fetch one object; `None` when it does not exist.
    pub async fn get<T: DeserializeOwned>(
        &self,
        resource: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<T>> {
        let mut cmd = self.command().args(["get", resource, name, "-o", "json"]);
        if let Some(ns) = namespace {
            cmd = cmd.args(["-n", ns]);
        }
        match self.runner.run(&cmd).await {
            Ok(out) => Ok(Some(serde_json::from_str(&out.stdout)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List objects of a kind; a missing resource type yields an empty list.
    pub async fn list<T: DeserializeOwned>(&self, resource: &str, namespace: &str) -> Result<Vec<T>> {
        let cmd = self
            .command()
            .args(["get", resource, "-n", namespace, "-o", "json"]);
        match self.runner.run(&cmd).await {
            Ok(out) => {
                let list: List<T> = serde_json::from_str(&out.stdout)?;
                Ok(list.items)
            }
            Err(e) if e.is_not_found() || is_unknown_resource(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn create<T: Serialize + DeserializeOwned>(&self, object: &T, namespace: &str) -> Result<T> {
        self.apply_verb("create", object, namespace).await
    }

    /// Replace honouring `metadata.resourceVersion` when present.
    pub async fn replace<T: Serialize + DeserializeOwned>(&self, object: &T, namespace: &str) -> Result<T> {
        self.apply_verb("replace", object, namespace).await
    }

    async fn apply_verb<T: Serialize + DeserializeOwned>(
        &self,
        verb: &str,
        object: &T,
        namespace: &str,
    ) -> Result<T> {
        let body = serde_json::to_string(object)?;
        let cmd = self
            .command()
            .args([verb, "-n", namespace, "-o", "json", "-f", "-"])
            .stdin(body);
        let out = self.runner.run(&cmd).await?;
        Ok(serde_json::from_str(&out.stdout)?)
    }

    /// Delete an object; `false` when it did not exist.
    pub async fn delete(&self, resource: &str, name: &str, namespace: Option<&str>) -> Result<bool> {
        let mut cmd = self.command().args(["delete", resource, name]);
        if let Some(ns) = namespace {
            cmd = cmd.args(["-n", ns]);
        }
        match self.runner.run(&cmd).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn logs(&self, namespace: &str, pod: &str, container: &str, previous: bool) -> Result<String> {
        let mut cmd = self.command().args(["logs", pod, "-n", namespace]);
        if !container.is_empty() {
            cmd = cmd.args(["-c", container]);
        }
        if previous {
            cmd = cmd.arg("--previous");
        }
        Ok(self.runner.run(&cmd).await?.stdout)
    }
}

/// kubectl's error when a CRD (e.g. Knative) is not installed.
pub fn is_unknown_resource(err: &PreviewError) -> bool {
    matches!(err, PreviewError::CommandFailed { message, .. }
        if message.contains("doesn't have a resource type"))
}

/// kubectl's error for an optimistic-concurrency clash.
pub fn is_conflict(err: &PreviewError) -> bool {
    matches!(err, PreviewError::CommandFailed { message, .. }
        if message.contains("the object has been modified")
            || message.contains("Conflict")
            || message.contains("AlreadyExists"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;

    #[tokio::test]
    async fn get_maps_not_found_to_none() {
        let runner = FakeRunner::new(|cmd| {
            if cmd.args.first().map(String::as_str) == Some("get") {
                return FakeRunner::fail("Error from server (NotFound): services \"web\" not found");
            }
            FakeRunner::ok("")
        });
        let kubectl = Kubectl::new(runner.clone(), "kubectl");
        let svc: Option<serde_json::Value> = kubectl.get("service", "web", Some("ns")).await.unwrap();
        assert!(svc.is_none());
        assert_eq!(runner.commands()[0].cli(), "kubectl get service web -o json -n ns");
    }

    #[tokio::test]
    async fn list_tolerates_missing_resource_types() {
        let runner = FakeRunner::new(|_| {
            FakeRunner::fail("error: the server doesn't have a resource type \"ksvc\"")
        });
        let kubectl = Kubectl::new(runner, "kubectl");
        let items: Vec<serde_json::Value> = kubectl.list("ksvc", "ns").await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn create_sends_object_on_stdin() {
        let runner = FakeRunner::new(|cmd| FakeRunner::ok(cmd.stdin.clone().unwrap_or_default()));
        let kubectl = Kubectl::new(runner.clone(), "kubectl");
        let obj = serde_json::json!({"metadata": {"name": "x"}});
        let created = kubectl.create(&obj, "jx").await.unwrap();
        assert_eq!(created, obj);
        assert_eq!(runner.commands()[0].cli(), "kubectl create -n jx -o json -f -");
    }

    #[test]
    fn conflict_detection() {
        let err = PreviewError::CommandFailed {
            command: "kubectl replace".into(),
            exit_code: Some(1),
            message: "Operation cannot be fulfilled: the object has been modified".into(),
        };
        assert!(is_conflict(&err));
    }
}
