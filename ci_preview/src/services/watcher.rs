//! Streams cluster events of the preview namespace into the log while syncing.

use std::sync::Arc;

use crate::error::Result;
use crate::services::command_runner::{Command, CommandRunner, LineSink, OutputStream, RunningCommand};

/// A running `kubectl get event -w`; purely observational.
pub struct NamespaceWatcher {
    namespace: String,
    process: Box<dyn RunningCommand>,
}

impl NamespaceWatcher {
    pub fn start(runner: &dyn CommandRunner, kubectl_bin: &str, namespace: &str) -> Result<Self> {
        let command = Command::new(kubectl_bin).args(["get", "event", "-w", "-n", namespace]);
        let ns = namespace.to_string();
        let sink: LineSink = Arc::new(move |stream: OutputStream, line: &str| match stream {
            OutputStream::Stdout => tracing::info!("{ns}: {line}"),
            OutputStream::Stderr => tracing::warn!("{ns}: ERROR: {line}"),
        });
        let process = runner.spawn(&command, sink)?;
        tracing::debug!(namespace = %namespace, "Watching namespace events");

        Ok(Self {
            namespace: namespace.to_string(),
            process,
        })
    }

    pub async fn stop(mut self) {
        self.process.kill().await;
        tracing::debug!(namespace = %self.namespace, "Stopped watching namespace events");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PreviewError;
    use crate::services::command_runner::ProcessRunner;
    use crate::testing::FakeRunner;

    #[tokio::test]
    async fn watches_the_namespace_and_stops() {
        let runner = FakeRunner::new(|_| FakeRunner::ok(""));
        let watcher = NamespaceWatcher::start(runner.as_ref(), "kubectl", "jx-o-r-pr-1").unwrap();
        assert_eq!(
            runner.spawned(),
            vec!["kubectl get event -w -n jx-o-r-pr-1".to_string()]
        );
        assert_eq!(runner.stopped(), 0);

        watcher.stop().await;
        assert_eq!(runner.stopped(), 1);
    }

    #[tokio::test]
    async fn start_and_stop_a_short_lived_process() {
        let watcher = NamespaceWatcher::start(&ProcessRunner, "echo", "jx-o-r-pr-1").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        watcher.stop().await;
    }

    #[tokio::test]
    async fn missing_binary_is_a_command_failure() {
        let err = NamespaceWatcher::start(&ProcessRunner, "/nonexistent/kubectl", "ns")
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, PreviewError::CommandFailed { .. }));
    }
}
