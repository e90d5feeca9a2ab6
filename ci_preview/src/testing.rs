//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::commands::PreviewContext;
use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result};
use crate::models::activity::PipelineActivity;
use crate::models::cluster::{ContainerStatus, Meta, Pod, PodStatus};
use crate::models::pull_request::{Author, PullRequest, PullRequestBranch, Repository};
use crate::services::activity_service::ActivityStore;
use crate::services::cluster::Cluster;
use crate::services::command_runner::{
    Command, CommandOutput, CommandRunner, LineSink, OutputStream, RunningCommand,
};
use crate::services::env_vars::Environment;
use crate::services::github_service::ScmClient;
use crate::services::preview_store::InMemoryPreviewStore;
use crate::services::prompt::{parse_selection, Prompter};

type Handler = Arc<dyn Fn(&Command) -> Result<CommandOutput> + Send + Sync>;

// ── Commands ──

/// Records every command and answers with a scripted handler.
pub struct FakeRunner {
    handler: Mutex<Handler>,
    commands: Mutex<Vec<Command>>,
    spawned: Mutex<Vec<String>>,
    stopped: Arc<AtomicUsize>,
}

impl FakeRunner {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&Command) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Mutex::new(Arc::new(handler)),
            commands: Mutex::new(Vec::new()),
            spawned: Mutex::new(Vec::new()),
            stopped: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn ok(stdout: impl Into<String>) -> Result<CommandOutput> {
        Ok(CommandOutput {
            stdout: stdout.into(),
            stderr: String::new(),
        })
    }

    pub fn fail(message: impl Into<String>) -> Result<CommandOutput> {
        Err(PreviewError::CommandFailed {
            command: "fake".to_string(),
            exit_code: Some(1),
            message: message.into(),
        })
    }

    /// Replace the handler for subsequent commands.
    pub fn respond_with<F>(&self, handler: F)
    where
        F: Fn(&Command) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap() = Arc::new(handler);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    /// Command lines of background commands, in start order.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }

    /// How many background commands were killed.
    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &Command) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.clone());
        let handler = self.handler.lock().unwrap().clone();
        (*handler)(command)
    }

    fn spawn(&self, command: &Command, sink: LineSink) -> Result<Box<dyn RunningCommand>> {
        self.spawned.lock().unwrap().push(command.cli());
        sink(OutputStream::Stdout, "started");
        Ok(Box::new(FakeProcess {
            stopped: self.stopped.clone(),
        }))
    }
}

struct FakeProcess {
    stopped: Arc<AtomicUsize>,
}

#[async_trait]
impl RunningCommand for FakeProcess {
    async fn kill(&mut self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Cluster ──

#[derive(Default)]
struct ClusterState {
    services: BTreeMap<(String, String), Option<String>>,
    knative: BTreeMap<(String, String), String>,
    pods: BTreeMap<String, Vec<Pod>>,
    logs: BTreeMap<(String, String, String), String>,
    log_requests: Vec<(String, String, bool)>,
    namespaces: BTreeSet<String>,
    deleted: Vec<String>,
    fail_deletes: bool,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

impl FakeCluster {
    pub fn add_service(&self, namespace: &str, name: &str, url: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.namespaces.insert(namespace.to_string());
        state.services.insert(key(namespace, name), url.map(str::to_string));
    }

    /// A service exposed through a same-named plain HTTP ingress.
    pub fn add_ingress_service(&self, namespace: &str, name: &str, host: &str) {
        self.add_service(namespace, name, Some(&format!("http://{host}")));
    }

    pub fn set_knative_url(&self, namespace: &str, name: &str, url: &str) {
        self.state
            .lock()
            .unwrap()
            .knative
            .insert(key(namespace, name), url.to_string());
    }

    pub fn add_pod(&self, namespace: &str, name: &str, phase: &str, containers: &[(&str, i32)]) {
        let pod = Pod {
            metadata: Meta {
                name: name.to_string(),
                ..Meta::default()
            },
            status: PodStatus {
                phase: phase.to_string(),
                container_statuses: containers
                    .iter()
                    .map(|(container, restarts)| ContainerStatus {
                        name: container.to_string(),
                        restart_count: *restarts,
                    })
                    .collect(),
            },
        };
        let mut state = self.state.lock().unwrap();
        state.namespaces.insert(namespace.to_string());
        state.pods.entry(namespace.to_string()).or_default().push(pod);
    }

    pub fn set_logs(&self, namespace: &str, pod: &str, container: &str, logs: &str) {
        self.state.lock().unwrap().logs.insert(
            (namespace.to_string(), pod.to_string(), container.to_string()),
            logs.to_string(),
        );
    }

    pub fn log_requests(&self) -> Vec<(String, String, bool)> {
        self.state.lock().unwrap().log_requests.clone()
    }

    pub fn add_namespace(&self, namespace: &str) {
        self.state.lock().unwrap().namespaces.insert(namespace.to_string());
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.state.lock().unwrap().namespaces.contains(namespace)
    }

    pub fn deleted_namespaces(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Make every namespace delete fail.
    pub fn fail_deletes(&self) {
        self.state.lock().unwrap().fail_deletes = true;
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn service_names(&self, namespace: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .services
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn service_url(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state.services.get(&key(namespace, name)).cloned().flatten())
    }

    async fn knative_url(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().knative.get(&key(namespace, name)).cloned())
    }

    async fn pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pods
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn container_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        previous: bool,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state
            .log_requests
            .push((pod.to_string(), container.to_string(), previous));
        state
            .logs
            .get(&(namespace.to_string(), pod.to_string(), container.to_string()))
            .cloned()
            .ok_or_else(|| PreviewError::CommandFailed {
                command: format!("kubectl logs {pod} -c {container}"),
                exit_code: Some(1),
                message: "no logs".to_string(),
            })
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deletes {
            return Err(PreviewError::CommandFailed {
                command: format!("kubectl delete namespace {namespace}"),
                exit_code: Some(1),
                message: "forbidden".to_string(),
            });
        }
        if !state.namespaces.remove(namespace) {
            return Ok(false);
        }
        state.deleted.push(namespace.to_string());
        Ok(true)
    }
}

// ── Pipeline activities ──

#[derive(Default)]
pub struct FakeActivities {
    activities: Mutex<BTreeMap<(String, String), PipelineActivity>>,
}

#[async_trait]
impl ActivityStore for FakeActivities {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<PipelineActivity>> {
        Ok(self.activities.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn create(&self, activity: &PipelineActivity) -> Result<PipelineActivity> {
        self.activities.lock().unwrap().insert(
            key(&activity.metadata.namespace, &activity.metadata.name),
            activity.clone(),
        );
        Ok(activity.clone())
    }

    async fn update(&self, activity: &PipelineActivity) -> Result<PipelineActivity> {
        self.create(activity).await
    }
}

// ── Source control ──

#[derive(Default)]
pub struct FakeScm {
    pull_requests: Mutex<BTreeMap<(String, String, i64), PullRequest>>,
    comments: Mutex<Vec<String>>,
}

impl FakeScm {
    pub fn add_pull_request(&self, owner: &str, repo: &str, pr: PullRequest) {
        self.pull_requests
            .lock()
            .unwrap()
            .insert((owner.to_string(), repo.to_string(), pr.number), pr);
    }

    pub fn comments(&self) -> Vec<String> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScmClient for FakeScm {
    async fn find_pull_request(&self, owner: &str, repo: &str, number: i64) -> Result<PullRequest> {
        self.pull_requests
            .lock()
            .unwrap()
            .get(&(owner.to_string(), repo.to_string(), number))
            .cloned()
            .ok_or_else(|| PreviewError::Scm(format!("pull request {owner}/{repo}#{number} not found")))
    }

    async fn create_comment(&self, _owner: &str, _repo: &str, _number: i64, body: &str) -> Result<()> {
        self.comments.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

// ── Prompts ──

/// Answers every prompt with the same text.
pub struct ScriptedPrompt {
    answer: String,
    asked: Mutex<Vec<Vec<String>>>,
}

impl ScriptedPrompt {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Options offered by each prompt so far.
    pub fn asked(&self) -> Vec<Vec<String>> {
        self.asked.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompt {
    fn select(&self, _message: &str, options: &[String], select_all: bool) -> Result<Vec<String>> {
        self.asked.lock().unwrap().push(options.to_vec());
        parse_selection(&self.answer, options, select_all)
    }
}

// ── Fixtures ──

/// An open pull request on `myowner/myrepo`.
pub fn fixture_pull_request(number: i64) -> PullRequest {
    let repo = Repository {
        namespace: "myowner".to_string(),
        name: "myrepo".to_string(),
        link: "https://github.com/myowner/myrepo".to_string(),
        clone_url: "https://github.com/myowner/myrepo.git".to_string(),
    };
    PullRequest {
        number,
        title: format!("PR {number}"),
        body: "some changes".to_string(),
        sha: "abc123".to_string(),
        link: format!("https://github.com/myowner/myrepo/pull/{number}"),
        base: PullRequestBranch {
            git_ref: "main".to_string(),
            sha: "base123".to_string(),
            repo: repo.clone(),
        },
        head: PullRequestBranch {
            git_ref: format!("feature-{number}"),
            sha: "abc123".to_string(),
            repo,
        },
        author: Author {
            login: "dev".to_string(),
            name: "Dev Eloper".to_string(),
            avatar: "https://avatars.example.com/dev".to_string(),
            link: "https://github.com/dev".to_string(),
        },
        state: "open".to_string(),
        ..PullRequest::default()
    }
}

/// Every collaborator faked, wired into a [`PreviewContext`] on demand.
pub struct TestHarness {
    pub runner: Arc<FakeRunner>,
    pub store: Arc<InMemoryPreviewStore>,
    pub cluster: Arc<FakeCluster>,
    pub scm: Arc<FakeScm>,
    pub activities: Arc<FakeActivities>,
    pub prompter: Arc<ScriptedPrompt>,
    pub config: PreviewConfig,
    pub env: Environment,
    _workspace: tempfile::TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let workspace = tempfile::tempdir().unwrap();
        Self {
            runner: FakeRunner::new(|_| FakeRunner::ok("")),
            store: Arc::new(InMemoryPreviewStore::new("jx")),
            cluster: Arc::new(FakeCluster::default()),
            scm: Arc::new(FakeScm::default()),
            activities: Arc::new(FakeActivities::default()),
            prompter: Arc::new(ScriptedPrompt::new("")),
            config: PreviewConfig {
                namespace: "jx".to_string(),
                workspace_dir: workspace.path().to_path_buf(),
                ..PreviewConfig::default()
            },
            env: Environment::default(),
            _workspace: workspace,
        }
    }

    pub fn context(&self) -> PreviewContext {
        PreviewContext {
            config: self.config.clone(),
            env: self.env.clone(),
            runner: self.runner.clone(),
            store: self.store.clone(),
            cluster: self.cluster.clone(),
            scm: self.scm.clone(),
            activities: self.activities.clone(),
            prompter: self.prompter.clone(),
        }
    }
}
