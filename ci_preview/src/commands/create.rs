//! `create` — provision or refresh the preview environment of a pull request.
//!
//! Runs the stages of [`CreateStage`] strictly in order. A sync failure aborts
//! the run; URL discovery, activity updates and values regeneration are best
//! effort and only log warnings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::commands::PreviewContext;
use crate::error::PreviewError;
use crate::models::preview::{Preview, UserSpec};
use crate::models::pull_request::{Author, PullRequest};
use crate::services::activity_service::{activity_key, record_preview_activity};
use crate::services::descriptor::{
    clean_path, relative_path, resolve_descriptor, scaffold_descriptor, Descriptor, DescriptorState,
};
use crate::services::diagnostics::diagnose_sync_failure;
use crate::services::env_vars::{deploy_env, DeployDefaults};
use crate::services::git::{parse_owner_repo, redact_credentials};
use crate::services::helmfile::Helmfile;
use crate::services::namer::preview_namespace;
use crate::services::output_vars::write_output_vars;
use crate::services::upsert::{upsert_preview, UpsertRequest};
use crate::services::url_discovery::find_preview_url;
use crate::services::watcher::NamespaceWatcher;

const SCAFFOLD_COMMIT_MESSAGE: &str = "fix: add preview helmfile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStage {
    Validating,
    DiscoveringPr,
    ComputingEnv,
    UpsertingRecord,
    WatchingNamespace,
    Syncing,
    StopWatching,
    DiscoveringUrl,
    UpdatingRecord,
    UpdatingActivity,
    CommentingOnPr,
    Done,
}

impl fmt::Display for CreateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::DiscoveringPr => "discovering pull request",
            Self::ComputingEnv => "computing environment",
            Self::UpsertingRecord => "upserting preview",
            Self::WatchingNamespace => "watching namespace",
            Self::Syncing => "syncing",
            Self::StopWatching => "stopping namespace watch",
            Self::DiscoveringUrl => "discovering URL",
            Self::UpdatingRecord => "updating preview",
            Self::UpdatingActivity => "updating activity",
            Self::CommentingOnPr => "commenting on pull request",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

fn enter(stage: CreateStage) {
    tracing::debug!(stage = %stage, "Create preview stage");
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Project directory holding the charts.
    pub dir: PathBuf,
    /// Explicit descriptor; discovered from `dir` when unset.
    pub file: Option<PathBuf>,
    pub source_url: String,
    pub owner: String,
    /// Repository name, also the default application name.
    pub repository: String,
    pub number: i64,
    /// Overrides the computed preview namespace.
    pub preview_namespace: String,
    pub service: String,
    pub path: String,
    pub selectors: Vec<String>,
    pub preview_url_timeout: Duration,
    pub docker_registry: String,
    pub version: String,
    pub build: String,
    pub branch: String,
    /// Head branch of the pull request, for pushing a scaffolded descriptor.
    pub pull_request_branch: String,
    pub git_user: String,
    pub no_comment: bool,
    pub no_watch: bool,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Ready(CreateReport),
    /// The descriptor was scaffolded or upgraded and pushed; the push triggers a new run.
    ScaffoldedAndDeferred { descriptor: PathBuf },
}

#[derive(Debug, Clone)]
pub struct CreateReport {
    pub preview: Preview,
    pub created: bool,
    pub url: Option<String>,
}

/// Owner, repository and number of the pull request being previewed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Identity {
    owner: String,
    repository: String,
    number: i64,
    source_url: String,
}

pub async fn run_create(ctx: &PreviewContext, opts: &CreateOptions) -> anyhow::Result<CreateOutcome> {
    enter(CreateStage::Validating);
    let identity = resolve_identity(ctx, opts).await?;
    let computed_namespace = if opts.preview_namespace.is_empty() {
        preview_namespace(
            &ctx.config.namespace,
            &identity.owner,
            &identity.repository,
            identity.number,
        )?
    } else {
        opts.preview_namespace.clone()
    };
    let descriptor = resolve_descriptor(&opts.dir, opts.file.as_deref())
        .context("failed to discover the preview helmfile")?;
    if descriptor.state != DescriptorState::Ready {
        return scaffold_and_defer(ctx, opts, &identity, descriptor).await;
    }

    enter(CreateStage::DiscoveringPr);
    let pr = ctx
        .scm
        .find_pull_request(&identity.owner, &identity.repository, identity.number)
        .await
        .context("failed to discover pull request")?;
    tracing::info!(url = %pr.link, "Found pull request");

    enter(CreateStage::ComputingEnv);
    let app_name = identity.repository.clone();
    let env = deploy_env(
        &ctx.env,
        &DeployDefaults {
            app_name: app_name.clone(),
            docker_registry: opts.docker_registry.clone(),
            docker_registry_org: identity.owner.clone(),
            preview_namespace: computed_namespace,
            version: opts.version.clone(),
            pull_number: String::new(),
        },
    )?;
    let namespace = env
        .get("PREVIEW_NAMESPACE")
        .cloned()
        .unwrap_or_default();
    if let Some(preview_dir) = descriptor.path.parent() {
        let mut values = ctx.values_generator(&opts.git_user);
        if let Err(e) = values.regenerate(preview_dir, &namespace).await {
            tracing::warn!(namespace = %namespace, "Failed to regenerate values file: {e}");
        }
    }

    enter(CreateStage::UpsertingRecord);
    let descriptor_file = descriptor.path.to_string_lossy().to_string();
    let relative_descriptor = repository_path(ctx, &opts.dir, &descriptor.path).await;
    let helmfile = Helmfile::new(ctx.runner.clone(), &ctx.config.helmfile_bin, descriptor_file)
        .debug(opts.debug)
        .selectors(opts.selectors.clone());
    let destroy_command = Helmfile::new(
        ctx.runner.clone(),
        &ctx.config.helmfile_bin,
        relative_descriptor.clone(),
    )
    .debug(opts.debug)
    .destroy_command(&env);

    let (mut preview, created) = upsert_preview(
        ctx.store.as_ref(),
        UpsertRequest {
            pull_request: &pr,
            destroy_command,
            clone_url: ctx.credentialed(&clone_source(&pr, &identity), &opts.git_user),
            preview_namespace: namespace.clone(),
            path: relative_descriptor,
        },
    )
    .await
    .with_context(|| {
        format!(
            "failed to upsert the Preview resource in namespace {}",
            ctx.config.namespace
        )
    })?;

    let watcher = if opts.no_watch {
        None
    } else {
        enter(CreateStage::WatchingNamespace);
        match NamespaceWatcher::start(ctx.runner.as_ref(), &ctx.config.kubectl_bin, &namespace) {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::warn!(namespace = %namespace, "Failed to watch namespace: {e}");
                None
            }
        }
    };

    enter(CreateStage::Syncing);
    let synced = sync_preview(ctx, &helmfile, &env, &namespace).await;
    if let Some(watcher) = watcher {
        enter(CreateStage::StopWatching);
        watcher.stop().await;
    }
    synced.with_context(|| format!("failed to sync preview {}", preview.name()))?;

    enter(CreateStage::DiscoveringUrl);
    let service = non_empty(&opts.service).or_else(|| ctx.env.get("JX_PREVIEW_SERVICE"));
    let url_path = non_empty(&opts.path)
        .or_else(|| ctx.env.get("JX_PREVIEW_PATH"))
        .unwrap_or_default();
    let url = match find_preview_url(
        ctx.cluster.as_ref(),
        &helmfile,
        &env,
        &namespace,
        service,
        url_path,
        opts.preview_url_timeout,
    )
    .await
    {
        Ok(url) => {
            tracing::info!(url = %url, "Preview is available");
            Some(url)
        }
        Err(e) => {
            tracing::warn!(namespace = %namespace, "Failed to find preview URL: {e}");
            None
        }
    };

    enter(CreateStage::UpdatingRecord);
    preview.spec.resources.name = app_name;
    if let Some(url) = &url {
        preview.spec.resources.url = url.clone();
    }
    apply_author(&mut preview.spec.pull_request.user, &pr.author);
    let preview = ctx
        .store
        .update(&preview)
        .await
        .with_context(|| format!("failed to update preview {}", preview.name()))?;

    let app_url = url.clone().unwrap_or_default();
    write_output_vars(
        &opts.dir,
        &[
            ("PREVIEW_URL", app_url.as_str()),
            ("PREVIEW_NAME", preview.name()),
            ("PREVIEW_NAMESPACE", preview.spec.resources.namespace.as_str()),
            ("PREVIEW_PULL_REQUEST_URL", pr.link.as_str()),
        ],
    )
    .context("failed to write preview variables")?;

    enter(CreateStage::UpdatingActivity);
    update_activity(ctx, opts, &identity, &app_url, &pr.link).await;

    if !opts.no_comment {
        enter(CreateStage::CommentingOnPr);
        ctx.scm
            .create_comment(
                &identity.owner,
                &identity.repository,
                identity.number,
                &preview_comment(preview.name(), url.as_deref()),
            )
            .await
            .with_context(|| {
                format!(
                    "failed to comment on pull request #{} on repository {}/{}",
                    identity.number, identity.owner, identity.repository
                )
            })?;
    }

    enter(CreateStage::Done);
    Ok(CreateOutcome::Ready(CreateReport {
        preview,
        created,
        url,
    }))
}

async fn resolve_identity(ctx: &PreviewContext, opts: &CreateOptions) -> anyhow::Result<Identity> {
    let mut source_url = opts.source_url.clone();
    if source_url.is_empty() {
        match ctx.git().remote_url(&opts.dir).await {
            Ok(url) => source_url = url,
            Err(e) => tracing::debug!("No git remote to discover the repository from: {e}"),
        }
    }

    let parsed = parse_owner_repo(&source_url);
    let owner = non_empty(&opts.owner)
        .map(str::to_string)
        .or_else(|| parsed.as_ref().map(|(o, _)| o.clone()))
        .unwrap_or_default();
    let repository = non_empty(&opts.repository)
        .map(str::to_string)
        .or_else(|| parsed.as_ref().map(|(_, r)| r.clone()))
        .unwrap_or_default();
    let number = if opts.number > 0 {
        opts.number
    } else {
        ctx.env
            .get("PULL_NUMBER")
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    };

    if owner.is_empty() || repository.is_empty() {
        return Err(PreviewError::Validation(format!(
            "could not determine the repository owner and name from {:?}",
            redact_credentials(&source_url)
        ))
        .into());
    }
    if number <= 0 {
        return Err(PreviewError::Validation(
            "missing pull request number: use --pr or $PULL_NUMBER".to_string(),
        )
        .into());
    }
    Ok(Identity {
        owner,
        repository,
        number,
        source_url,
    })
}

/// Clone URL base recorded on the preview.
fn clone_source(pr: &PullRequest, identity: &Identity) -> String {
    let repo = pr.repository();
    [&repo.clone_url, &repo.link, &identity.source_url]
        .into_iter()
        .find(|u| !u.is_empty())
        .cloned()
        .unwrap_or_default()
}

async fn sync_preview(
    ctx: &PreviewContext,
    helmfile: &Helmfile,
    env: &std::collections::BTreeMap<String, String>,
    namespace: &str,
) -> Result<(), PreviewError> {
    helmfile.repos(env).await?;
    if let Err(e) = helmfile.sync(env).await {
        return Err(diagnose_sync_failure(ctx.cluster.as_ref(), namespace, e).await);
    }
    Ok(())
}

fn apply_author(user: &mut UserSpec, author: &Author) {
    if !author.login.is_empty() {
        user.username = author.login.clone();
    }
    if !author.name.is_empty() {
        user.name = author.name.clone();
    }
    if !author.link.is_empty() {
        user.link_url = author.link.clone();
    }
    if !author.avatar.is_empty() {
        user.image_url = author.avatar.clone();
    }
}

async fn update_activity(
    ctx: &PreviewContext,
    opts: &CreateOptions,
    identity: &Identity,
    application_url: &str,
    pull_request_url: &str,
) {
    if application_url.is_empty() {
        tracing::warn!("No preview URL found so cannot update PipelineActivities with the preview URLs");
        return;
    }
    let build = non_empty(&opts.build)
        .or_else(|| ctx.env.first_of(&["BUILD_NUMBER", "BUILD_ID"]))
        .unwrap_or_default();
    let branch = match non_empty(&opts.branch) {
        Some(b) if b != "HEAD" => b,
        _ => ctx.env.get("PULL_BASE_REF").unwrap_or_default(),
    };
    if build.is_empty() || branch.is_empty() {
        tracing::warn!("No pipeline and build number available on $PULL_BASE_REF and $BUILD_NUMBER so cannot update PipelineActivities with the preview URLs");
        return;
    }

    let key = activity_key(&identity.owner, &identity.repository, branch, build);
    if let Err(e) = record_preview_activity(
        ctx.activities.as_ref(),
        &ctx.config.namespace,
        &key,
        application_url,
        pull_request_url,
    )
    .await
    {
        tracing::warn!(activity = %key.name, "Failed to update PipelineActivity: {e}");
    }
}

/// Markdown comment announcing the preview.
pub fn preview_comment(name: &str, url: Option<&str>) -> String {
    let mut comment = format!(":star: PR built and available in a preview **{name}**");
    if let Some(url) = url.filter(|u| !u.is_empty()) {
        comment.push_str(&format!(" [here]({url}) "));
    }
    comment
}

/// Commit and push a scaffolded or upgraded descriptor, then stop.
async fn scaffold_and_defer(
    ctx: &PreviewContext,
    opts: &CreateOptions,
    identity: &Identity,
    descriptor: Descriptor,
) -> anyhow::Result<CreateOutcome> {
    if descriptor.state == DescriptorState::Missing {
        scaffold_descriptor(
            ctx.runner.as_ref(),
            &ctx.config.kpt_bin,
            &ctx.config.template_url,
            &opts.dir,
            &descriptor.path,
        )
        .await?;
    }

    let git = ctx.git();
    let dir = opts.dir.as_path();
    let absolute = std::path::absolute(dir)
        .with_context(|| format!("failed to get absolute path of directory {}", dir.display()))?;
    git.add_safe_directory(&absolute)
        .await
        .with_context(|| format!("failed to mark {} as safe.directory", absolute.display()))?;
    git.ensure_user(dir, &opts.git_user)
        .await
        .context("failed to setup git user details")?;
    let preview_dir = descriptor.path.parent().unwrap_or(Path::new("."));
    let preview_rel = relative_path(&clean_path(dir), preview_dir);
    git.add(dir, &preview_rel.to_string_lossy())
        .await
        .context("failed to add the preview helmfile files to git")?;
    git.commit(dir, SCAFFOLD_COMMIT_MESSAGE)
        .await
        .context("failed to commit the preview helmfile files to git")?;

    let branch = match non_empty(&opts.pull_request_branch).or_else(|| ctx.env.get("PR_HEAD_REF")) {
        Some(branch) => branch.to_string(),
        None => {
            ctx.scm
                .find_pull_request(&identity.owner, &identity.repository, identity.number)
                .await
                .context("failed to find the pull request branch")?
                .head
                .git_ref
        }
    };
    git.push(dir, &branch)
        .await
        .context("failed to push the changes to git")?;
    tracing::info!(file = %descriptor.path.display(), branch = %branch, "Pushed preview helmfile, a new pipeline run should follow");

    let comment = format!(
        "Preview helmfile {} is added / updated. If a new pipeline run isn't triggered automatically you can do it manually",
        descriptor.path.display()
    );
    if let Err(e) = ctx
        .scm
        .create_comment(&identity.owner, &identity.repository, identity.number, &comment)
        .await
    {
        tracing::warn!(pr = identity.number, "Failed to comment on pull request: {e}");
    }

    Ok(CreateOutcome::ScaffoldedAndDeferred {
        descriptor: descriptor.path,
    })
}

/// `path` relative to the root of the git working tree holding `dir`, so it
/// resolves again in a fresh clone. Falls back to `dir` outside a working tree.
async fn repository_path(ctx: &PreviewContext, dir: &Path, path: &Path) -> String {
    let root = match ctx.git().top_level(dir).await {
        Ok(root) if !root.is_empty() => PathBuf::from(root),
        Ok(_) => dir.to_path_buf(),
        Err(e) => {
            tracing::debug!(dir = %dir.display(), "Not inside a git working tree: {e}");
            dir.to_path_buf()
        }
    };
    relative_path(&resolved(&root), &resolved(path))
        .to_string_lossy()
        .to_string()
}

fn resolved(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .map(|p| clean_path(&p))
        .unwrap_or_else(|_| clean_path(path))
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}
