//! `template` — render the preview manifests locally without deploying.

use std::path::PathBuf;

use anyhow::Context;

use crate::commands::PreviewContext;
use crate::error::PreviewError;
use crate::services::descriptor::{resolve_descriptor, DescriptorState};
use crate::services::env_vars::{deploy_env, DeployDefaults};
use crate::services::git::parse_owner_repo;
use crate::services::helmfile::Helmfile;

pub const DEFAULT_PREVIEW_NAMESPACE: &str = "preview-ns";
pub const DEFAULT_VERSION: &str = "0.0.0-PR-1-1-SNAPSHOT";

#[derive(Debug, Clone, Default)]
pub struct TemplateOptions {
    pub dir: PathBuf,
    pub file: Option<PathBuf>,
    pub source_url: String,
    pub owner: String,
    pub repository: String,
    /// Pull request number; 1 when unset.
    pub number: i64,
    pub docker_registry: String,
    pub version: String,
    pub selectors: Vec<String>,
    pub git_user: String,
    pub debug: bool,
}

pub async fn run_template(ctx: &PreviewContext, opts: &TemplateOptions) -> anyhow::Result<()> {
    let number = if opts.number > 0 { opts.number } else { 1 };
    let version = if opts.version.is_empty() {
        DEFAULT_VERSION
    } else {
        opts.version.as_str()
    };

    let descriptor = resolve_descriptor(&opts.dir, opts.file.as_deref())
        .context("failed to discover the preview helmfile")?;
    if descriptor.state == DescriptorState::Missing {
        return Err(PreviewError::Validation(format!(
            "no preview helmfile at {}",
            descriptor.path.display()
        ))
        .into());
    }

    let (owner, repository) = repository_of(ctx, opts).await;
    let mut env = deploy_env(
        &ctx.env,
        &DeployDefaults {
            app_name: repository,
            docker_registry: opts.docker_registry.clone(),
            docker_registry_org: owner,
            preview_namespace: DEFAULT_PREVIEW_NAMESPACE.to_string(),
            version: version.to_string(),
            pull_number: number.to_string(),
        },
    )?;
    env.insert("VERSION".to_string(), version.to_string());

    if let Some(preview_dir) = descriptor.path.parent() {
        let namespace = env.get("PREVIEW_NAMESPACE").cloned().unwrap_or_default();
        if let Err(e) = ctx
            .values_generator(&opts.git_user)
            .regenerate(preview_dir, &namespace)
            .await
        {
            tracing::warn!(namespace = %namespace, "Failed to regenerate values file: {e}");
        }
    }

    tracing::info!(file = %descriptor.path.display(), "Rendering preview templates");
    Helmfile::new(
        ctx.runner.clone(),
        &ctx.config.helmfile_bin,
        descriptor.path.to_string_lossy(),
    )
    .debug(opts.debug)
    .selectors(opts.selectors.clone())
    .template(&env)
    .await
    .context("failed to run helmfile template")?;
    Ok(())
}

/// Owner and repository from the options, else the source URL or git remote.
async fn repository_of(ctx: &PreviewContext, opts: &TemplateOptions) -> (String, String) {
    let mut source_url = opts.source_url.clone();
    if source_url.is_empty() && (opts.owner.is_empty() || opts.repository.is_empty()) {
        source_url = ctx.git().remote_url(&opts.dir).await.unwrap_or_default();
    }
    let (parsed_owner, parsed_repo) = parse_owner_repo(&source_url).unwrap_or_default();
    let pick = |explicit: &str, parsed: String| {
        if explicit.is_empty() {
            parsed
        } else {
            explicit.to_string()
        }
    };
    (pick(&opts.owner, parsed_owner), pick(&opts.repository, parsed_repo))
}
