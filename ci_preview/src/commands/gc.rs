//! `gc` — destroy previews whose pull requests are closed, merged or stale drafts.

use anyhow::Context;

use crate::commands::destroy::{DestroyOptions, Destroyer};
use crate::commands::PreviewContext;
use crate::models::preview::{sort_previews, Preview};

#[derive(Debug, Clone, Default)]
pub struct GcOptions {
    /// Also collect drafts without the `ok-to-test` label.
    pub destroy_drafts: bool,
    /// Only report what would be destroyed.
    pub dry_run: bool,
    pub destroy: DestroyOptions,
}

/// One sweep over every preview record. Returns the names destroyed, or the
/// names that would have been in a dry run.
pub async fn run_gc(ctx: &PreviewContext, opts: &GcOptions) -> anyhow::Result<Vec<String>> {
    let mut previews = ctx.store.list().await.with_context(|| {
        format!("failed to list previews in namespace {}", ctx.store.namespace())
    })?;
    sort_previews(&mut previews);

    if opts.dry_run {
        tracing::info!("These previews are selected for destruction:");
    }
    let mut destroyer = Destroyer::new(ctx, &opts.destroy);
    let mut deleted = Vec::new();
    for preview in &previews {
        let Some((owner, repository, number)) = pull_request_of(preview) else {
            continue;
        };
        let name = preview.name();
        let pr = ctx
            .scm
            .find_pull_request(owner, repository, number)
            .await
            .with_context(|| format!("failed to query pull request {owner}/{repository}#{number}"))?;
        if !pr.is_gc_candidate(opts.destroy_drafts) {
            continue;
        }

        if opts.dry_run {
            tracing::info!("{name}");
        } else {
            destroyer
                .destroy(name)
                .await
                .with_context(|| format!("failed to destroy preview environment {name}"))?;
        }
        deleted.push(name.to_string());
    }

    if deleted.is_empty() {
        tracing::debug!("No preview environments to garbage collect were found");
    }
    Ok(deleted)
}

/// Owner, repository and number, or `None` (with a warning) if the record lacks any.
fn pull_request_of(preview: &Preview) -> Option<(&str, &str, i64)> {
    let name = preview.name();
    let spec = &preview.spec.pull_request;
    let missing = if preview.spec.source.clone_url.is_empty() {
        "spec.source.cloneURL"
    } else if spec.owner.is_empty() {
        "spec.pullRequest.owner"
    } else if spec.repository.is_empty() {
        "spec.pullRequest.repository"
    } else if spec.number <= 0 {
        "spec.pullRequest.number"
    } else {
        return Some((spec.owner.as_str(), spec.repository.as_str(), spec.number));
    };
    tracing::warn!(preview = %name, "Cannot GC preview as it has no {missing}");
    None
}
