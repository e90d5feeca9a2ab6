//! `destroy` — tear down preview environments and delete their records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::commands::PreviewContext;
use crate::error::{PreviewError, Result};
use crate::models::preview::{sort_previews, Preview};
use crate::services::command_runner::Command;
use crate::services::descriptor::PREVIEW_DIR;
use crate::services::git::TempWorkspace;
use crate::services::values::ValuesGenerator;

#[derive(Debug, Clone, Default)]
pub struct DestroyOptions {
    pub names: Vec<String>,
    /// Substring the interactive picker filters names by.
    pub filter: String,
    /// Pre-select every offered preview in the picker.
    pub select_all: bool,
    /// Working tree to run destroy commands in; a sparse clone is made when unset.
    pub dir: Option<PathBuf>,
    /// Keep the namespace and record when the destroy command fails.
    pub fail_on_helm: bool,
    pub batch_mode: bool,
    pub git_user: String,
}

/// Destroys previews one at a time, sharing one dev environment clone.
pub struct Destroyer<'a> {
    ctx: &'a PreviewContext,
    dir: Option<PathBuf>,
    fail_on_helm: bool,
    values: ValuesGenerator,
}

impl<'a> Destroyer<'a> {
    pub fn new(ctx: &'a PreviewContext, opts: &DestroyOptions) -> Self {
        Self {
            ctx,
            dir: opts.dir.clone(),
            fail_on_helm: opts.fail_on_helm,
            values: ctx.values_generator(&opts.git_user),
        }
    }

    pub async fn destroy(&mut self, name: &str) -> Result<()> {
        let ctx = self.ctx;
        let store = ctx.store.as_ref();
        tracing::info!(preview = %name, namespace = %store.namespace(), "Destroying preview");
        let preview = store.get(name).await?;

        if preview.spec.destroy_command.has_command() {
            self.run_destroy_command(&preview).await?;
        }
        self.delete_namespace(&preview).await?;

        store
            .delete(name)
            .await
            .map_err(|e| PreviewError::RecordDeleteFailed {
                name: name.to_string(),
                namespace: store.namespace().to_string(),
                source: Box::new(e),
            })?;
        tracing::info!(preview = %name, namespace = %store.namespace(), "Deleted preview");
        Ok(())
    }

    async fn run_destroy_command(&mut self, preview: &Preview) -> Result<()> {
        let name = preview.name();
        let preview_path = descriptor_dir(preview);

        // Removed when dropped at the end of this function.
        let clone = match &self.dir {
            Some(_) => None,
            None => {
                let ws = TempWorkspace::reserve(&self.ctx.config.workspace_dir, "preview")?;
                self.clone_source(preview, ws.path(), &preview_path).await?;
                Some(ws)
            }
        };
        let work_dir = match (&clone, &self.dir) {
            (Some(ws), _) => ws.path().to_path_buf(),
            (None, dir) => dir.clone().unwrap_or_default(),
        };

        let full_preview_path = work_dir.join(&preview_path);
        if full_preview_path.is_dir() {
            if let Err(e) = self
                .values
                .regenerate(&full_preview_path, &preview.spec.resources.namespace)
                .await
            {
                tracing::warn!(preview = %name, "Failed to create the values file: {e}");
            }
        }

        let destroy = &preview.spec.destroy_command;
        let env: BTreeMap<String, String> = destroy
            .env
            .iter()
            .map(|e| (e.name.clone(), e.value.clone()))
            .collect();
        let dir = if destroy.path.is_empty() {
            work_dir
        } else {
            work_dir.join(&destroy.path)
        };
        let cmd = Command::new(&destroy.command)
            .args(destroy.args.iter().cloned())
            .dir(&dir)
            .envs(&env);

        if let Err(e) = self.ctx.runner.run(&cmd).await {
            if self.fail_on_helm {
                return Err(PreviewError::DestroyCommandFailed {
                    name: name.to_string(),
                    source: Box::new(e),
                });
            }
            tracing::warn!(preview = %name, "Could not delete preview resources: {e}");
        }
        Ok(())
    }

    async fn clone_source(&self, preview: &Preview, dir: &Path, path: &str) -> Result<()> {
        let spec = &preview.spec;
        if spec.source.clone_url.is_empty() {
            return Err(PreviewError::CloneFailed {
                url: String::new(),
                message: format!("no source clone URL recorded for preview {}", preview.name()),
            });
        }
        let git = self.ctx.git();
        git.sparse_clone(&spec.source.clone_url, dir, &[path]).await?;

        let commit = &spec.pull_request.latest_commit;
        if !commit.is_empty() {
            if let Err(e) = git.checkout(dir, commit).await {
                tracing::warn!(preview = %preview.name(), commit = %commit, "Failed to checkout latest commit: {e}");
            }
        }
        Ok(())
    }

    async fn delete_namespace(&self, preview: &Preview) -> Result<()> {
        let namespace = &preview.spec.resources.namespace;
        if namespace.is_empty() {
            return Err(PreviewError::NamespaceDeleteFailed {
                namespace: String::new(),
                message: format!("no preview namespace is defined for preview {}", preview.name()),
            });
        }
        match self.ctx.cluster.delete_namespace(namespace).await {
            Ok(true) => {
                tracing::info!(namespace = %namespace, "Deleted preview namespace");
                Ok(())
            }
            Ok(false) => {
                tracing::info!(namespace = %namespace, "There is no preview namespace to be removed");
                Ok(())
            }
            Err(e) => Err(PreviewError::NamespaceDeleteFailed {
                namespace: namespace.clone(),
                message: e.to_string(),
            }),
        }
    }
}

/// Directory holding the descriptor inside the source tree.
fn descriptor_dir(preview: &Preview) -> String {
    let destroy_path = &preview.spec.destroy_command.path;
    if !destroy_path.is_empty() {
        return destroy_path.clone();
    }
    Path::new(&preview.spec.source.path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| PREVIEW_DIR.to_string())
}

/// Destroy the named previews, or the ones picked interactively. Returns the destroyed names.
pub async fn run_destroy(ctx: &PreviewContext, opts: &DestroyOptions) -> anyhow::Result<Vec<String>> {
    let mut names = opts.names.clone();
    let batch_mode = opts.batch_mode || ctx.env.get("CI").is_some();
    if names.is_empty() && !batch_mode {
        let mut previews = ctx.store.list().await.with_context(|| {
            format!("failed to list previews in namespace {}", ctx.store.namespace())
        })?;
        sort_previews(&mut previews);
        let options: Vec<String> = previews
            .iter()
            .map(|p| p.name().to_string())
            .filter(|n| n.contains(&opts.filter))
            .collect();
        if !options.is_empty() {
            names = ctx
                .prompter
                .select("select preview(s) to delete:", &options, opts.select_all)
                .context("failed to select names to delete")?;
        }
    }
    if names.is_empty() {
        return Err(PreviewError::Validation("missing preview name".to_string()).into());
    }

    let mut destroyer = Destroyer::new(ctx, opts);
    for name in &names {
        destroyer
            .destroy(name)
            .await
            .with_context(|| format!("failed to destroy preview {name}"))?;
    }
    Ok(names)
}
