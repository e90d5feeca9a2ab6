//! `get` — list previews, or the one the current pipeline deployed.

use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::commands::PreviewContext;
use crate::error::PreviewError;
use crate::models::preview::{sort_previews, Preview};

const HEADERS: [&str; 3] = ["PULL REQUEST", "NAMESPACE", "APPLICATION"];

#[derive(Debug, Clone)]
pub struct GetOptions {
    /// Only the preview of `$REPO_NAME` pull request `$PULL_NUMBER`.
    pub current: bool,
    /// With `current`, poll until the preview has a URL.
    pub wait: bool,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            current: false,
            wait: false,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

pub async fn run_get(ctx: &PreviewContext, opts: &GetOptions, out: &mut dyn Write) -> anyhow::Result<()> {
    let previews = if opts.current {
        vec![current_preview(ctx, opts).await?]
    } else {
        let mut previews = ctx.store.list().await.with_context(|| {
            format!("failed to list previews in namespace {}", ctx.store.namespace())
        })?;
        sort_previews(&mut previews);
        previews
    };
    write_table(out, &previews).context("failed to write previews table")?;
    Ok(())
}

async fn current_preview(ctx: &PreviewContext, opts: &GetOptions) -> anyhow::Result<Preview> {
    let repository = ctx.env.get("REPO_NAME").unwrap_or_default();
    let number: i64 = ctx
        .env
        .get("PULL_NUMBER")
        .unwrap_or_default()
        .parse()
        .with_context(|| {
            format!(
                "failed to retrieve current preview in namespace {}: invalid $PULL_NUMBER",
                ctx.store.namespace()
            )
        })?;

    let deadline = Instant::now() + opts.timeout;
    loop {
        let found = ctx
            .store
            .list()
            .await
            .with_context(|| format!("failed to list previews in namespace {}", ctx.store.namespace()))?
            .into_iter()
            .find(|p| {
                p.spec.pull_request.number == number && p.spec.pull_request.repository == repository
            });
        let preview = found.ok_or_else(|| {
            PreviewError::Validation(format!(
                "no current preview for {repository} on pull request #{number}"
            ))
        })?;

        if !opts.wait || !preview.spec.resources.url.is_empty() {
            return Ok(preview);
        }
        if Instant::now() >= deadline {
            anyhow::bail!(
                "preview {} has no URL after waiting {:?}",
                preview.name(),
                opts.timeout
            );
        }
        tracing::info!(preview = %preview.name(), "Waiting for the preview URL");
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(opts.poll_interval.min(remaining)).await;
    }
}

fn write_table(out: &mut dyn Write, previews: &[Preview]) -> std::io::Result<()> {
    let rows: Vec<[&str; 3]> = previews
        .iter()
        .map(|p| {
            [
                p.spec.pull_request.url.as_str(),
                p.spec.resources.namespace.as_str(),
                p.spec.resources.url.as_str(),
            ]
        })
        .collect();

    let headers: [&str; 3] = HEADERS;
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }
    for row in std::iter::once(&headers).chain(&rows) {
        let line = format!(
            "{:<w0$} {:<w1$} {}",
            row[0],
            row[1],
            row[2],
            w0 = widths[0],
            w1 = widths[1]
        );
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}
