//! Centrix Preview — per-pull-request preview environments for CI pipelines.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use centrix_preview::commands::create::{run_create, CreateOptions, CreateOutcome};
use centrix_preview::commands::destroy::{run_destroy, DestroyOptions};
use centrix_preview::commands::gc::{run_gc, GcOptions};
use centrix_preview::commands::get::{run_get, GetOptions};
use centrix_preview::commands::template::{run_template, TemplateOptions};
use centrix_preview::commands::PreviewContext;
use centrix_preview::config::{parse_duration, PreviewConfig};
use centrix_preview::services::env_vars::Environment;

/// Exit status when the descriptor was scaffolded and a new pipeline run should take over.
const EXIT_DEFERRED: u8 = 2;

#[derive(Parser)]
#[command(name = "centrix-preview", about = "Centrix preview environments for pull requests")]
struct Cli {
    /// Namespace holding the Preview resources
    #[arg(short, long, global = true, env = "JX_NAMESPACE")]
    namespace: Option<String>,

    /// Never prompt
    #[arg(short, long, global = true)]
    batch_mode: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or update the preview environment of a pull request
    Create(CreateArgs),
    /// Destroy preview environments
    #[command(visible_aliases = ["delete", "remove"])]
    Destroy(DestroyArgs),
    /// Destroy previews of closed, merged or draft pull requests
    Gc(GcArgs),
    /// Display previews
    #[command(visible_alias = "list")]
    Get(GetArgs),
    /// Render the preview manifests without deploying them
    Template(TemplateArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Project directory
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Preview helmfile; discovered from the charts folder when unset
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Git URL of the repository; read from the git remote when unset
    #[arg(long)]
    source_url: Option<String>,

    /// Repository owner
    #[arg(long, env = "REPO_OWNER")]
    owner: Option<String>,

    /// Application (repository) name
    #[arg(long, env = "REPO_NAME")]
    app: Option<String>,

    /// Pull request number; defaults to $PULL_NUMBER
    #[arg(long)]
    pr: Option<i64>,

    /// Container registry host
    #[arg(long)]
    docker_registry: Option<String>,

    /// Version of the application being previewed
    #[arg(long)]
    version: Option<String>,

    /// Helmfile release selectors
    #[arg(short = 'l', long = "selector")]
    selectors: Vec<String>,

    /// User name for git credentials
    #[arg(long)]
    git_user: Option<String>,

    /// Pass --debug to helmfile
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
struct CreateArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Preview namespace; computed from the repository and pull request when unset
    #[arg(long)]
    preview_namespace: Option<String>,

    /// Service exposing the preview; defaults to $JX_PREVIEW_SERVICE or every service
    #[arg(long)]
    service: Option<String>,

    /// Path appended to the preview URL; defaults to $JX_PREVIEW_PATH
    #[arg(long)]
    path: Option<String>,

    /// How long to wait for the preview URL
    #[arg(long, value_parser = parse_duration)]
    preview_url_timeout: Option<Duration>,

    /// Build number for the pipeline activity
    #[arg(long)]
    build: Option<String>,

    /// Branch for the pipeline activity
    #[arg(long)]
    branch: Option<String>,

    /// Pull request head branch to push a scaffolded helmfile to
    #[arg(long, env = "PR_HEAD_REF")]
    pr_branch: Option<String>,

    /// Do not comment on the pull request
    #[arg(long)]
    no_comment: bool,

    /// Do not log the preview namespace events while syncing
    #[arg(long)]
    no_watch: bool,
}

#[derive(Args)]
struct DestroyArgs {
    /// Preview names
    names: Vec<String>,

    /// Only offer previews whose name contains this text
    #[arg(long, default_value = "")]
    filter: String,

    /// Select all offered previews by default
    #[arg(long)]
    all: bool,

    #[command(flatten)]
    common: CommonDestroyArgs,
}

#[derive(Args)]
struct CommonDestroyArgs {
    /// Directory to run the destroy command in; a clone is made when unset
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Keep the namespace and Preview when the destroy command fails
    #[arg(long)]
    fail_on_helm: bool,

    /// User name for git credentials
    #[arg(long)]
    git_user: Option<String>,
}

#[derive(Args)]
struct GcArgs {
    /// Also collect drafts without the ok-to-test label
    #[arg(long = "gc-drafts")]
    gc_drafts: bool,

    /// Only show which previews would be destroyed
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    common: CommonDestroyArgs,
}

#[derive(Args)]
struct GetArgs {
    /// Show the preview of $REPO_NAME pull request $PULL_NUMBER
    #[arg(short, long)]
    current: bool,

    /// With --current, wait until the preview has a URL
    #[arg(short, long)]
    wait: bool,

    /// How long --wait waits
    #[arg(long, value_parser = parse_duration, default_value = "60s")]
    timeout: Duration,
}

#[derive(Args)]
struct TemplateArgs {
    #[command(flatten)]
    source: SourceArgs,
}

impl CommonDestroyArgs {
    fn into_options(self, batch_mode: bool) -> DestroyOptions {
        DestroyOptions {
            dir: self.dir,
            fail_on_helm: self.fail_on_helm,
            batch_mode,
            git_user: self.git_user.unwrap_or_default(),
            ..DestroyOptions::default()
        }
    }
}

async fn run(ctx: &PreviewContext, command: Command, batch_mode: bool) -> anyhow::Result<ExitCode> {
    match command {
        Command::Create(args) => {
            let source = args.source;
            let opts = CreateOptions {
                dir: source.dir,
                file: source.file,
                source_url: source.source_url.unwrap_or_default(),
                owner: source.owner.unwrap_or_default(),
                repository: source.app.unwrap_or_default(),
                number: source.pr.unwrap_or_default(),
                preview_namespace: args.preview_namespace.unwrap_or_default(),
                service: args.service.unwrap_or_default(),
                path: args.path.unwrap_or_default(),
                selectors: source.selectors,
                preview_url_timeout: args
                    .preview_url_timeout
                    .unwrap_or(ctx.config.preview_url_timeout),
                docker_registry: source.docker_registry.unwrap_or_default(),
                version: source.version.unwrap_or_default(),
                build: args.build.unwrap_or_default(),
                branch: args.branch.unwrap_or_default(),
                pull_request_branch: args.pr_branch.unwrap_or_default(),
                git_user: source.git_user.unwrap_or_default(),
                no_comment: args.no_comment,
                no_watch: args.no_watch,
                debug: source.debug,
            };
            match run_create(ctx, &opts).await? {
                CreateOutcome::Ready(report) => {
                    tracing::info!(
                        preview = %report.preview.name(),
                        created = report.created,
                        url = %report.url.as_deref().unwrap_or(""),
                        "Preview is ready"
                    );
                    Ok(ExitCode::SUCCESS)
                }
                CreateOutcome::ScaffoldedAndDeferred { descriptor } => {
                    tracing::warn!(
                        file = %descriptor.display(),
                        "Preview helmfile was added or updated; the new pipeline run will deploy the preview"
                    );
                    Ok(ExitCode::from(EXIT_DEFERRED))
                }
            }
        }
        Command::Destroy(args) => {
            let opts = DestroyOptions {
                names: args.names,
                filter: args.filter,
                select_all: args.all,
                ..args.common.into_options(batch_mode)
            };
            run_destroy(ctx, &opts).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Gc(args) => {
            let opts = GcOptions {
                destroy_drafts: args.gc_drafts,
                dry_run: args.dry_run,
                destroy: args.common.into_options(true),
            };
            let deleted = run_gc(ctx, &opts).await?;
            tracing::info!(count = deleted.len(), dry_run = opts.dry_run, "Garbage collection finished");
            Ok(ExitCode::SUCCESS)
        }
        Command::Get(args) => {
            let opts = GetOptions {
                current: args.current,
                wait: args.wait,
                timeout: args.timeout,
                ..GetOptions::default()
            };
            run_get(ctx, &opts, &mut std::io::stdout()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Template(args) => {
            let source = args.source;
            let opts = TemplateOptions {
                dir: source.dir,
                file: source.file,
                source_url: source.source_url.unwrap_or_default(),
                owner: source.owner.unwrap_or_default(),
                repository: source.app.unwrap_or_default(),
                number: source.pr.unwrap_or_default(),
                docker_registry: source.docker_registry.unwrap_or_default(),
                version: source.version.unwrap_or_default(),
                selectors: source.selectors,
                git_user: source.git_user.unwrap_or_default(),
                debug: source.debug,
            };
            run_template(ctx, &opts).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing; stdout is reserved for `get` output
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();
    let mut config = PreviewConfig::from_env();
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }
    let ctx = PreviewContext::new(config, Environment::from_process());

    match run(&ctx, cli.command, cli.batch_mode).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
