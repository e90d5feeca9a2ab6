//! Preview engine configuration — loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TEMPLATE_URL: &str =
    "https://github.com/jenkins-x/jx3-pipeline-catalog.git/helm/preview";

#[derive(Clone, Debug)]
pub struct PreviewConfig {
    /// Control namespace holding the Preview records.
    pub namespace: String,
    /// Token for the source-control API, also used as the clone credential.
    pub git_token: String,
    /// User name paired with `git_token` in credentialed clone URLs.
    pub git_user: String,
    /// Base URL of the GitHub REST API.
    pub github_api_url: String,
    pub kubectl_bin: String,
    pub helmfile_bin: String,
    pub git_bin: String,
    pub kpt_bin: String,
    /// Parent directory for temporary working clones.
    pub workspace_dir: PathBuf,
    /// Cluster git repository holding `helmfiles/jx/jx-values.yaml`.
    pub dev_env_git_url: String,
    /// Source of the preview descriptor scaffold.
    pub template_url: String,
    /// Default budget for preview URL discovery.
    pub preview_url_timeout: Duration,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            namespace: "jx".to_string(),
            git_token: String::new(),
            git_user: String::new(),
            github_api_url: "https://api.github.com".to_string(),
            kubectl_bin: "kubectl".to_string(),
            helmfile_bin: "helmfile".to_string(),
            git_bin: "git".to_string(),
            kpt_bin: "kpt".to_string(),
            workspace_dir: std::env::temp_dir(),
            dev_env_git_url: String::new(),
            template_url: DEFAULT_TEMPLATE_URL.to_string(),
            preview_url_timeout: Duration::from_secs(60),
        }
    }
}

impl PreviewConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let git_token = first_non_empty([
            std::env::var("GITHUB_TOKEN").ok(),
            std::env::var("GIT_TOKEN").ok(),
        ]);

        let config = Self {
            namespace: env_or("JX_NAMESPACE", defaults.namespace),
            git_token,
            git_user: std::env::var("GIT_USER").unwrap_or_default(),
            github_api_url: env_or("GITHUB_API_URL", defaults.github_api_url),
            kubectl_bin: env_or("PREVIEW_KUBECTL_BIN", defaults.kubectl_bin),
            helmfile_bin: env_or("PREVIEW_HELMFILE_BIN", defaults.helmfile_bin),
            git_bin: env_or("PREVIEW_GIT_BIN", defaults.git_bin),
            kpt_bin: env_or("PREVIEW_KPT_BIN", defaults.kpt_bin),
            workspace_dir: std::env::var("PREVIEW_WORKSPACE_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_dir),
            dev_env_git_url: std::env::var("JX_DEV_ENV_GIT_URL").unwrap_or_default(),
            template_url: env_or("PREVIEW_TEMPLATE_URL", defaults.template_url),
            preview_url_timeout: defaults.preview_url_timeout,
        };

        if config.git_token.is_empty() {
            tracing::warn!("GITHUB_TOKEN not set -- pull request lookups may be rate limited and comments disabled");
        }
        if config.dev_env_git_url.is_empty() {
            tracing::debug!("JX_DEV_ENV_GIT_URL not set -- jx-values.yaml will not be regenerated");
        }

        config
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
}

/// The first value that is set and not blank.
fn first_non_empty<I>(values: I) -> String
where
    I: IntoIterator<Item = Option<String>>,
{
    values
        .into_iter()
        .flatten()
        .find(|v| !v.trim().is_empty())
        .unwrap_or_default()
}

/// Parse durations such as `90s`, `2m`, `500ms`, `1h` or a bare number of seconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{text}'"))?;
    let seconds = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{text}' is too large"))
    };
    match unit {
        "" | "s" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => seconds(60),
        "h" => seconds(3600),
        other => Err(format!("unknown duration unit '{other}' in '{text}'")),
    }
}
