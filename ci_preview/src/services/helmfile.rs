//! helmfile invocations for a preview descriptor.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{PreviewError, Result};
use crate::models::preview::{DestroyCommand, EnvVar};
use crate::services::command_runner::{Command, CommandRunner};

/// One entry of `helmfile list --output json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelmRelease {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub enabled: bool,
}

pub struct Helmfile {
    runner: Arc<dyn CommandRunner>,
    bin: String,
    /// Descriptor path as passed to `--file`.
    file: String,
    debug: bool,
    selectors: Vec<String>,
}

impl Helmfile {
    pub fn new(runner: Arc<dyn CommandRunner>, bin: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            runner,
            bin: bin.into(),
            file: file.into(),
            debug: false,
            selectors: Vec::new(),
        }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn selectors(mut self, selectors: Vec<String>) -> Self {
        self.selectors = selectors;
        self
    }

    fn global_args(&self, with_selectors: bool) -> Vec<String> {
        let mut args = vec!["--file".to_string(), self.file.clone()];
        if self.debug {
            args.push("--debug".to_string());
        }
        if with_selectors {
            for selector in &self.selectors {
                args.push("--selector".to_string());
                args.push(selector.clone());
            }
        }
        args
    }

    fn command(&self, with_selectors: bool, verb: &str, env: &BTreeMap<String, String>) -> Command {
        Command::new(&self.bin)
            .args(self.global_args(with_selectors))
            .arg(verb)
            .envs(env)
    }

    pub async fn repos(&self, env: &BTreeMap<String, String>) -> Result<()> {
        let cmd = self.command(true, "repos", env).inherit_output();
        self.runner.run(&cmd).await.map(|_| ())
    }

    pub async fn sync(&self, env: &BTreeMap<String, String>) -> Result<()> {
        let cmd = self.command(true, "sync", env);
        let out = self.runner.run(&cmd).await?;
        if !out.stdout.is_empty() {
            tracing::info!("{}", out.stdout.trim_end());
        }
        Ok(())
    }

    /// Render manifests to the terminal without touching the cluster.
    pub async fn template(&self, env: &BTreeMap<String, String>) -> Result<()> {
        let cmd = self.command(true, "template", env).inherit_output();
        self.runner.run(&cmd).await.map(|_| ())
    }

    pub async fn list_releases(&self, env: &BTreeMap<String, String>) -> Result<Vec<HelmRelease>> {
        let cmd = Command::new(&self.bin)
            .args(["--file", self.file.as_str(), "list", "--output", "json"])
            .envs(env);
        let out = self.runner.run(&cmd).await?;
        let text = out.stdout.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(text).map_err(|e| {
            PreviewError::Validation(format!("failed to parse helmfile releases {text:?}: {e}"))
        })
    }

    /// The teardown invocation captured on the preview record.
    pub fn destroy_command(&self, env: &BTreeMap<String, String>) -> DestroyCommand {
        let mut args = self.global_args(false);
        args.push("destroy".to_string());
        DestroyCommand {
            command: self.bin.clone(),
            args,
            path: String::new(),
            env: env
                .iter()
                .map(|(name, value)| EnvVar {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;

    fn env() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("VERSION".to_string(), "1.0.0".to_string()),
            ("APP_NAME".to_string(), "myrepo".to_string()),
        ])
    }

    #[test]
    fn destroy_command_has_sorted_env() {
        let runner = FakeRunner::new(|_| FakeRunner::ok(""));
        let helmfile = Helmfile::new(runner, "helmfile", "preview/helmfile.yaml.gotmpl")
            .debug(true)
            .selectors(vec!["app=web".into()]);
        let cmd = helmfile.destroy_command(&env());
        assert_eq!(cmd.command, "helmfile");
        assert_eq!(
            cmd.args,
            vec!["--file", "preview/helmfile.yaml.gotmpl", "--debug", "destroy"]
        );
        let names: Vec<_> = cmd.env.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["APP_NAME", "VERSION"]);
    }

    #[tokio::test]
    async fn sync_passes_selectors_and_env() {
        let runner = FakeRunner::new(|_| FakeRunner::ok(""));
        let helmfile = Helmfile::new(runner.clone(), "helmfile", "h.yaml")
            .selectors(vec!["app=web".into()]);
        helmfile.sync(&env()).await.unwrap();
        let cmd = &runner.commands()[0];
        assert_eq!(cmd.cli(), "helmfile --file h.yaml --selector app=web sync");
        assert_eq!(cmd.env.get("APP_NAME").map(String::as_str), Some("myrepo"));
    }

    #[tokio::test]
    async fn releases_are_parsed() {
        let runner = FakeRunner::new(|_| {
            FakeRunner::ok(r#"[{"name":"preview","namespace":"jx-o-r-pr-1","enabled":true,"labels":""}]"#)
        });
        let helmfile = Helmfile::new(runner, "helmfile", "h.yaml");
        let releases = helmfile.list_releases(&env()).await.unwrap();
        assert_eq!(releases[0].name, "preview");
    }
}
