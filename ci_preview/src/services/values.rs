//! `jx-values.yaml` generation for preview descriptors.
//!
//! The cluster-wide values live in the dev environment repository; a preview
//! gets a copy whose ingress sub-domain points at its own namespace.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::{PreviewError, Result};
use crate::services::git::{Git, TempWorkspace};

pub const VALUES_FILE: &str = "jx-values.yaml";
const DEV_ENV_VALUES: &str = "helmfiles/jx/jx-values.yaml";

/// Regenerates values files, cloning the dev environment at most once.
pub struct ValuesGenerator {
    git: Git,
    dev_env_url: String,
    workspace_dir: PathBuf,
    clone: Option<TempWorkspace>,
}

impl ValuesGenerator {
    /// `dev_env_url` should already carry credentials when the repository is private.
    pub fn new(git: Git, dev_env_url: impl Into<String>, workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            git,
            dev_env_url: dev_env_url.into(),
            workspace_dir: workspace_dir.into(),
            clone: None,
        }
    }

    async fn dev_env_dir(&mut self) -> Result<&Path> {
        if self.clone.is_none() {
            if self.dev_env_url.is_empty() {
                return Err(PreviewError::Validation(
                    "no dev environment git URL configured (JX_DEV_ENV_GIT_URL)".to_string(),
                ));
            }
            let ws = TempWorkspace::reserve(&self.workspace_dir, "dev-env")?;
            self.git
                .sparse_clone(&self.dev_env_url, ws.path(), &["helmfiles/jx"])
                .await?;
            self.clone = Some(ws);
        }
        match &self.clone {
            Some(ws) => Ok(ws.path()),
            None => Err(PreviewError::Validation("dev environment clone missing".to_string())),
        }
    }

    /// Write `<preview_dir>/jx-values.yaml` for `preview_namespace`.
    pub async fn regenerate(&mut self, preview_dir: &Path, preview_namespace: &str) -> Result<PathBuf> {
        let source = self.dev_env_dir().await?.join(DEV_ENV_VALUES);
        let text = std::fs::read_to_string(&source)
            .map_err(|e| PreviewError::io(format!("failed to read {}", source.display()), e))?;
        let rendered = render_values(&text, preview_namespace)?;

        let target = preview_dir.join(VALUES_FILE);
        std::fs::write(&target, rendered)
            .map_err(|e| PreviewError::io(format!("failed to write {}", target.display()), e))?;
        tracing::info!(file = %target.display(), namespace = %preview_namespace, "Regenerated values file");
        Ok(target)
    }
}

/// Set `jxRequirements.ingress.namespaceSubDomain` to `-<namespace>.`.
pub fn render_values(source: &str, preview_namespace: &str) -> Result<String> {
    let mut root: Value = serde_yaml::from_str(source)?;
    if root.is_null() {
        root = Value::Mapping(Mapping::new());
    }
    let requirements = child_mapping(&mut root, "jxRequirements")?;
    let ingress = child_mapping(requirements, "ingress")?;
    if let Value::Mapping(map) = ingress {
        map.insert(
            Value::from("namespaceSubDomain"),
            Value::from(format!("-{preview_namespace}.")),
        );
    }
    Ok(serde_yaml::to_string(&root)?)
}

fn child_mapping<'a>(parent: &'a mut Value, key: &str) -> Result<&'a mut Value> {
    let Value::Mapping(map) = parent else {
        return Err(PreviewError::Validation(format!(
            "expected a YAML mapping above {key}"
        )));
    };
    let child = map
        .entry(Value::from(key))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if child.is_null() {
        *child = Value::Mapping(Mapping::new());
    }
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;

    #[test]
    fn sub_domain_points_at_the_preview_namespace() {
        let source = "jxRequirements:\n  ingress:\n    domain: 1.2.3.4.nip.io\n    namespaceSubDomain: -jx.\n  cluster:\n    provider: gke\n";
        let rendered = render_values(source, "jx-o-r-pr-1").unwrap();
        let value: Value = serde_yaml::from_str(&rendered).unwrap();
        let ingress = &value["jxRequirements"]["ingress"];
        assert_eq!(ingress["namespaceSubDomain"].as_str(), Some("-jx-o-r-pr-1."));
        assert_eq!(ingress["domain"].as_str(), Some("1.2.3.4.nip.io"));
        assert_eq!(value["jxRequirements"]["cluster"]["provider"].as_str(), Some("gke"));
    }

    #[test]
    fn missing_sections_are_created() {
        let rendered = render_values("", "ns").unwrap();
        let value: Value = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(
            value["jxRequirements"]["ingress"]["namespaceSubDomain"].as_str(),
            Some("-ns.")
        );
    }

    #[tokio::test]
    async fn regenerate_clones_once_and_writes_file() {
        let scratch = tempfile::tempdir().unwrap();
        let preview_dir = scratch.path().join("preview");
        std::fs::create_dir_all(&preview_dir).unwrap();

        // The fake clone seeds the values file where the real sparse clone would put it.
        let runner = FakeRunner::new(|cmd| {
            if cmd.args.first().map(String::as_str) == Some("clone") {
                let target = PathBuf::from(cmd.args.last().unwrap()).join("helmfiles/jx");
                std::fs::create_dir_all(&target).unwrap();
                std::fs::write(target.join("jx-values.yaml"), "jxRequirements: {}\n").unwrap();
            }
            FakeRunner::ok("")
        });
        let git = Git::new(runner.clone(), "git");
        let mut generator = ValuesGenerator::new(git, "https://github.com/o/dev-env.git", scratch.path());

        generator.regenerate(&preview_dir, "ns-a").await.unwrap();
        generator.regenerate(&preview_dir, "ns-b").await.unwrap();

        let clones = runner
            .commands()
            .iter()
            .filter(|c| c.args.first().map(String::as_str) == Some("clone"))
            .count();
        assert_eq!(clones, 1);
        let written = std::fs::read_to_string(preview_dir.join(VALUES_FILE)).unwrap();
        assert!(written.contains("-ns-b."));
    }

    #[tokio::test]
    async fn missing_dev_env_url_is_reported() {
        let runner = FakeRunner::new(|_| FakeRunner::ok(""));
        let mut generator = ValuesGenerator::new(Git::new(runner, "git"), "", std::env::temp_dir());
        let err = generator.regenerate(Path::new("/tmp"), "ns").await.unwrap_err();
        assert!(matches!(err, PreviewError::Validation(_)));
    }
}
