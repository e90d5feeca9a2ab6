//! Deployment environment variables handed to helmfile.

use std::collections::BTreeMap;

use crate::error::{PreviewError, Result};

/// Snapshot of the process environment taken once per invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Value of `name`; empty values count as unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// First non-empty value among `names`.
    pub fn first_of(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|n| self.get(n))
    }
}

/// Fallbacks for the variables an invocation must provide.
#[derive(Debug, Clone, Default)]
pub struct DeployDefaults {
    pub app_name: String,
    pub docker_registry: String,
    pub docker_registry_org: String,
    pub preview_namespace: String,
    pub version: String,
    pub pull_number: String,
}

/// Environment values win; defaults fill the gaps; anything still empty is fatal
/// except `PR_HEAD_REF` and `PULL_NUMBER`.
pub fn deploy_env(env: &Environment, defaults: &DeployDefaults) -> Result<BTreeMap<String, String>> {
    let specs: [(&str, &str, bool); 7] = [
        ("APP_NAME", defaults.app_name.as_str(), false),
        ("DOCKER_REGISTRY", defaults.docker_registry.as_str(), false),
        ("DOCKER_REGISTRY_ORG", defaults.docker_registry_org.as_str(), false),
        ("PREVIEW_NAMESPACE", defaults.preview_namespace.as_str(), false),
        ("VERSION", defaults.version.as_str(), false),
        ("PR_HEAD_REF", "", true),
        ("PULL_NUMBER", defaults.pull_number.as_str(), true),
    ];

    let mut vars = BTreeMap::new();
    for (name, default, allow_empty) in specs {
        let value = env.get(name).unwrap_or(default);
        if value.is_empty() && !allow_empty {
            return Err(PreviewError::MissingEnvVar(name.to_string()));
        }
        vars.insert(name.to_string(), value.to_string());
    }
    Ok(vars)
}
