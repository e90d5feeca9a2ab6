//! Locating, upgrading and scaffolding the preview helmfile.

use std::path::{Component, Path, PathBuf};

use crate::error::{PreviewError, Result};
use crate::services::command_runner::{Command, CommandRunner};

pub const DESCRIPTOR_FILE: &str = "helmfile.yaml.gotmpl";
const LEGACY_DESCRIPTOR_FILE: &str = "helmfile.yaml";
pub const PREVIEW_DIR: &str = "preview";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorState {
    /// Present and current; the run can sync.
    Ready,
    /// Renamed or reformatted on disk; must be committed before syncing.
    Modified,
    /// Absent; must be scaffolded and committed.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub path: PathBuf,
    pub state: DescriptorState,
}

/// Find the descriptor for the project in `dir`, upgrading legacy layouts in place.
pub fn resolve_descriptor(dir: &Path, explicit: Option<&Path>) -> Result<Descriptor> {
    let path = match explicit {
        Some(p) if p.is_absolute() => clean_path(p),
        Some(p) => clean_path(&dir.join(p)),
        None => default_descriptor_path(dir)?,
    };

    let mut modified = false;
    if !path.exists() {
        let legacy = path.with_file_name(LEGACY_DESCRIPTOR_FILE);
        if path.file_name().is_some_and(|f| f == DESCRIPTOR_FILE) && legacy.is_file() {
            std::fs::rename(&legacy, &path).map_err(|e| {
                PreviewError::io(format!("failed to rename {} to {}", legacy.display(), path.display()), e)
            })?;
            tracing::info!(file = %path.display(), "Renamed legacy preview helmfile");
            modified = true;
        }
    }

    if path.exists() {
        let text = read(&path)?;
        if !has_multiple_documents(&text) {
            if let Some(split) = split_documents(&text) {
                std::fs::write(&path, split)
                    .map_err(|e| PreviewError::io(format!("failed to write {}", path.display()), e))?;
                tracing::info!(file = %path.display(), "Split helmfile into 2 documents for helmfile v1 compatibility");
                modified = true;
            }
        }
        let state = if modified {
            DescriptorState::Modified
        } else {
            DescriptorState::Ready
        };
        return Ok(Descriptor { path, state });
    }

    if let Some(preview_dir) = path.parent().filter(|p| p.is_dir()) {
        return Err(PreviewError::Validation(format!(
            "preview dir {} exists, but lacks helmfile",
            preview_dir.display()
        )));
    }
    Ok(Descriptor {
        path,
        state: DescriptorState::Missing,
    })
}

/// `<charts>/../preview/helmfile.yaml.gotmpl`, where charts is `dir/charts` or `dir/..`.
fn default_descriptor_path(dir: &Path) -> Result<PathBuf> {
    let mut charts = dir.join("charts");
    if !charts.is_dir() {
        charts = dir.join("..");
        if !charts.is_dir() {
            return Err(PreviewError::Validation(format!(
                "could not detect the helm charts folder in dir {}",
                dir.display()
            )));
        }
    }
    Ok(clean_path(
        &charts.join("..").join(PREVIEW_DIR).join(DESCRIPTOR_FILE),
    ))
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| PreviewError::io(format!("failed to read {}", path.display()), e))
}

pub fn has_multiple_documents(text: &str) -> bool {
    text.lines().any(|line| line == "---")
}

/// Insert `---` before the first top-level key after the `environments:` block.
/// `None` when there is nothing to split.
pub fn split_documents(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len() + 4);
    let mut in_environments = false;
    let mut added = false;
    for line in text.split_inclusive('\n') {
        if !added {
            let content = line.trim_end_matches(['\n', '\r']);
            if in_environments {
                if !content.is_empty() && !content.starts_with([' ', '\t', '#']) {
                    out.push_str("---\n");
                    added = true;
                }
            } else if content.starts_with("environments:") {
                in_environments = true;
            }
        }
        out.push_str(line);
    }
    added.then_some(out)
}

/// Fetch the descriptor template next to `dir` with `kpt pkg get`.
pub async fn scaffold_descriptor(
    runner: &dyn CommandRunner,
    kpt_bin: &str,
    template_url: &str,
    dir: &Path,
    descriptor: &Path,
) -> Result<()> {
    let preview_dir = descriptor.parent().unwrap_or(dir);
    let parent = preview_dir.parent().unwrap_or(dir);
    std::fs::create_dir_all(parent)
        .map_err(|e| PreviewError::io(format!("failed to make preview dir {}", parent.display()), e))?;

    let rel = relative_path(&clean_path(dir), &clean_path(parent));
    let cmd = Command::new(kpt_bin)
        .args(["pkg", "get", template_url])
        .arg(rel.to_string_lossy())
        .dir(dir);
    runner.run(&cmd).await.map_err(|e| PreviewError::CommandFailed {
        command: cmd.cli(),
        exit_code: None,
        message: format!("failed to get the preview helmfile {}: {e}", descriptor.display()),
    })?;
    tracing::info!(file = %descriptor.display(), "Scaffolded preview helmfile");
    Ok(())
}

/// Lexically normalise `.` and `..` without touching the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// `target` relative to `base`, both already cleaned.
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<_> = base.components().filter(|c| *c != Component::CurDir).collect();
    let target: Vec<_> = target.components().filter(|c| *c != Component::CurDir).collect();
    let common = base.iter().zip(&target).take_while(|(a, b)| a == b).count();
    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for c in &target[common..] {
        rel.push(c.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}
