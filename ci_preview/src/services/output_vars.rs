//! Exports preview facts to `.jx/variables.sh` for later pipeline steps.

use std::path::{Path, PathBuf};

use crate::error::{PreviewError, Result};

pub const VARIABLES_FILE: &str = ".jx/variables.sh";

/// Prepend `export NAME="value"` lines, keeping any previous content below.
pub fn write_output_vars(dir: &Path, vars: &[(&str, &str)]) -> Result<PathBuf> {
    let path = dir.join(VARIABLES_FILE);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| PreviewError::io(format!("failed to create {}", parent.display()), e))?;
    }

    let mut text = String::new();
    for (name, value) in vars {
        text.push_str(&format!("export {name}=\"{}\"\n", value.replace('"', "\\\"")));
    }
    match std::fs::read_to_string(&path) {
        Ok(existing) if !existing.is_empty() => {
            text.push('\n');
            text.push_str(&existing);
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(PreviewError::io(format!("failed to read {}", path.display()), e)),
    }

    std::fs::write(&path, text)
        .map_err(|e| PreviewError::io(format!("failed to write {}", path.display()), e))?;
    tracing::debug!(file = %path.display(), "Wrote preview variables");
    Ok(path)
}
