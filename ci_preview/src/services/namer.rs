//! Deterministic preview namespace names.

use crate::error::{PreviewError, Result};

/// Kubernetes namespace names are DNS labels.
pub const MAX_NAMESPACE_LENGTH: usize = 63;

/// Lowercase, map anything outside `[a-z0-9-]` to `-`, collapse repeated
/// hyphens and trim them from both ends.
pub fn to_valid_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// `<control>-<owner>-<repository>-pr-<number>`, left-truncated after the
/// control prefix so the result fits in a namespace name.
pub fn preview_namespace(
    control_namespace: &str,
    owner: &str,
    repository: &str,
    number: i64,
) -> Result<String> {
    if number <= 0 {
        return Err(PreviewError::Validation(format!(
            "invalid pull request number {number}"
        )));
    }
    let prefix = format!("{}-", to_valid_name(control_namespace));
    let pr_suffix = format!("pr-{number}");
    let rest = to_valid_name(&format!("{owner}-{repository}-{pr_suffix}"));

    if prefix.len() + rest.len() <= MAX_NAMESPACE_LENGTH {
        return Ok(format!("{prefix}{rest}"));
    }

    let room = MAX_NAMESPACE_LENGTH.saturating_sub(prefix.len());
    let tail = rest[rest.len() - room.min(rest.len())..].trim_start_matches('-');
    if !tail.ends_with(&pr_suffix) || tail.len() < pr_suffix.len() {
        return Err(PreviewError::NameTooLong {
            name: format!("{prefix}{rest}"),
            limit: MAX_NAMESPACE_LENGTH,
        });
    }
    let name = format!("{prefix}{tail}");
    tracing::debug!(name = %name, "Truncated preview namespace");
    Ok(name)
}
