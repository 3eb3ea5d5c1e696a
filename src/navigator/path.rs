//! POSIX-style remote path helpers
//!
//! Remote paths are always absolute, use `/` as separator and carry no trailing
//! slash except for the root itself.

use crate::error::{CoreError, CoreResult};

pub const ROOT: &str = "/";

/// Join a single directory entry name onto the current path
///
/// The name must be one real segment: empty names, `.`, `..` and names
/// containing `/` or NUL are rejected.
pub fn join(current: &str, name: &str) -> CoreResult<String> {
    if matches!(name, "" | "." | "..") || name.contains(['/', '\0']) {
        return Err(CoreError::InvalidPath(name.escape_default().to_string()));
    }
    if current == ROOT {
        Ok(format!("/{}", name))
    } else {
        Ok(format!("{}/{}", current.trim_end_matches('/'), name))
    }
}

/// Drop the last segment; the root is its own parent
pub fn parent(path: &str) -> String {
    if path == ROOT {
        return ROOT.to_string();
    }
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => ROOT.to_string(),
        Some(idx) => trimmed[..idx].to_string(),
    }
}

/// Last segment of a path, empty for the root
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// Resolve `target` against `base`, collapsing `.`, `..` and repeated slashes
pub fn resolve(base: &str, target: &str) -> CoreResult<String> {
    if target.contains('\0') {
        return Err(CoreError::InvalidPath(target.escape_default().to_string()));
    }
    let combined = if target.starts_with('/') {
        target.to_string()
    } else {
        format!("{}/{}", base, target)
    };
    normalize(&combined)
}

/// Normalise an absolute path
pub fn normalize(path: &str) -> CoreResult<String> {
    if !path.starts_with('/') {
        return Err(CoreError::InvalidPath(path.to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        Ok(ROOT.to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_follows_root_rule() {
        assert_eq!(join("/", "etc").unwrap(), "/etc");
        assert_eq!(join("/var/www", "html").unwrap(), "/var/www/html");
    }

    #[test]
    fn join_rejects_non_segment_names() {
        for name in ["", ".", "..", "a/b", "/etc", "nul\0byte"] {
            assert!(
                matches!(join("/var/www", name), Err(CoreError::InvalidPath(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn parent_stops_at_root() {
        assert_eq!(parent("/"), "/");
        assert_eq!(parent("/etc"), "/");
        assert_eq!(parent("/var/www/html"), "/var/www");
    }

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(normalize("/var//www/./html/..").unwrap(), "/var/www");
        assert_eq!(normalize("/..").unwrap(), "/");
        assert!(normalize("relative/path").is_err());
        assert_eq!(resolve("/home/u", "../v").unwrap(), "/home/v");
        assert_eq!(resolve("/home/u", "/tmp").unwrap(), "/tmp");
    }

    #[test]
    fn file_name_of_nested_path() {
        assert_eq!(file_name("/home/u/report.pdf"), "report.pdf");
        assert_eq!(file_name("/"), "");
    }
}
