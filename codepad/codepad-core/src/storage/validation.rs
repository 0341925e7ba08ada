//! Name and path rules shared by create, rename and lookup.
//!
//! Stored paths never carry a leading `/`. The API boundary accepts either
//! form and always emits the leading `/` via [`display_path`].

use crate::error::{Result, StoreError};

pub const SEPARATOR: char = '/';
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_PATH_LEN: usize = 1024;

const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Check a single path segment.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::invalid_name(name, "name is empty"));
    }
    if name == "." || name == ".." {
        return Err(StoreError::invalid_name(name, "name is a relative path component"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(StoreError::invalid_name(name, "name is longer than 255 bytes"));
    }
    if name.chars().any(|c| RESERVED.contains(&c)) {
        return Err(StoreError::invalid_name(name, "name contains a reserved character"));
    }
    if name.chars().any(|c| (c as u32) < 0x20) {
        return Err(StoreError::invalid_name(name, "name contains a control character"));
    }
    Ok(())
}

/// Join a parent path and a child name into a stored path.
pub fn join_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(p) if !p.is_empty() => format!("{}{}{}", p, SEPARATOR, name),
        _ => name.to_string(),
    }
}

pub fn check_path_len(path: &str) -> Result<()> {
    if path.len() > MAX_PATH_LEN {
        return Err(StoreError::invalid_name(path, "path is longer than 1024 bytes"));
    }
    Ok(())
}

/// Convert an externally supplied path into the stored form.
pub fn normalize_path(path: &str) -> Result<String> {
    let trimmed = path.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        return Err(StoreError::invalid_name(path, "path is empty"));
    }
    for segment in trimmed.split(SEPARATOR) {
        if segment.is_empty() {
            return Err(StoreError::invalid_name(path, "path contains an empty segment"));
        }
        validate_name(segment)?;
    }
    check_path_len(trimmed)?;
    Ok(trimmed.to_string())
}

pub fn display_path(stored: &str) -> String {
    format!("{}{}", SEPARATOR, stored)
}

/// Replace the `old_root` prefix of `path` with `new_root`.
///
/// `path` must be `old_root` itself or lie below it.
pub(crate) fn rebase_path(path: &str, old_root: &str, new_root: &str) -> Option<String> {
    if path == old_root {
        return Some(new_root.to_string());
    }
    let rest = path.strip_prefix(old_root)?.strip_prefix(SEPARATOR)?;
    Some(join_path(Some(new_root), rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn accepts_ordinary_names() {
        for name in ["App.jsx", "index.test.ts", ".gitignore", "with space", "ünïcode"] {
            assert!(validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_reserved_and_control_characters() {
        for name in ["", ".", "..", "a/b", "a\\b", "a:b", "a*b", "a?b", "a|b", "a<b", "a>b", "a\"b", "tab\there", "nul\0"] {
            let err = validate_name(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidName, "{name:?} should be rejected");
        }
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(validate_name(&long).is_err());
    }

    #[test]
    fn normalize_strips_separators_at_the_edges() {
        assert_eq!(normalize_path("/src/App.jsx").unwrap(), "src/App.jsx");
        assert_eq!(normalize_path("src/lib/").unwrap(), "src/lib");
        assert_eq!(normalize_path("b.js").unwrap(), "b.js");
        assert!(normalize_path("/").is_err());
        assert!(normalize_path("").is_err());
        assert!(normalize_path("src//App.jsx").is_err());
        assert!(normalize_path("src/../etc").is_err());
    }

    #[test]
    fn display_adds_leading_separator() {
        assert_eq!(display_path("src/App.jsx"), "/src/App.jsx");
        assert_eq!(join_path(None, "a"), "a");
        assert_eq!(join_path(Some("a"), "b"), "a/b");
    }

    #[test]
    fn rebase_only_touches_true_descendants() {
        assert_eq!(rebase_path("src", "src", "app").as_deref(), Some("app"));
        assert_eq!(rebase_path("src/lib/util.js", "src", "app").as_deref(), Some("app/lib/util.js"));
        assert_eq!(rebase_path("srcfoo/x.js", "src", "app"), None);
        assert_eq!(rebase_path("a/src/x.js", "src", "app"), None);
    }
}
