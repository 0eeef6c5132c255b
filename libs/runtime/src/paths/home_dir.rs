//! Resolution of the server's base (home) directory.
//!
//! Three cases, in order: an explicit path (with leading `~` expanded to the
//! current user's home), or — when none is given — a platform default rooted
//! under `%APPDATA%` on Windows and `$HOME` elsewhere.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

fn platform_home() -> Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .context("APPDATA environment variable is not set")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .context("HOME environment variable is not set")
    }
}

fn expand_tilde(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        let home = platform_home()?;
        Ok(home.join(rest))
    } else if path == "~" {
        platform_home()
    } else {
        Ok(PathBuf::from(path))
    }
}

/// Resolve the base directory a server instance should use.
///
/// - `explicit`: user-provided path, possibly `~`-prefixed or relative.
/// - `default_subdir`: name joined under the platform home when `explicit`
///   is `None` (e.g. `.hyperspot`).
/// - `create`: when true, the resolved directory is created (`create_dir_all`)
///   before returning.
pub fn resolve_home_dir(
    explicit: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf> {
    let resolved = match explicit {
        Some(raw) => expand_tilde(&raw).context("failed to expand home_dir path")?,
        None => platform_home()
            .context("failed to determine platform home directory")?
            .join(default_subdir),
    };

    let absolute = if resolved.is_absolute() {
        resolved
    } else {
        std::env::current_dir()
            .context("failed to determine current working directory")?
            .join(resolved)
    };

    if create {
        std::fs::create_dir_all(&absolute)
            .with_context(|| format!("failed to create home_dir '{}'", absolute.display()))?;
    }

    normalize(&absolute)
}

/// Collapse `.`/`..` components without requiring the path to exist
/// (`Path::canonicalize` would fail on a dir we only just decided to create
/// lazily when `create` is false).
fn normalize(path: &Path) -> Result<PathBuf> {
    use std::path::Component;
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_tilde_path_expands_against_home() {
        let tmp = tempfile::tempdir().unwrap();
        #[cfg(target_os = "windows")]
        std::env::set_var("APPDATA", tmp.path());
        #[cfg(not(target_os = "windows"))]
        std::env::set_var("HOME", tmp.path());

        let resolved = resolve_home_dir(Some("~/.myapp".to_string()), ".default", false).unwrap();
        assert!(resolved.starts_with(tmp.path()));
        assert!(resolved.ends_with(".myapp"));
    }

    #[test]
    fn none_uses_platform_default_subdir() {
        let tmp = tempfile::tempdir().unwrap();
        #[cfg(target_os = "windows")]
        std::env::set_var("APPDATA", tmp.path());
        #[cfg(not(target_os = "windows"))]
        std::env::set_var("HOME", tmp.path());

        let resolved = resolve_home_dir(None, ".hyperspot", false).unwrap();
        assert!(resolved.ends_with(".hyperspot"));
    }

    #[test]
    fn create_flag_makes_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("nested/base");
        let resolved =
            resolve_home_dir(Some(target.to_string_lossy().to_string()), ".default", true)
                .unwrap();
        assert!(resolved.is_dir());
    }

    #[test]
    fn relative_explicit_path_is_made_absolute() {
        let resolved = resolve_home_dir(Some("some_relative_dir".to_string()), ".default", false)
            .unwrap();
        assert!(resolved.is_absolute());
    }
}
