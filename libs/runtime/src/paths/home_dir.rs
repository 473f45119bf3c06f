use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HomeDirError {
    #[error("cannot determine the user's home directory")]
    NoHome,

    #[error("home_dir must be absolute after expansion: {0}")]
    NotAbsolute(String),

    #[error("failed to create home_dir {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve the application home directory.
///
/// - `None` (or blank) resolves to `<platform home>/<default_subdir>`
///   (`%APPDATA%` on Windows, `$HOME` elsewhere).
/// - A leading `~` is expanded against the platform home.
/// - The result must be absolute; it is created when `create` is set.
pub fn resolve_home_dir(
    configured: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let resolved = match configured.as_deref().map(str::trim) {
        None | Some("") => platform_home()?.join(default_subdir),
        Some(raw) => expand_tilde(raw)?,
    };

    if !resolved.is_absolute() {
        return Err(HomeDirError::NotAbsolute(
            resolved.to_string_lossy().to_string(),
        ));
    }

    if create {
        std::fs::create_dir_all(&resolved).map_err(|source| HomeDirError::Create {
            path: resolved.to_string_lossy().to_string(),
            source,
        })?;
    }

    Ok(resolved)
}

fn platform_home() -> Result<PathBuf, HomeDirError> {
    #[cfg(target_os = "windows")]
    let home = std::env::var_os("APPDATA")
        .map(PathBuf::from)
        .or_else(dirs::config_dir);
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir);

    home.ok_or(HomeDirError::NoHome)
}

fn expand_tilde(raw: &str) -> Result<PathBuf, HomeDirError> {
    if raw == "~" {
        return platform_home();
    }
    if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
        return Ok(platform_home()?.join(rest));
    }
    Ok(Path::new(raw).to_path_buf())
}
