//! Interactive shell selection

use std::path::PathBuf;

use hl_core::error::SessionError;

#[cfg(not(windows))]
const FALLBACK_SHELLS: &[&str] = &["zsh", "bash", "sh"];

#[cfg(windows)]
const FALLBACK_SHELLS: &[&str] = &["pwsh", "powershell", "cmd"];

/// Pick the shell for a new terminal.
///
/// Tries the configured shell, then `$SHELL`, then the platform fallbacks,
/// returning the first one found on disk or in `PATH`.
pub fn resolve_shell(configured: Option<&str>) -> Result<String, SessionError> {
    let env_shell = std::env::var("SHELL").ok();
    resolve_with(configured, env_shell.as_deref(), FALLBACK_SHELLS, |name| {
        which::which(name).ok()
    })
}

fn resolve_with<F>(
    configured: Option<&str>,
    env_shell: Option<&str>,
    fallbacks: &[&str],
    lookup: F,
) -> Result<String, SessionError>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let candidates = configured
        .into_iter()
        .chain(env_shell)
        .chain(fallbacks.iter().copied())
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty());

    for candidate in candidates {
        if let Some(path) = lookup(candidate) {
            tracing::debug!("Using shell {}", path.display());
            return Ok(path.to_string_lossy().into_owned());
        }
        tracing::debug!("Shell '{}' not found", candidate);
    }

    Err(SessionError::NoShell)
}
