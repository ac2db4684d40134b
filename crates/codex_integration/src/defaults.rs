use std::{env, path::PathBuf, time::Duration};

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub(crate) const DEFAULT_TEMPLATE_PATH: &str = ".codex/templates";
pub(crate) const DEFAULT_BINARY: &str = "codex";
pub(crate) const CODEX_BINARY_ENV: &str = "CODEX_BINARY";
pub(crate) const VERSION_FLAG: &str = "--version";

/// Binary used when the configuration does not pin a `cliPath`.
pub(crate) fn default_binary_path() -> PathBuf {
    env::var_os(CODEX_BINARY_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY))
}

#[cfg(windows)]
pub(crate) const PATH_LOOKUP_COMMAND: &str = "where";
#[cfg(not(windows))]
pub(crate) const PATH_LOOKUP_COMMAND: &str = "which";
