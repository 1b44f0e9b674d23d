//! Log sources: locating the log root, discovering files, parsing them and
//! reconciling the result against the cache

mod discovery;
mod parser;
mod reconcile;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::consts::CLAUDE_CONFIG_DIR_ENV;

pub(crate) use discovery::{DiscoveryStats, discover};
pub(crate) use reconcile::{ReconcileStats, Reconciled, reconcile};

const PROJECTS_DIR: &str = "projects";

/// Pick the log root: explicit override, then `$CLAUDE_CONFIG_DIR/projects`,
/// then the XDG-style config dir if it has logs, then `~/.claude/projects`.
fn resolve_root(
    explicit: Option<&Path>,
    config_dir_env: Option<OsString>,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(root) = explicit {
        return Some(root.to_path_buf());
    }
    if let Some(dir) = config_dir_env.filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir).join(PROJECTS_DIR));
    }
    let home = home?;
    let xdg = home.join(".config").join("claude").join(PROJECTS_DIR);
    if xdg.is_dir() {
        return Some(xdg);
    }
    Some(home.join(".claude").join(PROJECTS_DIR))
}

/// Log root for this run. `explicit` comes from `--root` or the config file.
pub(crate) fn find_root(explicit: Option<&Path>) -> Option<PathBuf> {
    resolve_root(
        explicit,
        std::env::var_os(CLAUDE_CONFIG_DIR_ENV),
        dirs::home_dir(),
    )
}
