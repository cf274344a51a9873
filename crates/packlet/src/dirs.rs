//! Where `packlet.toml` files are looked up.

use std::env;
use std::path::{Path, PathBuf};

use etcetera::BaseStrategy;

pub const CONFIG_FILE_NAME: &str = "packlet.toml";

/// Variable listing the system-wide configuration directories.
#[cfg(not(windows))]
const SYSTEM_DIRS_VAR: &str = "XDG_CONFIG_DIRS";
#[cfg(windows)]
const SYSTEM_DIRS_VAR: &str = "SYSTEMDRIVE";

/// A file based configuration layer. [`ConfigLayer::ALL`] lists them from
/// lowest to highest precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    /// `$XDG_CONFIG_DIRS/packlet`, then `/etc/packlet`; `%SYSTEMDRIVE%\ProgramData\packlet` on Windows
    System,
    /// The platform config dir, e.g. `~/.config/packlet`
    User,
    /// `packlet.toml` in the current directory
    Project,
}

impl ConfigLayer {
    pub const ALL: [Self; 3] = [Self::System, Self::User, Self::Project];

    pub const fn label(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Project => "project",
        }
    }

    /// Paths that may hold this layer's file, first match wins.
    pub fn candidates(self) -> Vec<PathBuf> {
        match self {
            Self::System => system_candidates(env::var(SYSTEM_DIRS_VAR).ok().as_deref()),
            Self::User => etcetera::choose_base_strategy()
                .map(|strategy| strategy.config_dir().join("packlet").join(CONFIG_FILE_NAME))
                .into_iter()
                .collect(),
            Self::Project => vec![PathBuf::from(CONFIG_FILE_NAME)],
        }
    }

    pub fn locate(self) -> Option<PathBuf> {
        self.candidates().into_iter().find(|path| path.is_file())
    }
}

#[cfg(not(windows))]
fn system_candidates(config_dirs: Option<&str>) -> Vec<PathBuf> {
    let config_dirs = config_dirs.filter(|dirs| !dirs.is_empty()).unwrap_or("/etc/xdg");
    config_dirs
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(Path::new)
        .chain([Path::new("/etc")])
        .map(|dir| dir.join("packlet").join(CONFIG_FILE_NAME))
        .collect()
}

#[cfg(windows)]
fn system_candidates(system_drive: Option<&str>) -> Vec<PathBuf> {
    system_drive
        .filter(|drive| !drive.is_empty())
        .map(|drive| {
            Path::new(&format!("{drive}\\"))
                .join("ProgramData")
                .join("packlet")
                .join(CONFIG_FILE_NAME)
        })
        .into_iter()
        .collect()
}
