use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use js_lowering::Downleveler;

use crate::combine::Combine;
use crate::dirs::ConfigLayer;
use crate::resolver::DEFAULT_EXTENSIONS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Entry module. Relative paths are taken relative to `root`.
    pub entry: Option<PathBuf>,

    /// Project root that module ids are relative to; the current directory
    /// when unset
    pub root: Option<PathBuf>,

    pub output: OutputConfig,

    /// Extensions tried, in order, when an import does not name a file
    pub extensions: Vec<String>,

    /// Syntax target such as `es2015` or `chrome80`. Module bodies keep
    /// their syntax when unset.
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the bundle is written to
    pub path: PathBuf,

    /// File name of the bundle inside `path`
    pub filename: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("dist"),
            filename: "main.js".to_owned(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entry: None,
            root: None,
            output: OutputConfig::default(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| (*ext).to_owned()).collect(),
            target: None,
        }
    }
}

impl Combine for Config {
    fn combine(self, other: Self) -> Self {
        let defaults = Self::default();
        Self {
            entry: self.entry.combine(other.entry),
            root: self.root.combine(other.root),
            // Non-option values only override when they differ from the default
            output: OutputConfig {
                path: if self.output.path == defaults.output.path {
                    other.output.path
                } else {
                    self.output.path
                },
                filename: if self.output.filename == defaults.output.filename {
                    other.output.filename
                } else {
                    self.output.filename
                },
            },
            extensions: if self.extensions == defaults.extensions {
                other.extensions
            } else {
                self.extensions
            },
            target: self.target.combine(other.target),
        }
    }
}

/// Values set explicitly through the environment (`PACKLET_*`) or the
/// command line, applied on top of the file based configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub entry: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub output_filename: Option<String>,
    pub extensions: Option<Vec<String>>,
    pub target: Option<String>,
}

impl ConfigOverrides {
    /// Load overrides from environment variables with PACKLET_ prefix
    pub fn from_env() -> Self {
        Self {
            entry: env_value("PACKLET_ENTRY").map(PathBuf::from),
            root: env_value("PACKLET_ROOT").map(PathBuf::from),
            output_path: env_value("PACKLET_OUTPUT_PATH").map(PathBuf::from),
            output_filename: env_value("PACKLET_OUTPUT_FILENAME"),
            // PACKLET_EXTENSIONS - comma-separated list such as ".js,.mjs"
            extensions: env_value("PACKLET_EXTENSIONS").and_then(|value| {
                let extensions: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToOwned::to_owned)
                    .collect();
                (!extensions.is_empty()).then_some(extensions)
            }),
            target: env_value("PACKLET_TARGET"),
        }
    }

    pub fn apply_to(self, mut config: Config) -> Config {
        config.entry = self.entry.combine(config.entry);
        config.root = self.root.combine(config.root);
        if let Some(path) = self.output_path {
            config.output.path = path;
        }
        if let Some(filename) = self.output_filename {
            config.output.filename = filename;
        }
        if let Some(extensions) = self.extensions {
            config.extensions = extensions;
        }
        config.target = self.target.combine(config.target);
        config
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

impl Config {
    /// Check values that cannot be expressed in the TOML schema.
    pub fn validate(&self) -> Result<()> {
        let filename = self.output.filename.as_str();
        let is_bare_name = !filename.is_empty()
            && filename != "."
            && filename != ".."
            && !filename.contains(['/', '\\']);
        if !is_bare_name {
            bail!("output.filename must be a plain file name, got {filename:?}");
        }

        if self.extensions.is_empty() {
            bail!("extensions must not be empty");
        }
        for extension in &self.extensions {
            if !extension.starts_with('.') || extension.len() < 2 || extension.contains('/') {
                bail!("invalid extension {extension:?}: extensions must look like \".js\"");
            }
        }

        if let Some(target) = &self.target {
            Downleveler::new(target)?;
        }
        Ok(())
    }

    /// Location the bundle is written to.
    pub fn output_file(&self) -> PathBuf {
        self.output.path.join(&self.output.filename)
    }

    /// Load a single config file from a path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration with hierarchical precedence:
    /// 1. CLI-provided config path (highest precedence)
    /// 2. Environment variables (PACKLET_*)
    /// 3. Project config (packlet.toml in current directory)
    /// 4. User config (~/.config/packlet/packlet.toml)
    /// 5. System config (/etc/packlet/packlet.toml or equivalent)
    /// 6. Default values (lowest precedence)
    pub fn load(cli_config_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        for layer in ConfigLayer::ALL {
            let Some(path) = layer.locate() else {
                continue;
            };
            log::debug!("Loading {} config from: {}", layer.label(), path.display());
            let layer_config = Self::load_from_file(&path)
                .with_context(|| format!("Failed to load {} config", layer.label()))?;
            config = layer_config.combine(config);
        }

        config = ConfigOverrides::from_env().apply_to(config);

        if let Some(cli_config_path) = cli_config_path {
            log::debug!("Loading CLI config from: {}", cli_config_path.display());
            let cli_config =
                Self::load_from_file(cli_config_path).context("Failed to load CLI config")?;
            config = cli_config.combine(config);
        }

        config.validate().context("Invalid final configuration")?;
        Ok(config)
    }
}
