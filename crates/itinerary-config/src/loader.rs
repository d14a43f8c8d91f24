use std::path::{Path, PathBuf};

use itinerary_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// File names tried, in order, when no config path is given.
const DEFAULT_FILE_NAMES: &[&str] = &["itinerary.toml", "itinerary.yml", "itinerary.yaml"];

/// Locates and parses the configuration file.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `path` if given (it must exist), otherwise the first default file
    /// found in the current directory, otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        match path {
            Some(path) => Self::load_file(path),
            None => {
                let cwd = std::env::current_dir()?;
                Self::load_from_dir(&cwd)
            }
        }
    }

    /// Load the first default config file in `dir`, or defaults if none exist.
    pub fn load_from_dir(dir: &Path) -> Result<AppConfig> {
        match Self::find_default(dir) {
            Some(path) => Self::load_file(&path),
            None => {
                debug!("no config file in {}, using defaults", dir.display());
                Ok(AppConfig::default())
            }
        }
    }

    pub fn load_file(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = parse(path, &contents)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    fn find_default(dir: &Path) -> Option<PathBuf> {
        DEFAULT_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}

fn parse(path: &Path, contents: &str) -> Result<AppConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}
