use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use bowerbird::error::{Error, Result};

pub const CONFIG_FILE: &str = "pipeline.toml";

/// Optional project configuration read from `pipeline.toml` in the input
/// directory. Command line flags take precedence over everything here.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    build: Build,
}

#[derive(Debug, Default, Deserialize)]
struct Build {
    output: Option<PathBuf>,
    working: Option<PathBuf>,
    custody_cache: Option<PathBuf>,
    purge: Option<bool>,
}

impl Config {
    pub fn discover(input: &Path) -> Result<Config> {
        let path = input.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Config::default());
        }

        let text = fs::read_to_string(&path)
            .map_err(|source| Error::io("read", &path, source))?;

        toml::from_str(&text).map_err(|e| Error::config(format!(
            "invalid pipeline configuration {}: {e}",
            path.display(),
        )))
    }

    pub fn output(&self, input: &Path) -> Option<PathBuf> {
        self.build.output.as_deref().map(|p| resolve(p, input))
    }

    pub fn working(&self, input: &Path) -> Option<PathBuf> {
        self.build.working.as_deref().map(|p| resolve(p, input))
    }

    pub fn custody_cache(&self, input: &Path) -> Option<PathBuf> {
        self.build.custody_cache.as_deref().map(|p| resolve(p, input))
    }

    pub fn purge(&self) -> bool {
        self.build.purge.unwrap_or(false)
    }
}

/// Relative paths in the configuration are taken relative to the directory
/// the configuration lives in.
fn resolve(path: &Path, input: &Path) -> PathBuf {
    match path.is_absolute() {
        true => path.to_path_buf(),
        false => input.join(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::discover(tmp.path()).unwrap();
        assert!(config.output(tmp.path()).is_none());
        assert!(!config.purge());
    }

    #[test]
    fn config_resolves_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            "[build]\noutput = \"public\"\ncustody_cache = \"/var/cache/site.json\"\npurge = true\n",
        ).unwrap();

        let config = Config::discover(tmp.path()).unwrap();
        assert_eq!(config.output(tmp.path()), Some(tmp.path().join("public")));
        assert_eq!(
            config.custody_cache(tmp.path()),
            Some(PathBuf::from("/var/cache/site.json")),
        );
        assert!(config.purge());
    }

    #[test]
    fn malformed_config_is_a_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "build = 17").unwrap();
        assert!(Config::discover(tmp.path()).is_err());
    }
}
