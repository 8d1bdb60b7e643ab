//! Subcommand implementations.

pub mod assess;
pub mod config_cmd;
pub mod dispatch;
pub mod policy;
pub mod rules;

use serde::de::DeserializeOwned;
use std::io::Read;
use std::path::Path;
use stride_config::{ConfigError, PipelineConfig};

/// Load the pipeline config from `path`, or from the default location.
///
/// Environment overrides apply in both cases.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    match path {
        Some(path) => {
            let mut config = PipelineConfig::load_from(path)?;
            config.apply_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => PipelineConfig::load(),
    }
}

/// Read a JSON document from a file, or from stdin when the path is `-`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?
    };
    parse_json(&content).map_err(|e| format!("Invalid JSON in {}: {e}", path.display()).into())
}

fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(content)
}

/// Accept either a single object or an array of them.
#[derive(serde::Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn one_or_many_accepts_both_shapes() {
        let one: OneOrMany<u32> = parse_json("7").unwrap();
        assert_eq!(one.into_vec(), vec![7]);
        let many: OneOrMany<u32> = parse_json("[1, 2]").unwrap();
        assert_eq!(many.into_vec(), vec![1, 2]);
    }

    #[test]
    fn read_json_reports_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = read_json::<serde_json::Value>(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn explicit_config_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ranker]\nmax_results = 2\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.ranker.max_results, 2);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.ranker.max_results, 5);
    }
}
