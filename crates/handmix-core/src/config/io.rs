//! YAML files for any serde configuration type
//!
//! Reads are forgiving: a missing or broken file yields `T::default()` so a
//! session can always start. Writes report every failure.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read `path` as `T`, or `T::default()` when it is absent or unreadable
///
/// Fields the file leaves out take their defaults when `T` carries
/// `#[serde(default)]`.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.is_file() {
        log::info!("[CONFIG] No file at {:?}, starting from defaults", path);
        return T::default();
    }
    match read_yaml(path) {
        Ok(config) => {
            log::info!("[CONFIG] Read {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("[CONFIG] Ignoring {:?}: {:#}", path, e);
            T::default()
        }
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).context("unreadable")?;
    serde_yaml::from_str(&text).context("not valid YAML for this config")
}

/// Write `config` to `path` as YAML; missing directories are created
pub fn save_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Config does not serialize to YAML")?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {:?}", dir))?;
    }
    std::fs::write(path, yaml).with_context(|| format!("Cannot write {:?}", path))?;
    log::info!("[CONFIG] Wrote {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config: EngineConfig = load_config(&dir.path().join("absent.yaml"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_broken_yaml_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "num_stems: [not a number").unwrap();
        let config: EngineConfig = load_config(&path);
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_saved_overrides_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = EngineConfig { num_stems: 6, quantum_frames: 256, ..Default::default() };
        save_config(&config, &path).unwrap();

        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded.num_stems, 6);
        assert_eq!(loaded.quantum_frames, 256);
        assert_eq!(loaded.fade_out_ms, config.fade_out_ms);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.yaml");
        std::fs::write(&path, "num_stems: 2\n").unwrap();
        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded.num_stems, 2);
        assert_eq!(loaded.quantum_frames, EngineConfig::default().quantum_frames);
    }
}
