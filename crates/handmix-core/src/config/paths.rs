//! Where handmix keeps its files

use std::path::PathBuf;

/// `handmix` under the platform config directory
///
/// Falls back to `./handmix` on platforms without one.
pub fn config_dir() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("handmix")
}

/// `name` inside [`config_dir`], e.g. `config.yaml` or `profiles.yaml`
pub fn default_config_path(name: &str) -> PathBuf {
    config_dir().join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_live_in_handmix_dir() {
        let path = default_config_path("profiles.yaml");
        assert!(path.ends_with("handmix/profiles.yaml"));
        assert_eq!(path.parent(), Some(config_dir().as_path()));
    }
}
