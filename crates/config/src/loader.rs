use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::BridgeConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "ackbridge.toml",
    "ackbridge.yaml",
    "ackbridge.yml",
    "ackbridge.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load an explicit config file, or fall back to discovery when none is given.
///
/// An explicit path that fails to load is an error; discovery never fails.
pub fn load_or_discover(path: Option<&Path>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(path)
        },
        None => Ok(discover_and_load()),
    }
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./ackbridge.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/ackbridge/ackbridge.{toml,yaml,yml,json}` (user-global)
///
/// Returns `BridgeConfig::default()` if no config file is found or it fails
/// to parse.
pub fn discover_and_load() -> BridgeConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return BridgeConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            BridgeConfig::default()
        },
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    find_in_dir(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in_dir(&dir)))
}

/// First standard config file name that exists in `dir`.
pub fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory, `~/.config/ackbridge/`.
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("ackbridge"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<BridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(unsafe_code)]
    fn loads_toml_with_env_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ackbridge.toml");
        unsafe { std::env::set_var("ACKBRIDGE_TEST_CLIENT", "peer-from-env") };
        std::fs::write(
            &path,
            r#"
            [auth]
            allowed_client_ids = ["${ACKBRIDGE_TEST_CLIENT}", "static-id"]
            "#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.auth.allowed_client_ids, vec!["peer-from-env", "static-id"]);
        unsafe { std::env::remove_var("ACKBRIDGE_TEST_CLIENT") };
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("ackbridge.yaml");
        std::fs::write(&yaml, "server:\n  port: 7000\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().server.port, 7000);

        let json = dir.path().join("ackbridge.json");
        std::fs::write(&json, r#"{"realtime": {"server_time_interval_ms": 250}}"#).unwrap();
        assert_eq!(
            load_config(&json).unwrap().realtime.server_time_interval_ms,
            250
        );
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ackbridge.ini");
        std::fs::write(&path, "port=1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_or_discover(Some(&missing)).is_err());
    }

    #[test]
    fn find_in_dir_prefers_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ackbridge.json"), "{}").unwrap();
        std::fs::write(dir.path().join("ackbridge.toml"), "").unwrap();
        assert_eq!(
            find_in_dir(dir.path()),
            Some(dir.path().join("ackbridge.toml"))
        );
    }
}
