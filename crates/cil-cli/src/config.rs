//! CLI configuration – reads/writes `~/.cil/config.toml`.

use cil_runtime::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted configuration stored in `~/.cil/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Parameter blob used by `inspect` and `infer` when `--weights` is absent.
    #[serde(default = "default_weights_path")]
    pub weights_path: PathBuf,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_weights_path() -> PathBuf {
    config_dir_for_home(&home_dir()).join("weights.cil")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weights_path: default_weights_path(),
            engine: EngineConfig::default(),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// Return the path to `~/.cil/config.toml`.
pub fn config_path() -> PathBuf {
    config_dir_for_home(&home_dir()).join("config.toml")
}

pub(crate) fn config_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".cil")
}

/// Load the config at `path` (or the default location), apply `CIL_*`
/// overrides, and fall back to defaults when no file exists.
pub fn load(path: Option<&Path>) -> Result<Config, String> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut cfg = load_from(&path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `CIL_*` overrides read through `lookup`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CIL_WEIGHTS` | `weights_path` |
/// | `CIL_WORKERS` | `engine.workers` |
/// | `CIL_IMAGE_WIDTH` | `engine.image_width` |
/// | `CIL_IMAGE_HEIGHT` | `engine.image_height` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("CIL_WEIGHTS") {
        cfg.weights_path = PathBuf::from(v);
    }
    if let Some(v) = lookup("CIL_WORKERS")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.engine.workers = n;
    }
    if let Some(v) = lookup("CIL_IMAGE_WIDTH")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.engine.image_width = n;
    }
    if let Some(v) = lookup("CIL_IMAGE_HEIGHT")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.engine.image_height = n;
    }
}

/// Save the config to a specific path, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only file (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    fn tmp_config_path(dir: &tempfile::TempDir) -> PathBuf {
        config_dir_for_home(&dir.path().to_string_lossy()).join("config.toml")
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = tmp_config_path(&dir);

        save_to(&Config::default(), &path).expect("save");

        let file_mode =
            std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = tmp_config_path(&dir);

        let mut cfg = Config::default();
        cfg.weights_path = PathBuf::from("/models/town01.cil");
        cfg.engine.workers = 6;
        cfg.engine.batch_timeout_ms = Some(40);
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\ncoast_speed = 3.5\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert!((loaded.engine.coast_speed - 3.5).abs() < f32::EPSILON);
        assert_eq!(loaded.engine.image_width, 200);
        assert!(loaded.weights_path.ends_with("weights.cil"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "engine = [").unwrap();
        assert!(load_from(&path).unwrap_err().contains("parse"));
    }

    #[test]
    fn config_path_points_to_cil_dir() {
        let p = config_dir_for_home("/home/testuser").join("config.toml");
        assert!(p.to_string_lossy().contains(".cil"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        assert!(load_from(&tmp_config_path(&dir)).expect("no error").is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        apply_env_overrides(
            &mut cfg,
            env(&[
                ("CIL_WEIGHTS", "/tmp/w.cil"),
                ("CIL_WORKERS", "3"),
                ("CIL_IMAGE_WIDTH", "320"),
                ("CIL_IMAGE_HEIGHT", "120"),
            ]),
        );
        assert_eq!(cfg.weights_path, PathBuf::from("/tmp/w.cil"));
        assert_eq!(cfg.engine.workers, 3);
        assert_eq!((cfg.engine.image_width, cfg.engine.image_height), (320, 120));
    }

    #[test]
    fn env_overrides_ignore_invalid_numbers() {
        let mut cfg = Config::default();
        let original = cfg.clone();
        apply_env_overrides(
            &mut cfg,
            env(&[("CIL_WORKERS", "many"), ("CIL_IMAGE_WIDTH", "-4"), ("CIL_IMAGE_HEIGHT", "")]),
        );
        assert_eq!(cfg, original);
    }
}
