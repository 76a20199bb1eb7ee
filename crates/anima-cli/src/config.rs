//! Configuration Vault – reads/writes `~/.anima/config.toml`.

use anima_memory::engine::EngineConfig;
use anima_memory::episodic::EpisodicConfig;
use anima_memory::semantic::SemanticConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted host configuration stored in `~/.anima/config.toml`.
///
/// Store tuning lives under the `[episodic]` and `[semantic]` tables; any key
/// left out keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimaConfig {
    /// The host offers a maintenance tick to the engine every this many
    /// simulation ticks.
    #[serde(default = "default_maintenance_every")]
    pub maintenance_every: u64,

    /// Simulated seconds that pass per tick.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,

    /// SQLite file used by `/save` and `/load`.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// Fixed seed for random recall; unset means fresh entropy each run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,

    #[serde(default)]
    pub episodic: EpisodicConfig,

    #[serde(default)]
    pub semantic: SemanticConfig,
}

fn default_maintenance_every() -> u64 {
    10
}
fn default_tick_seconds() -> u64 {
    3600
}
fn default_snapshot_path() -> String {
    anima_dir().join("anima.db").to_string_lossy().into_owned()
}

impl Default for AnimaConfig {
    fn default() -> Self {
        Self {
            maintenance_every: default_maintenance_every(),
            tick_seconds: default_tick_seconds(),
            snapshot_path: default_snapshot_path(),
            rng_seed: None,
            episodic: EpisodicConfig::default(),
            semantic: SemanticConfig::default(),
        }
    }
}

impl AnimaConfig {
    /// Store tuning for [`MemoryEngine`](anima_memory::MemoryEngine).
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            episodic: self.episodic.clone(),
            semantic: self.semantic.clone(),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn anima_dir() -> PathBuf {
    PathBuf::from(home_dir()).join(".anima")
}

/// Return the path to `~/.anima/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".anima").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
/// `ANIMA_*` overrides are applied on top of the file.
pub fn load() -> Result<Option<AnimaConfig>, String> {
    let Some(mut cfg) = load_from(&config_path())? else {
        return Ok(None);
    };
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<AnimaConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: AnimaConfig = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    cfg.episodic
        .validate()
        .and_then(|_| cfg.semantic.validate())
        .map_err(|e| format!("Invalid config at {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `ANIMA_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ANIMA_SNAPSHOT_PATH` | `snapshot_path` |
/// | `ANIMA_MAINTENANCE_EVERY` | `maintenance_every` |
/// | `ANIMA_RNG_SEED` | `rng_seed` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut AnimaConfig) {
    if let Ok(v) = std::env::var("ANIMA_SNAPSHOT_PATH") {
        cfg.snapshot_path = v;
    }
    if let Some(every) = env_parse::<u64>("ANIMA_MAINTENANCE_EVERY") {
        cfg.maintenance_every = every.max(1);
    }
    if let Some(seed) = env_parse::<u64>("ANIMA_RNG_SEED") {
        cfg.rng_seed = Some(seed);
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Save the config to disk, creating `~/.anima/` if necessary.
pub fn save(cfg: &AnimaConfig) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path with owner-only permissions on Unix.
pub(crate) fn save_to(cfg: &AnimaConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
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
