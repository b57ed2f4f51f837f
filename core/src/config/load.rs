use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default data directory: ~/.ckstate
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".ckstate"))
}

pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path.as_ref())?;
    let mut cfg = toml::from_str::<AppConfig>(&s)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.ckstate/config.toml (highest)
    let home_config = get_data_dir()?.join("config.toml");

    // Priority 2: ./ckstate.toml (current directory)
    let local_config = Path::new("ckstate.toml");

    let mut cfg: AppConfig = if home_config.exists() {
        let s = std::fs::read_to_string(&home_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else if local_config.exists() {
        let s = std::fs::read_to_string(local_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

// Environment variable overrides (Priority 0: highest)
fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Some(v) = env_parse::<u64>("CKSTATE_SESSION_TTL_SECS") {
        cfg.session.default_ttl_secs = v;
    }
    if let Some(v) = env_parse::<usize>("CKSTATE_MAX_SESSIONS") {
        cfg.session.max_sessions = v;
    }
    if let Some(v) = env_parse::<u64>("CKSTATE_CACHE_TTL_SECS") {
        cfg.context.cache_ttl_secs = v;
    }
    if let Ok(v) = std::env::var("CKSTATE_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = raw, "ignoring unparsable env override");
            None
        }
    }
}
