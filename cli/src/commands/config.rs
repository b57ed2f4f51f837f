use ckstate_core::api::{AppConfig, CliError};

use super::cli::{ConfigArgs, ConfigFormat};

pub fn render(cfg: &AppConfig, format: ConfigFormat) -> Result<String, CliError> {
    match format {
        ConfigFormat::Toml => {
            toml::to_string_pretty(cfg).map_err(|e| CliError::Config(e.to_string()))
        }
        ConfigFormat::Json => Ok(serde_json::to_string_pretty(cfg)?),
    }
}

pub fn handle_config(args: ConfigArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    println!("{}", render(cfg, args.format)?);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_output_reloads() {
        let mut cfg = AppConfig::default();
        cfg.session.max_sessions = 42;
        let text = render(&cfg, ConfigFormat::Toml).unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.session.max_sessions, 42);
        assert_eq!(back.context.cache_ttl_secs, cfg.context.cache_ttl_secs);
    }
}
