pub mod schema;

pub use schema::TrialscopeConfig;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Default trialscope home directory (~/.trialscope).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".trialscope"))
        .unwrap_or_else(|| PathBuf::from(".trialscope"))
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    default_home_dir().join("trialscope.toml")
}

/// Expand a user-supplied path that may contain `~`.
pub fn resolve_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<TrialscopeConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read trialscope config file")?;
        let config: TrialscopeConfig =
            toml::from_str(&contents).context("Failed to parse trialscope config (TOML)")?;
        Ok(config)
    } else {
        Ok(TrialscopeConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &TrialscopeConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

/// Check the settings a question run cannot do without.
pub fn validate(config: &TrialscopeConfig) -> Result<()> {
    if config.api_key.trim().is_empty() {
        bail!(
            "No inference API key configured: set {} or `api_key` in the config file",
            config.api_key_env
        );
    }
    if config.max_turns == 0 {
        bail!("max_turns must be at least 1");
    }
    if config.max_tool_calls_per_turn == 0 {
        bail!("max_tool_calls_per_turn must be at least 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.registry_url, "https://clinicaltrials.gov/api/v2");
        assert_eq!(cfg.max_turns, 5);
        assert_eq!(cfg.api_key_env, "GROQ_API_KEY");
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trialscope.toml");
        std::fs::write(&path, "model = \"llama-3.1-8b-instant\"\nmax_turns = 3\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.model, "llama-3.1-8b-instant");
        assert_eq!(cfg.max_turns, 3);
        assert_eq!(cfg.max_tokens, 4096);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("trialscope.toml");
        let cfg = TrialscopeConfig {
            question_timeout_secs: 45,
            system_prompt: Some("be brief".into()),
            ..TrialscopeConfig::default()
        };

        save_config(&cfg, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.question_timeout_secs, 45);
        assert_eq!(loaded.system_prompt.as_deref(), Some("be brief"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trialscope.toml");
        std::fs::write(&path, "max_turns = \"many\"").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn env_key_overrides_file_key() {
        let mut cfg = TrialscopeConfig {
            api_key: "from-file".into(),
            ..TrialscopeConfig::default()
        };
        cfg.apply_env_with(|name| (name == "GROQ_API_KEY").then(|| " from-env ".to_string()));
        assert_eq!(cfg.api_key, "from-env");

        cfg.apply_env_with(|_| Some("   ".to_string()));
        assert_eq!(cfg.api_key, "from-env");
    }

    #[test]
    fn validate_requires_api_key() {
        let cfg = TrialscopeConfig::default();
        assert!(validate(&cfg).is_err());

        let cfg = TrialscopeConfig {
            api_key: "gsk_test".into(),
            ..TrialscopeConfig::default()
        };
        assert!(validate(&cfg).is_ok());
    }
}
