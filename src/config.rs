//! Metamorph Configuration
//!
//! Loads and saves the agent's configuration from `~/.metamorph/metamorph.json`.
//! The core consumes this as a read-only snapshot at process start; changes
//! take effect only across a rebirth.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::warn;

use crate::types::{default_config, AgentConfig, ProviderDescriptor};

/// Config file name within the metamorph directory.
const CONFIG_FILENAME: &str = "metamorph.json";

/// Returns the agent's home directory: `~/.metamorph`.
pub fn get_metamorph_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
    home.join(".metamorph")
}

/// Returns the full path to the config file: `~/.metamorph/metamorph.json`.
pub fn get_config_path() -> PathBuf {
    get_metamorph_dir().join(CONFIG_FILENAME)
}

/// Load the agent config from disk, merging missing fields with defaults.
///
/// Returns `None` if the config file does not exist or cannot be parsed.
pub fn load_config() -> Option<AgentConfig> {
    let config_path = get_config_path();
    if !config_path.exists() {
        return None;
    }

    let contents = fs::read_to_string(&config_path).ok()?;
    let config: AgentConfig = serde_json::from_str(&contents).ok()?;
    Some(merge_defaults(config))
}

/// Fill in defaults for operational fields the on-disk document left unset.
pub fn merge_defaults(mut config: AgentConfig) -> AgentConfig {
    let defaults = default_config();

    if config.journal_path.is_empty() {
        config.journal_path = defaults.journal_path;
    }
    if config.max_backups == 0 {
        config.max_backups = defaults.max_backups;
    }
    if config.provider_timeout_secs == 0 {
        config.provider_timeout_secs = defaults.provider_timeout_secs;
    }
    if config.max_output_tokens == 0 {
        config.max_output_tokens = defaults.max_output_tokens;
    }
    if config.cycle_interval_secs == 0 {
        config.cycle_interval_secs = defaults.cycle_interval_secs;
    }
    if config.failure_backoff_secs == 0 {
        config.failure_backoff_secs = defaults.failure_backoff_secs;
    }
    if config.max_consecutive_failures == 0 {
        config.max_consecutive_failures = defaults.max_consecutive_failures;
    }
    if config.version.is_empty() {
        config.version = defaults.version;
    }
    if config.backup_dir.is_empty() {
        config.backup_dir = derive_backup_dir(&config.source_path);
    }

    config
}

/// Save the agent config to disk at `~/.metamorph/metamorph.json`.
///
/// Creates the metamorph directory with mode 0o700 if it does not exist.
/// The config file is written with mode 0o600 since it may contain API keys.
pub fn save_config(config: &AgentConfig) -> Result<()> {
    let dir = get_metamorph_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create metamorph directory")?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    }

    let config_path = get_config_path();
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(&config_path, &json).context("Failed to write config file")?;
    fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

/// Resolve a path that may start with `~` to an absolute path.
pub fn resolve_path(p: &str) -> String {
    if let Some(rest) = p.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        home.join(rest).to_string_lossy().to_string()
    } else {
        p.to_string()
    }
}

/// Default backup location: a hidden `.backups/` directory next to the
/// source image.
pub fn derive_backup_dir(source_path: &str) -> String {
    let resolved = PathBuf::from(resolve_path(source_path));
    match resolved.parent() {
        Some(parent) => parent.join(".backups").to_string_lossy().to_string(),
        None => ".backups".to_string(),
    }
}

/// Startup validation: required-field presence and credential resolution.
///
/// Providers whose credential cannot be resolved (no inline key and the
/// named environment variable is unset) are dropped from the failover list
/// with a warning. An empty source path or an empty surviving provider
/// list is a fatal configuration error.
pub fn validate_config(config: &mut AgentConfig) -> Result<()> {
    if config.source_path.trim().is_empty() {
        bail!("config is missing required field: sourcePath");
    }

    config.providers = resolve_providers(std::mem::take(&mut config.providers));

    if config.providers.is_empty() {
        bail!("no provider in the config has a resolvable credential");
    }

    if let Some(ref cmd) = config.rebirth_command {
        if cmd.is_empty() {
            bail!("rebirthCommand must not be an empty list");
        }
    }

    Ok(())
}

/// Resolve each provider's credential, consulting `api_key_env` when the
/// inline key is empty.
fn resolve_providers(providers: Vec<ProviderDescriptor>) -> Vec<ProviderDescriptor> {
    providers
        .into_iter()
        .filter_map(|mut desc| {
            if desc.api_key.is_empty() {
                if let Some(ref var) = desc.api_key_env {
                    match std::env::var(var) {
                        Ok(key) if !key.is_empty() => desc.api_key = key,
                        _ => {}
                    }
                }
            }

            if desc.api_key.is_empty() {
                warn!(
                    "provider '{}' has no resolvable credential; disabled",
                    desc.name
                );
                None
            } else {
                Some(desc)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;

    fn descriptor(name: &str, key: &str, env: Option<&str>) -> ProviderDescriptor {
        ProviderDescriptor {
            name: name.to_string(),
            kind: ProviderKind::Openai,
            endpoint: "https://example.test/v1".to_string(),
            model: "test-model".to_string(),
            api_key: key.to_string(),
            api_key_env: env.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_resolve_path_with_tilde() {
        let resolved = resolve_path("~/some/path");
        assert!(!resolved.starts_with('~'));
        assert!(resolved.ends_with("some/path"));
    }

    #[test]
    fn test_resolve_path_without_tilde() {
        let path = "/absolute/path/to/file";
        assert_eq!(resolve_path(path), path);
    }

    #[test]
    fn test_derive_backup_dir_is_sibling_of_image() {
        assert_eq!(
            derive_backup_dir("/opt/agent/agent.rs"),
            "/opt/agent/.backups"
        );
    }

    #[test]
    fn test_merge_defaults_fills_operational_fields() {
        let mut config = default_config();
        config.source_path = "/opt/agent/agent.rs".to_string();
        config.max_backups = 0;
        config.journal_path = String::new();

        let merged = merge_defaults(config);
        assert_eq!(merged.max_backups, 3);
        assert_eq!(merged.journal_path, "~/.metamorph/journal.log");
        assert_eq!(merged.backup_dir, "/opt/agent/.backups");
    }

    #[test]
    fn test_validate_config_requires_source_path() {
        let mut config = default_config();
        config.providers = vec![descriptor("a", "key", None)];
        assert!(validate_config(&mut config).is_err());
    }

    #[test]
    fn test_validate_config_drops_credentialless_providers() {
        let mut config = default_config();
        config.source_path = "/opt/agent/agent.rs".to_string();
        config.providers = vec![
            descriptor("keyed", "sk-test", None),
            descriptor("bare", "", Some("METAMORPH_TEST_UNSET_VAR")),
        ];

        validate_config(&mut config).unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "keyed");
    }

    #[test]
    fn test_validate_config_fails_with_no_usable_provider() {
        let mut config = default_config();
        config.source_path = "/opt/agent/agent.rs".to_string();
        config.providers = vec![descriptor("bare", "", None)];
        assert!(validate_config(&mut config).is_err());
    }
}
