use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from keyward.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywardConfig {
    pub vault: VaultConfig,
    pub generator: GeneratorConfig,
    pub sync: SyncConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Encrypted container file (default: ~/.keyward.pws)
    pub path: PathBuf,
    /// PBKDF2-HMAC-SHA384 rounds for the wrap key (default: 32768)
    pub wrap_iterations: u32,
    /// PBKDF2-HMAC-SHA256 rounds for the settings key (default: 1024)
    pub settings_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Iteration count for newly created entries (default: 4096)
    pub default_iterations: u32,
    /// Template length for newly created entries (default: 10)
    pub default_length: usize,
    /// Salt used for password derivation (default: "pepper")
    pub pepper: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Whether `sync` talks to a remote at all
    pub enabled: bool,
    /// Base URL of the sync server, with scheme
    pub server_address: Option<String>,
    /// HTTP basic auth user
    pub username: Option<String>,
    /// PEM certificate the server must present
    pub certificate_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.keyward.pws"),
            wrap_iterations: 32768,
            settings_iterations: 1024,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            default_iterations: 4096,
            default_length: 10,
            pepper: "pepper".into(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[vault]
path = "/tmp/vault.pws"
wrap_iterations = 100000
settings_iterations = 2048

[generator]
default_iterations = 8192
default_length = 16
pepper = "salt-and-pepper"

[sync]
enabled = true
server_address = "https://sync.example.com/keyward/"
username = "alice"
certificate_file = "/etc/keyward/server.pem"

[log]
level = "debug"
format = "json"
"#;
        let config: KeywardConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.vault.path, PathBuf::from("/tmp/vault.pws"));
        assert_eq!(config.vault.wrap_iterations, 100000);
        assert_eq!(config.vault.settings_iterations, 2048);
        assert_eq!(config.generator.default_length, 16);
        assert_eq!(config.generator.pepper, "salt-and-pepper");
        assert!(config.sync.enabled);
        assert_eq!(config.sync.username.as_deref(), Some("alice"));
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: KeywardConfig = toml::from_str("").unwrap();

        assert_eq!(config.vault.path, PathBuf::from("~/.keyward.pws"));
        assert_eq!(config.vault.wrap_iterations, 32768);
        assert_eq!(config.vault.settings_iterations, 1024);
        assert_eq!(config.generator.default_iterations, 4096);
        assert_eq!(config.generator.default_length, 10);
        assert_eq!(config.generator.pepper, "pepper");
        assert!(!config.sync.enabled);
        assert!(config.sync.server_address.is_none());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[generator]
default_length = 20
"#;
        let config: KeywardConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.generator.default_length, 20);
        // Defaults
        assert_eq!(config.generator.default_iterations, 4096);
        assert_eq!(config.vault.wrap_iterations, 32768);
        assert_eq!(config.log.format, "text");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = KeywardConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: KeywardConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.vault.path, parsed.vault.path);
        assert_eq!(config.generator.pepper, parsed.generator.pepper);
        assert_eq!(config.log.level, parsed.log.level);
    }
}
