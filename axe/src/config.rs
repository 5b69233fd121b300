//! On-disk application configuration.
//!
//! The file lives at `<config dir>/config.json`. Keys present in the file replace the built-in
//! defaults; absent keys keep them.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use axchat::{ChatConfig, ChatError, ProviderSettings, ProviderType, ToolEndpoint};
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR_ENV: &str = "AXE_CONFIG_DIR";
pub const CONFIG_DIR_NAME: &str = ".axe-desktop";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DATABASE_FILE_NAME: &str = "axe-desktop.db";

/// Checked in order; the first non-empty value overrides every Gemini provider's key.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GOOGLE_API_KEY", "AXE_API_KEY"];

pub const DEFAULT_PROVIDER_ID: &str = "default-gemini";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub db_path: PathBuf,
    #[serde(flatten)]
    pub chat: ChatConfig,
}

/// Shape of the config file; every key is optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    db_path: Option<PathBuf>,
    providers: Option<Vec<ProviderSettings>>,
    mcp_servers: Option<Vec<ToolEndpoint>>,
    active_provider_id: Option<String>,
}

/// `$AXE_CONFIG_DIR`, or `.axe-desktop` under the home directory.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_DIR_NAME))
}

/// First non-empty API key from the environment.
pub fn env_api_key() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

impl AppConfig {
    /// Built-in configuration rooted at `dir`.
    pub fn defaults_in(dir: &Path) -> Self {
        let chat = ChatConfig::new()
            .with_provider(
                ProviderSettings::new(DEFAULT_PROVIDER_ID, ProviderType::Gemini, DEFAULT_MODEL)
                    .with_name("Google Gemini"),
            )
            .with_tool_endpoint(
                ToolEndpoint::http("exa", "https://mcp.exa.ai/mcp").with_name("Exa Search"),
            )
            .with_active_provider_id(DEFAULT_PROVIDER_ID);

        Self {
            db_path: dir.join(DATABASE_FILE_NAME),
            chat,
        }
    }

    /// Loads `.env`, the config file from [`config_dir`], and the API key overrides.
    pub fn load() -> Result<Self, ChatError> {
        if let Err(error) = dotenvy::dotenv()
            && !error.not_found()
        {
            tracing::warn!(error = %error, "ignoring unreadable .env file");
        }

        let mut config = Self::load_from(&config_dir())?;
        if let Some(key) = env_api_key() {
            let updated = config.apply_api_key(&key);
            tracing::debug!(providers = updated, "applied API key from environment");
        }
        Ok(config)
    }

    /// Loads the config file in `dir` over the defaults. A malformed file keeps the defaults.
    pub fn load_from(dir: &Path) -> Result<Self, ChatError> {
        fs::create_dir_all(dir).map_err(|error| {
            ChatError::configuration(format!(
                "failed to create config directory {}: {error}",
                dir.display()
            ))
        })?;

        let mut config = Self::defaults_in(dir);
        let path = dir.join(CONFIG_FILE_NAME);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(config),
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "failed to read config file");
                return Ok(config);
            }
        };

        match serde_json::from_str::<ConfigFile>(&data) {
            Ok(file) => config.merge(file),
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "ignoring malformed config file");
            }
        }

        Ok(config)
    }

    fn merge(&mut self, file: ConfigFile) {
        if let Some(db_path) = file.db_path.filter(|path| !path.as_os_str().is_empty()) {
            self.db_path = db_path;
        }
        if let Some(providers) = file.providers {
            self.chat.providers = providers;
        }
        if let Some(endpoints) = file.mcp_servers {
            self.chat.tool_endpoints = endpoints;
        }
        if let Some(active) = file.active_provider_id {
            self.chat.active_provider_id = active;
        }
    }

    /// Sets `key` on every Gemini provider and returns how many were updated.
    pub fn apply_api_key(&mut self, key: &str) -> usize {
        let mut updated = 0;
        for provider in &mut self.chat.providers {
            if provider.provider_type == ProviderType::Gemini {
                provider.api_key = key.to_string();
                updated += 1;
            }
        }
        updated
    }

    pub fn save(&self) -> Result<PathBuf, ChatError> {
        self.save_to(&config_dir())
    }

    /// Writes pretty JSON to `<dir>/config.json`, readable by the owner only.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, ChatError> {
        fs::create_dir_all(dir).map_err(|error| {
            ChatError::configuration(format!(
                "failed to create config directory {}: {error}",
                dir.display()
            ))
        })?;

        let path = dir.join(CONFIG_FILE_NAME);
        let json = serde_json::to_string_pretty(self).map_err(|error| {
            ChatError::configuration(format!("failed to serialize config: {error}"))
        })?;

        let write_error = |error: std::io::Error| {
            ChatError::configuration(format!("failed to write {}: {error}", path.display()))
        };

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path).map_err(write_error)?;

        // Existing files keep their mode on open; narrow it before the key is written.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(write_error)?;
        }

        file.write_all(json.as_bytes()).map_err(write_error)?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use axchat::ToolTransport;

    use super::*;

    #[test]
    fn missing_file_yields_defaults_inside_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir should be created");

        let config = AppConfig::load_from(dir.path()).expect("config should load");

        assert_eq!(config.db_path, dir.path().join(DATABASE_FILE_NAME));
        let provider = config.chat.active_provider().expect("default provider");
        assert_eq!(provider.id, DEFAULT_PROVIDER_ID);
        assert_eq!(provider.name, "Google Gemini");
        assert_eq!(provider.model, DEFAULT_MODEL);
        assert!(!provider.has_credentials());

        assert_eq!(config.chat.tool_endpoints.len(), 1);
        assert_eq!(config.chat.tool_endpoints[0].transport, ToolTransport::Http);
        assert_eq!(config.chat.tool_endpoints[0].url, "https://mcp.exa.ai/mcp");
    }

    #[test]
    fn file_keys_replace_defaults_and_absent_keys_keep_them() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{
                "providers": [
                    {"id": "work", "name": "Work", "type": "openai", "api_key": "sk-1",
                     "model": "gpt-4o-mini", "enabled": true}
                ],
                "active_provider_id": "work"
            }"#,
        )
        .expect("config should be written");

        let config = AppConfig::load_from(dir.path()).expect("config should load");

        assert_eq!(config.chat.providers.len(), 1);
        let provider = config.chat.active_provider().expect("active provider");
        assert_eq!(provider.provider_type, ProviderType::OpenAi);
        assert_eq!(provider.api_key, "sk-1");
        assert_eq!(config.chat.tool_endpoints.len(), 1);
        assert_eq!(config.db_path, dir.path().join(DATABASE_FILE_NAME));
    }

    #[test]
    fn malformed_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join(CONFIG_FILE_NAME), "{ not json").expect("file should be written");

        let config = AppConfig::load_from(dir.path()).expect("config should load");

        assert_eq!(config, AppConfig::defaults_in(dir.path()));
    }

    #[test]
    fn api_key_override_only_touches_gemini_providers() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut config = AppConfig::defaults_in(dir.path());
        config.chat.providers.push(
            ProviderSettings::new("work", ProviderType::OpenAi, "gpt-4o-mini").with_api_key("sk-1"),
        );

        assert_eq!(config.apply_api_key("g-key"), 1);
        assert_eq!(config.chat.providers[0].api_key, "g-key");
        assert_eq!(config.chat.providers[1].api_key, "sk-1");
    }

    #[test]
    fn saved_config_round_trips_with_owner_only_permissions() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut config = AppConfig::defaults_in(dir.path());
        config.apply_api_key("g-key");
        config.chat.tool_endpoints[0] = config.chat.tool_endpoints[0].clone().disabled();

        let path = config.save_to(dir.path()).expect("config should save");

        let raw = fs::read_to_string(&path).expect("config should be readable");
        assert!(raw.contains("\"mcp_servers\""));
        assert!(raw.contains("\"type\": \"gemini\""));

        let loaded = AppConfig::load_from(dir.path()).expect("config should load");
        assert_eq!(loaded, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path)
                .expect("metadata should load")
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[test]
    fn save_narrows_permissions_of_an_existing_file_before_writing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{}").expect("file should be written");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))
            .expect("permissions should be set");

        let mut config = AppConfig::defaults_in(dir.path());
        config.apply_api_key("g-key");
        config.save_to(dir.path()).expect("config should save");

        let mode = fs::metadata(&path)
            .expect("metadata should load")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
        let raw = fs::read_to_string(&path).expect("config should be readable");
        assert!(raw.contains("g-key"));
    }
}
