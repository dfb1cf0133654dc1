use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const KEYS: &[&str] = &[
    "server",
    "application_id",
    "privacy_key",
    "session_id",
    "devmode",
    "monitor_url",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_application_id")]
    pub application_id: String,
    #[serde(default = "default_privacy_key")]
    pub privacy_key: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default = "default_devmode")]
    pub devmode: bool,
    #[serde(default = "default_monitor_url")]
    pub monitor_url: String,
}

fn default_server() -> String {
    "localhost:5555".to_string()
}

fn default_application_id() -> String {
    "exampleApplication".to_string()
}

fn default_privacy_key() -> String {
    "privkey".to_string()
}

fn default_session_id() -> String {
    "session1".to_string()
}

fn default_devmode() -> bool {
    true
}

fn default_monitor_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            application_id: default_application_id(),
            privacy_key: default_privacy_key(),
            session_id: default_session_id(),
            devmode: default_devmode(),
            monitor_url: default_monitor_url(),
        }
    }
}

impl CliConfig {
    /// Config file path: ~/.config/coral/cli.toml
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Cannot determine config directory")?
            .join("coral");
        Ok(config_dir.join("cli.toml"))
    }

    /// File values, then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file_only()?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(server) = lookup("CORAL_SERVER") {
            self.server = server;
        }
        if let Some(app) = lookup("CORAL_APP") {
            self.application_id = app;
        }
        if let Some(key) = lookup("CORAL_KEY") {
            self.privacy_key = key;
        }
        if let Some(session) = lookup("CORAL_SESSION") {
            self.session_id = session;
        }
        if let Some(url) = lookup("CORAL_MONITOR_URL") {
            self.monitor_url = url;
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Without env overrides, so `set` never writes environment values to disk.
    fn load_file_only() -> Result<Self> {
        let path = Self::path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn set(key: &str, value: &str) -> Result<()> {
        let mut config = Self::load_file_only()?;
        config.assign(key, value)?;
        config.save()
    }

    fn assign(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "server" => self.server = value.to_string(),
            "application_id" => self.application_id = value.to_string(),
            "privacy_key" => self.privacy_key = value.to_string(),
            "session_id" => self.session_id = value.to_string(),
            "devmode" => {
                self.devmode = value
                    .parse()
                    .with_context(|| format!("devmode must be true or false (got '{value}')"))?;
            }
            "monitor_url" => self.monitor_url = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {key}. Valid keys: {}", KEYS.join(", ")),
        }
        Ok(())
    }

}
