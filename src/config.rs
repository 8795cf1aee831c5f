use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Public site root, used for unsubscribe and article links.
    #[serde(default = "default_site_url")]
    pub site_url: String,

    #[serde(default)]
    pub youtube: YouTubeConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub channel_id: String,

    #[serde(default = "default_max_results")]
    pub max_results: u32,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    #[default]
    Console,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub provider: MailProvider,

    #[serde(default = "default_mail_api_url")]
    pub api_url: String,

    pub api_key: Option<String>,

    #[serde(default = "default_from_email")]
    pub from_email: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,

    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,

    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shorts-herald");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("herald.db").to_string_lossy().to_string()
}

fn default_site_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_max_results() -> u32 {
    50
}

fn default_api_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

fn default_mail_api_url() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}

fn default_from_email() -> String {
    "noreply@localhost".to_string()
}

fn default_from_name() -> String {
    "Lifestyle".to_string()
}

fn default_mail_timeout() -> u64 {
    30
}

fn default_interval_minutes() -> u32 {
    60
}

fn default_cycle_timeout() -> u64 {
    300
}

fn default_max_concurrent_sends() -> usize {
    10
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            channel_id: String::new(),
            max_results: default_max_results(),
            api_base_url: default_api_base_url(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: MailProvider::default(),
            api_url: default_mail_api_url(),
            api_key: None,
            from_email: default_from_email(),
            from_name: default_from_name(),
            timeout_secs: default_mail_timeout(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            cycle_timeout_secs: default_cycle_timeout(),
            max_concurrent_sends: default_max_concurrent_sends(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            site_url: default_site_url(),
            youtube: YouTubeConfig::default(),
            mail: MailConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl YouTubeConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.channel_id.trim().is_empty()
    }
}

impl Config {
    /// Loads the config file (creating it with defaults when missing) and
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            config
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shorts-herald")
            .join("config.toml")
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = lookup("YOUTUBE_API_KEY") {
            self.youtube.api_key = v;
        }
        if let Some(v) = lookup("YOUTUBE_CHANNEL_ID") {
            self.youtube.channel_id = v;
        }
        if let Some(v) = lookup("MAIL_API_KEY") {
            self.mail.api_key = Some(v);
        }
        if let Some(v) = lookup("FRONTEND_URL") {
            self.site_url = v;
        }
        if let Some(v) = lookup("SHORTS_HERALD_DB") {
            self.db_path = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.schedule.interval_minutes == 0 {
            return Err(AppError::Config(
                "schedule.interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.schedule.max_concurrent_sends == 0 {
            return Err(AppError::Config(
                "schedule.max_concurrent_sends must be at least 1".to_string(),
            ));
        }
        if self.mail.provider == MailProvider::Http && self.mail.api_key.is_none() {
            return Err(AppError::Config(
                "mail.api_key is required for the http provider".to_string(),
            ));
        }
        Ok(())
    }
}
