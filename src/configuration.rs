use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};
use secrecy::SecretString;
use serde_aux::field_attributes::deserialize_number_from_string;
use url::Url;

use crate::dispatcher::UnknownBadRequestPolicy;
use crate::registry_client::RegistryClient;
use crate::retry::RetryPolicy;
use crate::telegram_client::TelegramClient;

#[derive(serde::Deserialize, Debug, Clone)]
pub struct Settings {
    pub app: ApplicationSettings,
    pub registry: RegistrySettings,
    pub telegram: TelegramSettings,
    pub broadcast: BroadcastSettings,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct RegistrySettings {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_ms: u64,
    pub retry: RetrySettings,
    /// Tighter limits for calls made while answering a bot command, so the
    /// reply lands before Telegram gives up on the webhook.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub command_timeout_ms: u64,
    pub command_retry: RetrySettings,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct RetrySettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_attempts: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub delay_ms: u64,
}

impl RegistrySettings {
    /// Client used by broadcast cycles.
    pub fn client(&self) -> Result<RegistryClient, anyhow::Error> {
        self.build_client(self.timeout(), self.retry.policy())
    }

    /// Client used by the command webhook.
    pub fn command_client(&self) -> Result<RegistryClient, anyhow::Error> {
        self.build_client(
            Duration::from_millis(self.command_timeout_ms),
            self.command_retry.policy(),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn build_client(
        &self,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<RegistryClient, anyhow::Error> {
        let base_url = Url::parse(&self.base_url)?;
        Ok(RegistryClient::new(base_url, timeout, retry)?)
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct TelegramSettings {
    pub base_url: String,
    pub bot_token: SecretString,
    pub webhook_secret: SecretString,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_ms: u64,
}

impl TelegramSettings {
    pub fn client(&self) -> Result<TelegramClient, anyhow::Error> {
        let base_url = Url::parse(&self.base_url)?;
        Ok(TelegramClient::new(
            base_url,
            self.bot_token.clone(),
            self.timeout(),
        )?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct BroadcastSettings {
    /// Wall-clock times, `HH:MM`, at which a cycle starts every day.
    pub schedule: Vec<DailyTime>,
    pub utc_offset_minutes: i32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub concurrency: usize,
    pub on_unknown_bad_request: UnknownBadRequestPolicy,
    pub templates: TemplateSettings,
}

impl BroadcastSettings {
    pub fn utc_offset(&self) -> Result<FixedOffset, anyhow::Error> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            anyhow::anyhow!("{} minutes is not a valid UTC offset", self.utc_offset_minutes)
        })
    }
}

/// Texts sent to recipients. The status texts are rendered with Tera and
/// receive `today`.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct TemplateSettings {
    pub status_pending: String,
    pub status_complete: String,
    pub closing: String,
    pub error_notice: String,
    pub welcome: String,
    pub registered: String,
    pub already_registered: String,
    pub unregistered: String,
    pub not_registered: String,
    pub request_failed: String,
}

#[derive(serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct DailyTime(NaiveTime);

impl DailyTime {
    pub fn parse(s: &str) -> Result<Self, String> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(Self)
            .map_err(|e| format!("{s:?} is not a valid HH:MM time: {e}"))
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl TryFrom<String> for DailyTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DailyTime::parse(&value)
    }
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "{other} is not supported environment. Try to use `local` or `production`",
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("Failed to determine current directory: {e}")))?;
    let conf_dir = base_path.join("configuration");
    let env: Environment = std::env::var("APP_ENV")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let settings = config::Config::builder()
        .add_source(
            config::File::with_name(&conf_dir.join("base").to_string_lossy()).required(true),
        )
        .add_source(
            config::File::with_name(&conf_dir.join(env.as_str()).to_string_lossy())
                .required(true),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .prefix_separator("_"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
