use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "broker.hivemq.com";
pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_TOPIC: &str = "mqttline/1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttlineConfig {
    pub broker: BrokerConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Generated per run when unset.
    pub client_id: Option<String>,
    pub keep_alive_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub publish_timeout_seconds: u64,
    pub disconnect_timeout_seconds: u64,
    /// Extra attempts after the first transport-level connect failure.
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub topic: String,
    pub qos: u8,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            client_id: None,
            keep_alive_seconds: 30,
            connect_timeout_seconds: 10,
            publish_timeout_seconds: 10,
            disconnect_timeout_seconds: 2,
            reconnect_attempts: 1,
            reconnect_delay_ms: 500,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            qos: 1,
        }
    }
}

impl BrokerConfig {
    /// Broker settings for `host` with every other field at its default.
    pub fn for_host(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_seconds)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.disconnect_timeout_seconds)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl MqttlineConfig {
    /// Reads the config file at `path`. A missing file yields the defaults and
    /// is left uncreated.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: MqttlineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.broker.host.is_empty() {
            anyhow::bail!("MQTT host cannot be empty");
        }

        if self.broker.port == 0 {
            anyhow::bail!("MQTT port cannot be zero");
        }

        if let Some(client_id) = &self.broker.client_id {
            if client_id.is_empty() {
                anyhow::bail!("Client ID cannot be empty when set");
            }
        }

        // rumqttc rejects keep-alive intervals below five seconds
        if self.broker.keep_alive_seconds < 5 {
            anyhow::bail!("Keep-alive must be at least 5 seconds");
        }

        if self.broker.connect_timeout_seconds == 0 {
            anyhow::bail!("Connect timeout must be greater than zero");
        }

        if self.broker.publish_timeout_seconds == 0 {
            anyhow::bail!("Publish timeout must be greater than zero");
        }

        if self.session.topic.is_empty() {
            anyhow::bail!("Topic cannot be empty");
        }

        if self
            .session
            .topic
            .chars()
            .any(|c| c == '+' || c == '#' || c == '\0')
        {
            anyhow::bail!(
                "Topic '{}' cannot contain wildcards or null characters",
                self.session.topic
            );
        }

        if self.session.qos > 2 {
            anyhow::bail!(
                "Invalid QoS level: {}. Must be 0, 1, or 2",
                self.session.qos
            );
        }

        Ok(())
    }

    pub fn get_config_path() -> PathBuf {
        if let Ok(config_dir) = std::env::var("MQTTLINE_CONFIG_DIR") {
            PathBuf::from(config_dir).join("mqttline.toml")
        } else if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("mqttline").join("mqttline.toml")
        } else {
            PathBuf::from("mqttline.toml")
        }
    }
}
