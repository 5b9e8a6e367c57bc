use anyhow::{Context, Result};
use std::time::Duration;

/// Conexión al nodo de audio (Lavalink).
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub secure: bool,
}

impl NodeConfig {
    /// Base REST del nodo, incluyendo la versión del protocolo.
    pub fn rest_base(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}/v4", scheme, self.host, self.port)
    }

    /// Endpoint del websocket de eventos.
    pub fn websocket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}/v4/websocket", scheme, self.host, self.port)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2333,
            password: "youshallnotpass".to_string(),
            secure: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Nodo de audio
    pub lavalink: NodeConfig,

    // Google Drive
    pub drive_api_key: Option<String>,

    // Auto-join
    pub autojoin_on_join: bool,
    pub autojoin_channel: Option<String>,

    // Voz
    pub voice_connect_timeout: Duration,
    pub self_deaf: bool,

    // Límites
    pub max_queue_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_source(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración desde una función de búsqueda arbitraria.
    ///
    /// `load()` la usa con las variables de entorno; los tests con un mapa.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let config = Self {
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            guild_id: non_empty("GUILD_ID").and_then(|s| s.parse().ok()),

            lavalink: NodeConfig {
                host: non_empty("LAVALINK_HOST").unwrap_or(defaults.lavalink.host),
                port: match non_empty("LAVALINK_PORT") {
                    Some(port) => port.parse().context("LAVALINK_PORT inválido")?,
                    None => defaults.lavalink.port,
                },
                password: lookup("LAVALINK_PASSWORD").unwrap_or(defaults.lavalink.password),
                secure: match non_empty("LAVALINK_SECURE") {
                    Some(flag) => parse_flag(&flag)?,
                    None => defaults.lavalink.secure,
                },
            },

            drive_api_key: non_empty("GOOGLE_API_KEY"),

            autojoin_on_join: match non_empty("AUTOJOIN_ON_JOIN") {
                Some(flag) => parse_flag(&flag)?,
                None => defaults.autojoin_on_join,
            },
            autojoin_channel: non_empty("AUTOJOIN_CHANNEL"),

            voice_connect_timeout: match non_empty("VOICE_CONNECT_TIMEOUT") {
                Some(secs) => Duration::from_secs(
                    secs.parse().context("VOICE_CONNECT_TIMEOUT inválido")?,
                ),
                None => defaults.voice_connect_timeout,
            },
            self_deaf: match non_empty("SELF_DEAF") {
                Some(flag) => parse_flag(&flag)?,
                None => defaults.self_deaf,
            },

            max_queue_size: match non_empty("MAX_QUEUE_SIZE") {
                Some(size) => size.parse().context("MAX_QUEUE_SIZE inválido")?,
                None => defaults.max_queue_size,
            },
        };

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The Discord token must not be empty
    /// - The node port must be non-zero
    /// - The voice connect timeout must be positive
    /// - The queue bound must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if self.lavalink.port == 0 {
            anyhow::bail!("El puerto de Lavalink debe ser mayor que 0");
        }

        if self.voice_connect_timeout.is_zero() {
            anyhow::bail!("VOICE_CONNECT_TIMEOUT debe ser mayor que 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens, passwords and API keys are left out.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Lavalink: {}:{} (tls={})\n  \
            Drive: {}\n  \
            Autojoin: {} (canal preferido: {})\n  \
            Voz: timeout {}s, self_deaf={}\n  \
            Limits: {} queue",
            self.guild_id.map_or("global".to_string(), |id| format!("guild {}", id)),
            self.lavalink.host,
            self.lavalink.port,
            self.lavalink.secure,
            if self.drive_api_key.is_some() { "API key" } else { "usercontent" },
            self.autojoin_on_join,
            self.autojoin_channel.as_deref().unwrap_or("-"),
            self.voice_connect_timeout.as_secs(),
            self.self_deaf,
            self.max_queue_size,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            lavalink: NodeConfig::default(),

            drive_api_key: None,

            autojoin_on_join: true,
            autojoin_channel: None,

            voice_connect_timeout: Duration::from_secs(30),
            self_deaf: true,

            max_queue_size: 500,
        }
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("Valor booleano inválido: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_only_token_is_set() {
        let config = config_from(&[("DISCORD_TOKEN", "abc")]).unwrap();

        assert_eq!(config.lavalink, NodeConfig::default());
        assert_eq!(config.drive_api_key, None);
        assert!(config.autojoin_on_join);
        assert_eq!(config.autojoin_channel, None);
        assert_eq!(config.voice_connect_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_token_is_an_error() {
        assert!(config_from(&[]).is_err());
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = config_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("GOOGLE_API_KEY", ""),
            ("AUTOJOIN_CHANNEL", "   "),
        ])
        .unwrap();

        assert_eq!(config.drive_api_key, None);
        assert_eq!(config.autojoin_channel, None);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("LAVALINK_HOST", "lavalink"),
            ("LAVALINK_PORT", "443"),
            ("LAVALINK_SECURE", "true"),
            ("AUTOJOIN_ON_JOIN", "0"),
            ("AUTOJOIN_CHANNEL", " Música "),
            ("VOICE_CONNECT_TIMEOUT", "5"),
            ("MAX_QUEUE_SIZE", "10"),
        ])
        .unwrap();

        assert_eq!(config.lavalink.rest_base(), "https://lavalink:443/v4");
        assert_eq!(config.lavalink.websocket_url(), "wss://lavalink:443/v4/websocket");
        assert!(!config.autojoin_on_join);
        assert_eq!(config.autojoin_channel.as_deref(), Some("Música"));
        assert_eq!(config.voice_connect_timeout, Duration::from_secs(5));
        assert_eq!(config.max_queue_size, 10);
    }

    #[test]
    fn test_invalid_flag_is_rejected() {
        assert!(config_from(&[("DISCORD_TOKEN", "abc"), ("SELF_DEAF", "maybe")]).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_queue() {
        let config = config_from(&[("DISCORD_TOKEN", "abc"), ("MAX_QUEUE_SIZE", "0")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = config_from(&[
            ("DISCORD_TOKEN", "super-secret-token"),
            ("LAVALINK_PASSWORD", "hunter2"),
            ("GOOGLE_API_KEY", "AIzaSecret"),
        ])
        .unwrap();
        let summary = config.summary();

        assert!(!summary.contains("super-secret-token"));
        assert!(!summary.contains("hunter2"));
        assert!(!summary.contains("AIzaSecret"));
    }
}
