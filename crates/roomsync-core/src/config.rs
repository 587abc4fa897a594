//! Session configuration with environment overrides.

use roomsync_shared::types::default_username;

/// Settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Display name announced to peers.
    /// Env: `ROOMSYNC_USERNAME`
    /// Default: random `User<n>` name.
    pub username: String,

    /// Mirrored into the advisory `encrypted` flag on outgoing file
    /// messages. No transform is applied to payloads either way.
    /// Env: `ROOMSYNC_ENCRYPTION` (true/false)
    /// Default: `true`
    pub encryption_enabled: bool,

    /// Capacity of the session's command, event, and internal channels.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            encryption_enabled: true,
            channel_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("ROOMSYNC_USERNAME") {
            if !name.trim().is_empty() {
                config.username = name.trim().to_string();
            }
        }

        if let Ok(val) = std::env::var("ROOMSYNC_ENCRYPTION") {
            config.encryption_enabled = val != "false" && val != "0";
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(config.username.starts_with("User"));
        assert!(config.encryption_enabled);
        assert_eq!(config.channel_capacity, 256);
    }
}
