//! Process configuration
//!
//! Every knob is an environment variable with a workable default, so a bare
//! `warroom` starts a usable single-node orchestrator.

use std::time::Duration;

/// Which container driver implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverKind {
    /// Shell out to `docker compose`
    #[default]
    Compose,
    /// In-memory mock; every container operation succeeds instantly.
    /// Only useful for demos and tests.
    Mock,
}

/// Runtime configuration, resolved once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,
    /// Path to the sqlite store
    pub db_path: String,
    /// Directory where compose project files are rendered
    pub state_dir: String,
    /// Which container driver to use
    pub driver: DriverKind,
    /// Heartbeat silence before an agent is considered stalled
    pub stall_timeout: Duration,
    /// Per-subscriber delivery queue capacity
    pub subscriber_queue: usize,
    /// Per-(team, channel) ring buffer capacity
    pub channel_buffer_capacity: usize,
    /// First chat port handed to a team; subsequent teams count up
    pub chat_port_base: u16,
    /// How long after compose-up every agent gets to deliver its first
    /// heartbeat before the team transitions to error
    pub startup_window: Duration,
    /// `tenant:api-key` pairs, comma separated (tenant identity and key
    /// issuance live outside this process)
    pub api_keys: Vec<(String, String)>,
}

impl Config {
    pub fn from_env() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());

        Self {
            port: env_parse("WARROOM_PORT", 8200),
            db_path: std::env::var("WARROOM_DB_PATH")
                .unwrap_or_else(|_| format!("{home}/.warroom/warroom.db")),
            state_dir: std::env::var("WARROOM_STATE_DIR")
                .unwrap_or_else(|_| format!("{home}/.warroom/state")),
            driver: match std::env::var("WARROOM_DRIVER").as_deref() {
                Ok("mock") => DriverKind::Mock,
                _ => DriverKind::Compose,
            },
            stall_timeout: Duration::from_secs(env_parse("WARROOM_STALL_TIMEOUT_SECS", 60)),
            subscriber_queue: env_parse("WARROOM_SUBSCRIBER_QUEUE", 256),
            channel_buffer_capacity: env_parse(
                "WARROOM_CHANNEL_BUFFER_CAPACITY",
                crate::router::DEFAULT_BUFFER_CAPACITY,
            ),
            chat_port_base: env_parse("WARROOM_CHAT_PORT_BASE", 16_660),
            startup_window: Duration::from_secs(env_parse("WARROOM_STARTUP_WINDOW_SECS", 60)),
            api_keys: std::env::var("WARROOM_API_KEYS")
                .map(|raw| parse_api_keys(&raw))
                .unwrap_or_default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse `tenant:key[,tenant:key...]`, skipping malformed entries.
fn parse_api_keys(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (tenant, key) = pair.split_once(':')?;
            let tenant = tenant.trim();
            let key = key.trim();
            if tenant.is_empty() || key.is_empty() {
                return None;
            }
            Some((tenant.to_string(), key.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_parsing() {
        let keys = parse_api_keys("acme:k1, globex:k2 ,broken,:nokey,notenant:");
        assert_eq!(
            keys,
            vec![
                ("acme".to_string(), "k1".to_string()),
                ("globex".to_string(), "k2".to_string())
            ]
        );
    }

    #[test]
    fn empty_api_keys() {
        assert!(parse_api_keys("").is_empty());
    }
}
