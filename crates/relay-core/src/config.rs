use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default timeout for one claude CLI invocation, stream draining included.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Discord rejects message bodies longer than this.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 2000;
/// Minimum spacing between two edits of the same message.
pub const DEFAULT_MIN_EDIT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SESSION_TTL_HOURS: u64 = 24;
pub const DEFAULT_MAX_HISTORY: usize = 50;
pub const DEFAULT_CONSOLE_CATEGORY: &str = "🤖 Bot Consoles";
pub const DEFAULT_CONSOLE_PREFIX: &str = "bot-console-";

/// Top-level config (relay.toml + RELAY_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayBotConfig {
    #[serde(default)]
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
}

/// How the claude CLI is located and supervised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeConfig {
    /// Binary name or path (default: `claude`).
    #[serde(default = "default_command")]
    pub command: String,
    /// Launcher arguments inserted between the binary and `-p`,
    /// e.g. `["@anthropic-ai/claude-code"]` when `command = "npx"`.
    #[serde(default)]
    pub command_args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            command_args: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Output relay limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "default_min_edit_interval_ms")]
    pub min_edit_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            min_edit_interval_ms: DEFAULT_MIN_EDIT_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Sessions idle for longer than this are swept.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    /// How often the sweeper runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Cap on stored history per session; the oldest messages are dropped
    /// once it is exceeded.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            sweep_interval_secs: default_sweep_interval_secs(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    /// Guild whose members get a private console channel on startup.
    pub guild_id: u64,
    #[serde(default = "default_console_category")]
    pub console_category: String,
    #[serde(default = "default_console_prefix")]
    pub console_prefix: String,
}

fn default_command() -> String {
    "claude".to_string()
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_max_message_chars() -> usize {
    DEFAULT_MAX_MESSAGE_CHARS
}
fn default_min_edit_interval_ms() -> u64 {
    DEFAULT_MIN_EDIT_INTERVAL_MS
}
fn default_ttl_hours() -> u64 {
    DEFAULT_SESSION_TTL_HOURS
}
fn default_sweep_interval_secs() -> u64 {
    600
}
fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}
fn default_console_category() -> String {
    DEFAULT_CONSOLE_CATEGORY.to_string()
}
fn default_console_prefix() -> String {
    DEFAULT_CONSOLE_PREFIX.to_string()
}

impl RelayBotConfig {
    /// Load config from a TOML file with RELAY_* env var overrides.
    ///
    /// Path resolution: explicit argument, then `~/.claude-relay/relay.toml`.
    /// A missing file is not an error; every field has a default except the
    /// optional `[discord]` table. Nested keys use a double underscore, e.g.
    /// `RELAY_DISCORD__BOT_TOKEN`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: RelayBotConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("RELAY_").split("__"))
            .extract()
            .map_err(|e| crate::error::RelayError::Config(e.to_string()))?;

        tracing::debug!(path = %path, "configuration loaded");
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.claude-relay/relay.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_discord_limits() {
        let config = RelayBotConfig::default();
        assert_eq!(config.claude.command, "claude");
        assert_eq!(config.claude.timeout_secs, 120);
        assert_eq!(config.relay.max_message_chars, 2000);
        assert_eq!(config.relay.min_edit_interval_ms, 1000);
        assert_eq!(config.sessions.ttl_hours, 24);
        assert!(config.discord.is_none());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(
            &path,
            r#"
[claude]
command = "npx"
command_args = ["@anthropic-ai/claude-code"]
timeout_secs = 30

[discord]
bot_token = "token-123"
guild_id = 42
"#,
        )
        .unwrap();

        let config = RelayBotConfig::load(path.to_str()).unwrap();
        assert_eq!(config.claude.command, "npx");
        assert_eq!(config.claude.command_args, vec!["@anthropic-ai/claude-code"]);
        assert_eq!(config.claude.timeout_secs, 30);
        // Untouched sections keep their defaults.
        assert_eq!(config.relay.max_message_chars, 2000);

        let discord = config.discord.unwrap();
        assert_eq!(discord.guild_id, 42);
        assert_eq!(discord.console_prefix, "bot-console-");
    }

    #[test]
    fn wrong_type_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[claude]\ntimeout_secs = \"soon\"\n").unwrap();

        let err = RelayBotConfig::load(path.to_str()).unwrap_err();
        assert!(matches!(err, crate::error::RelayError::Config(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = RelayBotConfig::load(Some("/nonexistent/relay.toml")).unwrap();
        assert_eq!(config.claude.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }
}
