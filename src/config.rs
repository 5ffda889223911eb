//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// System prompt composed into every generative-fallback invocation.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a concise, helpful assistant. Answer briefly (max ~6 sentences).";

/// Reply used when neither the fixed corpus nor the generative fallback
/// produced an answer.
pub const DEFAULT_FALLBACK: &str =
    "Ich habe dazu keine fixe Antwort. Sende `!bot hilfe` oder aktiviere LLM.";

/// Group id value that disables the group filter.
pub const GROUP_WILDCARD: &str = "*";

/// Relay configuration.
///
/// Everything except the two addressing values has a default; `validate`
/// refuses to run without them.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// The bot's own signal address. Required.
    pub number: String,
    /// Target group id, or `"*"` to answer in every group. Required.
    pub group_id: String,
    /// Leading token that marks a message as bot-directed.
    pub trigger: String,
    /// How long an idle read blocks before the receiver is health-checked.
    pub recv_timeout: Duration,
    /// Outbound send attempts per message.
    pub send_retry: u32,
    /// Constant delay between send attempts (no growth).
    pub send_retry_wait: Duration,
    /// Whether the generative fallback is consulted on a fixed-corpus miss.
    pub use_llm: bool,
    /// Model handed to the generative command.
    pub llm_model: String,
    /// Hard wall-clock budget for one generative invocation.
    pub llm_timeout: Duration,
    /// Token budget for the generative reply.
    pub llm_max_tokens: u32,
    /// Path of the fixed-responses corpus file.
    pub fixed_file: PathBuf,
    /// Static fallback reply text.
    pub fallback: String,
    /// System prompt for the generative fallback.
    pub system_prompt: String,
    /// Program used for both receiving and sending.
    pub signal_cli: String,
    /// Directory for rolling log files; console-only when unset.
    pub log_dir: Option<PathBuf>,
    /// Dedup cache capacity (entries).
    pub dedup_capacity: usize,
    /// Dedup cache entry time-to-live.
    pub dedup_ttl: Duration,
    /// Ceiling for the receiver restart backoff.
    pub backoff_ceiling: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            number: String::new(),
            group_id: String::new(),
            trigger: "!Bot".to_string(),
            recv_timeout: Duration::from_secs(300),
            send_retry: 3,
            send_retry_wait: Duration::from_secs(1),
            use_llm: false,
            llm_model: "mistral:instruct".to_string(),
            llm_timeout: Duration::from_secs(25),
            llm_max_tokens: 300,
            fixed_file: PathBuf::from("FIXED_RESPONSES.json"),
            fallback: DEFAULT_FALLBACK.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            signal_cli: "signal-cli".to_string(),
            log_dir: None,
            dedup_capacity: 4096,
            dedup_ttl: Duration::from_secs(12 * 3600),
            backoff_ceiling: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Read configuration from the environment.
    ///
    /// Unset or unparsable values fall back to their defaults; only
    /// `validate` decides what is fatal.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            number: env_str("SIGNAL_NUMBER", ""),
            group_id: env_str("SIGNAL_GROUP_ID", ""),
            trigger: env_str("BOT_TRIGGER", &d.trigger),
            recv_timeout: Duration::from_secs(env_parse("RECV_TIMEOUT", 300)),
            send_retry: env_parse("SEND_RETRY", d.send_retry),
            send_retry_wait: Duration::from_secs_f64(env_parse("SEND_RETRY_WAIT", 1.0)),
            use_llm: env_str("USE_LLM", "false").eq_ignore_ascii_case("true"),
            llm_model: env_str("LLM_MODEL", &d.llm_model),
            llm_timeout: Duration::from_secs(env_parse("LLM_TIMEOUT", 25)),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS", d.llm_max_tokens),
            fixed_file: PathBuf::from(env_str("FIXED_FILE", "FIXED_RESPONSES.json")),
            fallback: env_str("BOT_FALLBACK", DEFAULT_FALLBACK),
            system_prompt: env_str("BOT_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
            signal_cli: env_str("SIGNAL_CLI", &d.signal_cli),
            log_dir: std::env::var("LOG_DIR")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            ..d
        }
    }

    /// Check the required addressing values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.number.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "SIGNAL_NUMBER".to_string(),
                hint: "Set it to the bot's own signal address, e.g. +4915...".to_string(),
            });
        }
        if self.group_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "SIGNAL_GROUP_ID".to_string(),
                hint: "Set it to the target group id, or \"*\" to answer every group".to_string(),
            });
        }
        Ok(())
    }

    /// True when the group filter is disabled.
    pub fn wildcard_group(&self) -> bool {
        self.group_id == GROUP_WILDCARD
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.trigger, "!Bot");
        assert_eq!(cfg.send_retry, 3);
        assert_eq!(cfg.send_retry_wait, Duration::from_secs(1));
        assert_eq!(cfg.dedup_capacity, 4096);
        assert_eq!(cfg.dedup_ttl, Duration::from_secs(12 * 3600));
        assert_eq!(cfg.backoff_ceiling, Duration::from_secs(30));
        assert!(!cfg.use_llm);
    }

    #[test]
    fn validate_requires_number_and_group() {
        let cfg = RelayConfig::default();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingRequired { ref key, .. }) if key == "SIGNAL_NUMBER"
        ));

        let cfg = RelayConfig {
            number: "+4915000000".to_string(),
            ..RelayConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingRequired { ref key, .. }) if key == "SIGNAL_GROUP_ID"
        ));

        let cfg = RelayConfig {
            number: "+4915000000".to_string(),
            group_id: "*".to_string(),
            ..RelayConfig::default()
        };
        assert!(cfg.validate().is_ok());
        assert!(cfg.wildcard_group());
    }

    #[test]
    fn from_env_reads_and_defaults() {
        temp_env::with_vars(
            [
                ("SIGNAL_NUMBER", Some("+4915111")),
                ("SIGNAL_GROUP_ID", Some("G42")),
                ("BOT_TRIGGER", Some("!Borgo")),
                ("SEND_RETRY", Some("5")),
                ("SEND_RETRY_WAIT", Some("0.5")),
                ("USE_LLM", Some("TRUE")),
                ("LLM_TIMEOUT", Some("not-a-number")),
                ("RECV_TIMEOUT", None),
            ],
            || {
                let cfg = RelayConfig::from_env();
                assert_eq!(cfg.number, "+4915111");
                assert_eq!(cfg.group_id, "G42");
                assert_eq!(cfg.trigger, "!Borgo");
                assert_eq!(cfg.send_retry, 5);
                assert_eq!(cfg.send_retry_wait, Duration::from_secs_f64(0.5));
                assert!(cfg.use_llm);
                // unparsable falls back
                assert_eq!(cfg.llm_timeout, Duration::from_secs(25));
                // unset falls back
                assert_eq!(cfg.recv_timeout, Duration::from_secs(300));
                assert!(!cfg.wildcard_group());
            },
        );
    }

    #[test]
    fn from_env_trims_whitespace() {
        temp_env::with_vars(
            [
                ("SIGNAL_NUMBER", Some("  +4915111  ")),
                ("SIGNAL_GROUP_ID", Some(" * ")),
            ],
            || {
                let cfg = RelayConfig::from_env();
                assert_eq!(cfg.number, "+4915111");
                assert!(cfg.wildcard_group());
            },
        );
    }
}
