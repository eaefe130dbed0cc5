//! Client-side configuration.
//!
//! Covers what the editor plugin persists locally: the active provider, the
//! ordered credential slots per provider, the local backend endpoint, the
//! timeout table, and the rate-limit detection vocabulary. Rotation state is
//! deliberately NOT here; it lives in [`crate::keys::KeyRotation`] and dies
//! with the process.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub provider: String,

    /// Local relay backend the client talks to.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default = "ProviderConfig::gemini")]
    pub gemini: ProviderConfig,
    #[serde(default = "ProviderConfig::openai")]
    pub openai: ProviderConfig,
    #[serde(default = "ProviderConfig::vllm")]
    pub vllm: ProviderConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Ordered credential slots. Blank entries are inactive placeholders and
    /// are never sent with a request.
    #[serde(default)]
    pub api_keys: Vec<String>,

    #[serde(default)]
    pub model: String,

    /// Response-body substrings treated as a throttling signal in addition
    /// to HTTP 429. Error formats differ per provider, so the vocabulary is
    /// data rather than code.
    #[serde(default = "default_rate_limit_markers")]
    pub rate_limit_markers: Vec<String>,
}

impl ProviderConfig {
    fn with_model(model: &str) -> Self {
        Self {
            api_keys: Vec::new(),
            model: model.to_string(),
            rate_limit_markers: default_rate_limit_markers(),
        }
    }

    pub fn gemini() -> Self {
        Self::with_model("gemini-2.5-flash")
    }

    pub fn openai() -> Self {
        Self::with_model("gpt-4")
    }

    pub fn vllm() -> Self {
        Self::with_model("default")
    }
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_rate_limit_markers() -> Vec<String> {
    ["429", "rate limit", "RESOURCE_EXHAUSTED", "quota"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Timeout table, in seconds. Connection establishment is separate from the
/// total-exchange ceiling; agent exchanges get a materially longer ceiling
/// because the backend may run multi-step tool execution mid-stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    /// Plain request/response calls (health, config passthrough).
    pub request_secs: u64,
    pub chat_secs: u64,
    pub agent_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 30,
            chat_secs: 120,
            agent_secs: 600,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn chat(&self) -> Duration {
        Duration::from_secs(self.chat_secs)
    }

    pub fn agent(&self) -> Duration {
        Duration::from_secs(self.agent_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            backend_url: default_backend_url(),
            gemini: ProviderConfig::gemini(),
            openai: ProviderConfig::openai(),
            vllm: ProviderConfig::vllm(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Self::default()
        };

        // Environment overrides take the front slot so they win rotation order.
        if let Ok(url) = std::env::var("EMBER_BACKEND_URL") {
            config.backend_url = url;
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !config.gemini.api_keys.contains(&key) {
                config.gemini.api_keys.insert(0, key);
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !config.openai.api_keys.contains(&key) {
                config.openai.api_keys.insert(0, key);
            }
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("no home directory"))?;
        Ok(home.join(".ember").join("config.json"))
    }

    /// Settings for the active provider.
    pub fn provider_config(&self) -> &ProviderConfig {
        match self.provider.as_str() {
            "openai" => &self.openai,
            "vllm" => &self.vllm,
            _ => &self.gemini,
        }
    }
}

/// Mask a key for logs and UI: first and last four characters survive,
/// short keys are fully starred.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_key_hides_the_middle() {
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("short"), "*****");
        assert_eq!(mask_key("AIzaSyD-1234-abcd"), "AIza*********abcd");
    }

    #[test]
    fn mask_key_handles_multibyte_keys() {
        // Counted and cut per character, never mid-codepoint.
        assert_eq!(mask_key("ключ-секрет"), "ключ***крет");
        assert_eq!(mask_key("日本語キー"), "*****");
    }

    #[test]
    fn provider_config_follows_active_provider() {
        let mut config = Config::default();
        config.provider = "openai".to_string();
        assert_eq!(config.provider_config().model, "gpt-4");
        config.provider = "gemini".to_string();
        assert_eq!(config.provider_config().model, "gemini-2.5-flash");
    }

    #[test]
    fn unknown_fields_do_not_break_deserialization() {
        let blob = r#"{"provider":"vllm","server":{"host":"0.0.0.0"}}"#;
        let config: Config = serde_json::from_str(blob).unwrap();
        assert_eq!(config.provider, "vllm");
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert!(!config.vllm.rate_limit_markers.is_empty());
    }
}
