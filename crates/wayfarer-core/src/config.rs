use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, WayfarerError};

/// Top-level configuration for Wayfarer.
///
/// Loaded from `~/.wayfarer/config.toml` by default. Every section falls back
/// to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WayfarerConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl WayfarerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: WayfarerConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the chat history database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.wayfarer/data".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl GeneralConfig {
    /// Expand a leading `~/` in `data_dir` against the user's home directory.
    pub fn data_path(&self) -> PathBuf {
        let dir = self.data_dir.as_str();
        if dir.starts_with("~/") || dir.starts_with("~\\") {
            #[cfg(target_os = "windows")]
            let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
            #[cfg(not(target_os = "windows"))]
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(&dir[2..])
        } else {
            PathBuf::from(dir)
        }
    }
}

/// Connection settings for the Gemini API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// API key. Takes precedence over `api_key_env` when set.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is absent.
    pub api_key_env: String,
    /// Base URL of the Generative Language API.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Request timeout in seconds. Zero disables the timeout.
    pub request_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-1.5-flash".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl GeminiConfig {
    /// Resolve the API key from config or environment.
    ///
    /// A missing key is a configuration error: the client cannot run without it.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.to_string());
        }
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(WayfarerError::Config(format!(
                "Gemini API key not found. Set [gemini].api_key or the {} environment variable.",
                self.api_key_env
            ))),
        }
    }
}

/// Sampling and length controls sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: Some(0.9),
            top_p: Some(0.95),
            top_k: Some(40),
            max_output_tokens: 500,
            stop_sequences: Vec::new(),
        }
    }
}

/// Chat presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Paired delimiter separating title and `label: body` segments.
    pub emphasis_marker: String,
    /// Speak every successful assistant reply.
    pub auto_speak: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            emphasis_marker: "**".to_string(),
            auto_speak: false,
        }
    }
}

/// Speech synthesis and recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    /// BCP 47 language tag passed to the speech engines.
    pub language: String,
    /// External text-to-speech program (e.g. `espeak`, `say`).
    pub tts_command: Option<String>,
    /// Extra arguments placed before the spoken text.
    pub tts_args: Vec<String>,
    /// External speech-to-text program. Each line it prints is a transcript.
    pub stt_command: Option<String>,
    pub stt_args: Vec<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "en-US".to_string(),
            tts_command: None,
            tts_args: Vec::new(),
            stt_command: None,
            stt_args: Vec::new(),
        }
    }
}

/// Connectivity probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub probe_host: String,
    pub probe_port: u16,
    pub probe_interval_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_host: "generativelanguage.googleapis.com".to_string(),
            probe_port: 443,
            probe_interval_secs: 15,
        }
    }
}
