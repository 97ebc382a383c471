use crate::defaults;
use crate::error::{Result, StorycastError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub pacing: PacingConfig,
    pub audio: AudioConfig,
    pub prompts: PromptOverrides,
}

/// Generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub text_model: String,
    pub speech_model: String,
    pub voice: String,
    /// Let the research call consult web search.
    pub research_search: bool,
}

/// Buffer thresholds and pauses for the broadcast loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PacingConfig {
    pub low_water_secs: f64,
    pub high_water_secs: f64,
    pub cool_down_secs: u64,
    pub retry_delay_secs: u64,
    pub lead_in_ms: u64,
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
}

/// Optional replacements for the built-in prompt templates.
///
/// Placeholders: `{topic}`, `{chapter}`, `{notes}`, `{context}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PromptOverrides {
    pub plan: Option<String>,
    pub research: Option<String>,
    pub write: Option<String>,
    pub research_fallback: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: defaults::DEFAULT_BASE_URL.to_string(),
            text_model: defaults::DEFAULT_TEXT_MODEL.to_string(),
            speech_model: defaults::DEFAULT_SPEECH_MODEL.to_string(),
            voice: defaults::DEFAULT_VOICE.to_string(),
            research_search: true,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            low_water_secs: defaults::LOW_WATER_SECS,
            high_water_secs: defaults::HIGH_WATER_SECS,
            cool_down_secs: defaults::COOL_DOWN_SECS,
            retry_delay_secs: defaults::RETRY_DELAY_SECS,
            lead_in_ms: defaults::LEAD_IN_MS,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(StorycastError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - STORYCAST_API_KEY (or GEMINI_API_KEY) → generation.api_key
    /// - STORYCAST_VOICE → generation.voice
    /// - STORYCAST_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        let api_key = ["STORYCAST_API_KEY", "GEMINI_API_KEY"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .find(|value| !value.is_empty());
        if let Some(key) = api_key {
            self.generation.api_key = Some(key);
        }

        if let Ok(voice) = std::env::var("STORYCAST_VOICE")
            && !voice.is_empty()
        {
            self.generation.voice = voice;
        }

        if let Ok(device) = std::env::var("STORYCAST_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Reject values the broadcast loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(StorycastError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.pacing.low_water_secs < 0.0 {
            return Err(StorycastError::ConfigInvalidValue {
                key: "pacing.low_water_secs".to_string(),
                message: "must not be negative".to_string(),
            });
        }
        if self.pacing.high_water_secs <= self.pacing.low_water_secs {
            return Err(StorycastError::ConfigInvalidValue {
                key: "pacing.high_water_secs".to_string(),
                message: format!(
                    "must exceed low_water_secs ({})",
                    self.pacing.low_water_secs
                ),
            });
        }
        if self.pacing.cool_down_secs == 0 {
            return Err(StorycastError::ConfigInvalidValue {
                key: "pacing.cool_down_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Render the effective configuration as TOML, with the API key masked.
    pub fn to_display_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.generation.api_key.is_some() {
            shown.generation.api_key = Some("********".to_string());
        }
        toml::to_string_pretty(&shown).map_err(|e| StorycastError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/storycast/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("storycast")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Serializes tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: only called with ENV_LOCK held.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_storycast_env() {
        remove_env("STORYCAST_API_KEY");
        remove_env("GEMINI_API_KEY");
        remove_env("STORYCAST_VOICE");
        remove_env("STORYCAST_AUDIO_DEVICE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.generation.api_key, None);
        assert_eq!(config.generation.voice, "Kore");
        assert_eq!(config.generation.text_model, "gemini-3-flash-preview");
        assert!(config.generation.research_search);

        assert_eq!(config.pacing.low_water_secs, 5.0);
        assert_eq!(config.pacing.high_water_secs, 60.0);
        assert_eq!(config.pacing.cool_down_secs, 20);
        assert_eq!(config.pacing.retry_delay_secs, 3);
        assert_eq!(config.pacing.lead_in_ms, 100);

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.sample_rate, 24000);
        assert_eq!(config.prompts, PromptOverrides::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [generation]
            voice = "Puck"
            research_search = false

            [pacing]
            high_water_secs = 90.0
            cool_down_secs = 30

            [audio]
            device = "pipewire"

            [prompts]
            research_fallback = "Notes on {chapter}"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.generation.voice, "Puck");
        assert!(!config.generation.research_search);
        assert_eq!(config.pacing.high_water_secs, 90.0);
        assert_eq!(config.pacing.cool_down_secs, 30);
        assert_eq!(config.pacing.low_water_secs, 5.0);
        assert_eq!(config.audio.device, Some("pipewire".to_string()));
        assert_eq!(
            config.prompts.research_fallback.as_deref(),
            Some("Notes on {chapter}")
        );
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[pacing\nlow = ").unwrap();

        assert!(Config::load(temp_file.path()).is_err());
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing = Path::new("/tmp/nonexistent_storycast_config_12345.toml");
        let config = Config::load_or_default(missing).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_env_override_api_key_prefers_storycast_var() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_storycast_env();

        set_env("GEMINI_API_KEY", "gemini-key");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.generation.api_key.as_deref(), Some("gemini-key"));

        set_env("STORYCAST_API_KEY", "storycast-key");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.generation.api_key.as_deref(), Some("storycast-key"));

        clear_storycast_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_storycast_env();

        set_env("STORYCAST_VOICE", "");
        set_env("STORYCAST_AUDIO_DEVICE", "hw:1,0");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.generation.voice, "Kore");
        assert_eq!(config.audio.device, Some("hw:1,0".to_string()));

        clear_storycast_env();
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_watermarks() {
        let mut config = Config::default();
        config.pacing.high_water_secs = 4.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pacing.high_water_secs"));
    }

    #[test]
    fn test_validate_rejects_zero_sample_rate() {
        let mut config = Config::default();
        config.audio.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_toml_masks_api_key() {
        let mut config = Config::default();
        config.generation.api_key = Some("secret".to_string());
        let shown = config.to_display_toml().unwrap();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("********"));
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = Config::default_path();
        assert!(path.to_string_lossy().contains("storycast"));
        assert!(path.ends_with("config.toml"));
    }
}
