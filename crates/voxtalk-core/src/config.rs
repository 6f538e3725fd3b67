use crate::error::ConfigError;
use crate::input::InputSourceKind;
use crate::transcript::PartialPolicy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub recognition: RecognitionConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Engine-specific tables, keyed by engine name.
    #[serde(default)]
    pub engines: Option<toml::Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            locale: default_locale(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputSourceSetting {
    #[default]
    Microphone,
    File,
    Custom,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct InputConfig {
    #[serde(default)]
    pub source: InputSourceSetting,

    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,

    /// RMS level above which a buffer counts as speech.
    #[serde(default = "default_speech_threshold")]
    pub speech_threshold: f32,

    #[serde(default = "default_silence_hold_ms")]
    pub silence_hold_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source: InputSourceSetting::default(),
            device_name: default_device_name(),
            file: None,
            buffer_size: default_buffer_size(),
            speech_threshold: default_speech_threshold(),
            silence_hold_ms: default_silence_hold_ms(),
        }
    }
}

impl InputConfig {
    pub fn source_kind(&self) -> Result<InputSourceKind, ConfigError> {
        match self.source {
            InputSourceSetting::Microphone => Ok(InputSourceKind::Microphone),
            InputSourceSetting::Custom => Ok(InputSourceKind::CustomStream),
            InputSourceSetting::File => self
                .file
                .clone()
                .map(InputSourceKind::AudioFile)
                .ok_or_else(|| {
                    ConfigError::Invalid("input.source = \"file\" requires input.file".to_string())
                }),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RecognitionConfig {
    #[serde(default = "default_engine")]
    pub engine: String,

    #[serde(default = "default_true")]
    pub report_partial_results: bool,

    #[serde(default)]
    pub on_device_only: bool,

    #[serde(default = "default_inactivity_timeout_ms")]
    pub inactivity_timeout_ms: u64,

    #[serde(default)]
    pub partial_policy: PartialPolicy,

    /// Restart dictation after the engine ends a task for inactivity.
    #[serde(default)]
    pub keep_alive: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            report_partial_results: default_true(),
            on_device_only: false,
            inactivity_timeout_ms: default_inactivity_timeout_ms(),
            partial_policy: PartialPolicy::default(),
            keep_alive: false,
        }
    }
}

impl RecognitionConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SynthesisConfig {
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Voice identifier; the engine's default voice for the locale when unset.
    #[serde(default)]
    pub voice: Option<String>,

    #[serde(default = "default_rate")]
    pub rate: f32,

    #[serde(default = "default_pitch")]
    pub pitch: f32,

    #[serde(default = "default_min_flush_length")]
    pub min_flush_length: usize,

    /// Treat incoming text as SSML and flush on closing `</speak>` tags.
    #[serde(default)]
    pub markup: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            voice: None,
            rate: default_rate(),
            pitch: default_pitch(),
            min_flush_length: default_min_flush_length(),
            markup: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RecoveryConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            settle_ms: default_settle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_device_name() -> String {
    "default".to_string()
}

fn default_buffer_size() -> u32 {
    1024
}

fn default_speech_threshold() -> f32 {
    0.02
}

fn default_silence_hold_ms() -> u64 {
    600
}

fn default_engine() -> String {
    "null".to_string()
}

fn default_true() -> bool {
    true
}

fn default_inactivity_timeout_ms() -> u64 {
    800
}

fn default_rate() -> f32 {
    0.5
}

fn default_pitch() -> f32 {
    1.0
}

fn default_min_flush_length() -> usize {
    10
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_settle_ms() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern is valid"))
}

/// Interpolate `${VAR}` patterns with environment variable values.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = input.to_string();
    let mut errors = Vec::new();

    for cap in env_var_pattern().captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                tracing::warn!(var = %var_name, "config references an unset environment variable");
                errors.push(var_name.to_string());
            }
        }
    }

    if let Some(first_missing) = errors.into_iter().next() {
        return Err(ConfigError::EnvVarNotFound(first_missing));
    }

    Ok(result)
}

impl AppConfig {
    /// Load configuration from a TOML file, with environment variable interpolation.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!(path = ?path, "loading config");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(s)?;
        let config: AppConfig = toml::from_str(&interpolated)?;
        Ok(config)
    }

    /// The `[engines.<name>]` table, or an empty table.
    pub fn engine_table(&self, name: &str) -> toml::Value {
        self.engines
            .as_ref()
            .and_then(|engines| engines.get(name))
            .cloned()
            .unwrap_or_else(|| toml::Value::Table(Default::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parse_valid_toml() {
        let toml_str = r#"
[general]
log_level = "debug"
locale = "es-ES"

[input]
source = "microphone"
device_name = "USB Microphone"
buffer_size = 512

[recognition]
engine = "scripted"
on_device_only = true
inactivity_timeout_ms = 1000
partial_policy = "accumulate"

[synthesis]
voice = "com.example.monica"
rate = 0.45
min_flush_length = 20
markup = true

[recovery]
debounce_ms = 1500

[engines.scripted]
transcript = "hola que tal"
"#;
        let config = AppConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.locale, "es-ES");
        assert_eq!(config.input.device_name, "USB Microphone");
        assert_eq!(config.input.buffer_size, 512);
        assert_eq!(config.recognition.engine, "scripted");
        assert!(config.recognition.on_device_only);
        assert_eq!(
            config.recognition.inactivity_timeout(),
            Duration::from_millis(1000)
        );
        assert_eq!(config.recognition.partial_policy, PartialPolicy::Accumulate);
        assert_eq!(config.synthesis.voice.as_deref(), Some("com.example.monica"));
        assert_eq!(config.synthesis.rate, 0.45);
        assert_eq!(config.synthesis.min_flush_length, 20);
        assert!(config.synthesis.markup);
        assert_eq!(config.recovery.debounce_ms, 1500);
        assert_eq!(config.recovery.settle_ms, 300);
        let scripted = config.engine_table("scripted");
        assert_eq!(
            scripted.get("transcript").and_then(|v| v.as_str()),
            Some("hola que tal")
        );
    }

    #[test]
    fn test_config_default_values() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.locale, "en-US");
        assert_eq!(config.input.source, InputSourceSetting::Microphone);
        assert_eq!(config.input.device_name, "default");
        assert_eq!(config.input.buffer_size, 1024);
        assert_eq!(config.recognition.engine, "null");
        assert!(config.recognition.report_partial_results);
        assert_eq!(config.recognition.inactivity_timeout_ms, 800);
        assert_eq!(config.recognition.partial_policy, PartialPolicy::Replace);
        assert_eq!(config.synthesis.min_flush_length, 10);
        assert!(!config.synthesis.markup);
        assert_eq!(config.recovery.debounce_ms, 1000);
        assert!(config.engines.is_none());
    }

    #[test]
    fn test_config_env_var_interpolation() {
        std::env::set_var("VOXTALK_TEST_LOCALE", "fr-FR");
        let toml_str = r#"
[general]
locale = "${VOXTALK_TEST_LOCALE}"
"#;
        let config = AppConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.general.locale, "fr-FR");
        std::env::remove_var("VOXTALK_TEST_LOCALE");
    }

    #[test]
    fn test_config_missing_env_var_error() {
        let toml_str = r#"
[general]
log_level = "${DEFINITELY_DOES_NOT_EXIST_12345}"
"#;
        let result = AppConfig::from_toml_str(toml_str);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("DEFINITELY_DOES_NOT_EXIST_12345"));
    }

    #[test]
    fn test_config_invalid_toml_error() {
        let toml_str = "this is not valid toml [[[";
        let result = AppConfig::from_toml_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_unknown_partial_policy_rejected() {
        let toml_str = r#"
[recognition]
partial_policy = "sometimes"
"#;
        assert!(AppConfig::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = std::env::temp_dir().join("voxtalk_test_config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.toml");
        std::fs::write(
            &path,
            r#"
[general]
log_level = "warn"

[input]
source = "file"
file = "/tmp/hello.wav"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(
            config.input.source_kind().unwrap(),
            InputSourceKind::AudioFile(PathBuf::from("/tmp/hello.wav"))
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_config_load_from_file_not_found() {
        let result = AppConfig::load_from_file(Path::new("/nonexistent/path.toml"));
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("failed to read config file"));
    }

    #[test]
    fn test_file_source_without_path_is_invalid() {
        let config = AppConfig::from_toml_str("[input]\nsource = \"file\"\n").unwrap();
        match config.input.source_kind() {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("input.file")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_engine_table_missing_is_empty() {
        let config = AppConfig::default();
        let table = config.engine_table("null");
        assert!(table.as_table().map(|t| t.is_empty()).unwrap_or(false));
    }
}
