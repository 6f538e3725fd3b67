use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to enumerate devices: {0}")]
    DeviceEnumeration(String),

    #[error("failed to build stream: {0}")]
    StreamBuild(String),

    #[error("stream error: {0}")]
    StreamError(String),
}

/// Failures surfaced by recognition and synthesis sessions.
///
/// The permission variants mirror the platform authorization states; every
/// other variant carries a human readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechError {
    #[error("the user denied the request to perform speech recognition")]
    PermissionDenied,

    #[error("the device prevents speech recognition")]
    PermissionRestricted,

    #[error("speech recognition authorization has not been determined")]
    PermissionNotDetermined,

    #[error("speech recognition not available")]
    EngineUnavailable,

    #[error("unable to create recognition task: {0}")]
    TaskCreationFailed(String),

    #[error("no audio input available: {0}")]
    NoAudioInput(String),

    #[error("audio session could not be configured: {0}")]
    AudioSessionConfigFailed(String),

    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("engine not found: {0}")]
    EngineNotFound(String),

    /// The recognizer or chat task behind a handle has shut down.
    #[error("{0} has shut down")]
    Closed(&'static str),
}

impl From<AudioError> for SpeechError {
    fn from(err: AudioError) -> Self {
        SpeechError::NoAudioInput(err.to_string())
    }
}
