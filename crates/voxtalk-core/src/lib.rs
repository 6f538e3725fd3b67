pub mod config;
pub mod config_diff;
pub mod error;
pub mod input;
pub mod transcript;
pub mod types;

pub use config::{
    AppConfig, InputConfig, InputSourceSetting, RecognitionConfig, RecoveryConfig,
    SynthesisConfig,
};
pub use config_diff::ConfigDiff;
pub use error::{AudioError, ConfigError, SpeechError};
pub use input::{AudioFeed, InputProvider, InputSource, InputSourceKind};
pub use transcript::{PartialPolicy, TranscriptAccumulator};
pub use types::{
    AudioChunk, AuthorizationStatus, EngineFailure, EngineUpdate, FailureKind,
    RecognitionEvent, RecognitionRequest, SpeechEvent, SpeechTurn, TaskHint, Voice,
    VoiceActivity, VoiceGender, VoiceQuality,
};
