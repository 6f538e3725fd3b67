use crate::error::SpeechError;
use serde::Deserialize;
use std::hash::{Hash, Hasher};
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Policy signal describing how long the user is expected to talk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskHint {
    /// Long or open-ended speech, e.g. dictating a message.
    Dictation,
    /// A few words, e.g. "search for previous documents" or "yes".
    Query,
    #[default]
    Unspecified,
}

impl TaskHint {
    /// Whether non-final results arm the inactivity timer.
    pub fn arms_inactivity_timer(self) -> bool {
        self != TaskHint::Dictation
    }
}

/// One recognition attempt. Created when a session starts, dropped when it stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionRequest {
    pub locale: String,
    pub task_hint: TaskHint,
    pub report_partial_results: bool,
    pub on_device_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    Restricted,
    NotDetermined,
}

impl AuthorizationStatus {
    pub fn into_result(self) -> Result<(), SpeechError> {
        match self {
            AuthorizationStatus::Authorized => Ok(()),
            AuthorizationStatus::Denied => Err(SpeechError::PermissionDenied),
            AuthorizationStatus::Restricted => Err(SpeechError::PermissionRestricted),
            AuthorizationStatus::NotDetermined => Err(SpeechError::PermissionNotDetermined),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The engine gave up after a long stretch without speech.
    InactivityTimeout,
    Other,
}

/// An error reported by the engine while a task is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl EngineFailure {
    pub fn inactivity() -> Self {
        Self {
            kind: FailureKind::InactivityTimeout,
            message: "no speech detected".to_string(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Other,
            message: message.into(),
        }
    }

    pub fn is_benign(&self) -> bool {
        self.kind == FailureKind::InactivityTimeout
    }
}

/// Raw output of an engine for one task, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    Transcript { text: String, is_final: bool },
    Failed(EngineFailure),
    AvailabilityChanged(bool),
}

/// Events delivered by a recognition session.
///
/// `Started` precedes every result of a task and `Finished` is always the last
/// event of a task. A non-benign failure is reported as `Error` immediately
/// followed by `Finished`.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Started,
    PartialResult(String),
    FinalResult(String),
    Finished,
    Error(SpeechError),
    AvailabilityChanged(bool),
}

/// A transcript surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechTurn {
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VoiceGender {
    Male,
    Female,
    #[default]
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VoiceQuality {
    #[default]
    Default,
    Enhanced,
    Premium,
}

/// A synthesis voice from the engine catalog.
#[derive(Debug, Clone)]
pub struct Voice {
    pub language: String,
    pub identifier: String,
    pub name: String,
    pub rate: Option<f32>,
    pub pitch_multiplier: Option<f32>,
    pub gender: VoiceGender,
    pub quality: VoiceQuality,
}

impl Voice {
    pub fn new(language: &str, identifier: &str, name: &str) -> Self {
        Self {
            language: language.to_string(),
            identifier: identifier.to_string(),
            name: name.to_string(),
            rate: None,
            pitch_multiplier: None,
            gender: VoiceGender::Unspecified,
            quality: VoiceQuality::Default,
        }
    }
}

// Floats are compared and hashed by bit pattern so `Voice` can key a set.
impl PartialEq for Voice {
    fn eq(&self, other: &Self) -> bool {
        self.language == other.language
            && self.identifier == other.identifier
            && self.name == other.name
            && self.rate.map(f32::to_bits) == other.rate.map(f32::to_bits)
            && self.pitch_multiplier.map(f32::to_bits)
                == other.pitch_multiplier.map(f32::to_bits)
            && self.gender == other.gender
            && self.quality == other.quality
    }
}

impl Eq for Voice {}

impl Hash for Voice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.language.hash(state);
        self.identifier.hash(state);
        self.name.hash(state);
        self.rate.map(f32::to_bits).hash(state);
        self.pitch_multiplier.map(f32::to_bits).hash(state);
        self.gender.hash(state);
        self.quality.hash(state);
    }
}

/// Caller-facing lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    StartedListening,
    StoppedListening,
    StartedSpeaking,
    StoppedSpeaking,
    DetectedSpeaking,
    /// Byte range of the utterance text about to be spoken.
    SynthesizingRange(Range<usize>),
}

/// Amplitude-based speech/silence transitions reported by live inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceActivity {
    SpeechStarted,
    SilenceStarted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_authorization_status_mapping() {
        assert!(AuthorizationStatus::Authorized.into_result().is_ok());
        assert_eq!(
            AuthorizationStatus::Denied.into_result(),
            Err(SpeechError::PermissionDenied)
        );
        assert_eq!(
            AuthorizationStatus::Restricted.into_result(),
            Err(SpeechError::PermissionRestricted)
        );
        assert_eq!(
            AuthorizationStatus::NotDetermined.into_result(),
            Err(SpeechError::PermissionNotDetermined)
        );
    }

    #[test]
    fn test_only_dictation_skips_inactivity_timer() {
        assert!(!TaskHint::Dictation.arms_inactivity_timer());
        assert!(TaskHint::Query.arms_inactivity_timer());
        assert!(TaskHint::Unspecified.arms_inactivity_timer());
    }

    #[test]
    fn test_engine_failure_classification() {
        assert!(EngineFailure::inactivity().is_benign());
        assert!(!EngineFailure::other("network lost").is_benign());
    }

    #[test]
    fn test_voice_hash_distinguishes_rate() {
        let base = Voice::new("en-US", "com.example.samantha", "Samantha");
        let mut faster = base.clone();
        faster.rate = Some(0.6);

        let mut set = HashSet::new();
        set.insert(base.clone());
        set.insert(base.clone());
        set.insert(faster);
        assert_eq!(set.len(), 2);
    }
}
