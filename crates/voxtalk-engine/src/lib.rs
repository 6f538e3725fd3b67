pub mod engine_trait;
pub mod null_engine;
pub mod registry;
pub mod scripted_engine;
pub mod session;

pub use engine_trait::{RecognitionTask, SpawnedTask, SpeechEngine};
pub use null_engine::NullSpeechEngine;
pub use registry::EngineRegistry;
pub use scripted_engine::ScriptedSpeechEngine;
pub use session::{RecognitionSession, RecognitionSettings, SessionPhase, SessionSignal};
