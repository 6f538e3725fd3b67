pub mod buffer;
pub mod engine_trait;
pub mod null_engine;
pub mod registry;
pub mod session;

pub use buffer::{FlushPolicy, TextChunkBuffer};
pub use engine_trait::{SpeechBoundary, SynthesisEngine, SynthesisNotification, Utterance};
pub use null_engine::{NullSynthesisEngine, SpokenLog};
pub use registry::SynthesisRegistry;
pub use session::{SynthesisEvent, SynthesisSession, SynthesisSettings};
