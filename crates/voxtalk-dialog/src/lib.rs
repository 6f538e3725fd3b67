pub mod chat;
pub mod command;
pub mod continuous;
pub mod listener;
pub mod recovery;

pub use chat::{ChatOptions, InterruptibleChat, SynthesisSetup};
pub use command::{CommandOptions, CommandRecognizer};
pub use continuous::{ContinuousOptions, ContinuousRecognizer};
pub use listener::RecognizerSetup;
pub use recovery::RecoverySettings;
