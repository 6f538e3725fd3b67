use std::path::{Path, PathBuf};
use voxtalk_core::{AudioFeed, InputSource, SpeechError};

/// A pre-recorded file, handed to the engine as a whole.
pub struct AudioFileInput {
    path: PathBuf,
}

impl AudioFileInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputSource for AudioFileInput {
    fn name(&self) -> &str {
        "audio-file"
    }

    fn initialize(&mut self) -> Result<AudioFeed, SpeechError> {
        if !self.path.is_file() {
            return Err(SpeechError::NoAudioInput(format!(
                "audio file not found: {}",
                self.path.display()
            )));
        }
        Ok(AudioFeed::File(self.path.clone()))
    }

    fn stop(&mut self) {}
}
