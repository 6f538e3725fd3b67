use crate::activity::ActivitySettings;
use crate::capture::MicrophoneInput;
use crate::custom::CustomStreamInput;
use crate::file::AudioFileInput;
use tokio::sync::mpsc;
use voxtalk_core::{
    InputConfig, InputProvider, InputSource, InputSourceKind, SpeechError, VoiceActivity,
};

/// Builds input sources of one configured kind.
#[derive(Debug, Clone)]
pub struct InputSourceFactory {
    kind: InputSourceKind,
    default_device: String,
    buffer_size: u32,
    activity: ActivitySettings,
}

impl InputSourceFactory {
    pub fn new(kind: InputSourceKind) -> Self {
        Self {
            kind,
            default_device: "default".to_string(),
            buffer_size: 1024,
            activity: ActivitySettings::default(),
        }
    }

    pub fn from_config(kind: InputSourceKind, config: &InputConfig) -> Self {
        Self {
            kind,
            default_device: config.device_name.clone(),
            buffer_size: config.buffer_size,
            activity: ActivitySettings::from_config(config),
        }
    }

    pub fn kind(&self) -> &InputSourceKind {
        &self.kind
    }
}

impl InputProvider for InputSourceFactory {
    fn create(
        &self,
        device_name: Option<&str>,
        activity: Option<mpsc::UnboundedSender<VoiceActivity>>,
    ) -> Result<Box<dyn InputSource>, SpeechError> {
        let source: Box<dyn InputSource> = match &self.kind {
            InputSourceKind::Microphone => {
                let device = device_name.unwrap_or(&self.default_device);
                let mic = MicrophoneInput::new(device, self.buffer_size);
                match activity {
                    Some(tx) => Box::new(mic.with_activity(self.activity, tx)),
                    None => Box::new(mic),
                }
            }
            InputSourceKind::AudioFile(path) => Box::new(AudioFileInput::new(path.clone())),
            InputSourceKind::CustomStream => Box::new(CustomStreamInput::new()),
        };
        tracing::debug!(source = source.name(), device = ?device_name, "created input source");
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_factory_creates_matching_sources() {
        let mic = InputSourceFactory::new(InputSourceKind::Microphone);
        assert_eq!(mic.create(None, None).unwrap().name(), "microphone");

        let file = InputSourceFactory::new(InputSourceKind::AudioFile(PathBuf::from("a.wav")));
        assert_eq!(file.create(None, None).unwrap().name(), "audio-file");

        let custom = InputSourceFactory::new(InputSourceKind::CustomStream);
        assert_eq!(custom.create(None, None).unwrap().name(), "custom-stream");
    }

    #[test]
    fn test_factory_from_config_keeps_kind() {
        let config = InputConfig::default();
        let factory = InputSourceFactory::from_config(InputSourceKind::CustomStream, &config);
        assert_eq!(factory.kind(), &InputSourceKind::CustomStream);
    }
}
