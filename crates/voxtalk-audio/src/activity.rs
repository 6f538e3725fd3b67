use std::time::Duration;
use voxtalk_core::{InputConfig, VoiceActivity};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivitySettings {
    /// RMS level above which a buffer counts as speech.
    pub speech_threshold: f32,
    /// How long the level must stay below the threshold before reporting silence.
    pub silence_hold: Duration,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self {
            speech_threshold: 0.02,
            silence_hold: Duration::from_millis(600),
        }
    }
}

impl ActivitySettings {
    pub fn from_config(config: &InputConfig) -> Self {
        Self {
            speech_threshold: config.speech_threshold,
            silence_hold: Duration::from_millis(config.silence_hold_ms),
        }
    }
}

/// Amplitude-based speech/silence detector fed from the capture callback.
///
/// Reports a transition only when the state flips, so a long stretch of
/// speech yields a single `SpeechStarted`.
#[derive(Debug, Clone)]
pub struct ActivityDetector {
    settings: ActivitySettings,
    speaking: bool,
    silent_frames: u64,
}

impl ActivityDetector {
    pub fn new(settings: ActivitySettings) -> Self {
        Self {
            settings,
            speaking: false,
            silent_frames: 0,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn observe(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        channels: u16,
    ) -> Option<VoiceActivity> {
        if samples.is_empty() {
            return None;
        }

        if rms(samples) >= self.settings.speech_threshold {
            self.silent_frames = 0;
            if !self.speaking {
                self.speaking = true;
                return Some(VoiceActivity::SpeechStarted);
            }
            return None;
        }

        if !self.speaking {
            return None;
        }

        let frames = samples.len() as u64 / u64::from(channels.max(1));
        self.silent_frames += frames;
        let hold_frames =
            (self.settings.silence_hold.as_secs_f64() * f64::from(sample_rate)) as u64;
        if self.silent_frames >= hold_frames {
            self.speaking = false;
            self.silent_frames = 0;
            return Some(VoiceActivity::SilenceStarted);
        }
        None
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(hold_ms: u64) -> ActivityDetector {
        ActivityDetector::new(ActivitySettings {
            speech_threshold: 0.1,
            silence_hold: Duration::from_millis(hold_ms),
        })
    }

    #[test]
    fn test_rms_of_constant_signal() {
        assert!((rms(&[0.5; 64]) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_loud_buffer_reports_speech_once() {
        let mut det = detector(100);
        assert_eq!(
            det.observe(&[0.5; 160], 16000, 1),
            Some(VoiceActivity::SpeechStarted)
        );
        assert_eq!(det.observe(&[0.5; 160], 16000, 1), None);
        assert!(det.is_speaking());
    }

    #[test]
    fn test_silence_requires_hold_duration() {
        let mut det = detector(100);
        det.observe(&[0.5; 160], 16000, 1);

        // 100ms at 16kHz is 1600 frames; 10 buffers of 160 reach it.
        for _ in 0..9 {
            assert_eq!(det.observe(&[0.0; 160], 16000, 1), None);
        }
        assert_eq!(
            det.observe(&[0.0; 160], 16000, 1),
            Some(VoiceActivity::SilenceStarted)
        );
        assert!(!det.is_speaking());
    }

    #[test]
    fn test_speech_resets_silence_counter() {
        let mut det = detector(100);
        det.observe(&[0.5; 160], 16000, 1);
        for _ in 0..9 {
            det.observe(&[0.0; 160], 16000, 1);
        }
        det.observe(&[0.5; 160], 16000, 1);
        assert_eq!(det.observe(&[0.0; 160], 16000, 1), None);
    }

    #[test]
    fn test_quiet_input_never_reports() {
        let mut det = detector(100);
        for _ in 0..50 {
            assert_eq!(det.observe(&[0.01; 160], 16000, 1), None);
        }
    }
}
