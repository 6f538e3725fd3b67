use crate::activity::{ActivityDetector, ActivitySettings};
use crate::device::DeviceManager;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use voxtalk_core::{AudioChunk, AudioError, AudioFeed, InputSource, SpeechError, VoiceActivity};

// ── CaptureThread ─────────────────────────────────────────────

/// Owns the cpal stream on a dedicated thread; the stream is dropped when
/// the thread receives the stop signal.
struct CaptureThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl CaptureThread {
    fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            tracing::error!("capture thread panicked");
        }
    }
}

// ── MicrophoneInput ───────────────────────────────────────────

/// Live capture from an input device.
pub struct MicrophoneInput {
    device_name: String,
    buffer_size: u32,
    activity: Option<(ActivitySettings, mpsc::UnboundedSender<VoiceActivity>)>,
    capture: Option<CaptureThread>,
}

impl MicrophoneInput {
    pub fn new(device_name: &str, buffer_size: u32) -> Self {
        Self {
            device_name: device_name.to_string(),
            buffer_size,
            activity: None,
            capture: None,
        }
    }

    /// Report speech/silence transitions on `sender` while capturing.
    pub fn with_activity(
        mut self,
        settings: ActivitySettings,
        sender: mpsc::UnboundedSender<VoiceActivity>,
    ) -> Self {
        self.activity = Some((settings, sender));
        self
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }
}

impl InputSource for MicrophoneInput {
    fn name(&self) -> &str {
        "microphone"
    }

    fn initialize(&mut self) -> Result<AudioFeed, SpeechError> {
        if let Some(previous) = self.capture.take() {
            previous.stop();
        }

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let device_name = self.device_name.clone();
        let buffer_size = self.buffer_size;
        let activity = self.activity.clone();

        let handle = std::thread::Builder::new()
            .name(format!("capture-{device_name}"))
            .spawn(move || {
                match open_stream(&device_name, buffer_size, chunk_tx, activity) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Blocks until stop() or the input is dropped.
                        let _ = stop_rx.recv();
                        drop(stream);
                        tracing::debug!(device = %device_name, "capture stream closed");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| SpeechError::AudioSessionConfigFailed(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| SpeechError::AudioSessionConfigFailed("capture thread exited".into()));
        match ready.and_then(|r| r) {
            Ok(()) => {
                self.capture = Some(CaptureThread { stop_tx, handle });
                tracing::info!(device = %self.device_name, "microphone capture started");
                Ok(AudioFeed::Buffers(chunk_rx))
            }
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.stop();
            tracing::info!(device = %self.device_name, "microphone capture stopped");
        }
    }
}

impl Drop for MicrophoneInput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_stream(
    device_name: &str,
    buffer_size: u32,
    tap: mpsc::UnboundedSender<AudioChunk>,
    activity: Option<(ActivitySettings, mpsc::UnboundedSender<VoiceActivity>)>,
) -> Result<Stream, SpeechError> {
    let device = DeviceManager::new().get_input_device(device_name)?;
    let supported = device
        .default_input_config()
        .map_err(|e| SpeechError::AudioSessionConfigFailed(e.to_string()))?;
    if supported.channels() == 0 {
        return Err(SpeechError::NoAudioInput(
            "not enough available inputs for microphone".to_string(),
        ));
    }

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config = StreamConfig {
        channels,
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(buffer_size),
    };

    let mut detector = activity
        .as_ref()
        .map(|(settings, _)| ActivityDetector::new(*settings));
    let activity_tx = activity.map(|(_, tx)| tx);

    let err_callback = |err: cpal::StreamError| {
        tracing::error!("capture stream error: {}", err);
    };

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let (Some(det), Some(tx)) = (detector.as_mut(), activity_tx.as_ref()) {
                    if let Some(transition) = det.observe(data, sample_rate, channels) {
                        tracing::trace!(?transition, "voice activity");
                        let _ = tx.send(transition);
                    }
                }
                let chunk = AudioChunk {
                    samples: downmix(data, channels),
                    sample_rate,
                    channels: 1,
                };
                let _ = tap.send(chunk);
            },
            err_callback,
            None,
        )
        .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok(stream)
}

/// Average interleaved frames into mono.
fn downmix(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let channels = channels as usize;
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
