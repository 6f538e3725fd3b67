use std::time::Duration;
use tokio::time::Instant;
use voxtalk_core::RecoveryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySettings {
    /// Changes arriving this long after the first one collapse into it.
    pub debounce: Duration,
    /// Wait between releasing the old input and opening the new one.
    pub settle: Duration,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            settle: Duration::from_millis(300),
        }
    }
}

impl RecoverySettings {
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            settle: Duration::from_millis(config.settle_ms),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct TimerOutcome {
    /// The settle delay is over: open the new input and start.
    pub restart: bool,
    /// The debounce window closed with changes collapsed into it.
    pub recheck: bool,
}

/// Leading-edge debounce of device changes.
///
/// The first change starts a recovery immediately; changes inside the window
/// only mark it for a recheck when the window closes.
#[derive(Debug)]
pub(crate) struct DeviceRecovery {
    settings: RecoverySettings,
    settle_until: Option<Instant>,
    window_until: Option<Instant>,
    recheck: bool,
    bound_device: Option<String>,
}

impl DeviceRecovery {
    pub fn new(settings: RecoverySettings) -> Self {
        Self {
            settings,
            settle_until: None,
            window_until: None,
            recheck: false,
            bound_device: None,
        }
    }

    /// Returns true when a new recovery should begin now.
    pub fn on_change(&mut self, listening: bool, now: Instant) -> bool {
        if self.window_until.is_some() {
            self.recheck = true;
            return false;
        }
        if !listening {
            return false;
        }
        self.begin(now);
        true
    }

    pub fn begin(&mut self, now: Instant) {
        self.settle_until = Some(now + self.settings.settle);
        self.window_until = Some(now + self.settings.debounce);
        self.recheck = false;
    }

    pub fn is_settling(&self) -> bool {
        self.settle_until.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.settle_until, self.window_until) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn on_timer(&mut self, now: Instant) -> TimerOutcome {
        let mut outcome = TimerOutcome::default();
        if self.settle_until.is_some_and(|t| t <= now) {
            self.settle_until = None;
            outcome.restart = true;
        }
        if self.window_until.is_some_and(|t| t <= now) {
            self.window_until = None;
            outcome.recheck = std::mem::take(&mut self.recheck);
        }
        outcome
    }

    pub fn cancel(&mut self) {
        self.settle_until = None;
        self.window_until = None;
        self.recheck = false;
    }

    /// Record the device the current input was opened on.
    pub fn bind(&mut self, device: Option<String>) {
        self.bound_device = device;
    }

    pub fn bound_device(&self) -> Option<&str> {
        self.bound_device.as_deref()
    }
}
