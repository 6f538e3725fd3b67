use crate::device::DeviceManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// The active input device switched, e.g. a headset was plugged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChange {
    pub input_device: Option<String>,
}

/// Source of input-device change notifications.
pub trait DeviceMonitor: Send {
    fn current_input_device(&self) -> Option<String>;

    /// The change stream. Can be taken once.
    fn take_change_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<DeviceChange>>;
}

type SharedName = Arc<Mutex<Option<String>>>;

fn read_name(shared: &SharedName) -> Option<String> {
    shared.lock().map(|name| (*name).clone()).unwrap_or(None)
}

// ── CpalDeviceMonitor ─────────────────────────────────────────

/// Polls the host's default input device and reports when its name changes.
pub struct CpalDeviceMonitor {
    current: SharedName,
    running: Arc<AtomicBool>,
    change_rx: Option<mpsc::UnboundedReceiver<DeviceChange>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl CpalDeviceMonitor {
    pub fn start(poll_interval: Duration) -> Self {
        let initial = DeviceManager::new().default_input_device_name();
        let current = Arc::new(Mutex::new(initial));
        let running = Arc::new(AtomicBool::new(true));
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        let thread_current = Arc::clone(&current);
        let thread_running = Arc::clone(&running);
        let handle = std::thread::Builder::new()
            .name("device-monitor".to_string())
            .spawn(move || {
                let manager = DeviceManager::new();
                while thread_running.load(Ordering::Relaxed) {
                    std::thread::sleep(poll_interval);
                    let latest = manager.default_input_device_name();
                    let changed = match thread_current.lock() {
                        Ok(mut known) if *known != latest => {
                            tracing::info!(from = ?*known, to = ?latest, "input device changed");
                            *known = latest.clone();
                            true
                        }
                        _ => false,
                    };
                    if changed
                        && change_tx
                            .send(DeviceChange {
                                input_device: latest,
                            })
                            .is_err()
                    {
                        break;
                    }
                }
            })
            .ok();

        if handle.is_none() {
            tracing::warn!("failed to spawn device monitor thread; device changes will not be reported");
        }

        Self {
            current,
            running,
            change_rx: Some(change_rx),
            handle,
        }
    }
}

impl DeviceMonitor for CpalDeviceMonitor {
    fn current_input_device(&self) -> Option<String> {
        read_name(&self.current)
    }

    fn take_change_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<DeviceChange>> {
        self.change_rx.take()
    }
}

impl Drop for CpalDeviceMonitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ── ManualDeviceMonitor ───────────────────────────────────────

/// A monitor driven by the host application, e.g. from platform route-change
/// callbacks that arrive outside this crate.
pub struct ManualDeviceMonitor {
    current: SharedName,
    change_rx: Option<mpsc::UnboundedReceiver<DeviceChange>>,
}

#[derive(Clone)]
pub struct ManualDeviceHandle {
    current: SharedName,
    change_tx: mpsc::UnboundedSender<DeviceChange>,
}

impl ManualDeviceMonitor {
    pub fn new(initial: Option<&str>) -> (Self, ManualDeviceHandle) {
        let current = Arc::new(Mutex::new(initial.map(str::to_string)));
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let monitor = Self {
            current: Arc::clone(&current),
            change_rx: Some(change_rx),
        };
        (monitor, ManualDeviceHandle { current, change_tx })
    }
}

impl DeviceMonitor for ManualDeviceMonitor {
    fn current_input_device(&self) -> Option<String> {
        read_name(&self.current)
    }

    fn take_change_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<DeviceChange>> {
        self.change_rx.take()
    }
}

impl ManualDeviceHandle {
    /// Record a new active input device and notify the monitor's receiver.
    pub fn set_input_device(&self, name: Option<&str>) {
        let name = name.map(str::to_string);
        if let Ok(mut current) = self.current.lock() {
            *current = name.clone();
        }
        let _ = self.change_tx.send(DeviceChange { input_device: name });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_monitor_reports_changes() {
        let (mut monitor, handle) = ManualDeviceMonitor::new(Some("Built-in Microphone"));
        let mut rx = monitor.take_change_receiver().unwrap();
        assert!(monitor.take_change_receiver().is_none());
        assert_eq!(
            monitor.current_input_device().as_deref(),
            Some("Built-in Microphone")
        );

        handle.set_input_device(Some("AirPods"));
        assert_eq!(monitor.current_input_device().as_deref(), Some("AirPods"));
        assert_eq!(
            rx.try_recv().unwrap(),
            DeviceChange {
                input_device: Some("AirPods".to_string())
            }
        );
    }

    #[test]
    fn test_manual_handle_survives_dropped_receiver() {
        let (mut monitor, handle) = ManualDeviceMonitor::new(None);
        drop(monitor.take_change_receiver());
        handle.set_input_device(Some("USB Mic"));
        assert_eq!(monitor.current_input_device().as_deref(), Some("USB Mic"));
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_cpal_monitor_reads_default_device() {
        let monitor = CpalDeviceMonitor::start(Duration::from_millis(100));
        println!("default input: {:?}", monitor.current_input_device());
    }
}
