pub mod activity;
pub mod capture;
pub mod custom;
pub mod device;
pub mod factory;
pub mod file;
pub mod monitor;

pub use activity::{ActivityDetector, ActivitySettings};
pub use capture::MicrophoneInput;
pub use custom::CustomStreamInput;
pub use device::DeviceManager;
pub use factory::InputSourceFactory;
pub use file::AudioFileInput;
pub use monitor::{
    CpalDeviceMonitor, DeviceChange, DeviceMonitor, ManualDeviceHandle, ManualDeviceMonitor,
};
