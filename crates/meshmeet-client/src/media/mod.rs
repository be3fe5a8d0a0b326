pub mod devices;
pub mod local;
pub mod playback;

pub use devices::{InventoryDevices, LocalMedia, MediaConstraints, MediaDevices};
pub use local::LocalMediaController;
pub use playback::{PlaybackGate, PlaybackState};
