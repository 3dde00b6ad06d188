pub mod device;
pub mod observation;
pub mod timeline;

pub use device::Device;
pub use observation::{NewObservation, Observation};
pub use timeline::{ActiveTimeline, Timeline};
