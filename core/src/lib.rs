pub mod core;
pub mod device;

pub mod prelude {
    pub use crate::core::machine::Machine;
    pub use crate::core::{Bus, BusMaster, bus::InterruptState};
    pub use crate::device::space::{SpaceId, Spaces};
}
