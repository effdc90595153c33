pub mod blitter;
pub mod dma;
pub mod fio;
pub mod music;
pub mod sid;
pub mod space;
pub mod timer;
pub mod vgc;
pub mod xmc;

pub use blitter::Blitter;
pub use dma::Dma;
pub use fio::Fio;
pub use music::MusicEngine;
pub use sid::Sid;
pub use space::{SpaceId, Spaces};
pub use timer::IntervalTimer;
pub use vgc::Vgc;
pub use xmc::Xmc;
