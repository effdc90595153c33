/// Machine-agnostic interface for emulated systems.
///
/// Each machine implements this trait to provide a uniform surface for a
/// front end. The front end is a pure rendering engine that does not know
/// about specific hardware (register files, copper lists, palette formats).
/// The CPU core is an external collaborator that drives the machine through
/// [`crate::core::Bus`]; the host loop calls [`Machine::on_frame`] once per
/// 60 Hz video frame in between instruction batches.
pub trait Machine {
    /// Native display resolution as (width, height) in pixels.
    fn display_size(&self) -> (u32, u32);

    /// Advance the machine by one video frame.
    ///
    /// This is the frame tick: video counters advance, sprite state is
    /// latched, collision masks are computed, the music engine runs one
    /// frame, and the interval timer may assert IRQ. CPU writes landing
    /// after this call become visible at the next tick.
    fn on_frame(&mut self);

    /// Render the most recently latched frame into an RGB24 pixel buffer.
    ///
    /// The buffer must be at least `width * height * 3` bytes (from
    /// `display_size()`). Pixels are stored left-to-right, top-to-bottom,
    /// 3 bytes per pixel (R, G, B). Rendering reads only the frame
    /// snapshot captured by [`Machine::on_frame`], so it may run on a
    /// separate host thread between ticks.
    fn render_frame(&self, buffer: &mut [u8]);

    /// Fill `buffer` with mono audio samples in [-1.0, 1.0] at 44 100 Hz.
    /// Returns the number of samples written.
    fn fill_audio(&mut self, buffer: &mut [f32]) -> usize;

    /// Warm start: reset device registers and jump-to-reset-vector state,
    /// preserving video memory and expansion RAM contents.
    fn reset(&mut self);
}
