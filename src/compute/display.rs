//! Display collaborator interface.

use super::FrameBuffers;

/// Receives frames between driver calls.
pub trait Display {
    /// Whether frames are shown at all. The driver skips device readbacks
    /// for refreshes when this is false.
    fn display_enabled(&self) -> bool;

    /// Show the current buffer.
    fn refresh(&mut self, frames: &FrameBuffers);
}

/// Display that shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

impl Display for Headless {
    fn display_enabled(&self) -> bool {
        false
    }

    fn refresh(&mut self, _frames: &FrameBuffers) {}
}
