//! Frame timing
//!
//! The TIA knows nothing about frames; it only reports VSYNC/VBLANK edges and
//! line ends. A [`FrameSync`] implementation turns those signals into frame
//! boundaries. During normal emulation that is the [`FrameManager`]; during
//! autodetection one of the detectors takes its place for a bounded number
//! of frames.

mod layout;
mod layout_detector;
mod manager;
mod ystart_detector;

pub use layout::{
    ConsoleTiming, DisplayFormat, FrameLayout, FrameLayoutDescriptor, LayoutMetrics,
    FRAME_WIDTH, MAX_FRAME_HEIGHT, MAX_LINES_VSYNC, MAX_YSTART,
};
pub use layout_detector::FrameLayoutDetector;
pub use manager::FrameManager;
pub use ystart_detector::YStartDetector;

use serde::{Deserialize, Serialize};

/// Frames at the start of a detection run that are not counted
pub const INITIAL_GARBAGE_FRAMES: u32 = 3;

/// Lines beyond the nominal frame length after which a frame without VSYNC
/// is force-completed
pub const FRAME_LINES_TOLERANCE: u32 = 60;

/// Consumer of the chip's synchronization signals
pub trait FrameSync {
    /// VSYNC latch changed
    fn on_vsync(&mut self, enabled: bool);

    /// VBLANK latch changed
    fn on_vblank(&mut self, enabled: bool);

    /// A scanline ended; `content` is set if it drew anything visible
    fn on_next_line(&mut self, content: bool);

    /// Whether the current line belongs to the visible frame
    fn is_rendering(&self) -> bool;

    /// Visible row of the current line
    fn current_row(&self) -> u32;

    /// Visible rows per frame
    fn height(&self) -> u32;

    /// Lines since the current frame started
    fn current_line(&self) -> u32;

    /// Lines in the last completed frame
    fn scanlines_last_frame(&self) -> u32;

    /// Consume the frame-complete signal
    fn take_frame_complete(&mut self) -> bool;

    /// Frames completed since reset
    fn frame_count(&self) -> u64;

    fn reset(&mut self);
}

/// The frame logic currently attached to the chip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FrameTracker {
    Manager(FrameManager),
    Layout(FrameLayoutDetector),
    YStart(YStartDetector),
}

impl Default for FrameTracker {
    fn default() -> Self {
        FrameTracker::Manager(FrameManager::new(FrameLayout::Ntsc))
    }
}

/// Forward a call to whichever tracker is attached
macro_rules! dispatch {
    ($self:ident, $tracker:ident => $call:expr) => {
        match $self {
            FrameTracker::Manager($tracker) => $call,
            FrameTracker::Layout($tracker) => $call,
            FrameTracker::YStart($tracker) => $call,
        }
    };
}

impl FrameTracker {
    pub fn manager(&self) -> Option<&FrameManager> {
        match self {
            FrameTracker::Manager(m) => Some(m),
            _ => None,
        }
    }

    pub fn manager_mut(&mut self) -> Option<&mut FrameManager> {
        match self {
            FrameTracker::Manager(m) => Some(m),
            _ => None,
        }
    }
}

impl FrameSync for FrameTracker {
    fn on_vsync(&mut self, enabled: bool) {
        dispatch!(self, t => t.on_vsync(enabled))
    }

    fn on_vblank(&mut self, enabled: bool) {
        dispatch!(self, t => t.on_vblank(enabled))
    }

    fn on_next_line(&mut self, content: bool) {
        dispatch!(self, t => t.on_next_line(content))
    }

    fn is_rendering(&self) -> bool {
        dispatch!(self, t => t.is_rendering())
    }

    fn current_row(&self) -> u32 {
        dispatch!(self, t => t.current_row())
    }

    fn height(&self) -> u32 {
        dispatch!(self, t => t.height())
    }

    fn current_line(&self) -> u32 {
        dispatch!(self, t => t.current_line())
    }

    fn scanlines_last_frame(&self) -> u32 {
        dispatch!(self, t => t.scanlines_last_frame())
    }

    fn take_frame_complete(&mut self) -> bool {
        dispatch!(self, t => t.take_frame_complete())
    }

    fn frame_count(&self) -> u64 {
        dispatch!(self, t => t.frame_count())
    }

    fn reset(&mut self) {
        dispatch!(self, t => t.reset())
    }
}
