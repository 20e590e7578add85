//! Frame layout autodetection
//!
//! Counts the lines between consecutive VSYNC pulses and classifies each
//! frame as NTSC-class (about 262 lines) or PAL-class (about 312 lines).

use log::debug;
use serde::{Deserialize, Serialize};

use super::layout::FrameLayout;
use super::{FrameSync, FRAME_LINES_TOLERANCE, INITIAL_GARBAGE_FRAMES};

/// Frames with more lines than this are PAL-class
pub const LAYOUT_THRESHOLD_LINES: u32 = (262 + 312) / 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameLayoutDetector {
    vsync: bool,

    /// Lines since the last VSYNC start
    current_line: u32,
    last_frame_lines: u32,

    ntsc_frames: u32,
    pal_frames: u32,

    total_frames: u64,
    frame_complete: bool,
}

impl FrameLayoutDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Majority layout, NTSC on a tie or with no usable frames
    pub fn detected_layout(&self) -> FrameLayout {
        if self.pal_frames > self.ntsc_frames {
            FrameLayout::Pal
        } else {
            FrameLayout::Ntsc
        }
    }

    /// (NTSC, PAL) frame counts
    pub fn votes(&self) -> (u32, u32) {
        (self.ntsc_frames, self.pal_frames)
    }

    fn finish_frame(&mut self, classify: bool) {
        if classify && self.total_frames >= INITIAL_GARBAGE_FRAMES as u64 {
            if self.current_line > LAYOUT_THRESHOLD_LINES {
                self.pal_frames += 1;
            } else {
                self.ntsc_frames += 1;
            }
        }

        debug!(
            "Layout detection frame {}: {} lines",
            self.total_frames, self.current_line
        );

        self.last_frame_lines = self.current_line;
        self.current_line = 0;
        self.total_frames += 1;
        self.frame_complete = true;
    }
}

impl FrameSync for FrameLayoutDetector {
    fn on_vsync(&mut self, enabled: bool) {
        if enabled && !self.vsync {
            self.finish_frame(true);
        }
        self.vsync = enabled;
    }

    fn on_vblank(&mut self, _enabled: bool) {}

    fn on_next_line(&mut self, _content: bool) {
        self.current_line += 1;

        // No VSYNC at all: end the frame so detection stays bounded, but
        // do not let it vote
        if self.current_line >= FrameLayout::Pal.frame_lines() + FRAME_LINES_TOLERANCE {
            self.finish_frame(false);
        }
    }

    fn is_rendering(&self) -> bool {
        false
    }

    fn current_row(&self) -> u32 {
        0
    }

    fn height(&self) -> u32 {
        0
    }

    fn current_line(&self) -> u32 {
        self.current_line
    }

    fn scanlines_last_frame(&self) -> u32 {
        self.last_frame_lines
    }

    fn take_frame_complete(&mut self) -> bool {
        std::mem::take(&mut self.frame_complete)
    }

    fn frame_count(&self) -> u64 {
        self.total_frames
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
