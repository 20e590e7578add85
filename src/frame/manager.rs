//! Frame manager for normal emulation
//!
//! Frames start at the rising edge of VSYNC. After VSYNC ends, `ystart`
//! lines are skipped and the next `height` lines are the visible frame. If a
//! game stops issuing VSYNC the manager free-runs so the display keeps
//! updating.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::layout::{FrameLayout, FrameLayoutDescriptor, MAX_LINES_VSYNC, MAX_YSTART};
use super::{FrameSync, FRAME_LINES_TOLERANCE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameState {
    /// Past the visible region, waiting for the next frame
    WaitForVsyncStart,

    /// Inside the VSYNC pulse
    WaitForVsyncEnd,

    /// Skipping the lines above the visible region
    WaitForFrameStart,

    /// Visible region
    Frame,
}

/// Frame boundary and visible window tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameManager {
    /// Current line structure
    layout: FrameLayout,

    state: FrameState,

    /// Lines completed in the current state
    lines_in_state: u32,

    /// Lines since the frame started
    current_line: u32,

    /// Line at which VSYNC ended in the current frame
    vsync_end_line: u32,

    /// Visible row of the current line
    row: u32,

    /// Visible start, in lines after the end of VSYNC
    ystart: u32,

    /// Visible rows
    height: u32,

    vsync: bool,
    vblank: bool,

    last_frame_lines: u32,
    frame_complete: bool,
    total_frames: u64,
}

impl FrameManager {
    pub fn new(layout: FrameLayout) -> Self {
        let metrics = layout.metrics();

        FrameManager {
            layout,
            state: FrameState::WaitForVsyncStart,
            lines_in_state: 0,
            current_line: 0,
            vsync_end_line: 0,
            row: 0,
            ystart: metrics.default_ystart,
            height: metrics.visible_height,
            vsync: false,
            vblank: false,
            last_frame_lines: 0,
            frame_complete: false,
            total_frames: 0,
        }
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Switch the line structure; takes effect with the next frame
    pub fn set_layout(&mut self, layout: FrameLayout) {
        if layout != self.layout {
            debug!("Frame layout set to {}", layout);
        }
        self.layout = layout;
        self.height = layout.metrics().visible_height;
    }

    pub fn ystart(&self) -> u32 {
        self.ystart
    }

    /// Set the visible start, clamped to the supported range
    pub fn set_ystart(&mut self, ystart: u32) {
        self.ystart = ystart.min(MAX_YSTART);
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn descriptor(&self) -> FrameLayoutDescriptor {
        FrameLayoutDescriptor {
            layout: self.layout,
            total_lines: self.last_frame_lines,
            vsync_end: self.vsync_end_line,
            ystart: self.ystart,
            height: self.height,
        }
    }

    fn set_state(&mut self, state: FrameState) {
        self.state = state;
        self.lines_in_state = 0;

        if state == FrameState::WaitForFrameStart && self.ystart == 0 {
            self.state = FrameState::Frame;
        }
        if self.state == FrameState::Frame {
            self.row = 0;
        }
    }

    fn finish_frame(&mut self) {
        self.last_frame_lines = self.current_line;
        self.current_line = 0;
        self.frame_complete = true;
        self.total_frames += 1;

        trace!(
            "Frame {} complete: {} lines",
            self.total_frames,
            self.last_frame_lines
        );
    }
}

impl FrameSync for FrameManager {
    fn on_vsync(&mut self, enabled: bool) {
        if enabled == self.vsync {
            return;
        }
        self.vsync = enabled;

        if enabled {
            if self.state != FrameState::WaitForVsyncEnd {
                self.finish_frame();
                self.set_state(FrameState::WaitForVsyncEnd);
            }
        } else if self.state == FrameState::WaitForVsyncEnd {
            self.vsync_end_line = self.current_line;
            self.set_state(FrameState::WaitForFrameStart);
        }
    }

    fn on_vblank(&mut self, enabled: bool) {
        self.vblank = enabled;
    }

    fn on_next_line(&mut self, _content: bool) {
        self.current_line += 1;
        self.lines_in_state += 1;

        match self.state {
            FrameState::WaitForVsyncEnd => {
                if self.lines_in_state > MAX_LINES_VSYNC {
                    debug!("VSYNC exceeded {} lines, forcing frame start", MAX_LINES_VSYNC);
                    self.vsync_end_line = self.current_line;
                    self.set_state(FrameState::WaitForFrameStart);
                }
            }
            FrameState::WaitForFrameStart => {
                if self.lines_in_state >= self.ystart {
                    self.set_state(FrameState::Frame);
                }
            }
            FrameState::Frame => {
                self.row += 1;
                if self.row >= self.height {
                    self.set_state(FrameState::WaitForVsyncStart);
                }
            }
            FrameState::WaitForVsyncStart => {}
        }

        // Free-run when VSYNC never arrives
        if self.state != FrameState::WaitForVsyncEnd
            && self.current_line >= self.layout.frame_lines() + FRAME_LINES_TOLERANCE
        {
            self.finish_frame();
            self.vsync_end_line = self.layout.metrics().vsync;
            self.current_line = self.vsync_end_line;
            self.set_state(FrameState::WaitForFrameStart);
        }
    }

    fn is_rendering(&self) -> bool {
        self.state == FrameState::Frame
    }

    fn current_row(&self) -> u32 {
        self.row
    }

    fn height(&self) -> u32 {
        self.height
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
        let ystart = self.ystart;
        *self = FrameManager::new(self.layout);
        self.ystart = ystart;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive one frame: VSYNC for 3 lines, then `lines - 3` more lines
    fn run_frame(manager: &mut FrameManager, lines: u32) -> Vec<u32> {
        let mut rows = Vec::new();
        manager.on_vsync(true);
        for _ in 0..3 {
            manager.on_next_line(false);
        }
        manager.on_vsync(false);
        for _ in 3..lines {
            if manager.is_rendering() {
                rows.push(manager.current_row());
            }
            manager.on_next_line(false);
        }
        rows
    }

    #[test]
    fn test_visible_window() {
        let mut manager = FrameManager::new(FrameLayout::Ntsc);
        manager.set_ystart(30);

        run_frame(&mut manager, 262);
        let rows = run_frame(&mut manager, 262);

        assert_eq!(rows.len(), 212);
        assert_eq!(rows[0], 0);
        assert_eq!(rows[211], 211);
    }

    #[test]
    fn test_frame_completion_on_vsync() {
        let mut manager = FrameManager::new(FrameLayout::Ntsc);
        run_frame(&mut manager, 262);
        assert!(manager.take_frame_complete());
        assert!(!manager.take_frame_complete());

        run_frame(&mut manager, 262);
        manager.on_vsync(true);
        assert!(manager.take_frame_complete());
        assert_eq!(manager.scanlines_last_frame(), 262);
        assert_eq!(manager.frame_count(), 3);
    }

    #[test]
    fn test_free_run_without_vsync() {
        let mut manager = FrameManager::new(FrameLayout::Ntsc);
        let limit = 262 + FRAME_LINES_TOLERANCE;

        for _ in 0..limit {
            manager.on_next_line(false);
        }
        assert!(manager.take_frame_complete());
        assert_eq!(manager.scanlines_last_frame(), limit);
        assert_eq!(manager.state(), FrameState::WaitForFrameStart);
    }

    #[test]
    fn test_long_vsync_is_cut_short() {
        let mut manager = FrameManager::new(FrameLayout::Pal);
        manager.on_vsync(true);
        for _ in 0..=MAX_LINES_VSYNC {
            manager.on_next_line(false);
        }
        assert_eq!(manager.state(), FrameState::WaitForFrameStart);
    }

    #[test]
    fn test_zero_ystart_renders_immediately() {
        let mut manager = FrameManager::new(FrameLayout::Ntsc);
        manager.set_ystart(0);
        manager.on_vsync(true);
        manager.on_vsync(false);
        assert!(manager.is_rendering());
        assert_eq!(manager.current_row(), 0);
    }

    #[test]
    fn test_ystart_is_clamped() {
        let mut manager = FrameManager::new(FrameLayout::Ntsc);
        manager.set_ystart(1000);
        assert_eq!(manager.ystart(), MAX_YSTART);
    }
}
