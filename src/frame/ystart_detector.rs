//! Visible start autodetection
//!
//! Measures, per frame, the line after VSYNC at which the picture starts:
//! the falling edge of VBLANK if the game uses it, otherwise the first line
//! with visible content. The most common value wins if it covers at least
//! half of the measured frames.

use log::debug;
use serde::{Deserialize, Serialize};

use super::layout::{FrameLayout, MAX_YSTART};
use super::{FrameSync, FRAME_LINES_TOLERANCE, INITIAL_GARBAGE_FRAMES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum DetectorState {
    WaitForVsyncStart,
    WaitForVsyncEnd,
    Measuring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YStartDetector {
    /// Layout whose default is used when nothing stable is found
    layout: FrameLayout,

    state: DetectorState,
    vsync: bool,
    vblank: bool,

    /// VBLANK was active at some point after VSYNC ended
    vblank_seen: bool,

    /// Lines since VSYNC ended
    lines_after_vsync: u32,

    /// Lines since the frame started
    current_line: u32,
    last_frame_lines: u32,

    /// Visible start of the frame being measured
    candidate: Option<u32>,

    /// Votes per visible start row
    histogram: Vec<u32>,
    measured_frames: u32,

    total_frames: u64,
    frame_complete: bool,
}

impl YStartDetector {
    pub fn new(layout: FrameLayout) -> Self {
        YStartDetector {
            layout,
            state: DetectorState::WaitForVsyncStart,
            vsync: false,
            vblank: false,
            vblank_seen: false,
            lines_after_vsync: 0,
            current_line: 0,
            last_frame_lines: 0,
            candidate: None,
            histogram: vec![0; MAX_YSTART as usize + 1],
            measured_frames: 0,
            total_frames: 0,
            frame_complete: false,
        }
    }

    /// Detected visible start, or the layout default without a clear winner
    pub fn detected_ystart(&self) -> u32 {
        let best = self
            .histogram
            .iter()
            .enumerate()
            .max_by_key(|&(row, &votes)| (votes, std::cmp::Reverse(row)));

        match best {
            Some((row, &votes)) if votes > 0 && votes * 2 >= self.measured_frames => row as u32,
            _ => self.layout.metrics().default_ystart,
        }
    }

    fn finish_frame(&mut self) {
        if self.state == DetectorState::Measuring
            && self.total_frames >= INITIAL_GARBAGE_FRAMES as u64
        {
            self.measured_frames += 1;

            if let Some(row) = self.candidate.filter(|&row| row <= MAX_YSTART) {
                self.histogram[row as usize] += 1;
            }

            debug!(
                "YStart detection frame {}: {:?}",
                self.total_frames, self.candidate
            );
        }

        self.last_frame_lines = self.current_line;
        self.current_line = 0;
        self.total_frames += 1;
        self.frame_complete = true;
    }
}

impl FrameSync for YStartDetector {
    fn on_vsync(&mut self, enabled: bool) {
        if enabled == self.vsync {
            return;
        }
        self.vsync = enabled;

        if enabled {
            self.finish_frame();
            self.state = DetectorState::WaitForVsyncEnd;
        } else if self.state == DetectorState::WaitForVsyncEnd {
            self.state = DetectorState::Measuring;
            self.lines_after_vsync = 0;
            self.vblank_seen = self.vblank;
            self.candidate = None;
        }
    }

    fn on_vblank(&mut self, enabled: bool) {
        if self.state == DetectorState::Measuring {
            if enabled {
                self.vblank_seen = true;
            } else if self.vblank_seen && self.candidate.is_none() {
                self.candidate = Some(self.lines_after_vsync);
            }
        }
        self.vblank = enabled;
    }

    fn on_next_line(&mut self, content: bool) {
        if self.state == DetectorState::Measuring && self.candidate.is_none() && content {
            self.candidate = Some(self.lines_after_vsync);
        }

        self.lines_after_vsync += 1;
        self.current_line += 1;

        if self.current_line >= self.layout.frame_lines() + FRAME_LINES_TOLERANCE {
            // Unsynchronized frames carry no information
            self.state = DetectorState::WaitForVsyncStart;
            self.finish_frame();
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
        *self = YStartDetector::new(self.layout);
    }
}
