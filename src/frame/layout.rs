//! Broadcast formats and frame geometry

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Lines spent in VSYNC before the emulator gives up waiting for it to end
pub const MAX_LINES_VSYNC: u32 = 50;

/// Largest visible start row that can be configured or detected
pub const MAX_YSTART: u32 = 64;

/// Rows in the frame buffer
pub const MAX_FRAME_HEIGHT: usize = 320;

/// Pixels per scanline
pub const FRAME_WIDTH: usize = 160;

/// Line structure of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameLayout {
    /// 262 lines, 60 Hz class
    Ntsc,

    /// 312 lines, 50 Hz class
    Pal,
}

/// Chip clock and palette family of the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsoleTiming {
    Ntsc,
    Pal,
    Secam,
}

/// Line counts of a nominal frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutMetrics {
    pub vsync: u32,
    pub vblank: u32,
    pub kernel: u32,
    pub overscan: u32,

    /// Rows shown to the user
    pub visible_height: u32,

    /// Visible start row used when detection is inconclusive
    pub default_ystart: u32,
}

impl LayoutMetrics {
    /// Lines in a nominal frame
    pub fn frame_lines(&self) -> u32 {
        self.vsync + self.vblank + self.kernel + self.overscan
    }
}

impl FrameLayout {
    pub fn metrics(self) -> LayoutMetrics {
        match self {
            FrameLayout::Ntsc => LayoutMetrics {
                vsync: 3,
                vblank: 37,
                kernel: 192,
                overscan: 30,
                visible_height: 212,
                default_ystart: 34,
            },
            FrameLayout::Pal => LayoutMetrics {
                vsync: 3,
                vblank: 45,
                kernel: 228,
                overscan: 36,
                visible_height: 248,
                default_ystart: 39,
            },
        }
    }

    /// Lines in a nominal frame
    pub fn frame_lines(self) -> u32 {
        self.metrics().frame_lines()
    }
}

impl fmt::Display for FrameLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameLayout::Ntsc => write!(f, "NTSC"),
            FrameLayout::Pal => write!(f, "PAL"),
        }
    }
}

impl ConsoleTiming {
    /// Nominal frames per second
    pub fn base_frame_rate(self) -> u32 {
        match self {
            ConsoleTiming::Ntsc => 60,
            ConsoleTiming::Pal | ConsoleTiming::Secam => 50,
        }
    }

    /// Lines per frame the frame rate is nominally derived from
    pub fn base_lines(self) -> u32 {
        match self {
            ConsoleTiming::Ntsc => 262,
            ConsoleTiming::Pal | ConsoleTiming::Secam => 312,
        }
    }
}

/// User-selectable display format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum DisplayFormat {
    /// Detect the frame layout at startup
    Auto,
    Ntsc,
    Pal,
    Secam,
    /// NTSC colours on a 312 line frame
    Ntsc50,
    /// PAL colours on a 262 line frame
    Pal60,
    /// SECAM colours on a 262 line frame
    Secam60,
}

impl DisplayFormat {
    /// All concrete formats in cycling order
    pub const CYCLE: [DisplayFormat; 7] = [
        DisplayFormat::Auto,
        DisplayFormat::Ntsc,
        DisplayFormat::Pal,
        DisplayFormat::Secam,
        DisplayFormat::Ntsc50,
        DisplayFormat::Pal60,
        DisplayFormat::Secam60,
    ];

    /// Format implied by a detected layout
    pub fn from_layout(layout: FrameLayout) -> Self {
        match layout {
            FrameLayout::Ntsc => DisplayFormat::Ntsc,
            FrameLayout::Pal => DisplayFormat::Pal,
        }
    }

    /// Frame layout, or `None` when it has to be detected
    pub fn layout(self) -> Option<FrameLayout> {
        match self {
            DisplayFormat::Auto => None,
            DisplayFormat::Ntsc | DisplayFormat::Pal60 | DisplayFormat::Secam60 => {
                Some(FrameLayout::Ntsc)
            }
            DisplayFormat::Pal | DisplayFormat::Secam | DisplayFormat::Ntsc50 => {
                Some(FrameLayout::Pal)
            }
        }
    }

    /// Console timing, or `None` when it follows the detected layout
    pub fn console_timing(self) -> Option<ConsoleTiming> {
        match self {
            DisplayFormat::Auto => None,
            DisplayFormat::Ntsc | DisplayFormat::Ntsc50 => Some(ConsoleTiming::Ntsc),
            DisplayFormat::Pal | DisplayFormat::Pal60 => Some(ConsoleTiming::Pal),
            DisplayFormat::Secam | DisplayFormat::Secam60 => Some(ConsoleTiming::Secam),
        }
    }

    /// Next format in cycling order
    pub fn next(self) -> Self {
        let index = Self::CYCLE.iter().position(|&f| f == self).unwrap_or(0);
        Self::CYCLE[(index + 1) % Self::CYCLE.len()]
    }
}

impl fmt::Display for DisplayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisplayFormat::Auto => "AUTO",
            DisplayFormat::Ntsc => "NTSC",
            DisplayFormat::Pal => "PAL",
            DisplayFormat::Secam => "SECAM",
            DisplayFormat::Ntsc50 => "NTSC50",
            DisplayFormat::Pal60 => "PAL60",
            DisplayFormat::Secam60 => "SECAM60",
        };
        write!(f, "{}", name)
    }
}

/// Geometry of the frame being produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayoutDescriptor {
    pub layout: FrameLayout,

    /// Scanlines in the last complete frame
    pub total_lines: u32,

    /// Line (from frame start) at which VSYNC ended
    pub vsync_end: u32,

    /// First visible row, counted from the end of VSYNC
    pub ystart: u32,

    /// Visible rows
    pub height: u32,
}
