//! Synthetic display kernel
//!
//! A stand-in for a CPU running a game: it issues the bus accesses of a
//! classic "race the beam" frame, one access per step, and ends every line
//! with a WSYNC. The background colour of each visible row is fetched from
//! the cartridge's colour table, and a player sprite drifts one pixel per
//! frame through HMOVE.

use serde::{Deserialize, Serialize};

use crate::frame::{FrameLayout, LayoutMetrics};
use crate::system::{Bus, Cpu};
use crate::tia::registers::*;

/// Start of the cartridge colour table
const COLOR_TABLE: u16 = 0x1000;

/// Rows covered by the player sprite
const PLAYER_ROWS: std::ops::Range<u32> = 80..96;

/// HMP0 value: one pixel to the right per frame
const PLAYER_MOTION: u8 = 0xf0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum KernelOp {
    Poke(u8, u8),

    /// Load the latch from the colour table
    FetchColor(u16),

    /// Store the latch to a register
    PokeLatch(u8),
}

/// Lines per frame section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelLines {
    pub vsync: u32,
    pub vblank: u32,
    pub visible: u32,
    pub overscan: u32,
}

impl KernelLines {
    pub fn total(&self) -> u32 {
        self.vsync + self.vblank + self.visible + self.overscan
    }
}

impl From<LayoutMetrics> for KernelLines {
    fn from(metrics: LayoutMetrics) -> Self {
        KernelLines {
            vsync: metrics.vsync,
            vblank: metrics.vblank,
            visible: metrics.kernel,
            overscan: metrics.overscan,
        }
    }
}

/// Demo CPU producing a complete frame every `lines.total()` scanlines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayKernel {
    lines: KernelLines,

    /// Line within the frame
    line: u32,

    /// Accesses left in the current line
    ops: Vec<KernelOp>,
    next_op: usize,

    latch: u8,

    frames: u64,
}

impl DisplayKernel {
    pub fn new(lines: KernelLines) -> Self {
        DisplayKernel {
            lines,
            line: 0,
            ops: Vec::new(),
            next_op: 0,
            latch: 0,
            frames: 0,
        }
    }

    /// Kernel emitting the standard line counts of `layout`
    pub fn for_layout(layout: FrameLayout) -> Self {
        Self::new(layout.metrics().into())
    }

    pub fn lines(&self) -> KernelLines {
        self.lines
    }

    /// Frames started since reset
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn build_line(&mut self) {
        let KernelLines {
            vsync,
            vblank,
            visible,
            ..
        } = self.lines;
        let line = self.line;
        let first_visible = vsync + vblank;
        let ops = &mut self.ops;

        if line == 0 {
            ops.push(KernelOp::Poke(VBLANK, 0x02));
            ops.push(KernelOp::Poke(VSYNC, 0x02));
            if self.frames == 0 {
                ops.extend([
                    KernelOp::Poke(COLUP0, 0x0e),
                    KernelOp::Poke(AUDC0, 0x04),
                    KernelOp::Poke(AUDF0, 0x0f),
                    KernelOp::Poke(AUDV0, 0x06),
                ]);
            }
        } else if line == vsync {
            ops.push(KernelOp::Poke(VSYNC, 0x00));
            ops.push(KernelOp::Poke(HMP0, PLAYER_MOTION));
            ops.push(KernelOp::Poke(HMOVE, 0x00));
        } else if line == vsync + 1 {
            ops.push(KernelOp::Poke(HMCLR, 0x00));
        } else if (first_visible..first_visible + visible).contains(&line) {
            let row = line - first_visible;
            if row == 0 {
                ops.push(KernelOp::Poke(VBLANK, 0x00));
            }
            ops.push(KernelOp::FetchColor(COLOR_TABLE + (row & 0xff) as u16));
            ops.push(KernelOp::PokeLatch(COLUBK));

            if row == PLAYER_ROWS.start {
                ops.push(KernelOp::Poke(GRP0, 0x3c));
            } else if row == PLAYER_ROWS.end {
                ops.push(KernelOp::Poke(GRP0, 0x00));
            }
        } else if line == first_visible + visible {
            ops.push(KernelOp::Poke(VBLANK, 0x02));
            ops.push(KernelOp::Poke(COLUBK, 0x00));
            ops.push(KernelOp::Poke(GRP0, 0x00));
        }
    }

    fn end_line(&mut self, bus: &mut dyn Bus) {
        bus.poke(WSYNC as u16, 0);

        self.ops.clear();
        self.next_op = 0;
        self.line += 1;
        if self.line >= self.lines.total() {
            self.line = 0;
            self.frames += 1;
        }
    }
}

impl Cpu for DisplayKernel {
    fn reset(&mut self, _bus: &mut dyn Bus) {
        *self = DisplayKernel::new(self.lines);
    }

    fn step(&mut self, bus: &mut dyn Bus) {
        if self.next_op == 0 && self.ops.is_empty() {
            self.build_line();
        }

        match self.ops.get(self.next_op).copied() {
            Some(KernelOp::Poke(reg, value)) => bus.poke(reg as u16, value),
            Some(KernelOp::FetchColor(addr)) => self.latch = bus.peek(addr),
            Some(KernelOp::PokeLatch(reg)) => bus.poke(reg as u16, self.latch),
            None => {
                self.end_line(bus);
                return;
            }
        }
        self.next_op += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        writes: Vec<(u16, u8)>,
    }

    impl Bus for Recorder {
        fn peek(&mut self, addr: u16) -> u8 {
            addr as u8
        }

        fn poke(&mut self, addr: u16, value: u8) {
            self.writes.push((addr, value));
        }
    }

    fn run_frame(kernel: &mut DisplayKernel, bus: &mut Recorder) {
        let frames = kernel.frames();
        while kernel.frames() == frames {
            kernel.step(bus);
        }
    }

    #[test]
    fn test_one_wsync_per_line() {
        for layout in [FrameLayout::Ntsc, FrameLayout::Pal] {
            let mut kernel = DisplayKernel::for_layout(layout);
            let mut bus = Recorder::default();
            run_frame(&mut kernel, &mut bus);

            let wsyncs = bus.writes.iter().filter(|&&(a, _)| a == WSYNC as u16).count();
            assert_eq!(wsyncs as u32, layout.frame_lines());
        }
    }

    #[test]
    fn test_background_from_table() {
        let mut kernel = DisplayKernel::for_layout(FrameLayout::Ntsc);
        let mut bus = Recorder::default();
        run_frame(&mut kernel, &mut bus);

        let colors: Vec<u8> = bus
            .writes
            .iter()
            .filter(|&&(a, _)| a == COLUBK as u16)
            .map(|&(_, v)| v)
            .collect();

        // One per visible row plus the overscan clear
        assert_eq!(colors.len(), 192 + 1);
        assert_eq!(colors[1], 0x01);
    }

    #[test]
    fn test_tone_only_on_first_frame() {
        let mut kernel = DisplayKernel::for_layout(FrameLayout::Ntsc);
        let mut bus = Recorder::default();
        run_frame(&mut kernel, &mut bus);
        assert!(bus.writes.contains(&(AUDV0 as u16, 0x06)));

        let mut bus = Recorder::default();
        run_frame(&mut kernel, &mut bus);
        assert!(!bus.writes.iter().any(|&(a, _)| a == AUDV0 as u16));
    }
}
