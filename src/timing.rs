//! Emulation timing model
//!
//! Derives CPU/audio rates, timeslice limits and audio queue sizing from the
//! frame layout, console timing and playback parameters. Every update
//! recalculates all derived values.

use crate::frame::{ConsoleTiming, FrameLayout};

/// Audio fragments span this many half frames
const AUDIO_HALF_FRAMES_PER_FRAGMENT: f64 = 1.0;

/// CPU cycles per scanline
pub const CYCLES_PER_LINE: u32 = 76;

/// CPU cycles per generated audio sample
pub const CYCLES_PER_SAMPLE: u32 = 38;

#[derive(Debug, Clone, PartialEq)]
pub struct EmulationTiming {
    frame_layout: FrameLayout,
    console_timing: ConsoleTiming,

    playback_rate: u32,
    playback_period: u32,
    audio_queue_extra_fragments: u32,
    audio_queue_headroom: u32,
    speed_factor: f32,

    max_cycles_per_timeslice: u32,
    min_cycles_per_timeslice: u32,
    lines_per_frame: u32,
    cycles_per_frame: u32,
    cycles_per_second: u32,
    audio_fragment_size: u32,
    audio_sample_rate: u32,
    audio_queue_capacity: u32,
    prebuffer_fragment_count: u32,
}

impl Default for EmulationTiming {
    fn default() -> Self {
        EmulationTiming::new(FrameLayout::Ntsc, ConsoleTiming::Ntsc)
    }
}

impl EmulationTiming {
    pub fn new(frame_layout: FrameLayout, console_timing: ConsoleTiming) -> Self {
        let mut timing = EmulationTiming {
            frame_layout,
            console_timing,
            playback_rate: 44100,
            playback_period: 512,
            audio_queue_extra_fragments: 3,
            audio_queue_headroom: 2,
            speed_factor: 1.0,
            max_cycles_per_timeslice: 0,
            min_cycles_per_timeslice: 0,
            lines_per_frame: 0,
            cycles_per_frame: 0,
            cycles_per_second: 0,
            audio_fragment_size: 0,
            audio_sample_rate: 0,
            audio_queue_capacity: 0,
            prebuffer_fragment_count: 0,
        };
        timing.recalculate();
        timing
    }

    pub fn update_frame_layout(&mut self, frame_layout: FrameLayout) -> &mut Self {
        self.frame_layout = frame_layout;
        self.recalculate();
        self
    }

    pub fn update_console_timing(&mut self, console_timing: ConsoleTiming) -> &mut Self {
        self.console_timing = console_timing;
        self.recalculate();
        self
    }

    pub fn update_playback_rate(&mut self, playback_rate: u32) -> &mut Self {
        self.playback_rate = playback_rate.max(1);
        self.recalculate();
        self
    }

    pub fn update_playback_period(&mut self, period: u32) -> &mut Self {
        self.playback_period = period;
        self.recalculate();
        self
    }

    pub fn update_audio_queue_extra_fragments(&mut self, fragments: u32) -> &mut Self {
        self.audio_queue_extra_fragments = fragments;
        self.recalculate();
        self
    }

    pub fn update_audio_queue_headroom(&mut self, headroom: u32) -> &mut Self {
        self.audio_queue_headroom = headroom;
        self.recalculate();
        self
    }

    pub fn update_speed_factor(&mut self, speed_factor: f32) -> &mut Self {
        self.speed_factor = if speed_factor > 0.0 { speed_factor } else { 1.0 };
        self.recalculate();
        self
    }

    fn recalculate(&mut self) {
        let speed = self.speed_factor as f64;

        self.lines_per_frame = self.frame_layout.frame_lines();

        self.audio_sample_rate = match self.console_timing {
            ConsoleTiming::Ntsc => (speed * 262.0 * 76.0 * 60.0).round() as u32 / CYCLES_PER_SAMPLE,
            ConsoleTiming::Pal | ConsoleTiming::Secam => {
                (speed * 312.0 * 76.0 * 50.0).round() as u32 / CYCLES_PER_SAMPLE
            }
        };

        self.cycles_per_second = self.audio_sample_rate * CYCLES_PER_SAMPLE;
        self.cycles_per_frame = CYCLES_PER_LINE * self.lines_per_frame;
        self.max_cycles_per_timeslice = (speed * self.cycles_per_frame as f64 * 2.0).round() as u32;
        self.min_cycles_per_timeslice = (speed * self.cycles_per_frame as f64 / 2.0).round() as u32;
        self.audio_fragment_size =
            ((speed * AUDIO_HALF_FRAMES_PER_FRAGMENT * self.lines_per_frame as f64).round() as u32)
                .max(1);

        self.prebuffer_fragment_count = (self.playback_period as f64
            * self.audio_sample_rate as f64
            / (self.audio_fragment_size as f64 * self.playback_rate as f64))
            .ceil() as u32
            + self.audio_queue_headroom;

        let timeslice_fragments = (self.max_cycles_per_timeslice as f64
            * self.audio_sample_rate as f64
            / (self.audio_fragment_size as f64 * self.cycles_per_second.max(1) as f64))
            .ceil() as u32;

        self.audio_queue_capacity = self.prebuffer_fragment_count.max(timeslice_fragments)
            + self.audio_queue_extra_fragments;
    }

    pub fn frame_layout(&self) -> FrameLayout {
        self.frame_layout
    }

    pub fn console_timing(&self) -> ConsoleTiming {
        self.console_timing
    }

    pub fn max_cycles_per_timeslice(&self) -> u32 {
        self.max_cycles_per_timeslice
    }

    pub fn min_cycles_per_timeslice(&self) -> u32 {
        self.min_cycles_per_timeslice
    }

    pub fn lines_per_frame(&self) -> u32 {
        self.lines_per_frame
    }

    pub fn cycles_per_frame(&self) -> u32 {
        self.cycles_per_frame
    }

    pub fn cycles_per_second(&self) -> u32 {
        self.cycles_per_second
    }

    pub fn audio_fragment_size(&self) -> u32 {
        self.audio_fragment_size
    }

    pub fn audio_sample_rate(&self) -> u32 {
        self.audio_sample_rate
    }

    pub fn audio_queue_capacity(&self) -> u32 {
        self.audio_queue_capacity
    }

    pub fn prebuffer_fragment_count(&self) -> u32 {
        self.prebuffer_fragment_count
    }
}
