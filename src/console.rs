//! Console glue
//!
//! Owns the [`System`] and everything derived from the display format: the
//! timing model, the palette and the audio queue. Construction resets the
//! machine, autodetects the frame layout and the visible start on throwaway
//! clones, then installs the palette.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use log::{debug, info, trace, warn};

use crate::audio::AudioQueue;
use crate::cartridge::Cartridge;
use crate::frame::{
    ConsoleTiming, DisplayFormat, FrameLayout, FrameLayoutDetector, FrameTracker, YStartDetector,
    FRAME_WIDTH,
};
use crate::savestate::{SaveStateError, Serializer};
use crate::settings::{PaletteType, Settings};
use crate::system::{Cpu, System};
use crate::tia::palette::{self, Palette};
use crate::timing::EmulationTiming;

/// Frames run to detect the frame layout
pub const LAYOUT_DETECTION_FRAMES: u32 = 60;

/// Frames run to detect the visible start
pub const YSTART_DETECTION_FRAMES: u32 = 80;

/// Lines of headroom above the detected visible start
pub const YSTART_EXTRA: u32 = 2;

/// An emulated console driven by the CPU `C`
pub struct Console<C: Cpu> {
    system: System<C>,

    settings: Settings,

    timing: EmulationTiming,

    /// Palette of the current console timing and variant
    palette: Palette,

    audio_queue: Arc<AudioQueue>,
}

impl<C: Cpu> Console<C> {
    /// Build and power on a console
    pub fn new(cpu: C, cartridge: Cartridge, settings: Settings) -> Self {
        let mut system = System::new(cpu, cartridge);
        system.reset();

        let timing = EmulationTiming::default();
        let audio_queue = Arc::new(AudioQueue::new(1, 1, false));

        let mut console = Console {
            system,
            palette: palette::palette(ConsoleTiming::Ntsc, PaletteType::Standard),
            settings,
            timing,
            audio_queue,
        };

        let layout = match console.settings.display_format.layout() {
            Some(layout) => layout,
            None => console.detect_layout(),
        };
        console.apply_layout(layout);

        match console.settings.ystart {
            Some(ystart) => console.set_ystart(ystart),
            None => {
                let ystart = console.detect_ystart();
                console.set_ystart(ystart);
            }
        }

        if let Some(path) = console.settings.palette_file.clone() {
            if let Err(e) = palette::load_user_palette(&path) {
                warn!("Could not load palette {}: {}", path.display(), e);
            }
        }
        console.install_palette();

        console.system.tia_mut().set_color_loss(console.settings.color_loss);
        console
    }

    /// Build a console around a ROM file
    pub fn with_rom<P: AsRef<Path>>(cpu: C, path: P, settings: Settings) -> Result<Self> {
        let cartridge = Cartridge::from_file(path.as_ref())
            .with_context(|| format!("Failed to load ROM: {}", path.as_ref().display()))?;
        Ok(Self::new(cpu, cartridge, settings))
    }

    /// Clone of the machine reset to power on, with audio detached and
    /// `tracker` watching the frames
    fn probe(&self, tracker: FrameTracker) -> System<C> {
        let mut probe = self.system.clone();
        probe.tia_mut().detach_audio();
        probe.reset();
        probe.tia_mut().set_frame_tracker(tracker);
        probe
    }

    /// Run `frames` frames on a probe and hand back its tracker
    fn run_probe(&self, tracker: FrameTracker, frames: u32) -> FrameTracker {
        let mut probe = self.probe(tracker);
        let max_cycles = self.timing.max_cycles_per_timeslice() as u64;

        for _ in 0..frames {
            run_system_frame(&mut probe, max_cycles);
        }

        probe.tia_mut().set_frame_tracker(FrameTracker::default())
    }

    /// Detect the frame layout on a clone of the machine
    pub fn detect_layout(&self) -> FrameLayout {
        let tracker = FrameTracker::Layout(FrameLayoutDetector::new());

        let layout = match self.run_probe(tracker, LAYOUT_DETECTION_FRAMES) {
            FrameTracker::Layout(detector) => {
                let (ntsc, pal) = detector.votes();
                debug!("Layout votes: {} NTSC, {} PAL", ntsc, pal);
                detector.detected_layout()
            }
            _ => FrameLayout::Ntsc,
        };

        info!("Detected frame layout: {}", layout);
        layout
    }

    /// Detect the visible start on a clone of the machine, including headroom
    pub fn detect_ystart(&self) -> u32 {
        let layout = self.layout();
        let tracker = FrameTracker::YStart(YStartDetector::new(layout));

        let ystart = match self.run_probe(tracker, YSTART_DETECTION_FRAMES) {
            FrameTracker::YStart(detector) => detector.detected_ystart(),
            _ => layout.metrics().default_ystart,
        };

        let ystart = ystart.saturating_sub(YSTART_EXTRA);
        info!("Detected ystart: {}", ystart);
        ystart
    }

    /// Re-run layout detection; applied when the format is `Auto`
    pub fn redetect_frame_layout(&mut self) -> FrameLayout {
        let layout = self.detect_layout();
        if self.settings.display_format == DisplayFormat::Auto {
            self.apply_layout(layout);
        }
        layout
    }

    /// Re-run visible start detection and apply the result
    pub fn redetect_ystart(&mut self) -> u32 {
        let ystart = self.detect_ystart();
        self.set_ystart(ystart);
        ystart
    }

    fn apply_layout(&mut self, layout: FrameLayout) {
        let console_timing = self
            .settings
            .display_format
            .console_timing()
            .unwrap_or(match layout {
                FrameLayout::Ntsc => ConsoleTiming::Ntsc,
                FrameLayout::Pal => ConsoleTiming::Pal,
            });

        let audio = &self.settings.audio;
        let mut timing = EmulationTiming::new(layout, console_timing);
        timing
            .update_playback_rate(audio.sample_rate)
            .update_playback_period(audio.fragment_size)
            .update_audio_queue_headroom(audio.headroom)
            .update_audio_queue_extra_fragments(audio.buffer_size)
            .update_speed_factor(self.settings.speed);
        self.timing = timing;

        if let Some(manager) = self.system.tia_mut().frame_tracker_mut().manager_mut() {
            manager.set_layout(layout);
        }

        let fragment_size = self.timing.audio_fragment_size() as usize;
        let capacity = self.timing.audio_queue_capacity() as usize;
        let queue = &self.audio_queue;
        let reusable = queue.fragment_size() == fragment_size
            && queue.capacity() == capacity
            && queue.is_stereo() == audio.stereo;

        // Keep the queue the playback side is draining unless its shape changed
        if !reusable {
            self.audio_queue = Arc::new(AudioQueue::new(fragment_size, capacity, audio.stereo));
        }
        self.audio_queue.ignore_overflows(!audio.enabled);

        let attached = audio.enabled.then(|| Arc::clone(&self.audio_queue));
        self.system.tia_mut().set_audio_queue(attached);

        self.install_palette();

        debug!(
            "Layout {} with {:?} timing, {} Hz audio",
            layout,
            console_timing,
            self.timing.audio_sample_rate()
        );
    }

    fn install_palette(&mut self) {
        let variant = match self.settings.palette {
            PaletteType::User if !palette::has_user_palette() => {
                warn!("No user palette loaded, using standard palette");
                self.settings.palette = PaletteType::Standard;
                PaletteType::Standard
            }
            variant => variant,
        };
        self.palette = palette::palette(self.timing.console_timing(), variant);
    }

    /// Switch the display format; only call between frames
    pub fn set_format(&mut self, format: DisplayFormat) {
        self.settings.display_format = format;
        let layout = match format.layout() {
            Some(layout) => layout,
            None => self.detect_layout(),
        };
        self.apply_layout(layout);
        info!("Display format: {}", format);
    }

    /// Cycle to the next display format
    pub fn toggle_format(&mut self) -> DisplayFormat {
        let format = self.settings.display_format.next();
        self.set_format(format);
        format
    }

    /// Cycle to the next palette
    pub fn toggle_palette(&mut self) -> PaletteType {
        self.settings.palette = self.settings.palette.next(palette::has_user_palette());
        self.install_palette();
        self.settings.palette
    }

    pub fn set_ystart(&mut self, ystart: u32) {
        if let Some(manager) = self.system.tia_mut().frame_tracker_mut().manager_mut() {
            manager.set_ystart(ystart);
        }
    }

    pub fn ystart(&self) -> u32 {
        self.system
            .tia()
            .frame_tracker()
            .manager()
            .map_or(0, |manager| manager.ystart())
    }

    pub fn set_color_loss(&mut self, enabled: bool) {
        self.settings.color_loss = enabled;
        self.system.tia_mut().set_color_loss(enabled);
    }

    /// Reset the machine, keeping format and detection results
    pub fn reset(&mut self) {
        self.system.reset();
    }

    /// Run until a frame completes or the timeslice cap is hit
    pub fn run_frame(&mut self) -> u64 {
        let max_cycles = self.timing.max_cycles_per_timeslice() as u64;
        let cycles = run_system_frame(&mut self.system, max_cycles);

        trace!(
            "Frame {}: {} cycles, {} lines",
            self.system.tia().frame_count(),
            cycles,
            self.system.tia().scanlines_last_frame()
        );
        cycles
    }

    /// Frames per second implied by the last frame's line count
    pub fn frame_rate(&self) -> f32 {
        let console_timing = self.timing.console_timing();
        let base_fps = console_timing.base_frame_rate() as f32;

        match self.system.tia().scanlines_last_frame() {
            0 => base_fps,
            lines => console_timing.base_lines() as f32 * base_fps / lines as f32,
        }
    }

    /// Last completed frame as 0x00RRGGBB pixels
    pub fn frame_rgb(&self) -> Vec<u32> {
        self.system
            .tia()
            .frame_buffer()
            .iter()
            .map(|&index| self.palette[index as usize])
            .collect()
    }

    /// Last completed frame as an image
    pub fn screenshot(&self) -> RgbImage {
        let height = self.system.tia().frame_buffer().len() / FRAME_WIDTH;
        let pixels = self.frame_rgb();

        RgbImage::from_fn(FRAME_WIDTH as u32, height as u32, |x, y| {
            let rgb = pixels[y as usize * FRAME_WIDTH + x as usize];
            Rgb([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8])
        })
    }

    /// Randomly clear bits in the low page of the address space
    ///
    /// Only active when frying is allowed in the settings.
    pub fn fry(&mut self) {
        if !self.settings.allow_fry {
            return;
        }

        let bus = self.system.bus_mut();
        let mut addr: u16 = 0;
        while addr < 0x100 {
            let value = bus.peek_quiet(addr) & rand::random::<u8>();
            bus.poke_quiet(addr, value);
            addr += rand::random::<u8>() as u16 % 4;
        }
    }

    // Snapshots

    /// Append the whole console state
    pub fn save_state(&self, out: &mut Serializer) -> bool {
        match out.put(&(self.settings.display_format, &self.system)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to save console state: {}", e);
                false
            }
        }
    }

    /// Restore the whole console state; nothing changes on failure
    pub fn load_state(&mut self, input: &mut Serializer) -> bool {
        match input.get::<(DisplayFormat, System<C>)>() {
            Ok((format, system)) => {
                self.restore(format, system);
                true
            }
            Err(e) => {
                warn!("Failed to load console state: {}", e);
                false
            }
        }
    }

    fn restore(&mut self, format: DisplayFormat, system: System<C>) {
        self.system = system;
        self.settings.display_format = format;

        let layout = self
            .system
            .tia()
            .frame_tracker()
            .manager()
            .map_or(self.timing.frame_layout(), |manager| manager.layout());
        self.apply_layout(layout);
    }

    pub fn save_state_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveStateError> {
        let mut out = Serializer::new();
        out.put(&(self.settings.display_format, &self.system))?;
        out.save_to_file(path)
    }

    pub fn load_state_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SaveStateError> {
        let mut input = Serializer::load_from_file(path)?;
        let (format, system) = input.get::<(DisplayFormat, System<C>)>()?;
        input.finish()?;

        self.restore(format, system);
        Ok(())
    }

    // Accessors

    pub fn system(&self) -> &System<C> {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut System<C> {
        &mut self.system
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn timing(&self) -> &EmulationTiming {
        &self.timing
    }

    pub fn layout(&self) -> FrameLayout {
        self.timing.frame_layout()
    }

    pub fn console_timing(&self) -> ConsoleTiming {
        self.timing.console_timing()
    }

    pub fn format(&self) -> DisplayFormat {
        self.settings.display_format
    }

    /// Queue the chip pushes audio into; replaced on format changes
    pub fn audio_queue(&self) -> Arc<AudioQueue> {
        Arc::clone(&self.audio_queue)
    }
}

/// Step `system` until the chip reports a new frame or `max_cycles` pass
fn run_system_frame<C: Cpu>(system: &mut System<C>, max_cycles: u64) -> u64 {
    let start = system.cycles();
    while system.cycles() - start < max_cycles {
        system.step();
        if system.tia_mut().take_frame_complete() {
            break;
        }
    }
    system.cycles() - start
}
