//! RustyVCS - runs the built-in display kernel on the emulated chip
//!
//! The kernel stands in for a game: it draws a frame with the requested line
//! counts, and the console autodetects layout and visible start from it.
//! Optionally the audio queue is drained on a playback thread and the last
//! frame is written out as a PNG.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use rusty_vcs::audio::{AudioQueue, AudioSystem};
use rusty_vcs::frame::{DisplayFormat, FrameLayout};
use rusty_vcs::kernel::{DisplayKernel, KernelLines};
use rusty_vcs::settings::{AudioSettings, PaletteType, ResamplingQuality, Settings};
use rusty_vcs::timing::EmulationTiming;
use rusty_vcs::{Cartridge, Console};

/// Command line arguments for RustyVCS
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    /// Emit a 312 line kernel instead of 262 lines
    #[clap(long)]
    pal: bool,

    /// Visible lines of the kernel (overrides the layout default)
    #[clap(long)]
    visible: Option<u32>,

    /// Display format
    #[clap(short, long, value_enum, default_value = "auto")]
    format: DisplayFormat,

    /// Frames to run
    #[clap(short = 'n', long, default_value = "120")]
    frames: u32,

    /// Write the last frame to this PNG file
    #[clap(short, long)]
    screenshot: Option<PathBuf>,

    /// 2K or 4K ROM image supplying the colour table
    #[clap(long)]
    rom: Option<PathBuf>,

    /// Palette variant
    #[clap(long, value_enum, default_value = "standard")]
    palette: PaletteType,

    /// User palette file
    #[clap(long)]
    palette_file: Option<PathBuf>,

    /// Fixed visible start, skips detection
    #[clap(long)]
    ystart: Option<u32>,

    /// Emulate colour loss
    #[clap(long)]
    color_loss: bool,

    /// Drain audio on a playback thread in real time
    #[clap(short, long)]
    audio: bool,

    /// Playback sample rate
    #[clap(long, default_value = "44100")]
    sample_rate: u32,

    /// Resampling quality
    #[clap(long, value_enum, default_value = "lanczos3")]
    quality: ResamplingQuality,

    /// Stereo output
    #[clap(long)]
    stereo: bool,

    /// Save a snapshot of the console after the run
    #[clap(long)]
    save_state: Option<PathBuf>,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            display_format: self.format,
            palette: self.palette,
            palette_file: self.palette_file.clone(),
            color_loss: self.color_loss,
            ystart: self.ystart,
            audio: AudioSettings {
                sample_rate: self.sample_rate,
                resampling_quality: self.quality,
                stereo: self.stereo,
                enabled: self.audio,
                ..AudioSettings::default()
            },
            ..Settings::default()
        }
    }

    fn kernel(&self) -> DisplayKernel {
        let layout = if self.pal {
            FrameLayout::Pal
        } else {
            FrameLayout::Ntsc
        };
        let mut lines = KernelLines::from(layout.metrics());
        if let Some(visible) = self.visible {
            lines.overscan = (lines.total() - lines.vsync - lines.vblank).saturating_sub(visible);
            lines.visible = visible;
        }
        DisplayKernel::new(lines)
    }
}

/// Playback side: drains the queue at the host rate until told to stop
struct Playback {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<PlaybackStats>,
}

#[derive(Debug, Default)]
struct PlaybackStats {
    fragments: u64,
    underruns: u64,
    peak: i16,
}

impl Playback {
    fn spawn(queue: Arc<AudioQueue>, timing: &EmulationTiming, settings: &AudioSettings) -> Self {
        let mut system = AudioSystem::new(queue, timing, settings);
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let period = Duration::from_secs_f64(
            system.format().fragment_size as f64 / system.format().sample_rate as f64,
        );

        let handle = thread::spawn(move || {
            let mut stats = PlaybackStats::default();
            let mut fragment = vec![0; system.fragment_len()];

            while !flag.load(Ordering::Relaxed) {
                system.fill_pcm(&mut fragment);
                stats.fragments += 1;
                if system.is_underrun() {
                    stats.underruns += 1;
                }
                let peak = fragment.iter().map(|s| s.saturating_abs()).max().unwrap_or(0);
                stats.peak = stats.peak.max(peak);

                thread::sleep(period);
            }
            stats
        });

        Playback { stop, handle }
    }

    fn finish(self) -> PlaybackStats {
        self.stop.store(true, Ordering::Relaxed);
        self.handle.join().unwrap_or_default()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("RustyVCS starting...");

    let settings = args.settings();
    let mut console = match &args.rom {
        Some(path) => Console::with_rom(args.kernel(), path, settings)?,
        None => Console::new(args.kernel(), Cartridge::demo(), settings),
    };

    info!(
        "Format {}: {} layout, {:?} timing, ystart {}",
        console.format(),
        console.layout(),
        console.console_timing(),
        console.ystart()
    );

    let playback = args.audio.then(|| {
        Playback::spawn(
            console.audio_queue(),
            console.timing(),
            &console.settings().audio,
        )
    });

    let started = Instant::now();
    for frame in 0..args.frames {
        let frame_start = Instant::now();
        let cycles = console.run_frame();
        debug!("Frame {}: {} cycles", frame, cycles);

        // Pace to real time only while someone is listening
        if playback.is_some() {
            let target = Duration::from_secs_f32(1.0 / console.frame_rate());
            if let Some(rest) = target.checked_sub(frame_start.elapsed()) {
                thread::sleep(rest);
            }
        }
    }

    let tia = console.system().tia();
    println!("frames:        {}", tia.frame_count());
    println!("layout:        {}", console.layout());
    println!("format:        {}", console.format());
    println!("ystart:        {}", console.ystart());
    println!("lines/frame:   {}", tia.scanlines_last_frame());
    println!("frame rate:    {:.2} Hz", console.frame_rate());
    println!("cpu cycles:    {}", console.system().cycles());
    println!("elapsed:       {:.2?}", started.elapsed());

    if let Some(playback) = playback {
        let stats = playback.finish();
        println!(
            "audio:         {} fragments, {} underruns, peak {}",
            stats.fragments, stats.underruns, stats.peak
        );
        println!("queue drops:   {}", console.audio_queue().overflow_count());
    }

    if let Some(path) = &args.screenshot {
        console
            .screenshot()
            .save(path)
            .with_context(|| format!("Failed to write screenshot: {}", path.display()))?;
        info!("Screenshot written to {}", path.display());
    }

    if let Some(path) = &args.save_state {
        console
            .save_state_to_file(path)
            .with_context(|| format!("Failed to save state: {}", path.display()))?;
    }

    Ok(())
}
