//! Console scenarios driven by the display kernel

use std::sync::Arc;

use rusty_vcs::frame::{ConsoleTiming, DisplayFormat, FrameLayout, FRAME_WIDTH};
use rusty_vcs::kernel::{DisplayKernel, KernelLines};
use rusty_vcs::savestate::Serializer;
use rusty_vcs::settings::Settings;
use rusty_vcs::{Cartridge, Console};

fn console_for(layout: FrameLayout, settings: Settings) -> Console<DisplayKernel> {
    Console::new(DisplayKernel::for_layout(layout), Cartridge::demo(), settings)
}

fn run_frames(console: &mut Console<DisplayKernel>, frames: u32) {
    for _ in 0..frames {
        console.run_frame();
    }
}

#[test]
fn test_detects_ntsc_kernel() {
    let console = console_for(FrameLayout::Ntsc, Settings::default());

    assert_eq!(console.format(), DisplayFormat::Auto);
    assert_eq!(console.layout(), FrameLayout::Ntsc);
    assert_eq!(console.console_timing(), ConsoleTiming::Ntsc);
    // VBLANK ends 37 lines after VSYNC, minus the headroom
    assert_eq!(console.ystart(), 35);
}

#[test]
fn test_detects_pal_kernel() {
    let console = console_for(FrameLayout::Pal, Settings::default());

    assert_eq!(console.layout(), FrameLayout::Pal);
    assert_eq!(console.console_timing(), ConsoleTiming::Pal);
    assert_eq!(console.ystart(), 43);
}

#[test]
fn test_detection_leaves_machine_at_power_on() {
    let console = console_for(FrameLayout::Pal, Settings::default());
    assert_eq!(console.system().cycles(), 0);
    assert_eq!(console.system().tia().frame_count(), 0);
}

#[test]
fn test_frames_have_kernel_line_count() {
    let mut console = console_for(FrameLayout::Pal, Settings::default());
    run_frames(&mut console, 4);

    assert_eq!(console.system().tia().scanlines_last_frame(), 312);
    assert!((console.frame_rate() - 50.0).abs() < 1e-3);
}

#[test]
fn test_background_rows_reach_frame_buffer() {
    let mut console = console_for(FrameLayout::Ntsc, Settings::default());
    run_frames(&mut console, 4);

    let frame = console.system().tia().frame_buffer();
    assert_eq!(frame.len() % FRAME_WIDTH, 0);
    // Kernel row 17 draws colour 0x12 across the whole line
    assert!(frame
        .chunks(FRAME_WIDTH)
        .any(|row| row.iter().all(|&c| c == 0x12)));

    let rgb = console.frame_rgb();
    assert_eq!(rgb.len(), frame.len());

    let image = console.screenshot();
    assert_eq!(image.width() as usize, FRAME_WIDTH);
    assert_eq!(image.height() as usize, frame.len() / FRAME_WIDTH);
}

#[test]
fn test_format_change() {
    let mut console = console_for(FrameLayout::Ntsc, Settings::default());

    console.set_format(DisplayFormat::Pal60);
    assert_eq!(console.layout(), FrameLayout::Ntsc);
    assert_eq!(console.console_timing(), ConsoleTiming::Pal);

    console.set_format(DisplayFormat::Ntsc50);
    assert_eq!(console.layout(), FrameLayout::Pal);
    assert_eq!(console.console_timing(), ConsoleTiming::Ntsc);

    console.set_format(DisplayFormat::Auto);
    assert_eq!(console.layout(), FrameLayout::Ntsc);
    assert_eq!(console.toggle_format(), DisplayFormat::Ntsc);
}

#[test]
fn test_snapshot_replays_identically() {
    let mut console = console_for(FrameLayout::Ntsc, Settings::default());
    run_frames(&mut console, 5);

    let mut state = Serializer::new();
    assert!(console.save_state(&mut state));

    run_frames(&mut console, 3);
    let cycles = console.system().cycles();
    let frame = console.system().tia().frame_buffer().to_vec();

    state.rewind();
    assert!(console.load_state(&mut state));
    run_frames(&mut console, 3);

    assert_eq!(console.system().cycles(), cycles);
    assert_eq!(console.system().tia().frame_buffer(), &frame[..]);
}

#[test]
fn test_failed_load_keeps_state() {
    let mut console = console_for(FrameLayout::Ntsc, Settings::default());
    run_frames(&mut console, 2);
    let cycles = console.system().cycles();

    let mut junk = Serializer::new();
    junk.put(&7u8).unwrap();
    assert!(!console.load_state(&mut junk));
    assert_eq!(console.system().cycles(), cycles);
}

#[test]
fn test_snapshot_file_round_trip() {
    let name = format!("rusty_vcs_console_{}.state", std::process::id());
    let path = std::env::temp_dir().join(name);

    let mut console = console_for(FrameLayout::Pal, Settings::default());
    run_frames(&mut console, 3);
    console.save_state_to_file(&path).unwrap();
    let cycles = console.system().cycles();

    let mut other = console_for(FrameLayout::Pal, Settings::default());
    other.load_state_from_file(&path).unwrap();
    assert_eq!(other.system().cycles(), cycles);
    assert_eq!(other.layout(), FrameLayout::Pal);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_fry_when_allowed() {
    let settings = Settings {
        allow_fry: true,
        ..Settings::default()
    };
    let mut console = console_for(FrameLayout::Ntsc, settings);
    run_frames(&mut console, 1);
    let cycles = console.system().cycles();
    console.fry();
    assert_eq!(console.system().cycles(), cycles);

    run_frames(&mut console, 2);
    assert!(console.system().tia().frame_count() > 0);
}

#[test]
fn test_load_keeps_playback_queue() {
    let mut console = console_for(FrameLayout::Ntsc, Settings::default());
    let held = console.audio_queue();
    run_frames(&mut console, 2);

    let mut state = Serializer::new();
    assert!(console.save_state(&mut state));
    state.rewind();
    assert!(console.load_state(&mut state));

    assert!(Arc::ptr_eq(&held, &console.audio_queue()));
    while held.dequeue(None).is_some() {}

    run_frames(&mut console, 3);
    assert!(held.size() > 0);
}

fn color_loss_console(extra_lines: u32) -> Console<DisplayKernel> {
    let mut lines = KernelLines::from(FrameLayout::Ntsc.metrics());
    lines.overscan += extra_lines;

    let settings = Settings {
        display_format: DisplayFormat::Ntsc,
        color_loss: true,
        ..Settings::default()
    };
    Console::new(DisplayKernel::new(lines), Cartridge::demo(), settings)
}

#[test]
fn test_color_loss_on_odd_frames() {
    let mut console = color_loss_console(1);
    run_frames(&mut console, 5);

    let tia = console.system().tia();
    assert_eq!(tia.scanlines_last_frame(), 263);

    let frame = tia.frame_buffer();
    assert!(!frame.is_empty());
    assert!(frame.iter().all(|&c| c & 0x01 != 0));
}

#[test]
fn test_no_color_loss_on_even_frames() {
    let mut console = color_loss_console(0);
    run_frames(&mut console, 5);

    let tia = console.system().tia();
    assert_eq!(tia.scanlines_last_frame(), 262);

    let frame = tia.frame_buffer();
    assert!(!frame.is_empty());
    assert!(frame.iter().all(|&c| c & 0x01 == 0));
}
