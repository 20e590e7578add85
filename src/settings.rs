//! Emulator settings
//!
//! Plain configuration values. The binary fills these in from its command
//! line; library users construct them directly.

use std::path::PathBuf;

use clap::ValueEnum;

use crate::frame::DisplayFormat;

/// Resampler used on the playback side
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResamplingQuality {
    /// Nearest neighbour, cheapest
    NearestNeighbour,
    /// Lanczos with a = 2
    Lanczos2,
    /// Lanczos with a = 3
    Lanczos3,
}

/// Built-in or user palette selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum PaletteType {
    Standard,
    Z26,
    User,
}

impl PaletteType {
    /// Next palette in cycling order; `User` is skipped when not installed
    pub fn next(self, user_available: bool) -> Self {
        match self {
            PaletteType::Standard => PaletteType::Z26,
            PaletteType::Z26 if user_available => PaletteType::User,
            PaletteType::Z26 | PaletteType::User => PaletteType::Standard,
        }
    }
}

/// Audio configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    /// Host playback sample rate
    pub sample_rate: u32,

    /// Host fragment size in frames (playback period)
    pub fragment_size: u32,

    /// Fragments kept queued before playback starts
    pub headroom: u32,

    /// Extra queue capacity on top of what timing requires
    pub buffer_size: u32,

    pub resampling_quality: ResamplingQuality,

    /// Chip output in stereo (one channel per generator)
    pub stereo: bool,

    /// Volume percentage (0 - 100)
    pub volume: u32,

    pub enabled: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        AudioSettings {
            sample_rate: 44100,
            fragment_size: 512,
            headroom: 2,
            buffer_size: 3,
            resampling_quality: ResamplingQuality::Lanczos3,
            stereo: false,
            volume: 80,
            enabled: true,
        }
    }
}

/// Console configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub display_format: DisplayFormat,

    pub palette: PaletteType,

    /// User palette file, if any
    pub palette_file: Option<PathBuf>,

    /// Emulate colour loss on frames with an odd line count
    pub color_loss: bool,

    /// Fixed visible start; detection is skipped when set
    pub ystart: Option<u32>,

    /// Emulation speed multiplier
    pub speed: f32,

    /// Allow the frying easter egg
    pub allow_fry: bool,

    pub audio: AudioSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            display_format: DisplayFormat::Auto,
            palette: PaletteType::Standard,
            palette_file: None,
            color_loss: false,
            ystart: None,
            speed: 1.0,
            allow_fry: false,
            audio: AudioSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_cycle() {
        assert_eq!(PaletteType::Standard.next(false), PaletteType::Z26);
        assert_eq!(PaletteType::Z26.next(false), PaletteType::Standard);
        assert_eq!(PaletteType::Z26.next(true), PaletteType::User);
        assert_eq!(PaletteType::User.next(true), PaletteType::Standard);
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.display_format, DisplayFormat::Auto);
        assert_eq!(settings.audio.sample_rate, 44100);
        assert_eq!(settings.audio.resampling_quality, ResamplingQuality::Lanczos3);
    }
}
